use serde::{Deserialize, Serialize};

/// Dye resolution used when float textures can't be filtered.
pub const FALLBACK_DYE_RESOLUTION: u32 = 256;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Grid cells along the shorter side of the surface for velocity and
    /// pressure.
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    /// Reserved. Nothing is captured yet.
    pub capture_resolution: u32,

    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// How much of last frame's pressure seeds the solver.
    pub pressure: f32,
    pub pressure_iterations: u32,
    /// Vorticity confinement strength.
    pub curl: f32,

    /// Splat radius as a percentage of the surface.
    pub splat_radius: f32,
    pub splat_force: f32,

    pub shading: bool,
    pub color_update_speed: f32,
    pub back_color: Color,
    pub transparent: bool,

    pub seed: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sim_resolution: 128,
            dye_resolution: 1440,
            capture_resolution: 512,
            density_dissipation: 3.5,
            velocity_dissipation: 2.0,
            pressure: 0.1,
            pressure_iterations: 20,
            curl: 30.0,
            splat_radius: 0.5,
            splat_force: 15000.0,
            shading: true,
            color_update_speed: 10.0,
            back_color: Color {
                r: 0.5,
                g: 0.0,
                b: 0.0,
            },
            transparent: true,
            seed: None,
        }
    }
}

impl Settings {
    /// Without linear filtering, drop to a small dye field and turn shading
    /// off.
    pub fn downgrade(mut self, linear_filtering: bool) -> Self {
        if !linear_filtering {
            log::warn!(
                "Float textures can't be filtered. Lowering the dye resolution to {} and disabling shading",
                FALLBACK_DYE_RESOLUTION
            );

            self.dye_resolution = FALLBACK_DYE_RESOLUTION;
            self.shading = false;
        }

        self
    }

    /// The color the surface is cleared to before the dye is drawn.
    pub fn clear_color(&self) -> [f32; 4] {
        if self.transparent {
            [0.0, 0.0, 0.0, 0.0]
        } else {
            [self.back_color.r, self.back_color.g, self.back_color.b, 1.0]
        }
    }
}
