use crate::render::Problem;

/// The number of color channels a field needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channels {
    R,
    Rg,
    Rgba,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Linear,
    Nearest,
}

/// Where a pass draws to.
pub enum Target<'a, T> {
    Texture(&'a T),
    Screen { width: u32, height: u32 },
}

impl<T> Clone for Target<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Target<'_, T> {}

/// One full-screen pass, tagged by the program that runs it.
///
/// `texel_size` is the size of one texel of the grid the stencil walks over.
pub enum Pass<'a, T> {
    Copy {
        source: &'a T,
    },
    Clear {
        source: &'a T,
        value: f32,
    },
    /// `shading` picks the lit variant of the display program.
    Display {
        dye: &'a T,
        texel_size: [f32; 2],
        shading: bool,
    },
    Splat {
        target: &'a T,
        aspect_ratio: f32,
        point: [f32; 2],
        color: [f32; 3],
        radius: f32,
    },
    Advection {
        velocity: &'a T,
        source: &'a T,
        texel_size: [f32; 2],
        source_texel_size: [f32; 2],
        dt: f32,
        dissipation: f32,
    },
    Divergence {
        velocity: &'a T,
        texel_size: [f32; 2],
    },
    Curl {
        velocity: &'a T,
        texel_size: [f32; 2],
    },
    Vorticity {
        velocity: &'a T,
        curl: &'a T,
        texel_size: [f32; 2],
        strength: f32,
        dt: f32,
    },
    Pressure {
        pressure: &'a T,
        divergence: &'a T,
        texel_size: [f32; 2],
    },
    GradientSubtract {
        pressure: &'a T,
        velocity: &'a T,
        texel_size: [f32; 2],
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Copy,
    Clear,
    Display,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
}

impl<T> Pass<'_, T> {
    pub fn kind(&self) -> PassKind {
        match self {
            Pass::Copy { .. } => PassKind::Copy,
            Pass::Clear { .. } => PassKind::Clear,
            Pass::Display { .. } => PassKind::Display,
            Pass::Splat { .. } => PassKind::Splat,
            Pass::Advection { .. } => PassKind::Advection,
            Pass::Divergence { .. } => PassKind::Divergence,
            Pass::Curl { .. } => PassKind::Curl,
            Pass::Vorticity { .. } => PassKind::Vorticity,
            Pass::Pressure { .. } => PassKind::Pressure,
            Pass::GradientSubtract { .. } => PassKind::GradientSubtract,
        }
    }

    /// The vertex stage texel size. Passes that only read at `vUv` don't
    /// need one.
    pub fn texel_size(&self) -> [f32; 2] {
        match self {
            Pass::Copy { .. } | Pass::Clear { .. } | Pass::Splat { .. } => [0.0, 0.0],
            Pass::Display { texel_size, .. }
            | Pass::Advection { texel_size, .. }
            | Pass::Divergence { texel_size, .. }
            | Pass::Curl { texel_size, .. }
            | Pass::Vorticity { texel_size, .. }
            | Pass::Pressure { texel_size, .. }
            | Pass::GradientSubtract { texel_size, .. } => *texel_size,
        }
    }
}

/// Something that can allocate field textures and run passes over them.
///
/// Blending is enabled for [`Pass::Display`] only. Every other pass
/// overwrites its target.
pub trait Backend {
    type Texture;

    /// Whether float textures can be sampled with hardware bilinear filtering.
    fn linear_filtering(&self) -> bool;

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        channels: Channels,
        filter: Filter,
    ) -> Result<Self::Texture, Problem>;

    fn clear(&self, target: Target<'_, Self::Texture>, color: [f32; 4]);

    fn draw(&self, pass: &Pass<'_, Self::Texture>, target: Target<'_, Self::Texture>);
}
