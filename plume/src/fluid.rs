use crate::backend::{Backend, Pass, Target};
use crate::framebuffer::{FramebufferSet, Size};
use crate::render::Problem;
use crate::settings::Settings;

use std::rc::Rc;

/// The stable fluids solver. Owns every field and the backend that runs
/// passes over them.
pub struct Fluid<B: Backend> {
    backend: B,
    settings: Rc<Settings>,
    surface: Size,
    framebuffers: FramebufferSet<B::Texture>,
}

impl<B: Backend> Fluid<B> {
    pub fn new(backend: B, surface: Size, settings: &Rc<Settings>) -> Result<Self, Problem> {
        let framebuffers = FramebufferSet::allocate(
            &backend,
            surface,
            settings.sim_resolution,
            settings.dye_resolution,
        )?;

        Ok(Self {
            backend,
            settings: Rc::clone(settings),
            surface,
            framebuffers,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn framebuffers(&self) -> &FramebufferSet<B::Texture> {
        &self.framebuffers
    }

    pub fn surface(&self) -> Size {
        self.surface
    }

    /// Reallocate every field for a new surface size. Velocity and dye are
    /// resampled into the new fields. The rest start from zero.
    pub fn resize(&mut self, surface: Size) -> Result<(), Problem> {
        log::debug!("Resizing surface to {}x{}", surface.width, surface.height);

        let framebuffers = FramebufferSet::allocate(
            &self.backend,
            surface,
            self.settings.sim_resolution,
            self.settings.dye_resolution,
        )?;

        self.backend.draw(
            &Pass::Copy {
                source: &self.framebuffers.velocity.read().texture,
            },
            Target::Texture(&framebuffers.velocity.read().texture),
        );
        self.backend.draw(
            &Pass::Copy {
                source: &self.framebuffers.dye.read().texture,
            },
            Target::Texture(&framebuffers.dye.read().texture),
        );

        self.framebuffers = framebuffers;
        self.surface = surface;

        Ok(())
    }

    /// The splat radius in texture space. Widened on landscape surfaces so
    /// the splat stays round on screen.
    pub fn correct_radius(&self, radius: f32) -> f32 {
        let aspect_ratio = self.surface.aspect_ratio();

        if aspect_ratio > 1.0 {
            radius * aspect_ratio
        } else {
            radius
        }
    }

    /// Add a gaussian impulse to velocity and a matching blob of color to
    /// the dye.
    pub fn splat(&mut self, point: [f32; 2], impulse: [f32; 2], color: [f32; 3]) {
        let aspect_ratio = self.surface.aspect_ratio();
        let radius = self.correct_radius(self.settings.splat_radius / 100.0);
        let framebuffers = &mut self.framebuffers;

        self.backend.draw(
            &Pass::Splat {
                target: &framebuffers.velocity.read().texture,
                aspect_ratio,
                point,
                color: [impulse[0], impulse[1], 0.0],
                radius,
            },
            Target::Texture(&framebuffers.velocity.write().texture),
        );
        framebuffers.velocity.swap();

        self.backend.draw(
            &Pass::Splat {
                target: &framebuffers.dye.read().texture,
                aspect_ratio,
                point,
                color,
                radius,
            },
            Target::Texture(&framebuffers.dye.write().texture),
        );
        framebuffers.dye.swap();
    }

    /// Advance the fields by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.curl();
        self.vorticity(dt);
        self.divergence();
        self.clear_pressure();
        self.solve_pressure();
        self.subtract_gradient();
        self.advect_velocity(dt);
        self.advect_dye(dt);
    }

    pub fn curl(&self) {
        let velocity = &self.framebuffers.velocity;

        self.backend.draw(
            &Pass::Curl {
                velocity: &velocity.read().texture,
                texel_size: velocity.texel_size(),
            },
            Target::Texture(&self.framebuffers.curl.texture),
        );
    }

    pub fn vorticity(&mut self, dt: f32) {
        let framebuffers = &mut self.framebuffers;

        self.backend.draw(
            &Pass::Vorticity {
                velocity: &framebuffers.velocity.read().texture,
                curl: &framebuffers.curl.texture,
                texel_size: framebuffers.velocity.texel_size(),
                strength: self.settings.curl,
                dt,
            },
            Target::Texture(&framebuffers.velocity.write().texture),
        );
        framebuffers.velocity.swap();
    }

    pub fn divergence(&self) {
        let velocity = &self.framebuffers.velocity;

        self.backend.draw(
            &Pass::Divergence {
                velocity: &velocity.read().texture,
                texel_size: velocity.texel_size(),
            },
            Target::Texture(&self.framebuffers.divergence.texture),
        );
    }

    /// Scale down last step's pressure. What's left seeds the solver.
    pub fn clear_pressure(&mut self) {
        let pressure = &mut self.framebuffers.pressure;

        self.backend.draw(
            &Pass::Clear {
                source: &pressure.read().texture,
                value: self.settings.pressure,
            },
            Target::Texture(&pressure.write().texture),
        );
        pressure.swap();
    }

    /// Jacobi iterations on the pressure Poisson equation.
    pub fn solve_pressure(&mut self) {
        let framebuffers = &mut self.framebuffers;

        for _ in 0..self.settings.pressure_iterations {
            self.backend.draw(
                &Pass::Pressure {
                    pressure: &framebuffers.pressure.read().texture,
                    divergence: &framebuffers.divergence.texture,
                    texel_size: framebuffers.pressure.texel_size(),
                },
                Target::Texture(&framebuffers.pressure.write().texture),
            );
            framebuffers.pressure.swap();
        }
    }

    pub fn subtract_gradient(&mut self) {
        let framebuffers = &mut self.framebuffers;

        self.backend.draw(
            &Pass::GradientSubtract {
                pressure: &framebuffers.pressure.read().texture,
                velocity: &framebuffers.velocity.read().texture,
                texel_size: framebuffers.velocity.texel_size(),
            },
            Target::Texture(&framebuffers.velocity.write().texture),
        );
        framebuffers.velocity.swap();
    }

    pub fn advect_velocity(&mut self, dt: f32) {
        let velocity = &mut self.framebuffers.velocity;
        let texel_size = velocity.texel_size();

        self.backend.draw(
            &Pass::Advection {
                velocity: &velocity.read().texture,
                source: &velocity.read().texture,
                texel_size,
                source_texel_size: texel_size,
                dt,
                dissipation: self.settings.velocity_dissipation,
            },
            Target::Texture(&velocity.write().texture),
        );
        velocity.swap();
    }

    pub fn advect_dye(&mut self, dt: f32) {
        let framebuffers = &mut self.framebuffers;

        self.backend.draw(
            &Pass::Advection {
                velocity: &framebuffers.velocity.read().texture,
                source: &framebuffers.dye.read().texture,
                texel_size: framebuffers.velocity.texel_size(),
                source_texel_size: framebuffers.dye.texel_size(),
                dt,
                dissipation: self.settings.density_dissipation,
            },
            Target::Texture(&framebuffers.dye.write().texture),
        );
        framebuffers.dye.swap();
    }

    /// Composite the dye onto the visible surface.
    pub fn render(&self) {
        let screen = Target::Screen {
            width: self.surface.width,
            height: self.surface.height,
        };

        self.backend.clear(screen, self.settings.clear_color());
        self.backend.draw(
            &Pass::Display {
                dye: &self.framebuffers.dye.read().texture,
                texel_size: [
                    1.0 / self.surface.width as f32,
                    1.0 / self.surface.height as f32,
                ],
                shading: self.settings.shading,
            },
            screen,
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::PassKind;
    use crate::cpu::{CpuBackend, CpuTexture};
    use approx::assert_relative_eq;

    fn fluid(surface: Size, settings: Settings) -> Fluid<CpuBackend> {
        Fluid::new(CpuBackend::new(true), surface, &Rc::new(settings))
            .expect("cpu fluid")
    }

    fn small() -> Settings {
        Settings {
            sim_resolution: 8,
            dye_resolution: 16,
            ..Default::default()
        }
    }

    fn total(texture: &CpuTexture) -> f32 {
        texture
            .texels()
            .iter()
            .map(|texel| texel[0] + texel[1] + texel[2])
            .sum()
    }

    #[test]
    fn step_runs_the_passes_in_order() {
        let mut fluid = fluid(
            Size::new(64, 64),
            Settings {
                pressure_iterations: 2,
                ..small()
            },
        );

        fluid.step(0.016);

        use PassKind::*;
        assert_eq!(
            fluid.backend().take_passes(),
            vec![
                Curl,
                Vorticity,
                Divergence,
                Clear,
                Pressure,
                Pressure,
                GradientSubtract,
                Advection,
                Advection,
            ]
        );
    }

    #[test]
    fn zero_iterations_leave_the_relaxed_pressure() {
        let mut fluid = fluid(
            Size::new(64, 64),
            Settings {
                pressure_iterations: 0,
                pressure: 0.1,
                ..small()
            },
        );
        let pressure = fluid.framebuffers().pressure.read();
        pressure
            .texture
            .fill(|x, y| [(x + y) as f32, 0.0, 0.0, 1.0]);

        fluid.divergence();
        fluid.clear_pressure();
        fluid.solve_pressure();

        let pressure = &fluid.framebuffers().pressure.read().texture;
        for (x, y) in [(0, 0), (3, 5), (7, 7)] {
            assert_relative_eq!(pressure.texel(x, y)[0], 0.1 * (x + y) as f32);
        }
        assert!(!fluid.backend().passes().contains(&PassKind::Pressure));
    }

    #[test]
    fn projection_removes_divergence() {
        let mut fluid = fluid(
            Size::new(64, 64),
            Settings {
                sim_resolution: 16,
                pressure_iterations: 40,
                ..small()
            },
        );
        // Everything flows out of the center.
        fluid
            .framebuffers()
            .velocity
            .read()
            .texture
            .fill(|x, y| [x as f32 - 7.5, y as f32 - 7.5, 0.0, 1.0]);
        let divergence = |fluid: &Fluid<CpuBackend>| -> f32 {
            fluid
                .framebuffers()
                .divergence
                .texture
                .texels()
                .iter()
                .map(|texel| texel[0].abs())
                .sum()
        };

        fluid.divergence();
        let before = divergence(&fluid);

        fluid.clear_pressure();
        fluid.solve_pressure();
        fluid.subtract_gradient();
        fluid.divergence();
        let after = divergence(&fluid);

        assert!(before > 0.0);
        assert!(after < 0.8 * before);
    }

    #[test]
    fn vorticity_is_clamped() {
        let mut fluid = fluid(Size::new(64, 64), small());
        fluid
            .framebuffers()
            .curl
            .texture
            .fill(|x, _| [1.0e6 * (x + 1) as f32, 0.0, 0.0, 1.0]);

        fluid.vorticity(1.0);

        let velocity = &fluid.framebuffers().velocity.read().texture;
        assert!(velocity
            .texels()
            .iter()
            .all(|texel| texel[0].abs() <= 1000.0 && texel[1].abs() <= 1000.0));
        assert_relative_eq!(velocity.texel(4, 4)[1].abs(), 1000.0);
    }

    #[test]
    fn dye_fades_without_input() {
        let mut fluid = fluid(
            Size::new(64, 64),
            Settings {
                curl: 0.0,
                ..small()
            },
        );
        fluid
            .framebuffers()
            .dye
            .read()
            .texture
            .fill(|x, y| [0.1 * x as f32, 0.05 * y as f32, 0.3, 1.0]);

        let mut previous = total(&fluid.framebuffers().dye.read().texture);
        for _ in 0..5 {
            fluid.step(1.0 / 60.0);
            let current = total(&fluid.framebuffers().dye.read().texture);
            assert!(current < previous);
            previous = current;
        }
    }

    fn assert_round_splat(surface: Size) {
        let mut fluid = fluid(
            surface,
            Settings {
                sim_resolution: 25,
                dye_resolution: 50,
                ..Default::default()
            },
        );
        let dye = fluid.framebuffers().dye.size();
        let center = (dye.width / 2, dye.height / 2);
        let point = [
            (center.0 as f32 + 0.5) / dye.width as f32,
            (center.1 as f32 + 0.5) / dye.height as f32,
        ];

        fluid.splat(point, [0.0, 0.0], [1.0, 0.0, 0.0]);

        let dye = &fluid.framebuffers().dye.read().texture;
        let peak = dye.texel(center.0, center.1)[0];
        let right = dye.texel(center.0 + 5, center.1)[0];
        let left = dye.texel(center.0 - 5, center.1)[0];
        let up = dye.texel(center.0, center.1 + 5)[0];
        let down = dye.texel(center.0, center.1 - 5)[0];

        assert_relative_eq!(peak, 1.0, epsilon = 1e-5);
        assert!(right > 0.01 && right < peak);
        assert_relative_eq!(right, up, epsilon = 1e-4);
        assert_relative_eq!(left, down, epsilon = 1e-4);
        assert_relative_eq!(right, left, epsilon = 1e-4);
    }

    #[test]
    fn splats_are_round_on_landscape_surfaces() {
        assert_round_splat(Size::new(200, 100));
    }

    #[test]
    fn splats_are_round_on_portrait_surfaces() {
        assert_round_splat(Size::new(100, 200));
    }

    #[test]
    fn splat_pushes_velocity_along_the_impulse() {
        let mut fluid = fluid(Size::new(64, 64), small());

        fluid.splat([0.5625, 0.5625], [3.0, -1.0], [0.0, 0.0, 1.0]);

        let velocity = fluid.framebuffers().velocity.read().texture.texel(4, 4);
        assert_relative_eq!(velocity[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(velocity[1], -1.0, epsilon = 1e-5);
        assert_eq!(
            fluid.backend().passes(),
            vec![PassKind::Splat, PassKind::Splat]
        );
    }

    #[test]
    fn resize_reallocates_and_keeps_the_dye() {
        let mut fluid = fluid(Size::new(64, 64), small());
        fluid
            .framebuffers()
            .dye
            .read()
            .texture
            .fill(|_, _| [0.5, 0.25, 0.0, 1.0]);
        assert_eq!(fluid.backend().textures_created(), 8);

        fluid.resize(Size::new(128, 64)).expect("cpu resize");

        assert_eq!(fluid.backend().textures_created(), 16);
        assert_eq!(fluid.surface(), Size::new(128, 64));
        assert_eq!(fluid.framebuffers().velocity.size(), Size::new(16, 8));
        assert_eq!(fluid.framebuffers().dye.size(), Size::new(32, 16));

        let dye = &fluid.framebuffers().dye.read().texture;
        assert_relative_eq!(dye.texel(0, 0)[0], 0.5);
        assert_relative_eq!(dye.texel(31, 15)[1], 0.25);
    }

    #[test]
    fn opaque_render_shows_the_back_color() {
        let fluid = fluid(
            Size::new(4, 4),
            Settings {
                transparent: false,
                ..small()
            },
        );
        fluid
            .framebuffers()
            .dye
            .read()
            .texture
            .fill(|_, _| [0.0, 0.0, 0.0, 1.0]);

        fluid.render();

        let (width, height, pixels) = fluid.backend().screen();
        assert_eq!((width, height), (4, 4));
        assert_eq!(pixels[0], [0.5, 0.0, 0.0, 1.0]);
    }
}
