use crate::backend::Backend;
use crate::fluid::Fluid;
use crate::host::Host;
use crate::pointer::Pointers;
use crate::settings::Settings;
use crate::{color, render, rng};

use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Running,
    Paused,
    /// Terminal. Every lifecycle call after this is ignored.
    Destroyed,
}

pub struct Plume<B: Backend, H: Host> {
    fluid: Fluid<B>,
    host: H,
    pointers: Pointers,
    settings: Rc<Settings>,

    state: State,
    pending_frame: Option<H::FrameHandle>,
    elapsed_time: f32,
    last_timestamp: f64,
    max_frame_time: f32,
}

impl<B: Backend, H: Host> Plume<B, H> {
    /// Allocate the fields and schedule the first frame.
    pub fn new(backend: B, mut host: H, settings: Settings) -> Result<Self, Problem> {
        log::info!("✨ Initialising Plume");

        rng::reseed(settings.seed.as_deref());
        let settings = Rc::new(settings.downgrade(backend.linear_filtering()));

        let surface = host.resize_surface();
        if surface.is_empty() {
            return Err(Problem::EmptySurface {
                width: surface.width,
                height: surface.height,
            });
        }
        log::debug!("Surface: {}x{}", surface.width, surface.height);

        let fluid = Fluid::new(backend, surface, &settings).map_err(Problem::Render)?;
        let last_timestamp = host.now();
        let pending_frame = Some(host.request_frame());

        Ok(Plume {
            fluid,
            host,
            pointers: Pointers::new(),
            settings,

            state: State::Running,
            pending_frame,
            elapsed_time: 0.0,
            last_timestamp,
            max_frame_time: 1.0 / 60.0,
        })
    }

    /// Run one frame. `timestamp` is the frame callback's time in
    /// milliseconds.
    pub fn animate(&mut self, timestamp: f64) {
        if self.state != State::Running {
            return;
        }
        self.pending_frame = None;

        let timestep = ((0.001 * (timestamp - self.last_timestamp)) as f32)
            .max(0.0)
            .min(self.max_frame_time);
        self.last_timestamp = timestamp;
        self.elapsed_time += timestep;

        let surface = self.host.resize_surface();
        if !surface.is_empty() && surface != self.fluid.surface() {
            if let Err(problem) = self.fluid.resize(surface) {
                log::error!("Failed to resize: {}", problem);
            }
        }

        self.pointers
            .update_colors(timestep, self.settings.color_update_speed);
        self.apply_inputs();

        self.fluid.step(timestep);
        self.fluid.render();

        self.pending_frame = Some(self.host.request_frame());
    }

    // Drain pending clicks and moves into splats.
    fn apply_inputs(&mut self) {
        let force = self.settings.splat_force;

        for pointer in self.pointers.iter_mut() {
            if pointer.take_click() {
                let impulse = [rng::centered(10.0), rng::centered(30.0)];
                let color = color::generate().map(|channel| 10.0 * channel);
                self.fluid.splat(pointer.texcoord, impulse, color);
            }

            if pointer.take_moved() {
                let impulse = [pointer.delta[0] * force, pointer.delta[1] * force];
                self.fluid.splat(pointer.texcoord, impulse, pointer.color);
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != State::Running {
            return;
        }

        if let Some(frame) = self.pending_frame.take() {
            self.host.cancel_frame(frame);
        }
        self.state = State::Paused;
        log::debug!("Paused");
    }

    /// Restart the frame loop. The next frame measures time from now, not
    /// from the frame before the pause.
    pub fn resume(&mut self) {
        if self.state != State::Paused {
            return;
        }

        self.last_timestamp = self.host.now();
        self.pending_frame = Some(self.host.request_frame());
        self.state = State::Running;
        log::debug!("Resumed");
    }

    pub fn destroy(&mut self) {
        if self.state == State::Destroyed {
            return;
        }

        if let Some(frame) = self.pending_frame.take() {
            self.host.cancel_frame(frame);
        }
        self.host.detach_input();
        self.state = State::Destroyed;
        log::debug!("Destroyed");
    }

    pub fn pointer_down(&mut self, id: i64, x: f32, y: f32) {
        let surface = self.fluid.surface();
        self.pointers.press(id, [x, y], surface);
    }

    pub fn pointer_move(&mut self, id: i64, x: f32, y: f32) {
        let surface = self.fluid.surface();
        self.pointers.move_to(id, [x, y], surface);
    }

    pub fn pointer_up(&mut self, id: i64) {
        self.pointers.release(id);
    }

    /// Queue a pop of color at the mouse pointer for the next frame.
    pub fn click(&mut self) {
        self.pointers.click();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    pub fn fluid(&self) -> &Fluid<B> {
        &self.fluid
    }

    pub fn pointers(&self) -> &Pointers {
        &self.pointers
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

#[derive(Debug)]
pub enum Problem {
    EmptySurface { width: u32, height: u32 },
    ReadSettings(String),
    Render(render::Problem),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Problem::*;
        match self {
            EmptySurface { width, height } => {
                write!(f, "The surface has no area: {}x{}", width, height)
            }
            ReadSettings(msg) => write!(f, "{}", msg),
            Render(render_msg) => write!(f, "{}", render_msg),
        }
    }
}
