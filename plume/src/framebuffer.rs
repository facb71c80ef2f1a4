use crate::backend::{Backend, Channels, Filter};
use crate::render::Problem;

/// A drawable size in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Grid size for a field with `base` cells along the shorter side of the
/// surface. The longer side is stretched by the aspect ratio.
pub fn resolution(base: u32, surface: Size) -> Size {
    let aspect_ratio = surface.aspect_ratio();
    let aspect = if aspect_ratio < 1.0 {
        1.0 / aspect_ratio
    } else {
        aspect_ratio
    };

    let min = base.max(1);
    let max = ((base as f32 * aspect).round() as u32).max(1);

    if surface.width > surface.height {
        Size::new(max, min)
    } else {
        Size::new(min, max)
    }
}

pub struct Framebuffer<T> {
    pub texture: T,
    pub width: u32,
    pub height: u32,
    pub texel_size: [f32; 2],
}

impl<T> Framebuffer<T> {
    pub fn new<B>(
        backend: &B,
        size: Size,
        channels: Channels,
        filter: Filter,
    ) -> Result<Self, Problem>
    where
        B: Backend<Texture = T>,
    {
        let texture = backend.create_texture(size.width, size.height, channels, filter)?;

        Ok(Self {
            texture,
            width: size.width,
            height: size.height,
            texel_size: [1.0 / size.width as f32, 1.0 / size.height as f32],
        })
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Two framebuffers of the same size. Passes read from one and write to
/// the other, then swap.
pub struct DoubleFramebuffer<T> {
    buffers: [Framebuffer<T>; 2],
    read: usize,
}

impl<T> DoubleFramebuffer<T> {
    pub fn new<B>(
        backend: &B,
        size: Size,
        channels: Channels,
        filter: Filter,
    ) -> Result<Self, Problem>
    where
        B: Backend<Texture = T>,
    {
        let front = Framebuffer::new(backend, size, channels, filter)?;
        let back = Framebuffer::new(backend, size, channels, filter)?;

        Ok(Self {
            buffers: [front, back],
            read: 0,
        })
    }

    pub fn read(&self) -> &Framebuffer<T> {
        &self.buffers[self.read]
    }

    pub fn write(&self) -> &Framebuffer<T> {
        &self.buffers[1 - self.read]
    }

    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    pub fn width(&self) -> u32 {
        self.buffers[0].width
    }

    pub fn height(&self) -> u32 {
        self.buffers[0].height
    }

    pub fn size(&self) -> Size {
        self.buffers[0].size()
    }

    pub fn texel_size(&self) -> [f32; 2] {
        self.buffers[0].texel_size
    }
}

/// Every render target the simulation uses.
pub struct FramebufferSet<T> {
    pub velocity: DoubleFramebuffer<T>,
    pub dye: DoubleFramebuffer<T>,
    pub divergence: Framebuffer<T>,
    pub curl: Framebuffer<T>,
    pub pressure: DoubleFramebuffer<T>,
}

impl<T> FramebufferSet<T> {
    /// Allocate all five targets for a surface. Velocity and dye use
    /// hardware filtering when the backend has it.
    pub fn allocate<B>(
        backend: &B,
        surface: Size,
        sim_resolution: u32,
        dye_resolution: u32,
    ) -> Result<Self, Problem>
    where
        B: Backend<Texture = T>,
    {
        let sim_size = resolution(sim_resolution, surface);
        let dye_size = resolution(dye_resolution, surface);
        let filter = if backend.linear_filtering() {
            Filter::Linear
        } else {
            Filter::Nearest
        };

        log::debug!(
            "Allocating fields. Simulation: {}x{}. Dye: {}x{}",
            sim_size.width,
            sim_size.height,
            dye_size.width,
            dye_size.height
        );

        Ok(Self {
            dye: DoubleFramebuffer::new(backend, dye_size, Channels::Rgba, filter)?,
            velocity: DoubleFramebuffer::new(backend, sim_size, Channels::Rg, filter)?,
            divergence: Framebuffer::new(backend, sim_size, Channels::R, Filter::Nearest)?,
            curl: Framebuffer::new(backend, sim_size, Channels::R, Filter::Nearest)?,
            pressure: DoubleFramebuffer::new(backend, sim_size, Channels::R, Filter::Nearest)?,
        })
    }
}
