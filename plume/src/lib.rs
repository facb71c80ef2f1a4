pub mod backend;
pub mod capabilities;
mod color;
pub mod cpu;
mod data;
pub mod fluid;
pub mod framebuffer;
pub mod gl;
pub mod host;
mod plume;
pub mod pointer;
pub mod render;
mod rng;
pub mod settings;

pub use crate::plume::{Plume, Problem, State};
pub use backend::Backend;
pub use capabilities::{Capabilities, ContextVersion};
pub use framebuffer::Size;
pub use gl::GlBackend;
pub use host::Host;
pub use settings::Settings;
