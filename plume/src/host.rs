use crate::framebuffer::Size;

/// The environment an effect runs in: a clock, a drawing surface, a frame
/// scheduler and the input listeners.
pub trait Host {
    type FrameHandle: Copy;

    /// Milliseconds, on the same clock as the frame timestamps.
    fn now(&self) -> f64;

    /// Match the drawing buffer to the displayed size and return it in
    /// physical pixels.
    fn resize_surface(&mut self) -> Size;

    fn request_frame(&mut self) -> Self::FrameHandle;

    fn cancel_frame(&mut self, handle: Self::FrameHandle);

    /// Remove every input listener. Called once, on destroy.
    fn detach_input(&mut self);
}

#[cfg(test)]
pub(crate) use manual::ManualHost;
