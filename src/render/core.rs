use crate::error::Result;
use crate::event::WindowSize;

/// Boundary to whatever draws the frame.
///
/// The scheduler brackets the hooks and the sketch's `draw` with exactly one
/// `begin_frame` and one `end_frame` per frame, even when drawing fails.
pub trait Renderer: Send {
    fn begin_frame(&mut self, frame: u64) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    /// The surface size changed. Applied at the start of the next frame.
    fn resize(&mut self, _size: WindowSize) -> Result<()> {
        Ok(())
    }

    /// Release resources. Called once during dispose.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Renderer that draws nothing. Useful for headless sketches and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn begin_frame(&mut self, _frame: u64) -> Result<()> {
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn begin_frame(&mut self, frame: u64) -> Result<()> {
        (**self).begin_frame(frame)
    }

    fn end_frame(&mut self) -> Result<()> {
        (**self).end_frame()
    }

    fn resize(&mut self, size: WindowSize) -> Result<()> {
        (**self).resize(size)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}
