use crate::Result;
use crate::event::{KeyEvent, MouseEvent, WindowPosition, WindowSize};

use super::context::FrameContext;

/// Lifecycle callback of a sketch: `setup` or `draw`.
pub type SketchFn<M> = Box<dyn FnMut(&mut M, &mut FrameContext<'_>) -> Result<()> + Send>;

/// Handler invoked with one input or window notification.
pub type InputFn<M, E> = Box<dyn FnMut(&mut M, &mut FrameContext<'_>, &E) -> Result<()> + Send>;

/// A user program: its model plus whichever callbacks it defines.
///
/// Every callback is optional. A sketch without `draw` runs setup and then
/// stops looping.
pub struct Sketch<M> {
    pub(crate) model: M,
    pub(crate) setup: Option<SketchFn<M>>,
    pub(crate) draw: Option<SketchFn<M>>,
    pub(crate) mouse: Option<InputFn<M, MouseEvent>>,
    pub(crate) key: Option<InputFn<M, KeyEvent>>,
    pub(crate) focus: Option<InputFn<M, bool>>,
    pub(crate) window_resized: Option<InputFn<M, WindowSize>>,
    pub(crate) window_moved: Option<InputFn<M, WindowPosition>>,
}

impl<M> Sketch<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            setup: None,
            draw: None,
            mouse: None,
            key: None,
            focus: None,
            window_resized: None,
            window_moved: None,
        }
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>) -> Result<()> + Send + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    pub fn draw<F>(mut self, draw: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>) -> Result<()> + Send + 'static,
    {
        self.draw = Some(Box::new(draw));
        self
    }

    pub fn mouse<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>, &MouseEvent) -> Result<()> + Send + 'static,
    {
        self.mouse = Some(Box::new(handler));
        self
    }

    pub fn key<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>, &KeyEvent) -> Result<()> + Send + 'static,
    {
        self.key = Some(Box::new(handler));
        self
    }

    /// Called with `true` when the surface gains focus, `false` when it loses it.
    pub fn focus<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>, &bool) -> Result<()> + Send + 'static,
    {
        self.focus = Some(Box::new(handler));
        self
    }

    pub fn window_resized<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>, &WindowSize) -> Result<()> + Send + 'static,
    {
        self.window_resized = Some(Box::new(handler));
        self
    }

    pub fn window_moved<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut M, &mut FrameContext<'_>, &WindowPosition) -> Result<()> + Send + 'static,
    {
        self.window_moved = Some(Box::new(handler));
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn has_draw(&self) -> bool {
        self.draw.is_some()
    }
}
