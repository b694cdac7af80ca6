//! Lifecycle hooks for optional extensions.
//!
//! An extension is attached once and then registered per hook kind. The
//! kinds it may be registered for are declared up front through
//! [`Extension::capabilities`], so a bad registration fails immediately
//! instead of at dispatch time.

mod context;
mod registry;

use std::fmt;

use crate::Result;
use crate::event::{KeyEvent, MouseEvent};

pub use context::HookContext;
pub use registry::{CallbackRegistry, DispatchReport, HookFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookKind {
    Pre,
    Draw,
    Post,
    Pause,
    Resume,
    Dispose,
    MouseEvent,
    KeyEvent,
}

impl HookKind {
    pub const ALL: [HookKind; 8] = [
        HookKind::Pre,
        HookKind::Draw,
        HookKind::Post,
        HookKind::Pause,
        HookKind::Resume,
        HookKind::Dispose,
        HookKind::MouseEvent,
        HookKind::KeyEvent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::Pre => "pre",
            HookKind::Draw => "draw",
            HookKind::Post => "post",
            HookKind::Pause => "pause",
            HookKind::Resume => "resume",
            HookKind::Dispose => "dispose",
            HookKind::MouseEvent => "mouseEvent",
            HookKind::KeyEvent => "keyEvent",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned when an extension is attached to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionId(pub(crate) u64);

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arguments carried by a hook invocation.
#[derive(Debug, Clone, Copy)]
pub enum HookArgs<'e> {
    None,
    Mouse(&'e MouseEvent),
    Key(&'e KeyEvent),
}

/// Behaviour injection point for the frame loop.
///
/// Every hook defaults to a no-op; an extension only overrides the ones it
/// lists in `capabilities`. Returning an error that is not fatal is logged
/// and the remaining extensions still run.
pub trait Extension: Send {
    fn name(&self) -> &str {
        "extension"
    }

    fn capabilities(&self) -> &[HookKind];

    fn provides(&self, kind: HookKind) -> bool {
        self.capabilities().contains(&kind)
    }

    fn pre(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn draw(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn post(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn dispose(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn mouse_event(&mut self, _ctx: &mut HookContext<'_>, _event: &MouseEvent) -> Result<()> {
        Ok(())
    }

    fn key_event(&mut self, _ctx: &mut HookContext<'_>, _event: &KeyEvent) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn invoke(
    extension: &mut dyn Extension,
    kind: HookKind,
    args: HookArgs<'_>,
    ctx: &mut HookContext<'_>,
) -> Result<()> {
    match (kind, args) {
        (HookKind::Pre, _) => extension.pre(ctx),
        (HookKind::Draw, _) => extension.draw(ctx),
        (HookKind::Post, _) => extension.post(ctx),
        (HookKind::Pause, _) => extension.pause(ctx),
        (HookKind::Resume, _) => extension.resume(ctx),
        (HookKind::Dispose, _) => extension.dispose(ctx),
        (HookKind::MouseEvent, HookArgs::Mouse(event)) => extension.mouse_event(ctx, event),
        (HookKind::KeyEvent, HookArgs::Key(event)) => extension.key_event(ctx, event),
        (HookKind::MouseEvent | HookKind::KeyEvent, _) => Ok(()),
    }
}
