use std::time::Duration;

use crate::Result;
use crate::error::{EngineError, UsageError};
use crate::event::WindowSize;
use crate::hooks::{CallbackRegistry, Extension, ExtensionId, HookKind};
use crate::input::{InputTracker, KeyState, MouseState};

use super::SchedulerState;

/// Read-only view of the scheduler at the time a callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInfo {
    /// Completed draw calls so far.
    pub frame_count: u64,
    /// Smoothed measured frame rate.
    pub frame_rate: f64,
    pub target_frame_rate: f64,
    pub state: SchedulerState,
    pub window: WindowSize,
    /// Time since setup started.
    pub elapsed: Duration,
}

/// Control requests buffered by callbacks and applied by the scheduler
/// once the callback has returned.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlRequests {
    pub exit: bool,
    pub redraw: bool,
    pub looping: Option<bool>,
    pub frame_rate: Option<f64>,
    pub paused: Option<bool>,
}

impl ControlRequests {
    /// Later requests win for the optional knobs; flags accumulate.
    pub fn merge(&mut self, other: ControlRequests) {
        self.exit |= other.exit;
        self.redraw |= other.redraw;
        if other.looping.is_some() {
            self.looping = other.looping;
        }
        if other.frame_rate.is_some() {
            self.frame_rate = other.frame_rate;
        }
        if other.paused.is_some() {
            self.paused = other.paused;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ControlRequests::default()
    }
}

/// Context passed to the sketch's own callbacks (setup, draw, input handlers).
pub struct FrameContext<'a> {
    info: FrameInfo,
    input: &'a InputTracker,
    registry: &'a mut CallbackRegistry,
    requests: ControlRequests,
    usage_error: Option<UsageError>,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        info: FrameInfo,
        input: &'a InputTracker,
        registry: &'a mut CallbackRegistry,
    ) -> Self {
        Self {
            info,
            input,
            registry,
            requests: ControlRequests::default(),
            usage_error: None,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.info.frame_count
    }

    pub fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    pub fn window_size(&self) -> WindowSize {
        self.info.window
    }

    pub fn mouse(&self) -> &MouseState {
        self.input.mouse()
    }

    pub fn keys(&self) -> &KeyState {
        self.input.keys()
    }

    pub fn exit(&mut self) {
        self.requests.exit = true;
    }

    pub fn redraw(&mut self) {
        self.requests.redraw = true;
    }

    pub fn no_loop(&mut self) {
        self.requests.looping = Some(false);
    }

    pub fn start_loop(&mut self) {
        self.requests.looping = Some(true);
    }

    pub fn set_frame_rate(&mut self, hz: f64) {
        self.requests.frame_rate = Some(hz);
    }

    /// Attach an extension without registering it for any hook.
    pub fn attach<E>(&mut self, extension: E) -> ExtensionId
    where
        E: Extension + 'static,
    {
        self.registry.attach(Box::new(extension))
    }

    /// Attach an extension and register it for every hook it declares.
    ///
    /// A failed registration leaves nothing attached. Like `register`, the
    /// error is also fatal for the runtime once the callback returns.
    pub fn install<E>(&mut self, extension: E) -> Result<ExtensionId>
    where
        E: Extension + 'static,
    {
        let id = self.registry.attach(Box::new(extension));
        if let Err(error) = self.registry.add_all(id) {
            self.registry.detach(id);
            return Err(self.record_usage_error(error));
        }
        Ok(id)
    }

    /// A duplicate or invalid registration stops the runtime after the
    /// callback returns, whether or not the error is handled here.
    pub fn register(&mut self, kind: HookKind, id: ExtensionId) -> Result<()> {
        self.registry
            .add(kind, id)
            .map_err(|error| self.record_usage_error(error))
    }

    pub fn unregister(&mut self, kind: HookKind, id: ExtensionId) -> bool {
        self.registry.remove(kind, id)
    }

    fn record_usage_error(&mut self, error: UsageError) -> EngineError {
        self.usage_error.get_or_insert_with(|| error.clone());
        error.into()
    }

    /// Requests buffered by the callback and the first usage error it hit.
    pub(crate) fn into_parts(self) -> (ControlRequests, Option<UsageError>) {
        (self.requests, self.usage_error)
    }
}
