use crate::input::InputTracker;
use crate::runtime::context::{ControlRequests, FrameInfo};

use super::{ExtensionId, HookKind};

/// Context handed to an extension for the duration of one hook call.
///
/// Requests are buffered and applied once the call returns, which is what
/// lets an extension unregister itself from the hook that is running it.
pub struct HookContext<'a> {
    id: ExtensionId,
    kind: HookKind,
    info: FrameInfo,
    input: &'a InputTracker,
    requests: ControlRequests,
    removals: Vec<(HookKind, ExtensionId)>,
    detached: Vec<ExtensionId>,
}

pub(crate) struct HookOutcome {
    pub requests: ControlRequests,
    pub removals: Vec<(HookKind, ExtensionId)>,
    pub detached: Vec<ExtensionId>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        id: ExtensionId,
        kind: HookKind,
        info: FrameInfo,
        input: &'a InputTracker,
    ) -> Self {
        Self {
            id,
            kind,
            info,
            input,
            requests: ControlRequests::default(),
            removals: Vec::new(),
            detached: Vec::new(),
        }
    }

    pub fn extension_id(&self) -> ExtensionId {
        self.id
    }

    pub fn hook(&self) -> HookKind {
        self.kind
    }

    pub fn frame(&self) -> &FrameInfo {
        &self.info
    }

    pub fn input(&self) -> &InputTracker {
        self.input
    }

    /// Stop receiving the hook currently being dispatched.
    pub fn unregister_self(&mut self) {
        self.removals.push((self.kind, self.id));
    }

    pub fn unregister(&mut self, kind: HookKind, id: ExtensionId) {
        self.removals.push((kind, id));
    }

    /// Drop this extension from every hook and from the runtime.
    pub fn detach_self(&mut self) {
        self.detached.push(self.id);
    }

    pub fn request_exit(&mut self) {
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

    pub(crate) fn into_outcome(self) -> HookOutcome {
        HookOutcome {
            requests: self.requests,
            removals: self.removals,
            detached: self.detached,
        }
    }
}
