//! Input state derived from raw events.
//!
//! The tracker is owned by the scheduler and only ever mutated while the
//! event queue is drained; sketches and extensions get read-only access.

pub mod keyboard;
pub mod mouse;

use std::sync::Arc;

use crate::config::{Platform, PlatformProfile};
use crate::event::{InputEvent, KeyAction, KeyCode, KeyEvent};

pub use keyboard::{KeyId, KeyState};
pub use mouse::{MouseState, Position};

/// Result of folding one raw event into the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedInput {
    /// The event as handlers should see it, `None` if it was dropped.
    pub event: Option<InputEvent>,
    /// The event carries an engine-level shutdown request.
    pub request_exit: bool,
}

pub struct InputTracker {
    profile: Arc<PlatformProfile>,
    mouse: MouseState,
    keys: KeyState,
}

impl InputTracker {
    pub fn new(profile: Arc<PlatformProfile>, suppress_key_repeat: bool) -> Self {
        Self {
            profile,
            mouse: MouseState::new(),
            keys: KeyState::new(suppress_key_repeat),
        }
    }

    pub fn apply(&mut self, event: InputEvent) -> TrackedInput {
        match event {
            InputEvent::Mouse(mouse) => TrackedInput {
                event: Some(InputEvent::Mouse(self.mouse.apply(&mouse, &self.profile))),
                request_exit: false,
            },
            InputEvent::Key(key) => {
                if !self.keys.apply(&key) {
                    return TrackedInput {
                        event: None,
                        request_exit: false,
                    };
                }
                TrackedInput {
                    event: Some(InputEvent::Key(key)),
                    request_exit: self.requests_shutdown(&key),
                }
            }
            InputEvent::Focus { gained } => {
                if gained {
                    self.keys.focus_gained();
                } else {
                    self.keys.focus_lost();
                }
                TrackedInput {
                    event: Some(event),
                    request_exit: false,
                }
            }
        }
    }

    // Escape always quits. The window-close chord only applies when another
    // application hosts the sketch; standalone sketches own their shortcuts.
    fn requests_shutdown(&self, key: &KeyEvent) -> bool {
        if key.action != KeyAction::Press {
            return false;
        }
        if key.is_escape() {
            return true;
        }
        if !self.profile.embedded || key.code != KeyCode::W {
            return false;
        }
        match self.profile.platform {
            Platform::MacOs => key.modifiers.meta,
            _ => key.modifiers.ctrl,
        }
    }

    pub(crate) fn begin_frame(&mut self) {
        self.mouse.snapshot_for_draw();
    }

    pub fn mouse(&self) -> &MouseState {
        &self.mouse
    }

    pub fn keys(&self) -> &KeyState {
        &self.keys
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }
}
