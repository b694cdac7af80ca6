use crate::config::{Platform, PlatformProfile};
use crate::event::{MouseAction, MouseButton, MouseEvent};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Cursor state derived from raw mouse events.
///
/// `previous_event` follows every position-carrying event, while
/// `previous_draw` is only refreshed once per frame; sketches read the
/// latter to compute per-frame deltas.
#[derive(Debug, Clone, Default)]
pub struct MouseState {
    position: Position,
    previous_event: Position,
    previous_draw: Position,
    pressed: bool,
    button: MouseButton,
    wheel: i32,
    first_move_seen: bool,
    sticky_remap: bool,
}

impl MouseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an event into the state, returning the event as the sketch should
    /// see it (with any platform button substitution applied).
    pub fn apply(&mut self, event: &MouseEvent, profile: &PlatformProfile) -> MouseEvent {
        let mut event = *event;
        event.button = self.remap_button(&event, profile);

        if event.action.moves_cursor() {
            self.previous_event = self.position;
            self.position = Position::new(event.x, event.y);
            if !self.first_move_seen {
                self.previous_event = self.position;
                self.previous_draw = self.position;
                self.first_move_seen = true;
            }
        }

        self.button = event.button;
        match event.action {
            MouseAction::Press => self.pressed = true,
            MouseAction::Release => self.pressed = false,
            MouseAction::Wheel => self.wheel = event.count,
            _ => {}
        }

        event
    }

    // Ctrl + left press acts as a right button on macOS for the whole
    // gesture. The flag survives the release and is only dropped by the
    // click that closes the gesture, so letting go of Ctrl mid-drag does not
    // flip the button back. Events without a left button keep their own.
    fn remap_button(&mut self, event: &MouseEvent, profile: &PlatformProfile) -> MouseButton {
        if profile.platform != Platform::MacOs {
            return event.button;
        }
        if event.action == MouseAction::Press
            && event.button == MouseButton::Left
            && event.modifiers.ctrl
        {
            self.sticky_remap = true;
        }
        let button = if self.sticky_remap && event.button == MouseButton::Left {
            MouseButton::Right
        } else {
            event.button
        };
        if event.action == MouseAction::Click {
            self.sticky_remap = false;
        }
        button
    }

    /// Called once per frame before the draw body.
    pub(crate) fn snapshot_for_draw(&mut self) {
        self.previous_draw = self.previous_event;
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn previous_event_position(&self) -> Position {
        self.previous_event
    }

    pub fn previous_draw_position(&self) -> Position {
        self.previous_draw
    }

    pub fn pressed(&self) -> bool {
        self.pressed
    }

    pub fn button(&self) -> MouseButton {
        self.button
    }

    pub fn wheel(&self) -> i32 {
        self.wheel
    }

    pub fn remap_active(&self) -> bool {
        self.sticky_remap
    }
}
