//! Raw input events produced by the surface layer and consumed by the
//! scheduler exactly once.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    Press,
    Release,
    Click,
    Drag,
    Move,
    Enter,
    Exit,
    Wheel,
}

impl MouseAction {
    /// Actions whose coordinates establish the cursor position.
    pub fn moves_cursor(self) -> bool {
        matches!(self, MouseAction::Press | MouseAction::Drag | MouseAction::Move)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MouseButton {
    #[default]
    None,
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        ..Modifiers::NONE
    };

    pub const META: Modifiers = Modifiers {
        meta: true,
        ..Modifiers::NONE
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };

    pub fn is_empty(&self) -> bool {
        *self == Modifiers::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub action: MouseAction,
    pub x: f32,
    pub y: f32,
    pub button: MouseButton,
    pub modifiers: Modifiers,
    /// Click count for `Click`, scroll amount for `Wheel`.
    pub count: i32,
}

impl MouseEvent {
    pub fn new(action: MouseAction, x: f32, y: f32) -> Self {
        Self {
            action,
            x,
            y,
            button: MouseButton::None,
            modifiers: Modifiers::NONE,
            count: 0,
        }
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_count(mut self, count: i32) -> Self {
        self.count = count;
        self
    }
}

/// Platform-neutral key code, numbered like the common virtual-key tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyCode(pub u32);

impl KeyCode {
    pub const UNKNOWN: KeyCode = KeyCode(0);
    pub const BACKSPACE: KeyCode = KeyCode(8);
    pub const TAB: KeyCode = KeyCode(9);
    pub const ENTER: KeyCode = KeyCode(10);
    pub const SHIFT: KeyCode = KeyCode(16);
    pub const CONTROL: KeyCode = KeyCode(17);
    pub const ALT: KeyCode = KeyCode(18);
    pub const ESCAPE: KeyCode = KeyCode(27);
    pub const SPACE: KeyCode = KeyCode(32);
    pub const LEFT: KeyCode = KeyCode(37);
    pub const UP: KeyCode = KeyCode(38);
    pub const RIGHT: KeyCode = KeyCode(39);
    pub const DOWN: KeyCode = KeyCode(40);
    pub const DELETE: KeyCode = KeyCode(127);
    pub const F1: KeyCode = KeyCode(112);
    pub const META: KeyCode = KeyCode(157);
    pub const W: KeyCode = KeyCode('W' as u32);

    /// Code for a printable character: letters map to their uppercase
    /// form, everything else to its scalar value.
    pub fn from_char(ch: char) -> Self {
        KeyCode(ch.to_ascii_uppercase() as u32)
    }

    pub fn function(n: u8) -> Self {
        KeyCode(Self::F1.0 + u32::from(n.saturating_sub(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
    /// A character was produced; does not change the pressed-key set.
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    /// Character for the key, `None` for coded keys such as arrows.
    pub key: Option<char>,
    pub code: KeyCode,
    pub modifiers: Modifiers,
    pub auto_repeat: bool,
}

impl KeyEvent {
    pub fn new(action: KeyAction, key: Option<char>, code: KeyCode) -> Self {
        Self {
            action,
            key,
            code,
            modifiers: Modifiers::NONE,
            auto_repeat: false,
        }
    }

    pub fn press(ch: char) -> Self {
        Self::new(KeyAction::Press, Some(ch), KeyCode::from_char(ch))
    }

    pub fn release(ch: char) -> Self {
        Self::new(KeyAction::Release, Some(ch), KeyCode::from_char(ch))
    }

    pub fn typed(ch: char) -> Self {
        Self::new(KeyAction::Type, Some(ch), KeyCode::UNKNOWN)
    }

    pub fn coded(action: KeyAction, code: KeyCode) -> Self {
        Self::new(action, None, code)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.auto_repeat = true;
        self
    }

    pub fn is_escape(&self) -> bool {
        self.code == KeyCode::ESCAPE || self.key == Some('\u{1b}')
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Mouse(MouseEvent),
    Key(KeyEvent),
    Focus { gained: bool },
}

impl InputEvent {
    pub fn describe(&self) -> &'static str {
        match self {
            InputEvent::Mouse(_) => "mouse",
            InputEvent::Key(_) => "key",
            InputEvent::Focus { .. } => "focus",
        }
    }
}

impl From<MouseEvent> for InputEvent {
    fn from(event: MouseEvent) -> Self {
        InputEvent::Mouse(event)
    }
}

impl From<KeyEvent> for InputEvent {
    fn from(event: KeyEvent) -> Self {
        InputEvent::Key(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowPosition {
    pub x: i32,
    pub y: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_codes_are_case_insensitive() {
        assert_eq!(KeyCode::from_char('w'), KeyCode::W);
        assert_eq!(KeyCode::from_char('W'), KeyCode::W);
        assert_eq!(KeyCode::function(3), KeyCode(114));
    }

    #[test]
    fn escape_detected_by_code_or_char() {
        assert!(KeyEvent::coded(KeyAction::Press, KeyCode::ESCAPE).is_escape());
        assert!(KeyEvent::new(KeyAction::Press, Some('\u{1b}'), KeyCode::UNKNOWN).is_escape());
        assert!(!KeyEvent::press('e').is_escape());
    }
}
