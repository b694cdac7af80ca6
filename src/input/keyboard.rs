use std::collections::HashSet;

use crate::event::{KeyAction, KeyCode, KeyEvent};

/// Identity of a held key. Code and character together distinguish, for
/// example, a shifted and unshifted press of the same physical key.
pub type KeyId = (KeyCode, Option<char>);

#[derive(Debug, Clone)]
pub struct KeyState {
    last_key: Option<char>,
    last_code: KeyCode,
    pressed: HashSet<KeyId>,
    auto_repeat_suppressed: bool,
    focused: bool,
}

impl KeyState {
    pub fn new(auto_repeat_suppressed: bool) -> Self {
        Self {
            last_key: None,
            last_code: KeyCode::UNKNOWN,
            pressed: HashSet::new(),
            auto_repeat_suppressed,
            focused: true,
        }
    }

    /// Returns `false` when the event was dropped as an auto-repeat.
    pub fn apply(&mut self, event: &KeyEvent) -> bool {
        if self.auto_repeat_suppressed && event.auto_repeat {
            return false;
        }

        self.last_key = event.key;
        match event.action {
            KeyAction::Press => {
                self.last_code = event.code;
                self.pressed.insert((event.code, event.key));
            }
            KeyAction::Release => {
                self.last_code = event.code;
                self.pressed.remove(&(event.code, event.key));
            }
            KeyAction::Type => {}
        }
        true
    }

    /// Focus loss produces no release events, so held keys are forgotten here.
    pub fn focus_lost(&mut self) {
        self.focused = false;
        self.pressed.clear();
    }

    pub fn focus_gained(&mut self) {
        self.focused = true;
    }

    pub fn set_auto_repeat_suppressed(&mut self, suppressed: bool) {
        self.auto_repeat_suppressed = suppressed;
    }

    pub fn any_key_down(&self) -> bool {
        !self.pressed.is_empty()
    }

    pub fn is_down(&self, code: KeyCode) -> bool {
        self.pressed.iter().any(|(held, _)| *held == code)
    }

    pub fn pressed_keys(&self) -> impl Iterator<Item = &KeyId> {
        self.pressed.iter()
    }

    pub fn pressed_count(&self) -> usize {
        self.pressed.len()
    }

    pub fn last_key(&self) -> Option<char> {
        self.last_key
    }

    pub fn last_code(&self) -> KeyCode {
        self.last_code
    }

    pub fn focused(&self) -> bool {
        self.focused
    }
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_then_release_empties_set() {
        let mut keys = KeyState::default();
        keys.apply(&KeyEvent::press('a'));
        assert!(keys.any_key_down());
        keys.apply(&KeyEvent::release('a'));
        assert!(!keys.any_key_down());
        assert_eq!(keys.pressed_count(), 0);
    }

    #[test]
    fn focus_loss_clears_without_release() {
        let mut keys = KeyState::default();
        keys.apply(&KeyEvent::press('a'));
        keys.apply(&KeyEvent::press('s'));
        keys.focus_lost();
        assert!(!keys.any_key_down());
        assert!(!keys.focused());
    }

    #[test]
    fn simultaneous_keys_tracked_independently() {
        let mut keys = KeyState::default();
        keys.apply(&KeyEvent::press('a'));
        keys.apply(&KeyEvent::press('d'));
        keys.apply(&KeyEvent::press('a'));
        assert_eq!(keys.pressed_count(), 2);
        keys.apply(&KeyEvent::release('a'));
        assert!(keys.is_down(KeyCode::from_char('d')));
        assert!(keys.any_key_down());
    }

    #[test]
    fn auto_repeat_dropped_when_suppressed() {
        let mut keys = KeyState::new(true);
        assert!(keys.apply(&KeyEvent::press('x')));
        assert!(!keys.apply(&KeyEvent::press('x').repeated()));

        let mut permissive = KeyState::new(false);
        permissive.apply(&KeyEvent::press('x'));
        assert!(permissive.apply(&KeyEvent::press('x').repeated()));
        assert_eq!(permissive.pressed_count(), 1);
    }

    #[test]
    fn typed_characters_do_not_hold_keys() {
        let mut keys = KeyState::default();
        keys.apply(&KeyEvent::typed('q'));
        assert_eq!(keys.last_key(), Some('q'));
        assert!(!keys.any_key_down());
    }
}
