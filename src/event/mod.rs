pub mod queue;
pub mod types;

pub use queue::{EventQueue, WindowEvents};
pub use types::{
    InputEvent, KeyAction, KeyCode, KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent,
    WindowPosition, WindowSize,
};
