pub mod terminal;

pub use terminal::{
    CrosstermTranslator, DriverResult, SurfaceEvent, TerminalDriver, TerminalDriverError,
    TerminalRenderer,
};
