mod types;

pub use types::{EngineError, Result, UsageError};
