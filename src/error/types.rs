use thiserror::Error;

use crate::hooks::{ExtensionId, HookKind};

/// Unified result type for the sketch runtime.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the sketch runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
    #[error("extension `{extension}` failed: {message}")]
    Extension { extension: String, message: String },
    #[error("renderer error: {0}")]
    Renderer(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Build a recoverable error attributed to an extension.
    pub fn extension(extension: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extension {
            extension: extension.into(),
            message: message.into(),
        }
    }

    /// Errors of this class abort hook dispatch and stop the runtime.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::Fatal(_))
    }
}

/// Violations of engine invariants caused by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("run_frame invoked while a frame is already in progress")]
    ReentrantFrame,
    #[error("extension {id} is already registered for the `{kind}` hook")]
    DuplicateHook { kind: HookKind, id: ExtensionId },
    #[error("extension {id} does not provide the `{kind}` hook")]
    MissingCapability { kind: HookKind, id: ExtensionId },
    #[error("extension {0} is not attached")]
    UnknownExtension(ExtensionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_fatal() {
        let err = EngineError::from(UsageError::ReentrantFrame);
        assert!(err.is_fatal());
    }

    #[test]
    fn extension_errors_are_recoverable() {
        let err = EngineError::extension("overlay", "texture missing");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "extension `overlay` failed: texture missing");
    }
}
