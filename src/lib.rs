//! Frame-driven sketch runtime.
//!
//! A [`Sketch`] bundles a user model with `setup`, `draw` and input
//! callbacks. [`SketchRuntime`] schedules it: it paces frames to a target
//! rate, feeds queued input in between frames, tracks mouse and keyboard
//! state, and lets extensions hook the frame through the
//! [`CallbackRegistry`]. Surfaces such as the crossterm
//! [`TerminalDriver`] post events through a [`RuntimeHandle`].

pub mod config;
pub mod error;
pub mod event;
pub mod hooks;
pub mod input;
pub mod logging;
pub mod metrics;
pub mod render;
pub mod runtime;

pub use config::{
    DEFAULT_EMA_ALPHA, DEFAULT_FRAME_RATE, EngineConfig, ExitBehavior, Platform, PlatformProfile,
    UsageErrorPolicy,
};
pub use error::{EngineError, Result, UsageError};
pub use event::{
    EventQueue, InputEvent, KeyAction, KeyCode, KeyEvent, Modifiers, MouseAction, MouseButton,
    MouseEvent, WindowPosition, WindowSize,
};
pub use hooks::{CallbackRegistry, DispatchReport, Extension, ExtensionId, HookContext, HookKind};
pub use input::{InputTracker, KeyState, MouseState, Position};
pub use logging::{LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult};
pub use metrics::{FrameMetrics, MetricSnapshot};
pub use render::{NullRenderer, Renderer};
pub use runtime::audit::{
    BufferedAudit, NullRuntimeAudit, RuntimeAudit, RuntimeAuditEvent, RuntimeAuditEventBuilder,
    RuntimeAuditStage,
};
pub use runtime::context::{FrameContext, FrameInfo};
pub use runtime::diagnostics::{LifecycleLoggerExtension, MetricsSnapshotExtension};
pub use runtime::driver::{
    CrosstermTranslator, DriverResult, SurfaceEvent, TerminalDriver, TerminalDriverError,
    TerminalRenderer,
};
pub use runtime::{
    FrameState, InputFn, RuntimeHandle, SchedulerState, Sketch, SketchFn, SketchRuntime,
};
