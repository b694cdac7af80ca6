//! Lifecycle audit trail for the scheduler.
//!
//! Records capture a stage identifier plus structured metadata so callers
//! can log, buffer, or assert on the runtime's progression without hooking
//! into the frame loop itself.

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use serde_json::Value;

/// Distinct lifecycle checkpoints emitted by `SketchRuntime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeAuditStage {
    RuntimeConstructed,
    ExtensionAttached,
    HookRegistered,
    HookRemoved,
    SetupStarted,
    SetupCompleted,
    FrameCompleted,
    /// The draw loop stopped (`no_loop`, or no draw body).
    LoopPaused,
    LoopResumed,
    SurfacePaused,
    SurfaceResumed,
    ExitRequested,
    DisposeStarted,
    Disposed,
}

#[derive(Debug, Clone)]
pub struct RuntimeAuditEvent {
    pub timestamp: SystemTime,
    pub stage: RuntimeAuditStage,
    pub details: Vec<(String, Value)>,
}

impl RuntimeAuditEvent {
    fn new(stage: RuntimeAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

pub struct RuntimeAuditEventBuilder {
    event: RuntimeAuditEvent,
}

impl RuntimeAuditEventBuilder {
    pub fn new(stage: RuntimeAuditStage) -> Self {
        Self {
            event: RuntimeAuditEvent::new(stage),
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.details.push((key.into(), value.into()));
        self
    }

    pub fn finish(self) -> RuntimeAuditEvent {
        self.event
    }
}

pub trait RuntimeAudit: Send + Sync {
    fn record(&self, event: RuntimeAuditEvent);
}

/// Default no-op implementation used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullRuntimeAudit;

impl RuntimeAudit for NullRuntimeAudit {
    fn record(&self, _event: RuntimeAuditEvent) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct BufferedAudit {
    events: Mutex<Vec<RuntimeAuditEvent>>,
}

impl BufferedAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RuntimeAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stages(&self) -> Vec<RuntimeAuditStage> {
        self.events().into_iter().map(|event| event.stage).collect()
    }

    pub fn count(&self, stage: RuntimeAuditStage) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.stage == stage)
            .count()
    }
}

impl RuntimeAudit for BufferedAudit {
    fn record(&self, event: RuntimeAuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
