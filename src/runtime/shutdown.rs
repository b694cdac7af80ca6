use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::config::{ExitBehavior, UsageErrorPolicy};
use crate::error::EngineError;
use crate::logging::{LogLevel, Logger, StderrSink, event_with_fields, json_kv};

/// Guards the teardown sequence so it runs at most once, no matter how
/// many threads ask for it or whether it is re-entered from a dispose hook.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    started: AtomicBool,
    completed: Mutex<bool>,
    done: Condvar,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the teardown. Only the first caller gets `true`.
    pub fn try_begin(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn complete(&self) {
        let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        *completed = true;
        self.done.notify_all();
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until teardown completes or `timeout` passes.
    pub fn wait_disposed(&self, timeout: Duration) -> bool {
        let completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        let (completed, _) = self
            .done
            .wait_timeout_while(completed, timeout, |completed| !*completed)
            .unwrap_or_else(PoisonError::into_inner);
        *completed
    }
}

/// Final step after teardown when the process itself should go away.
pub(crate) fn shutdown_process(behavior: ExitBehavior) {
    if let ExitBehavior::ExitProcess(code) = behavior {
        std::process::exit(code);
    }
}

/// Report a violated engine invariant and terminate according to `policy`.
pub(crate) fn fatal(error: &EngineError, policy: UsageErrorPolicy, logger: Option<&Logger>) -> ! {
    let message = match error {
        EngineError::Usage(_) => "fatal_usage_error",
        _ => "fatal_error",
    };
    let event = event_with_fields(
        LogLevel::Error,
        "sketch::runtime",
        message,
        [json_kv("error", error.to_string())],
    );
    if let Some(logger) = logger {
        let _ = logger.log_event(event.clone());
    }
    let _ = Logger::new(StderrSink).log_event(event);

    match policy {
        UsageErrorPolicy::Exit => std::process::exit(1),
        UsageErrorPolicy::Panic => panic!("fatal {error}"),
    }
}
