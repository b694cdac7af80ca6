//! Engine configuration and the immutable platform profile.
//!
//! The platform profile is built once at startup and shared by reference;
//! nothing in the engine reads platform or hosting flags from global state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::logging::Logger;
use crate::metrics::FrameMetrics;
use crate::runtime::audit::{NullRuntimeAudit, RuntimeAudit};

pub const DEFAULT_FRAME_RATE: f64 = 60.0;
pub const DEFAULT_EMA_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// Process-wide facts the input layer branches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub platform: Platform,
    /// The sketch is hosted by another application (an editor or launcher)
    /// rather than running standalone.
    pub embedded: bool,
}

impl PlatformProfile {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            embedded: false,
        }
    }

    pub fn detect() -> Self {
        Self::new(Platform::current())
    }

    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::detect()
    }
}

/// What happens once the runtime has been disposed after an exit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitBehavior {
    /// `run()` returns to the caller.
    Return,
    /// Terminate the process with the given status code.
    ExitProcess(i32),
}

/// How fatal usage errors terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorPolicy {
    /// Print a diagnostic and exit the process with status 1.
    Exit,
    /// Panic with the diagnostic, leaving termination to the embedder.
    Panic,
}

/// Configuration knobs for the sketch runtime.
#[derive(Clone)]
pub struct EngineConfig {
    pub profile: Arc<PlatformProfile>,
    /// Frames per second the scheduler paces towards.
    pub target_frame_rate: f64,
    /// Smoothing factor of the frame-time moving average.
    pub ema_alpha: f64,
    /// Drop auto-repeated key events.
    pub suppress_key_repeat: bool,
    pub logger: Option<Logger>,
    pub metrics: Option<Arc<Mutex<FrameMetrics>>>,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    pub metrics_target: String,
    pub audit: Arc<dyn RuntimeAudit>,
    pub exit_behavior: ExitBehavior,
    pub usage_error_policy: UsageErrorPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: Arc::new(PlatformProfile::detect()),
            target_frame_rate: DEFAULT_FRAME_RATE,
            ema_alpha: DEFAULT_EMA_ALPHA,
            suppress_key_repeat: true,
            logger: None,
            metrics: None,
            metrics_interval: Duration::from_secs(5),
            metrics_target: "sketch::runtime.metrics".to_string(),
            audit: Arc::new(NullRuntimeAudit),
            exit_behavior: ExitBehavior::Return,
            usage_error_policy: UsageErrorPolicy::Exit,
        }
    }
}

impl EngineConfig {
    pub fn with_profile(mut self, profile: PlatformProfile) -> Self {
        self.profile = Arc::new(profile);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_frame_rate(mut self, hz: f64) -> Self {
        self.target_frame_rate = hz;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn RuntimeAudit>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_usage_error_policy(mut self, policy: UsageErrorPolicy) -> Self {
        self.usage_error_policy = policy;
        self
    }

    pub fn with_exit_behavior(mut self, behavior: ExitBehavior) -> Self {
        self.exit_behavior = behavior;
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(FrameMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<FrameMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }

    /// Pacing period derived from the target rate.
    pub fn frame_period(&self) -> Duration {
        frame_period(self.target_frame_rate)
    }
}

pub(crate) fn frame_period(hz: f64) -> Duration {
    if hz.is_finite() && hz > 0.0 {
        Duration::from_secs_f64(1.0 / hz)
    } else {
        Duration::from_secs_f64(1.0 / DEFAULT_FRAME_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_standalone_by_default() {
        let profile = PlatformProfile::new(Platform::Linux);
        assert!(!profile.embedded);
        assert!(PlatformProfile::new(Platform::MacOs).embedded(true).embedded);
    }

    #[test]
    fn frame_period_tracks_rate() {
        let config = EngineConfig::default().with_frame_rate(50.0);
        assert_eq!(config.frame_period(), Duration::from_millis(20));
    }

    #[test]
    fn enable_metrics_is_idempotent() {
        let mut config = EngineConfig::default();
        config.enable_metrics();
        let first = config.metrics_handle().unwrap();
        config.enable_metrics();
        let second = config.metrics_handle().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
