use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;

use crate::Result;
use crate::event::{KeyEvent, MouseEvent};
use crate::hooks::{Extension, HookContext, HookKind};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::FrameMetrics;

/// Logs lifecycle hooks and input for observability/debugging.
pub struct LifecycleLoggerExtension {
    logger: Logger,
    level: LogLevel,
    log_frames: bool,
    log_keys: bool,
    log_mouse: bool,
}

impl LifecycleLoggerExtension {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_frames: false,
            log_keys: true,
            log_mouse: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Log every `pre`/`post` pair. Noisy at full frame rate.
    pub fn log_frames(mut self, enabled: bool) -> Self {
        self.log_frames = enabled;
        self
    }

    pub fn log_keys(mut self, enabled: bool) -> Self {
        self.log_keys = enabled;
        self
    }

    pub fn log_mouse(mut self, enabled: bool) -> Self {
        self.log_mouse = enabled;
        self
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, "sketch::runtime.lifecycle", message, fields);
        let _ = self.logger.log_event(event);
    }
}

impl Extension for LifecycleLoggerExtension {
    fn name(&self) -> &str {
        "diagnostics.lifecycle_logger"
    }

    fn capabilities(&self) -> &[HookKind] {
        &[
            HookKind::Pre,
            HookKind::Post,
            HookKind::Pause,
            HookKind::Resume,
            HookKind::Dispose,
            HookKind::MouseEvent,
            HookKind::KeyEvent,
        ]
    }

    fn pre(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        if self.log_frames {
            self.emit(
                "frame.pre",
                [json_kv("frame_count", json!(ctx.frame().frame_count))],
            );
        }
        Ok(())
    }

    fn post(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        if self.log_frames {
            let info = ctx.frame();
            self.emit(
                "frame.post",
                [
                    json_kv("frame_count", json!(info.frame_count)),
                    json_kv("frame_rate", json!(info.frame_rate)),
                ],
            );
        }
        Ok(())
    }

    fn pause(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.emit(
            "surface.paused",
            [json_kv("frame_count", json!(ctx.frame().frame_count))],
        );
        Ok(())
    }

    fn resume(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.emit(
            "surface.resumed",
            [json_kv("frame_count", json!(ctx.frame().frame_count))],
        );
        Ok(())
    }

    fn dispose(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let info = ctx.frame();
        self.emit(
            "runtime.dispose",
            [
                json_kv("frame_count", json!(info.frame_count)),
                json_kv("uptime_ms", json!(info.elapsed.as_millis() as u64)),
            ],
        );
        Ok(())
    }

    fn mouse_event(&mut self, _ctx: &mut HookContext<'_>, event: &MouseEvent) -> Result<()> {
        if self.log_mouse {
            self.emit(
                "event.mouse",
                [
                    json_kv("action", json!(format!("{:?}", event.action))),
                    json_kv("button", json!(format!("{:?}", event.button))),
                    json_kv("x", json!(event.x)),
                    json_kv("y", json!(event.y)),
                ],
            );
        }
        Ok(())
    }

    fn key_event(&mut self, _ctx: &mut HookContext<'_>, event: &KeyEvent) -> Result<()> {
        if self.log_keys {
            self.emit(
                "event.key",
                [
                    json_kv("action", json!(format!("{:?}", event.action))),
                    json_kv("code", json!(event.code.0)),
                    json_kv("key", json!(event.key.map(String::from))),
                    json_kv("modifiers", json!(format!("{:?}", event.modifiers))),
                ],
            );
        }
        Ok(())
    }
}

/// Periodically emits frame metrics snapshots through the provided logger.
pub struct MetricsSnapshotExtension {
    logger: Logger,
    metrics: Arc<Mutex<FrameMetrics>>,
    target: String,
    interval: Duration,
    last_emit: Option<Instant>,
}

impl MetricsSnapshotExtension {
    pub fn new(logger: Logger, metrics: Arc<Mutex<FrameMetrics>>) -> Self {
        Self {
            logger,
            metrics,
            target: "sketch::runtime.metrics".to_string(),
            interval: Duration::from_secs(5),
            last_emit: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&mut self, uptime: Duration, frame_rate: f64) {
        if self.interval.is_zero() {
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return;
            }
        }

        self.last_emit = Some(now);
        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime, frame_rate).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }
}

impl Extension for MetricsSnapshotExtension {
    fn name(&self) -> &str {
        "diagnostics.metrics_snapshot"
    }

    fn capabilities(&self) -> &[HookKind] {
        &[HookKind::Post]
    }

    fn post(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let info = *ctx.frame();
        self.emit_snapshot(info.elapsed, info.frame_rate);
        Ok(())
    }
}
