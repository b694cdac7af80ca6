use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Counters accumulated by the scheduler across frames.
#[derive(Debug, Default, Clone)]
pub struct FrameMetrics {
    frames: u64,
    late_frames: u64,
    events_drained: u64,
    hook_failures: u64,
    setup_time: Duration,
    last_frame_time: Duration,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_setup(&mut self, elapsed: Duration) {
        self.setup_time = elapsed;
    }

    /// Record a completed frame; `target` is the pacing period the frame was aiming for.
    pub fn record_frame(&mut self, elapsed: Duration, target: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.last_frame_time = elapsed;
        if elapsed > target {
            self.late_frames = self.late_frames.saturating_add(1);
        }
    }

    pub fn record_events(&mut self, count: usize) {
        if count > 0 {
            self.events_drained = self.events_drained.saturating_add(count as u64);
        }
    }

    pub fn record_hook_failure(&mut self) {
        self.hook_failures = self.hook_failures.saturating_add(1);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn hook_failures(&self) -> u64 {
        self.hook_failures
    }

    pub fn snapshot(&self, uptime: Duration, frame_rate: f64) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            frames: self.frames,
            late_frames: self.late_frames,
            events_drained: self.events_drained,
            hook_failures: self.hook_failures,
            setup_ms: self.setup_time.as_secs_f64() * 1000.0,
            last_frame_ms: self.last_frame_time.as_secs_f64() * 1000.0,
            frame_rate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub frames: u64,
    pub late_frames: u64,
    pub events_drained: u64,
    pub hook_failures: u64,
    pub setup_ms: f64,
    pub last_frame_ms: f64,
    pub frame_rate: f64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "frame_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("frames".to_string(), json!(self.frames));
        map.insert("late_frames".to_string(), json!(self.late_frames));
        map.insert("events_drained".to_string(), json!(self.events_drained));
        map.insert("hook_failures".to_string(), json!(self.hook_failures));
        map.insert("setup_ms".to_string(), json!(self.setup_ms));
        map.insert("last_frame_ms".to_string(), json!(self.last_frame_ms));
        map.insert("frame_rate".to_string(), json!(self.frame_rate));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_frames_counted_against_target() {
        let mut metrics = FrameMetrics::new();
        let target = Duration::from_millis(16);
        metrics.record_frame(Duration::from_millis(10), target);
        metrics.record_frame(Duration::from_millis(40), target);
        let snapshot = metrics.snapshot(Duration::from_secs(1), 60.0);
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.late_frames, 1);
    }

    #[test]
    fn snapshot_fields_include_counters() {
        let mut metrics = FrameMetrics::new();
        metrics.record_events(3);
        metrics.record_hook_failure();
        let fields = metrics.snapshot(Duration::ZERO, 30.0).as_fields();
        assert_eq!(fields["events_drained"], json!(3));
        assert_eq!(fields["hook_failures"], json!(1));
    }
}
