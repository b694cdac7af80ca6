use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sketch_runtime::logging::{LogEvent, LogSink};
use sketch_runtime::{
    EngineConfig, Extension, FrameContext, HookContext, HookKind, KeyEvent,
    LifecycleLoggerExtension, LoggingResult, Logger, MetricsSnapshotExtension, MouseAction,
    MouseEvent, NullRenderer, Platform, PlatformProfile, Result, Sketch, SketchRuntime,
    UsageErrorPolicy,
};

#[derive(Clone, Default)]
struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _event: &LogEvent) -> LoggingResult<()> {
        Ok(())
    }
}

const FRAMES: usize = 120;

fn runtime_step_frames(c: &mut Criterion) {
    c.bench_function("runtime_step_frames", |b| {
        b.iter(|| {
            let mut runtime = build_runtime();
            for _ in 0..FRAMES {
                runtime.step().expect("step");
            }
            black_box(runtime.model().trail);
        });
    });
}

fn runtime_event_burst(c: &mut Criterion) {
    c.bench_function("runtime_event_burst", |b| {
        b.iter(|| {
            let mut runtime = build_runtime();
            runtime.step().expect("setup");
            for frame in 0..FRAMES {
                let handle = runtime.handle();
                for i in 0..8 {
                    let x = (frame * 8 + i) as f32;
                    handle.post_event(MouseEvent::new(MouseAction::Move, x, x * 0.5));
                }
                handle.post_event(KeyEvent::press('a'));
                handle.post_event(KeyEvent::release('a'));
                runtime.step().expect("step");
            }
            black_box(runtime.model().moves);
        });
    });
}

fn build_runtime() -> SketchRuntime<Trail> {
    let logger = Logger::new(NullSink);
    let mut config = EngineConfig::default()
        .with_profile(PlatformProfile::new(Platform::Linux))
        .with_usage_error_policy(UsageErrorPolicy::Panic)
        .with_logger(logger.clone());
    config.metrics_interval = Duration::ZERO;
    config.enable_metrics();
    let metrics = config.metrics_handle().expect("metrics handle");

    let sketch = Sketch::new(Trail::default())
        .draw(|trail: &mut Trail, ctx: &mut FrameContext<'_>| {
            let position = ctx.mouse().position();
            trail.trail += position.x + position.y;
            Ok(())
        })
        .mouse(|trail: &mut Trail, _ctx: &mut FrameContext<'_>, _event: &MouseEvent| {
            trail.moves += 1;
            Ok(())
        });

    let mut runtime = SketchRuntime::new(sketch, NullRenderer, config);
    runtime.install(
        LifecycleLoggerExtension::new(logger.clone())
            .log_frames(true)
            .log_keys(false),
    );
    runtime.install(
        MetricsSnapshotExtension::new(logger, metrics).with_interval(Duration::from_millis(250)),
    );
    runtime.install(FrameCounter::default());
    runtime
}

#[derive(Default)]
struct Trail {
    trail: f32,
    moves: u64,
}

#[derive(Default)]
struct FrameCounter {
    pre: u64,
    post: u64,
}

impl Extension for FrameCounter {
    fn name(&self) -> &str {
        "bench.frame_counter"
    }

    fn capabilities(&self) -> &[HookKind] {
        &[HookKind::Pre, HookKind::Post]
    }

    fn pre(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        self.pre += 1;
        Ok(())
    }

    fn post(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
        self.post += 1;
        Ok(())
    }
}

criterion_group!(benches, runtime_step_frames, runtime_event_burst);
criterion_main!(benches);
