//! Frame scheduler for sketches.
//!
//! `SketchRuntime` owns every piece of frame state and mutates it only
//! through `&mut self`. Producer threads talk to it through a
//! [`RuntimeHandle`]: events go through the event queue, control calls are
//! buffered and picked up at the next safe point.

pub mod audit;
pub mod context;
pub mod diagnostics;
pub mod driver;
pub mod estimator;
pub mod handle;
pub mod shutdown;
pub mod sketch;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::config::{DEFAULT_FRAME_RATE, EngineConfig, frame_period};
use crate::error::{EngineError, Result, UsageError};
use crate::event::{InputEvent, WindowEvents, WindowPosition, WindowSize};
use crate::hooks::{CallbackRegistry, Extension, ExtensionId, HookArgs, HookKind};
use crate::input::InputTracker;
use crate::logging::{LogLevel, event_with_fields, json_kv};
use crate::metrics::FrameMetrics;
use crate::render::Renderer;

use audit::{RuntimeAuditEventBuilder, RuntimeAuditStage};
use context::{ControlRequests, FrameContext, FrameInfo};
use estimator::FrameRateEstimator;
use handle::Shared;
use shutdown::{fatal, shutdown_process};

pub use handle::RuntimeHandle;
pub use sketch::{InputFn, Sketch, SketchFn};

const RUNTIME_TARGET: &str = "sketch::runtime";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    NotStarted,
    Setup,
    Looping,
    Paused,
    Stopping,
    Disposed,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::NotStarted => "not_started",
            SchedulerState::Setup => "setup",
            SchedulerState::Looping => "looping",
            SchedulerState::Paused => "paused",
            SchedulerState::Stopping => "stopping",
            SchedulerState::Disposed => "disposed",
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, SchedulerState::Stopping | SchedulerState::Disposed)
    }
}

/// Loop bookkeeping. Written only by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    /// Completed draws. Zero throughout setup.
    pub frame_count: u64,
    pub looping: bool,
    /// One frame is owed even though the loop is stopped.
    pub redraw_requested: bool,
    /// No further frames will run.
    pub finished: bool,
    pub exit_requested: bool,
    pub last_frame_start: Option<Instant>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            frame_count: 0,
            looping: true,
            redraw_requested: true,
            finished: false,
            exit_requested: false,
            last_frame_start: None,
        }
    }
}

pub struct SketchRuntime<M> {
    sketch: Sketch<M>,
    renderer: Box<dyn Renderer>,
    config: EngineConfig,
    registry: CallbackRegistry,
    input: InputTracker,
    shared: Arc<Shared>,
    state: SchedulerState,
    frame: FrameState,
    estimator: FrameRateEstimator,
    target_frame_rate: f64,
    window: WindowSize,
    window_position: Option<WindowPosition>,
    in_frame: bool,
    suspended: bool,
    start_instant: Option<Instant>,
    last_metrics_emit: Option<Instant>,
}

impl<M> SketchRuntime<M> {
    pub fn new<R>(sketch: Sketch<M>, renderer: R, mut config: EngineConfig) -> Self
    where
        R: Renderer + 'static,
    {
        if config.metrics.is_none() && config.metrics_interval > Duration::ZERO {
            config.enable_metrics();
        }
        let target_frame_rate = if valid_frame_rate(config.target_frame_rate) {
            config.target_frame_rate
        } else {
            DEFAULT_FRAME_RATE
        };
        let shared = Arc::new(Shared::new(target_frame_rate, config.exit_behavior));
        let registry = CallbackRegistry::new().with_logger(config.logger.clone());
        let input = InputTracker::new(Arc::clone(&config.profile), config.suppress_key_repeat);
        let estimator = FrameRateEstimator::new(config.ema_alpha, target_frame_rate);

        config.audit.record(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::RuntimeConstructed)
                .detail("platform", format!("{:?}", config.profile.platform))
                .detail("embedded", config.profile.embedded)
                .detail("target_frame_rate", target_frame_rate)
                .finish(),
        );

        Self {
            sketch,
            renderer: Box::new(renderer),
            config,
            registry,
            input,
            shared,
            state: SchedulerState::NotStarted,
            frame: FrameState::default(),
            estimator,
            target_frame_rate,
            window: WindowSize::new(100, 100),
            window_position: None,
            in_frame: false,
            suspended: false,
            start_instant: None,
            last_metrics_emit: None,
        }
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window = WindowSize::new(width, height);
        self
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle::new(Arc::clone(&self.shared))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn attach<E>(&mut self, extension: E) -> ExtensionId
    where
        E: Extension + 'static,
    {
        let name = extension.name().to_string();
        let id = self.registry.attach(Box::new(extension));
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::ExtensionAttached)
                .detail("extension", name)
                .detail("id", id.0),
        );
        id
    }

    /// Attach an extension and register it for every hook it declares.
    pub fn install<E>(&mut self, extension: E) -> ExtensionId
    where
        E: Extension + 'static,
    {
        let kinds = extension.capabilities().to_vec();
        let id = self.attach(extension);
        for kind in kinds {
            self.register_hook(kind, id);
        }
        id
    }

    /// Registering the same extension twice for a hook, or for a hook it
    /// does not provide, is a fatal usage error.
    pub fn register_hook(&mut self, kind: HookKind, id: ExtensionId) {
        if let Err(error) = self.registry.add(kind, id) {
            self.abort(error.into());
        }
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::HookRegistered)
                .detail("hook", kind.as_str())
                .detail("id", id.0),
        );
    }

    pub fn unregister_hook(&mut self, kind: HookKind, id: ExtensionId) -> bool {
        let removed = self.registry.remove(kind, id);
        if removed {
            self.record_audit(
                RuntimeAuditEventBuilder::new(RuntimeAuditStage::HookRemoved)
                    .detail("hook", kind.as_str())
                    .detail("id", id.0),
            );
        }
        removed
    }

    pub fn detach(&mut self, id: ExtensionId) -> Option<Box<dyn Extension>> {
        self.registry.detach(id)
    }

    /// Advance the scheduler by one tick: setup on the first call, then at
    /// most one frame. Returns whether a frame was drawn.
    pub fn step(&mut self) -> Result<bool> {
        let result = self.tick();
        self.escalate(result)
    }

    /// Run one frame now, whether or not the loop is running. Runs setup
    /// first if the sketch has not started. Returns `false` without drawing
    /// once an exit is pending or the runtime is disposed.
    pub fn run_frame(&mut self) -> Result<bool> {
        let result = self.frame_once();
        self.escalate(result)
    }

    /// Drive the sketch until it is disposed, pacing frames to the target
    /// rate. Parks without spinning while the loop is stopped.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_loop();
        let result = self.escalate(result);
        if let Err(error) = &result {
            self.log_runtime_event(
                LogLevel::Error,
                "run_failed",
                [json_kv("error", json!(error.to_string()))],
            );
            self.dispose();
        }
        result
    }

    /// Queue an input event. While the loop is stopped the queue is drained
    /// before this returns.
    pub fn post_event(&mut self, event: impl Into<InputEvent>) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.shared.queue.push(event.into(), false);
        if self.is_idle() {
            let result = self.drain_and_settle();
            self.escalate(result)?;
        }
        Ok(())
    }

    pub fn post_window_resized(&self, width: u32, height: u32) {
        self.shared
            .queue
            .post_window_resized(WindowSize::new(width, height));
    }

    pub fn post_window_moved(&self, x: i32, y: i32) {
        self.shared
            .queue
            .post_window_moved(WindowPosition { x, y });
    }

    pub fn no_loop(&mut self) {
        if !self.frame.looping {
            return;
        }
        self.frame.looping = false;
        if self.state == SchedulerState::Looping {
            self.state = SchedulerState::Paused;
        }
        self.publish_state();
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::LoopPaused)
                .detail("frame_count", self.frame.frame_count),
        );
        self.log_runtime_event(LogLevel::Debug, "loop_stopped", std::iter::empty());
    }

    /// Restart the loop. Ignored once the sketch has finished.
    pub fn start_loop(&mut self) {
        if self.frame.looping || self.frame.finished {
            return;
        }
        self.frame.looping = true;
        if self.state == SchedulerState::Paused {
            self.state = SchedulerState::Looping;
        }
        self.publish_state();
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::LoopResumed)
                .detail("frame_count", self.frame.frame_count),
        );
        self.log_runtime_event(LogLevel::Debug, "loop_started", std::iter::empty());
    }

    pub fn redraw(&mut self) {
        self.frame.redraw_requested = true;
    }

    /// Change the pacing target. Non-positive or non-finite rates are
    /// rejected and the current target is kept.
    pub fn set_frame_rate(&mut self, hz: f64) -> Result<()> {
        if !valid_frame_rate(hz) {
            let error = EngineError::Config(format!("frame rate must be positive, got {hz}"));
            self.log_runtime_event(
                LogLevel::Warn,
                "frame_rate_rejected",
                [json_kv("error", json!(error.to_string()))],
            );
            return Err(error);
        }
        self.target_frame_rate = hz;
        self.shared.publish_frame_rate(hz);
        self.log_runtime_event(
            LogLevel::Debug,
            "frame_rate_changed",
            [json_kv("target", json!(hz))],
        );
        Ok(())
    }

    /// The surface was minimised or hidden: dispatch `Pause` and stop frames.
    pub fn pause(&mut self) -> Result<()> {
        let result = self.set_suspended(true);
        self.escalate(result)
    }

    pub fn resume(&mut self) -> Result<()> {
        let result = self.set_suspended(false);
        self.escalate(result)
    }

    /// Ask the sketch to quit.
    ///
    /// Between frames of a running loop this only records the request; the
    /// next tick tears down. A stopped or unstarted sketch is disposed right
    /// away, and calling this after disposal goes straight to process exit.
    pub fn exit(&mut self) {
        match self.state {
            SchedulerState::Disposed => shutdown_process(self.config.exit_behavior),
            SchedulerState::Stopping => {}
            SchedulerState::Setup | SchedulerState::Looping if !self.suspended => {
                self.request_exit("exit")
            }
            _ => {
                self.request_exit("exit");
                let result = self.settle();
                if let Err(error) = self.escalate(result) {
                    self.log_runtime_event(
                        LogLevel::Warn,
                        "dispose_failed",
                        [json_kv("error", json!(error.to_string()))],
                    );
                }
            }
        }
    }

    /// Stop the scheduler, dispatch `Dispose`, and release the renderer.
    /// Only the first call does anything.
    pub fn dispose(&mut self) {
        let result = self.dispose_inner();
        if let Err(error) = self.escalate(result) {
            self.log_runtime_event(
                LogLevel::Warn,
                "dispose_failed",
                [json_kv("error", json!(error.to_string()))],
            );
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frame_state(&self) -> &FrameState {
        &self.frame
    }

    pub fn frame_count(&self) -> u64 {
        self.frame.frame_count
    }

    /// Smoothed measured frame rate.
    pub fn frame_rate(&self) -> f64 {
        self.estimator.rate()
    }

    pub fn target_frame_rate(&self) -> f64 {
        self.target_frame_rate
    }

    pub fn is_looping(&self) -> bool {
        self.frame.looping
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn window_size(&self) -> WindowSize {
        self.window
    }

    pub fn window_position(&self) -> Option<WindowPosition> {
        self.window_position
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn model(&self) -> &M {
        self.sketch.model()
    }

    pub fn model_mut(&mut self) -> &mut M {
        self.sketch.model_mut()
    }

    fn tick(&mut self) -> Result<bool> {
        self.reconcile_shared()?;
        self.settle()?;
        let drawn = match self.state {
            SchedulerState::Stopping | SchedulerState::Disposed => return Ok(false),
            SchedulerState::NotStarted | SchedulerState::Setup => {
                self.guarded(Self::run_setup)?;
                false
            }
            SchedulerState::Looping | SchedulerState::Paused => {
                if self.should_run_frame() {
                    self.guarded(Self::frame_body)?
                } else {
                    self.drain_events()?;
                    false
                }
            }
        };
        self.settle()?;
        Ok(drawn)
    }

    fn frame_once(&mut self) -> Result<bool> {
        self.reconcile_shared()?;
        // A pending exit tears down here; no new frame starts after it.
        self.settle()?;
        if self.state.is_terminal() {
            return Ok(false);
        }
        if matches!(self.state, SchedulerState::NotStarted | SchedulerState::Setup) {
            self.guarded(Self::run_setup)?;
        }
        let drawn = self.guarded(Self::frame_body)?;
        self.settle()?;
        Ok(drawn)
    }

    fn run_loop(&mut self) -> Result<()> {
        while !self.state.is_terminal() {
            self.tick()?;
            self.wait_for_next_tick()?;
        }
        Ok(())
    }

    // Sleep until the next frame is due. Control requests that arrive while
    // sleeping are applied without drawing early.
    fn wait_for_next_tick(&mut self) -> Result<()> {
        loop {
            if self.frame.exit_requested
                || !matches!(self.state, SchedulerState::Looping | SchedulerState::Paused)
            {
                return Ok(());
            }
            if !self.should_run_frame() {
                self.shared.queue.park();
                return Ok(());
            }
            let remaining = self.until_next_frame();
            if remaining.is_zero() || !self.shared.queue.wait(Some(remaining)) {
                return Ok(());
            }
            self.reconcile_shared()?;
        }
    }

    fn until_next_frame(&self) -> Duration {
        let period = frame_period(self.target_frame_rate);
        self.frame
            .last_frame_start
            .map(|start| (start + period).saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    fn guarded<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.in_frame {
            return Err(UsageError::ReentrantFrame.into());
        }
        self.in_frame = true;
        let result = body(self);
        // Left set if `body` unwinds, so the next frame is refused.
        self.in_frame = false;
        result
    }

    fn run_setup(&mut self) -> Result<()> {
        self.state = SchedulerState::Setup;
        let started = Instant::now();
        self.start_instant = Some(started);
        self.last_metrics_emit = Some(started);
        self.record_audit(RuntimeAuditEventBuilder::new(RuntimeAuditStage::SetupStarted));
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_started",
            [
                json_kv("extensions", json!(self.registry.extension_count())),
                json_kv("target_frame_rate", json!(self.target_frame_rate)),
            ],
        );

        let result = self.call_sketch(|sketch, ctx| match sketch.setup.as_mut() {
            Some(setup) => setup(&mut sketch.model, ctx),
            None => Ok(()),
        });

        let elapsed = started.elapsed();
        self.with_metrics(|metrics| metrics.record_setup(elapsed));
        if self.state == SchedulerState::Setup {
            self.state = if self.frame.looping {
                SchedulerState::Looping
            } else {
                SchedulerState::Paused
            };
        }
        self.publish_state();
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::SetupCompleted)
                .detail("looping", self.frame.looping)
                .detail("elapsed_ms", elapsed.as_secs_f64() * 1000.0),
        );
        result
    }

    fn frame_body(&mut self) -> Result<bool> {
        let started = Instant::now();
        self.apply_window_events()?;
        if let Some(previous) = self.frame.last_frame_start {
            self.estimator.update(started.duration_since(previous));
        }
        self.frame.last_frame_start = Some(started);
        self.drain_events()?;

        self.renderer.begin_frame(self.frame.frame_count)?;
        let drawn = self.frame_callbacks();
        let closed = self.renderer.end_frame();
        let drawn = drawn?;
        closed?;
        if !drawn {
            return Ok(false);
        }

        self.frame.redraw_requested = false;
        self.frame.frame_count += 1;

        let elapsed = started.elapsed();
        let period = frame_period(self.target_frame_rate);
        self.with_metrics(|metrics| metrics.record_frame(elapsed, period));
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::FrameCompleted)
                .detail("frame_count", self.frame.frame_count),
        );
        self.log_runtime_event(
            LogLevel::Trace,
            "frame_completed",
            [
                json_kv("frame_count", json!(self.frame.frame_count)),
                json_kv("elapsed_us", json!(elapsed.as_micros() as u64)),
            ],
        );
        self.maybe_emit_metrics();
        Ok(true)
    }

    // Everything inside the renderer bracket. Returns false when the sketch
    // has no draw body, which ends the loop for good.
    fn frame_callbacks(&mut self) -> Result<bool> {
        self.dispatch_hook(HookKind::Pre, HookArgs::None)?;
        self.input.begin_frame();
        if !self.sketch.has_draw() {
            self.terminate_loop();
            return Ok(false);
        }
        self.call_sketch(|sketch, ctx| match sketch.draw.as_mut() {
            Some(draw) => draw(&mut sketch.model, ctx),
            None => Ok(()),
        })?;
        self.dispatch_hook(HookKind::Draw, HookArgs::None)?;
        self.dispatch_hook(HookKind::Post, HookArgs::None)?;
        Ok(true)
    }

    fn terminate_loop(&mut self) {
        self.frame.finished = true;
        self.frame.looping = false;
        if self.state == SchedulerState::Looping {
            self.state = SchedulerState::Paused;
        }
        self.publish_state();
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::LoopPaused).detail("reason", "no_draw"),
        );
        self.log_runtime_event(LogLevel::Debug, "loop_finished", std::iter::empty());
    }

    fn apply_window_events(&mut self) -> Result<()> {
        let WindowEvents { resized, moved } = self.shared.queue.take_window_events();
        if let Some(size) = resized {
            self.window = size;
            self.renderer.resize(size)?;
            self.log_runtime_event(
                LogLevel::Info,
                "window_resized",
                [
                    json_kv("width", json!(size.width)),
                    json_kv("height", json!(size.height)),
                ],
            );
            if self.sketch.window_resized.is_some() {
                self.call_sketch(|sketch, ctx| match sketch.window_resized.as_mut() {
                    Some(handler) => handler(&mut sketch.model, ctx, &size),
                    None => Ok(()),
                })?;
            }
        }
        if let Some(position) = moved {
            self.window_position = Some(position);
            if self.sketch.window_moved.is_some() {
                self.call_sketch(|sketch, ctx| match sketch.window_moved.as_mut() {
                    Some(handler) => handler(&mut sketch.model, ctx, &position),
                    None => Ok(()),
                })?;
            }
        }
        Ok(())
    }

    fn drain_events(&mut self) -> Result<usize> {
        let shared = Arc::clone(&self.shared);
        let count = shared.queue.drain(|event| self.handle_input(event))?;
        self.with_metrics(|metrics| metrics.record_events(count));
        Ok(count)
    }

    fn drain_and_settle(&mut self) -> Result<()> {
        self.drain_events()?;
        self.settle()
    }

    fn handle_input(&mut self, event: InputEvent) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        let tracked = self.input.apply(event);
        match tracked.event {
            Some(InputEvent::Mouse(mouse)) => {
                if self.sketch.mouse.is_some() {
                    self.call_sketch(|sketch, ctx| match sketch.mouse.as_mut() {
                        Some(handler) => handler(&mut sketch.model, ctx, &mouse),
                        None => Ok(()),
                    })?;
                }
                self.dispatch_hook(HookKind::MouseEvent, HookArgs::Mouse(&mouse))?;
            }
            Some(InputEvent::Key(key)) => {
                if self.sketch.key.is_some() {
                    self.call_sketch(|sketch, ctx| match sketch.key.as_mut() {
                        Some(handler) => handler(&mut sketch.model, ctx, &key),
                        None => Ok(()),
                    })?;
                }
                self.dispatch_hook(HookKind::KeyEvent, HookArgs::Key(&key))?;
            }
            Some(InputEvent::Focus { gained }) => {
                if self.sketch.focus.is_some() {
                    self.call_sketch(|sketch, ctx| match sketch.focus.as_mut() {
                        Some(handler) => handler(&mut sketch.model, ctx, &gained),
                        None => Ok(()),
                    })?;
                }
            }
            None => {}
        }
        if tracked.request_exit {
            self.request_exit("input");
        }
        Ok(())
    }

    fn call_sketch<F>(&mut self, call: F) -> Result<()>
    where
        F: FnOnce(&mut Sketch<M>, &mut FrameContext<'_>) -> Result<()>,
    {
        let info = self.info();
        let mut ctx = FrameContext::new(info, &self.input, &mut self.registry);
        let result = call(&mut self.sketch, &mut ctx);
        let (requests, usage_error) = ctx.into_parts();
        if let Some(error) = usage_error {
            self.abort(error.into());
        }
        self.apply_requests(requests)?;
        result
    }

    fn dispatch_hook(&mut self, kind: HookKind, args: HookArgs<'_>) -> Result<()> {
        if self.registry.len(kind) == 0 {
            return Ok(());
        }
        let info = self.info();
        let report = self.registry.dispatch(kind, args, info, &self.input)?;
        let failures = report.failures.len();
        if failures > 0 {
            self.with_metrics(|metrics| {
                for _ in 0..failures {
                    metrics.record_hook_failure();
                }
            });
        }
        self.apply_requests(report.requests)
    }

    fn apply_requests(&mut self, requests: ControlRequests) -> Result<()> {
        if requests.is_empty() || self.state.is_terminal() {
            return Ok(());
        }
        if let Some(hz) = requests.frame_rate {
            // Rejections are logged by `set_frame_rate`.
            let _ = self.set_frame_rate(hz);
        }
        match requests.looping {
            Some(true) => self.start_loop(),
            Some(false) => self.no_loop(),
            None => {}
        }
        if requests.redraw {
            self.redraw();
        }
        if let Some(paused) = requests.paused {
            self.set_suspended(paused)?;
        }
        if requests.exit {
            self.request_exit("request");
        }
        Ok(())
    }

    fn reconcile_shared(&mut self) -> Result<()> {
        let requests = self.shared.take_requests();
        self.apply_requests(requests)
    }

    fn request_exit(&mut self, source: &'static str) {
        if self.frame.exit_requested {
            return;
        }
        self.frame.exit_requested = true;
        self.frame.finished = true;
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::ExitRequested).detail("source", source),
        );
        self.log_runtime_event(
            LogLevel::Info,
            "exit_requested",
            [json_kv("source", json!(source))],
        );
    }

    // Tear down once an exit request is pending and nothing is in flight.
    fn settle(&mut self) -> Result<()> {
        if self.frame.exit_requested && !self.shared.shutdown.is_started() {
            self.dispose_inner()?;
            shutdown_process(self.config.exit_behavior);
        }
        Ok(())
    }

    fn set_suspended(&mut self, suspended: bool) -> Result<()> {
        if self.suspended == suspended || self.state.is_terminal() {
            return Ok(());
        }
        self.suspended = suspended;
        if !suspended {
            // The gap while hidden is not a frame time.
            self.frame.last_frame_start = None;
        }
        self.publish_state();
        let (kind, stage, message) = if suspended {
            (HookKind::Pause, RuntimeAuditStage::SurfacePaused, "surface_paused")
        } else {
            (HookKind::Resume, RuntimeAuditStage::SurfaceResumed, "surface_resumed")
        };
        self.record_audit(RuntimeAuditEventBuilder::new(stage));
        self.log_runtime_event(LogLevel::Info, message, std::iter::empty());
        self.dispatch_hook(kind, HookArgs::None)
    }

    fn dispose_inner(&mut self) -> Result<()> {
        if !self.shared.shutdown.try_begin() {
            return Ok(());
        }
        self.state = SchedulerState::Stopping;
        self.frame.looping = false;
        self.frame.finished = true;
        self.publish_state();
        self.record_audit(
            RuntimeAuditEventBuilder::new(RuntimeAuditStage::DisposeStarted)
                .detail("frame_count", self.frame.frame_count),
        );

        let hooks = self.dispatch_hook(HookKind::Dispose, HookArgs::None);
        let released = self.renderer.release();
        self.state = SchedulerState::Disposed;
        self.emit_metrics_snapshot(Instant::now());
        self.shared.shutdown.complete();

        let uptime_ms = self
            .start_instant
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.record_audit(RuntimeAuditEventBuilder::new(RuntimeAuditStage::Disposed));
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_stopped",
            [
                json_kv("uptime_ms", json!(uptime_ms)),
                json_kv("frames", json!(self.frame.frame_count)),
            ],
        );
        hooks.and(released)
    }

    fn should_run_frame(&self) -> bool {
        matches!(self.state, SchedulerState::Looping | SchedulerState::Paused)
            && !self.suspended
            && !self.frame.finished
            && (self.frame.looping || self.frame.redraw_requested)
    }

    fn is_idle(&self) -> bool {
        match self.state {
            SchedulerState::Paused => true,
            SchedulerState::Looping => self.suspended,
            _ => false,
        }
    }

    fn publish_state(&self) {
        let pacing = self.frame.looping
            && !self.suspended
            && matches!(
                self.state,
                SchedulerState::NotStarted | SchedulerState::Setup | SchedulerState::Looping
            );
        self.shared.publish_looping(pacing);
    }

    fn info(&self) -> FrameInfo {
        FrameInfo {
            frame_count: self.frame.frame_count,
            frame_rate: self.estimator.rate(),
            target_frame_rate: self.target_frame_rate,
            state: self.state,
            window: self.window,
            elapsed: self
                .start_instant
                .map(|start| start.elapsed())
                .unwrap_or_default(),
        }
    }

    fn escalate<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(error) if error.is_fatal() => self.abort(error),
            other => other,
        }
    }

    fn abort(&self, error: EngineError) -> ! {
        fatal(
            &error,
            self.config.usage_error_policy,
            self.config.logger.as_ref(),
        )
    }

    fn record_audit(&self, builder: RuntimeAuditEventBuilder) {
        self.config.audit.record(builder.finish());
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            let event = event_with_fields(level, RUNTIME_TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn with_metrics(&self, record: impl FnOnce(&mut FrameMetrics)) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                record(&mut guard);
            }
        }
    }

    fn maybe_emit_metrics(&mut self) {
        if self.config.metrics.is_none() || self.config.metrics_interval.is_zero() {
            return;
        }

        let now = Instant::now();
        match self.last_metrics_emit {
            Some(last) if now.duration_since(last) < self.config.metrics_interval => {
                return;
            }
            _ => {
                self.last_metrics_emit = Some(now);
            }
        }
        self.emit_metrics_snapshot(now);
    }

    fn emit_metrics_snapshot(&self, now: Instant) {
        let uptime = self
            .start_instant
            .map(|start| now.duration_since(start))
            .unwrap_or_default();

        if let (Some(logger), Some(metrics)) =
            (self.config.logger.as_ref(), self.config.metrics.as_ref())
        {
            if let Ok(guard) = metrics.lock() {
                let target = self.config.metrics_target.as_str();
                let snapshot_event = guard
                    .snapshot(uptime, self.estimator.rate())
                    .to_log_event(target);
                let _ = logger.log_event(snapshot_event);
            }
        }
    }
}

fn valid_frame_rate(hz: f64) -> bool {
    hz.is_finite() && hz > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Platform, PlatformProfile, UsageErrorPolicy};
    use crate::event::{KeyAction, KeyCode, KeyEvent, MouseAction, MouseEvent};
    use crate::hooks::HookContext;
    use crate::logging::{Logger, MemorySink};
    use crate::render::NullRenderer;
    use crate::runtime::audit::BufferedAudit;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Mutex;
    use std::thread;

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_profile(PlatformProfile::new(Platform::Linux))
            .with_usage_error_policy(UsageErrorPolicy::Panic)
    }

    fn runtime<M>(sketch: Sketch<M>) -> SketchRuntime<M> {
        SketchRuntime::new(sketch, NullRenderer, config())
    }

    #[derive(Clone, Default)]
    struct RecordingRenderer {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingRenderer {
        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn push(&self, entry: String) -> Result<()> {
            self.log.lock().unwrap().push(entry);
            Ok(())
        }
    }

    impl Renderer for RecordingRenderer {
        fn begin_frame(&mut self, frame: u64) -> Result<()> {
            self.push(format!("begin:{frame}"))
        }

        fn end_frame(&mut self) -> Result<()> {
            self.push("end".to_string())
        }

        fn resize(&mut self, size: WindowSize) -> Result<()> {
            self.push(format!("resize:{}x{}", size.width, size.height))
        }

        fn release(&mut self) -> Result<()> {
            self.push("release".to_string())
        }
    }

    struct HookCounter {
        kinds: Vec<HookKind>,
        calls: Arc<Mutex<Vec<HookKind>>>,
        fail_on: Option<HookKind>,
    }

    impl HookCounter {
        fn new(kinds: &[HookKind]) -> (Self, Arc<Mutex<Vec<HookKind>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let counter = Self {
                kinds: kinds.to_vec(),
                calls: Arc::clone(&calls),
                fail_on: None,
            };
            (counter, calls)
        }

        fn hit(&mut self, kind: HookKind) -> Result<()> {
            self.calls.lock().unwrap().push(kind);
            if self.fail_on == Some(kind) {
                return Err(EngineError::extension("counter", "boom"));
            }
            Ok(())
        }
    }

    impl Extension for HookCounter {
        fn name(&self) -> &str {
            "counter"
        }

        fn capabilities(&self) -> &[HookKind] {
            &self.kinds
        }

        fn pre(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
            self.hit(HookKind::Pre)
        }

        fn post(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
            self.hit(HookKind::Post)
        }

        fn pause(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
            self.hit(HookKind::Pause)
        }

        fn resume(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
            self.hit(HookKind::Resume)
        }

        fn dispose(&mut self, _ctx: &mut HookContext<'_>) -> Result<()> {
            self.hit(HookKind::Dispose)
        }

        fn mouse_event(&mut self, _ctx: &mut HookContext<'_>, _event: &MouseEvent) -> Result<()> {
            self.hit(HookKind::MouseEvent)
        }
    }

    fn count(calls: &Arc<Mutex<Vec<HookKind>>>, kind: HookKind) -> usize {
        calls.lock().unwrap().iter().filter(|call| **call == kind).count()
    }

    #[derive(Default)]
    struct Frames {
        setup_frame: Option<u64>,
        draws: Vec<u64>,
        keys: Vec<char>,
    }

    fn counting_sketch(stop_in_setup: bool) -> Sketch<Frames> {
        Sketch::new(Frames::default())
            .setup(move |frames, ctx| {
                frames.setup_frame = Some(ctx.frame_count());
                if stop_in_setup {
                    ctx.no_loop();
                }
                Ok(())
            })
            .draw(|frames, ctx| {
                frames.draws.push(ctx.frame_count());
                Ok(())
            })
    }

    #[test]
    fn frame_count_stays_zero_in_setup_and_counts_each_draw() {
        let mut runtime = runtime(counting_sketch(false));
        assert!(!runtime.step().unwrap());
        assert_eq!(runtime.state(), SchedulerState::Looping);
        for _ in 0..3 {
            assert!(runtime.step().unwrap());
        }
        assert_eq!(runtime.model().setup_frame, Some(0));
        assert_eq!(runtime.model().draws, vec![0, 1, 2]);
        assert_eq!(runtime.frame_count(), 3);
    }

    #[test]
    fn no_loop_in_setup_still_draws_once() {
        let mut runtime = runtime(counting_sketch(true));
        for _ in 0..4 {
            runtime.step().unwrap();
        }
        assert_eq!(runtime.state(), SchedulerState::Paused);
        assert_eq!(runtime.model().draws, vec![0]);
        assert!(!runtime.handle().is_looping());
    }

    #[test]
    fn redraw_while_paused_runs_exactly_one_frame() {
        let mut runtime = runtime(counting_sketch(true));
        runtime.step().unwrap();
        runtime.step().unwrap();

        runtime.redraw();
        assert!(runtime.step().unwrap());
        assert!(!runtime.step().unwrap());
        assert_eq!(runtime.model().draws, vec![0, 1]);
        assert_eq!(runtime.state(), SchedulerState::Paused);

        runtime.start_loop();
        assert_eq!(runtime.state(), SchedulerState::Looping);
        assert!(runtime.step().unwrap());
    }

    #[test]
    fn missing_draw_ends_the_loop() {
        let renderer = RecordingRenderer::default();
        let sketch = Sketch::new(()).setup(|_, _| Ok(()));
        let mut runtime = SketchRuntime::new(sketch, renderer.clone(), config());
        runtime.step().unwrap();
        assert!(!runtime.step().unwrap());
        assert!(runtime.frame_state().finished);
        assert_eq!(runtime.state(), SchedulerState::Paused);

        runtime.start_loop();
        assert!(!runtime.is_looping());
        assert!(!runtime.step().unwrap());
        assert_eq!(runtime.frame_count(), 0);
        assert_eq!(renderer.entries(), vec!["begin:0", "end"]);
    }

    #[test]
    fn renderer_bracket_stays_paired_when_draw_fails() {
        let renderer = RecordingRenderer::default();
        let sketch = Sketch::new(0u32).draw(|calls, _| {
            *calls += 1;
            if *calls == 2 {
                return Err(EngineError::extension("sketch", "draw failed"));
            }
            Ok(())
        });
        let mut runtime = SketchRuntime::new(sketch, renderer.clone(), config());
        runtime.step().unwrap();
        assert!(runtime.step().unwrap());
        assert!(runtime.step().is_err());
        assert!(runtime.step().unwrap());

        assert_eq!(
            renderer.entries(),
            vec!["begin:0", "end", "begin:1", "end", "begin:1", "end"]
        );
        assert_eq!(runtime.frame_count(), 2);
    }

    #[test]
    fn resize_is_applied_once_at_frame_start_with_latest_size() {
        let renderer = RecordingRenderer::default();
        let sketch = Sketch::new(Vec::<WindowSize>::new())
            .window_resized(|sizes, _, size| {
                sizes.push(*size);
                Ok(())
            })
            .draw(|sizes, ctx| {
                sizes.push(ctx.window_size());
                Ok(())
            });
        let mut runtime = SketchRuntime::new(sketch, renderer.clone(), config());
        runtime.step().unwrap();

        let handle = runtime.handle();
        handle.post_window_resized(320, 200);
        handle.post_window_resized(640, 480);
        assert_eq!(runtime.window_size(), WindowSize::new(100, 100));
        runtime.step().unwrap();

        let latest = WindowSize::new(640, 480);
        assert_eq!(runtime.model(), &vec![latest, latest]);
        assert_eq!(renderer.entries()[0], "resize:640x480");
        runtime.step().unwrap();
        assert_eq!(runtime.model().len(), 3);
    }

    #[test]
    fn escape_press_disposes_after_the_frame() {
        let (counter, calls) = HookCounter::new(&[HookKind::Dispose]);
        let mut runtime = runtime(counting_sketch(false));
        runtime.install(counter);
        runtime.step().unwrap();

        runtime
            .post_event(KeyEvent::coded(KeyAction::Press, KeyCode::ESCAPE))
            .unwrap();
        assert_eq!(runtime.state(), SchedulerState::Looping);
        assert!(runtime.step().unwrap());

        assert_eq!(runtime.state(), SchedulerState::Disposed);
        assert_eq!(runtime.model().draws, vec![0]);
        assert_eq!(count(&calls, HookKind::Dispose), 1);
        assert!(runtime.handle().is_disposed());
        assert!(!runtime.step().unwrap());
    }

    #[test]
    fn dispose_runs_teardown_once() {
        let audit = Arc::new(BufferedAudit::new());
        let renderer = RecordingRenderer::default();
        let (counter, calls) = HookCounter::new(&[HookKind::Dispose]);
        let mut runtime = SketchRuntime::new(
            counting_sketch(false),
            renderer.clone(),
            config().with_audit(audit.clone()),
        );
        runtime.install(counter);
        runtime.step().unwrap();

        runtime.dispose();
        runtime.dispose();
        runtime.exit();

        assert_eq!(count(&calls, HookKind::Dispose), 1);
        assert_eq!(audit.count(RuntimeAuditStage::DisposeStarted), 1);
        assert_eq!(audit.count(RuntimeAuditStage::Disposed), 1);
        let releases = renderer
            .entries()
            .iter()
            .filter(|entry| *entry == "release")
            .count();
        assert_eq!(releases, 1);
    }

    #[test]
    fn exit_while_paused_disposes_immediately() {
        let mut runtime = runtime(counting_sketch(true));
        runtime.step().unwrap();
        runtime.step().unwrap();
        runtime.exit();
        assert_eq!(runtime.state(), SchedulerState::Disposed);
    }

    #[test]
    #[should_panic(expected = "fatal usage error")]
    fn frame_after_unwound_draw_is_fatal() {
        let sketch = Sketch::new(()).draw(|_, _| panic!("draw exploded"));
        let mut runtime = runtime(sketch);
        runtime.step().unwrap();
        let unwound = catch_unwind(AssertUnwindSafe(|| runtime.step()));
        assert!(unwound.is_err());
        let _ = runtime.step();
    }

    #[test]
    #[should_panic(expected = "fatal usage error")]
    fn duplicate_hook_registration_is_fatal() {
        let (counter, _) = HookCounter::new(&[HookKind::Pre]);
        let mut runtime = runtime(counting_sketch(false));
        let id = runtime.install(counter);
        runtime.register_hook(HookKind::Pre, id);
    }

    #[test]
    #[should_panic(expected = "fatal usage error")]
    fn duplicate_registration_from_setup_is_fatal_even_if_ignored() {
        let sketch = Sketch::new(())
            .setup(|_, ctx| {
                let (counter, _) = HookCounter::new(&[HookKind::Pre]);
                let id = ctx.attach(counter);
                let _ = ctx.register(HookKind::Pre, id);
                let _ = ctx.register(HookKind::Pre, id);
                Ok(())
            })
            .draw(|_, _| Ok(()));
        let mut runtime = runtime(sketch);
        let _ = runtime.step();
    }

    #[test]
    fn failed_install_from_setup_leaves_nothing_attached() {
        let sketch = Sketch::new(())
            .setup(|_, ctx| {
                let kinds = [HookKind::Pre, HookKind::Post, HookKind::Pre];
                let (counter, _) = HookCounter::new(&kinds);
                let _ = ctx.install(counter);
                Ok(())
            })
            .draw(|_, _| Ok(()));
        let mut runtime = runtime(sketch);
        let outcome = catch_unwind(AssertUnwindSafe(|| runtime.step()));
        assert!(outcome.is_err());
        assert_eq!(runtime.registry().extension_count(), 0);
        assert_eq!(runtime.registry().len(HookKind::Pre), 0);
        assert_eq!(runtime.registry().len(HookKind::Post), 0);
    }

    #[test]
    fn run_frame_after_exit_does_not_draw() {
        let mut runtime = runtime(counting_sketch(false));
        runtime.step().unwrap();
        runtime.step().unwrap();
        runtime.exit();
        assert_eq!(runtime.state(), SchedulerState::Looping);

        assert!(!runtime.run_frame().unwrap());
        assert_eq!(runtime.model().draws, vec![0]);
        assert_eq!(runtime.state(), SchedulerState::Disposed);

        // Disposed: still not an error.
        assert!(!runtime.run_frame().unwrap());
        assert_eq!(runtime.model().draws, vec![0]);
    }

    #[test]
    fn exit_from_another_thread_stops_run() {
        let sketch = Sketch::new(0u32).draw(|frames, _| {
            *frames += 1;
            Ok(())
        });
        let mut runtime = SketchRuntime::new(sketch, NullRenderer, config().with_frame_rate(200.0));
        let handle = runtime.handle();
        let remote = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.exit();
            handle.wait_disposed(Duration::from_secs(5))
        });

        runtime.run().unwrap();
        assert!(remote.join().unwrap());
        assert_eq!(runtime.state(), SchedulerState::Disposed);
        assert!(*runtime.model() > 0);
    }

    #[test]
    fn posted_key_wakes_a_parked_scheduler() {
        let sketch = counting_sketch(true).key(|frames, ctx, key| {
            if key.action == KeyAction::Press {
                if let Some(ch) = key.key {
                    frames.keys.push(ch);
                }
                if key.key == Some('q') {
                    ctx.exit();
                }
            }
            Ok(())
        });
        let mut runtime = runtime(sketch);
        let handle = runtime.handle();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.post_event(KeyEvent::press('a'));
            handle.post_event(KeyEvent::press('q'));
        });

        runtime.run().unwrap();
        producer.join().unwrap();
        assert_eq!(runtime.model().keys, vec!['a', 'q']);
        assert_eq!(runtime.model().draws, vec![0]);
        assert_eq!(runtime.state(), SchedulerState::Disposed);
    }

    #[test]
    fn paused_runtime_handles_input_before_returning() {
        let sketch = counting_sketch(true).key(|frames, _, key| {
            if let Some(ch) = key.key {
                frames.keys.push(ch);
            }
            Ok(())
        });
        let mut runtime = runtime(sketch);
        runtime.step().unwrap();
        runtime.step().unwrap();

        runtime.post_event(KeyEvent::press('x')).unwrap();
        assert_eq!(runtime.model().keys, vec!['x']);
        assert!(runtime.input().keys().is_down(KeyCode::from_char('x')));
        assert_eq!(runtime.frame_count(), 1);
    }

    #[test]
    fn mouse_hooks_receive_queued_events() {
        let (counter, calls) = HookCounter::new(&[HookKind::MouseEvent]);
        let mut runtime = runtime(counting_sketch(false));
        runtime.install(counter);
        runtime.step().unwrap();
        runtime
            .post_event(MouseEvent::new(MouseAction::Move, 10.0, 12.0))
            .unwrap();
        assert_eq!(count(&calls, HookKind::MouseEvent), 0);
        runtime.step().unwrap();
        assert_eq!(count(&calls, HookKind::MouseEvent), 1);
        assert_eq!(runtime.input().mouse().position().x, 10.0);
    }

    #[test]
    fn recoverable_hook_errors_are_counted_and_frames_continue() {
        let mut config = config();
        config.enable_metrics();
        let metrics = config.metrics_handle().unwrap();
        let (mut counter, _) = HookCounter::new(&[HookKind::Pre, HookKind::Post]);
        counter.fail_on = Some(HookKind::Post);
        let mut runtime = SketchRuntime::new(counting_sketch(false), NullRenderer, config);
        runtime.install(counter);

        runtime.step().unwrap();
        assert!(runtime.step().unwrap());
        assert!(runtime.step().unwrap());

        let metrics = metrics.lock().unwrap();
        assert_eq!(metrics.hook_failures(), 2);
        assert_eq!(metrics.frames(), 2);
    }

    #[test]
    fn surface_pause_stops_frames_and_dispatches_hooks() {
        let (counter, calls) = HookCounter::new(&[HookKind::Pause, HookKind::Resume]);
        let mut runtime = runtime(counting_sketch(false));
        runtime.install(counter);
        runtime.step().unwrap();

        runtime.pause().unwrap();
        runtime.pause().unwrap();
        assert!(!runtime.step().unwrap());
        assert_eq!(runtime.state(), SchedulerState::Looping);

        runtime.resume().unwrap();
        assert!(runtime.step().unwrap());
        assert_eq!(count(&calls, HookKind::Pause), 1);
        assert_eq!(count(&calls, HookKind::Resume), 1);
    }

    #[test]
    fn non_positive_frame_rate_is_rejected_and_logged() {
        let sink = MemorySink::new();
        let mut runtime = SketchRuntime::new(
            counting_sketch(false),
            NullRenderer,
            config().with_logger(Logger::new(sink.clone())),
        );
        assert!(matches!(runtime.set_frame_rate(0.0), Err(EngineError::Config(_))));
        assert!(runtime.set_frame_rate(-5.0).is_err());
        assert_eq!(runtime.target_frame_rate(), 60.0);
        runtime.set_frame_rate(30.0).unwrap();
        assert_eq!(runtime.handle().frame_rate(), 30.0);
        let rejected = sink
            .messages()
            .iter()
            .filter(|message| *message == "frame_rate_rejected")
            .count();
        assert_eq!(rejected, 2);
    }

    #[test]
    fn remote_control_requests_apply_at_next_tick() {
        let mut runtime = runtime(counting_sketch(false));
        let handle = runtime.handle();
        runtime.step().unwrap();

        handle.no_loop();
        assert!(runtime.is_looping());
        runtime.step().unwrap();
        assert_eq!(runtime.state(), SchedulerState::Paused);

        handle.redraw();
        assert!(runtime.step().unwrap());
        assert!(!runtime.step().unwrap());
    }

    #[test]
    fn audit_trail_follows_lifecycle() {
        let audit = Arc::new(BufferedAudit::new());
        let mut runtime = SketchRuntime::new(
            counting_sketch(false),
            NullRenderer,
            config().with_audit(audit.clone()),
        );
        runtime.step().unwrap();
        runtime.step().unwrap();
        runtime.exit();
        runtime.step().unwrap();

        assert_eq!(
            audit.stages(),
            vec![
                RuntimeAuditStage::RuntimeConstructed,
                RuntimeAuditStage::SetupStarted,
                RuntimeAuditStage::SetupCompleted,
                RuntimeAuditStage::FrameCompleted,
                RuntimeAuditStage::ExitRequested,
                RuntimeAuditStage::DisposeStarted,
                RuntimeAuditStage::Disposed,
            ]
        );
    }
}
