use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::ExitBehavior;
use crate::event::{EventQueue, InputEvent, WindowPosition, WindowSize};

use super::context::ControlRequests;
use super::shutdown::{ShutdownCoordinator, shutdown_process};

/// State reachable from producer threads. Everything else stays with the
/// scheduler.
pub(crate) struct Shared {
    pub(crate) queue: EventQueue,
    pub(crate) shutdown: ShutdownCoordinator,
    looping: AtomicBool,
    target_rate_bits: AtomicU64,
    requests: Mutex<ControlRequests>,
    exit_behavior: ExitBehavior,
}

impl Shared {
    pub(crate) fn new(target_rate: f64, exit_behavior: ExitBehavior) -> Self {
        Self {
            queue: EventQueue::new(),
            shutdown: ShutdownCoordinator::new(),
            looping: AtomicBool::new(true),
            target_rate_bits: AtomicU64::new(target_rate.to_bits()),
            requests: Mutex::new(ControlRequests::default()),
            exit_behavior,
        }
    }

    pub(crate) fn publish_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    pub(crate) fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn publish_frame_rate(&self, hz: f64) {
        self.target_rate_bits.store(hz.to_bits(), Ordering::Release);
    }

    pub(crate) fn target_frame_rate(&self) -> f64 {
        f64::from_bits(self.target_rate_bits.load(Ordering::Acquire))
    }

    fn request(&self, update: impl FnOnce(&mut ControlRequests)) {
        {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            update(&mut requests);
        }
        self.queue.wake();
    }

    pub(crate) fn take_requests(&self) -> ControlRequests {
        std::mem::take(&mut *self.requests.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Cloneable, thread-safe handle for the surface layer and other producers.
///
/// Control calls are requests: the scheduler applies them at its next safe
/// point, and a parked scheduler is woken to do so.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
}

impl RuntimeHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Never blocks on the scheduler. While the loop is paused the scheduler
    /// is woken so the event is handled right away.
    pub fn post_event(&self, event: impl Into<InputEvent>) {
        let paused = !self.shared.is_looping();
        self.shared.queue.push(event.into(), paused);
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

    pub fn is_looping(&self) -> bool {
        self.shared.is_looping()
    }

    /// Target frame rate the scheduler paces towards.
    pub fn frame_rate(&self) -> f64 {
        self.shared.target_frame_rate()
    }

    pub fn set_frame_rate(&self, hz: f64) {
        self.shared.request(|requests| requests.frame_rate = Some(hz));
    }

    pub fn redraw(&self) {
        self.shared.request(|requests| requests.redraw = true);
    }

    pub fn start_loop(&self) {
        self.shared.request(|requests| requests.looping = Some(true));
    }

    pub fn no_loop(&self) {
        self.shared.request(|requests| requests.looping = Some(false));
    }

    pub fn pause(&self) {
        self.shared.request(|requests| requests.paused = Some(true));
    }

    pub fn resume(&self) {
        self.shared.request(|requests| requests.paused = Some(false));
    }

    /// Ask the runtime to shut down. Once the runtime is already disposed
    /// this goes straight to process-level shutdown.
    pub fn exit(&self) {
        if self.shared.shutdown.is_disposed() {
            shutdown_process(self.shared.exit_behavior);
            return;
        }
        self.shared.request(|requests| requests.exit = true);
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.shutdown.is_disposed()
    }

    pub fn wait_disposed(&self, timeout: Duration) -> bool {
        self.shared.shutdown.wait_disposed(timeout)
    }

    pub fn pending_events(&self) -> usize {
        self.shared.queue.len()
    }
}
