use std::collections::VecDeque;
use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::types::{InputEvent, WindowPosition, WindowSize};

/// Window notifications taken at the frame safe point. Only the latest
/// resize and move are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowEvents {
    pub resized: Option<WindowSize>,
    pub moved: Option<WindowPosition>,
}

impl WindowEvents {
    pub fn is_empty(&self) -> bool {
        self.resized.is_none() && self.moved.is_none()
    }
}

#[derive(Default)]
struct QueueInner {
    events: VecDeque<InputEvent>,
    window: WindowEvents,
    woken: bool,
}

/// Multi-producer event ingress with an exclusive, all-or-nothing drain.
///
/// Producers only hold the inner lock long enough to push. The same
/// condition variable backs the scheduler's interruptible sleep.
#[derive(Default)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    wake: Condvar,
    drain_lock: Mutex<()>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an event. With `wake` set, a scheduler sleeping in
    /// [`wait`](Self::wait) returns immediately; a [`park`](Self::park)ed
    /// scheduler always does.
    pub fn push(&self, event: InputEvent, wake: bool) {
        let mut inner = self.lock();
        inner.events.push_back(event);
        if wake {
            inner.woken = true;
        }
        self.wake.notify_all();
    }

    pub fn post_window_resized(&self, size: WindowSize) {
        self.lock().window.resized = Some(size);
    }

    pub fn post_window_moved(&self, position: WindowPosition) {
        self.lock().window.moved = Some(position);
    }

    pub fn take_window_events(&self) -> WindowEvents {
        mem::take(&mut self.lock().window)
    }

    /// Remove every queued event and hand them to `dispatch` in arrival order.
    ///
    /// The batch is detached in one step, so events posted during dispatch
    /// wait for the next drain. Only one drain runs at a time. If `dispatch`
    /// fails, the rest of the batch is discarded and the error returned.
    pub fn drain<F, E>(&self, mut dispatch: F) -> Result<usize, E>
    where
        F: FnMut(InputEvent) -> Result<(), E>,
    {
        let _exclusive = self
            .drain_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let batch = mem::take(&mut self.lock().events);
        let count = batch.len();
        for event in batch {
            dispatch(event)?;
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Wake a parked scheduler without enqueueing anything.
    pub fn wake(&self) {
        let mut inner = self.lock();
        inner.woken = true;
        self.wake.notify_all();
    }

    /// Park until woken or until `timeout` elapses (`None` waits for a wake).
    /// Returns `true` when a wake was consumed.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let inner = self.lock();
        let mut inner = match timeout {
            Some(timeout) => {
                self.wake
                    .wait_timeout_while(inner, timeout, |inner| !inner.woken)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .wake
                .wait_while(inner, |inner| !inner.woken)
                .unwrap_or_else(PoisonError::into_inner),
        };
        mem::replace(&mut inner.woken, false)
    }

    /// Park with no deadline until woken or until an event is pending.
    pub fn park(&self) {
        let inner = self.lock();
        let mut inner = self
            .wake
            .wait_while(inner, |inner| !inner.woken && inner.events.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        inner.woken = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{KeyAction, KeyCode, KeyEvent};
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn tagged(producer: u32, seq: u32) -> InputEvent {
        InputEvent::Key(KeyEvent::coded(KeyAction::Press, KeyCode(producer * 100_000 + seq)))
    }

    #[test]
    fn drain_preserves_per_producer_order() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 500;

        let queue = Arc::new(EventQueue::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        queue.push(tagged(producer, seq), false);
                    }
                })
            })
            .collect();

        let mut seen: Vec<Vec<u32>> = vec![Vec::new(); PRODUCERS as usize];
        let mut record = |event: InputEvent| -> Result<(), ()> {
            if let InputEvent::Key(key) = event {
                let producer = key.code.0 / 100_000;
                seen[producer as usize].push(key.code.0 % 100_000);
            }
            Ok(())
        };

        // Drain concurrently with the producers, then once more at the end.
        for _ in 0..50 {
            queue.drain(&mut record).unwrap();
            thread::yield_now();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        queue.drain(&mut record).unwrap();

        for sequence in &seen {
            assert_eq!(sequence.len(), PER_PRODUCER as usize);
            assert!(sequence.windows(2).all(|pair| pair[0] + 1 == pair[1]));
        }
    }

    #[test]
    fn events_pushed_during_dispatch_wait_for_next_drain() {
        let queue = EventQueue::new();
        queue.push(tagged(0, 1), false);
        let drained = queue
            .drain(|_| -> Result<(), ()> {
                queue.push(tagged(0, 2), false);
                Ok(())
            })
            .unwrap();
        assert_eq!(drained, 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn failed_dispatch_consumes_batch() {
        let queue = EventQueue::new();
        queue.push(tagged(0, 1), false);
        queue.push(tagged(0, 2), false);
        let result = queue.drain(|_| Err("boom"));
        assert_eq!(result, Err("boom"));
        assert!(queue.is_empty());
    }

    #[test]
    fn window_notifications_keep_latest() {
        let queue = EventQueue::new();
        queue.post_window_resized(WindowSize::new(100, 100));
        queue.post_window_resized(WindowSize::new(640, 480));
        queue.post_window_moved(WindowPosition { x: 4, y: 8 });
        let events = queue.take_window_events();
        assert_eq!(events.resized, Some(WindowSize::new(640, 480)));
        assert_eq!(events.moved, Some(WindowPosition { x: 4, y: 8 }));
        assert!(queue.take_window_events().is_empty());
    }

    #[test]
    fn wait_returns_on_wake_from_other_thread() {
        let queue = Arc::new(EventQueue::new());
        let waker = Arc::clone(&queue);
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.push(tagged(0, 0), true);
        });
        assert!(queue.wait(Some(Duration::from_secs(5))));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn park_returns_for_pending_events_without_wake() {
        let queue = Arc::new(EventQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push(tagged(0, 0), false);
        });
        queue.park();
        assert_eq!(queue.len(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_wake() {
        let queue = EventQueue::new();
        queue.push(tagged(0, 0), false);
        assert!(!queue.wait(Some(Duration::from_millis(5))));
    }
}
