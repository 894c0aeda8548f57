//! Host timers backing the realm's timer globals.
//!
//! The realm never keeps time itself: `setTimeout`, `setInterval` and
//! `setImmediate` register a callback inside the realm and ask the host to
//! schedule a numeric id. When the host timer fires the id is handed back to
//! the realm, which runs the callback.
//!
//! | Implementation | Used by | Fired ids delivered through |
//! |----------------|---------|-----------------------------|
//! | [`TokioTimers`] | in-process, frame | `mpsc::UnboundedReceiver<u32>` |
//! | [`TimerQueue`] | worker | polled with [`TimerQueue::take_due`] |

// ============================================================================
// Imports
// ============================================================================

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Shortest period of a repeating timer.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// TimerHost
// ============================================================================

/// Host side of the realm timer globals.
pub trait TimerHost: Send + Sync {
    /// Schedules `id` to fire after `delay`, then every `delay` if `repeat`.
    fn schedule(&self, id: u32, delay: Duration, repeat: bool);

    /// Cancels `id`. Unknown ids are ignored.
    fn cancel(&self, id: u32);

    /// Cancels every scheduled id.
    fn clear_all(&self);
}

/// Converts a script delay in milliseconds into a duration.
///
/// Negative, non-finite and NaN delays run as soon as possible.
pub(crate) fn delay_from_millis(delay: f64) -> Duration {
    if delay.is_finite() && delay > 0.0 {
        Duration::from_micros((delay.min(f64::from(i32::MAX)) * 1000.0) as u64)
    } else {
        Duration::ZERO
    }
}

// ============================================================================
// TokioTimers
// ============================================================================

/// Timers driven by a tokio runtime.
///
/// Each scheduled id is a spawned task; fired ids are sent on the channel
/// returned by [`TokioTimers::new`].
pub struct TokioTimers {
    handle: Handle,
    fired: mpsc::UnboundedSender<u32>,
    tasks: Arc<Mutex<FxHashMap<u32, JoinHandle<()>>>>,
}

impl TokioTimers {
    /// Creates timers on the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> (Arc<Self>, mpsc::UnboundedReceiver<u32>) {
        let (fired, fired_rx) = mpsc::unbounded_channel();
        let timers = Arc::new(Self {
            handle,
            fired,
            tasks: Arc::new(Mutex::new(FxHashMap::default())),
        });
        (timers, fired_rx)
    }

    /// Returns the number of scheduled ids.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl TimerHost for TokioTimers {
    fn schedule(&self, id: u32, delay: Duration, repeat: bool) {
        let fired = self.fired.clone();
        let tasks = Arc::clone(&self.tasks);

        // Held across spawn so a task that finishes instantly removes its
        // own entry only after it was inserted.
        let mut guard = self.tasks.lock();

        let task = self.handle.spawn(async move {
            if repeat {
                let period = delay.max(MIN_INTERVAL);
                let mut ticker = time::interval_at(time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if fired.send(id).is_err() {
                        break;
                    }
                }
            } else {
                time::sleep(delay).await;
                let _ = fired.send(id);
            }
            tasks.lock().remove(&id);
        });

        if let Some(previous) = guard.insert(id, task) {
            previous.abort();
        }
        trace!(id, ?delay, repeat, "Timer scheduled");
    }

    fn cancel(&self, id: u32) {
        if let Some(task) = self.tasks.lock().remove(&id) {
            task.abort();
            trace!(id, "Timer cancelled");
        }
    }

    fn clear_all(&self) {
        let drained: Vec<_> = self.tasks.lock().drain().collect();
        for (_, task) in drained {
            task.abort();
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        self.clear_all();
    }
}

// ============================================================================
// TimerQueue
// ============================================================================

/// Deadline-ordered timer queue for a thread without an async runtime.
///
/// The owning thread sleeps until [`TimerQueue::next_deadline`] and collects
/// due ids with [`TimerQueue::take_due`].
#[derive(Default)]
pub struct TimerQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<(Instant, u64, u32)>>,
    /// Live ids: generation and repeat period.
    active: FxHashMap<u32, (u64, Option<Duration>)>,
    generation: u64,
}

impl TimerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let mut state = self.state.lock();
        state.discard_stale();
        state.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Pops every id due at `now`, rescheduling repeating ones.
    #[must_use]
    pub fn take_due(&self, now: Instant) -> Vec<u32> {
        let mut state = self.state.lock();
        let mut due = Vec::new();

        loop {
            state.discard_stale();
            let Some(Reverse((deadline, generation, id))) = state.heap.peek().copied() else {
                break;
            };
            if deadline > now {
                break;
            }
            state.heap.pop();
            due.push(id);

            match state.active.get(&id).copied() {
                Some((_, Some(period))) => {
                    state.heap.push(Reverse((deadline + period, generation, id)));
                }
                _ => {
                    state.active.remove(&id);
                }
            }
        }

        due
    }

    /// Returns the number of live ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Returns `true` if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueState {
    /// Drops heap entries whose id was cancelled or rescheduled.
    fn discard_stale(&mut self) {
        while let Some(Reverse((_, generation, id))) = self.heap.peek().copied() {
            match self.active.get(&id) {
                Some((live, _)) if *live == generation => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

impl TimerHost for TimerQueue {
    fn schedule(&self, id: u32, delay: Duration, repeat: bool) {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;
        let period = repeat.then(|| delay.max(MIN_INTERVAL));
        let first = if repeat { delay.max(MIN_INTERVAL) } else { delay };

        state.active.insert(id, (generation, period));
        state
            .heap
            .push(Reverse((Instant::now() + first, generation, id)));
    }

    fn cancel(&self, id: u32) {
        self.state.lock().active.remove(&id);
    }

    fn clear_all(&self) {
        let mut state = self.state.lock();
        state.active.clear();
        state.heap.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_from_millis() {
        assert_eq!(delay_from_millis(5.0), Duration::from_millis(5));
        assert_eq!(delay_from_millis(-1.0), Duration::ZERO);
        assert_eq!(delay_from_millis(f64::NAN), Duration::ZERO);
        assert_eq!(delay_from_millis(f64::INFINITY), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_tokio_timer_fires_once() {
        let (timers, mut fired) = TokioTimers::new(Handle::current());
        timers.schedule(7, Duration::from_millis(5), false);

        let id = tokio::time::timeout(Duration::from_secs(2), fired.recv())
            .await
            .expect("fires")
            .expect("channel open");
        assert_eq!(id, 7);

        tokio::task::yield_now().await;
        assert!(
            tokio::time::timeout(Duration::from_millis(50), fired.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_tokio_interval_repeats_until_cancelled() {
        let (timers, mut fired) = TokioTimers::new(Handle::current());
        timers.schedule(1, Duration::from_millis(2), true);

        for _ in 0..3 {
            let id = tokio::time::timeout(Duration::from_secs(2), fired.recv())
                .await
                .expect("ticks")
                .expect("channel open");
            assert_eq!(id, 1);
        }

        timers.cancel(1);
        assert_eq!(timers.active_count(), 0);
    }

    #[tokio::test]
    async fn test_tokio_cancel_before_fire() {
        let (timers, mut fired) = TokioTimers::new(Handle::current());
        timers.schedule(3, Duration::from_millis(20), false);
        timers.cancel(3);

        assert!(
            tokio::time::timeout(Duration::from_millis(80), fired.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_tokio_clear_all() {
        let (timers, _fired) = TokioTimers::new(Handle::current());
        timers.schedule(1, Duration::from_secs(10), false);
        timers.schedule(2, Duration::from_secs(10), true);
        assert_eq!(timers.active_count(), 2);

        timers.clear_all();
        assert_eq!(timers.active_count(), 0);
    }

    #[test]
    fn test_queue_orders_by_deadline() {
        let queue = TimerQueue::new();
        queue.schedule(1, Duration::from_millis(30), false);
        queue.schedule(2, Duration::from_millis(10), false);

        let later = Instant::now() + Duration::from_millis(50);
        assert_eq!(queue.take_due(later), vec![2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_skips_cancelled() {
        let queue = TimerQueue::new();
        queue.schedule(1, Duration::ZERO, false);
        queue.schedule(2, Duration::ZERO, false);
        queue.cancel(1);

        let due = queue.take_due(Instant::now() + Duration::from_millis(1));
        assert_eq!(due, vec![2]);
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn test_queue_reschedules_repeating() {
        let queue = TimerQueue::new();
        queue.schedule(4, Duration::from_millis(10), true);

        let first = queue.next_deadline().expect("scheduled");
        assert_eq!(queue.take_due(first), vec![4]);

        let second = queue.next_deadline().expect("rescheduled");
        assert_eq!(second - first, Duration::from_millis(10));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_queue_not_due_yet() {
        let queue = TimerQueue::new();
        queue.schedule(1, Duration::from_secs(60), false);
        assert!(queue.take_due(Instant::now()).is_empty());
        assert_eq!(queue.len(), 1);
    }
}
