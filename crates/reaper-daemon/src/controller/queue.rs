//! Deduplicating work queue
//!
//! Keys are handed to at most one worker at a time. A key added while it is
//! being processed is parked and becomes ready again once the worker calls
//! [`WorkQueue::done`]. Delayed additions keep only the earliest pending
//! deadline per key.

use parking_lot::Mutex;
use reaper_types::ResourceKey;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on a single delayed addition
const MAX_DELAY: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Per-key exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `failures` (zero-based)
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(1000))
    }
}

/// Pending delayed addition of a key
#[derive(Debug)]
struct Timer {
    deadline: Instant,
    task: AbortHandle,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<ResourceKey>,
    dirty: HashSet<ResourceKey>,
    processing: HashSet<ResourceKey>,
    waiting: HashMap<ResourceKey, Timer>,
    failures: HashMap<ResourceKey, u32>,
}

/// Work queue with per-key serialization, delayed adds and rate limiting
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: Backoff,
    shutdown: CancellationToken,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
            shutdown: CancellationToken::new(),
        })
    }

    /// Make `key` ready for processing
    pub fn add(&self, key: ResourceKey) {
        if self.is_shutting_down() {
            return;
        }

        let mut state = self.state.lock();
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            // Picked up again by `done`
            return;
        }
        state.ready.push_back(key);
        drop(state);

        self.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, key: ResourceKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let now = Instant::now();
        let deadline = now
            .checked_add(delay.min(MAX_DELAY))
            .unwrap_or(now + MAX_DELAY);

        // The timer task takes this lock before firing, so it cannot observe
        // the map before its own entry is in place.
        let mut state = self.state.lock();
        if self.is_shutting_down() {
            return;
        }
        if let Some(existing) = state.waiting.get(&key) {
            if existing.deadline <= deadline {
                return;
            }
        }

        let queue = Arc::clone(self);
        let timer_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = queue.shutdown.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => queue.fire(timer_key, deadline),
            }
        })
        .abort_handle();

        if let Some(superseded) = state.waiting.insert(key, Timer { deadline, task }) {
            superseded.task.abort();
        }
    }

    fn fire(&self, key: ResourceKey, deadline: Instant) {
        let due = {
            let mut state = self.state.lock();
            match state.waiting.get(&key) {
                Some(timer) if timer.deadline == deadline => {
                    state.waiting.remove(&key);
                    true
                }
                _ => false,
            }
        };
        if due {
            self.add(key);
        }
    }

    /// Number of delayed additions still waiting for their deadline
    pub fn pending_timers(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Add `key` after its backoff delay and count the failure
    pub fn add_rate_limited(self: &Arc<Self>, key: ResourceKey) -> Duration {
        let delay = {
            let mut state = self.state.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = self.backoff.delay(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
        delay
    }

    /// Reset the failure count of `key`
    pub fn forget(&self, key: &ResourceKey) {
        self.state.lock().failures.remove(key);
    }

    /// Number of failures recorded for `key` since the last `forget`
    pub fn num_requeues(&self, key: &ResourceKey) -> u32 {
        self.state.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next ready key; `None` once the queue is shut down
    pub async fn get(&self) -> Option<ResourceKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if self.shutdown.is_cancelled() {
                    return None;
                }
                if let Some(key) = state.ready.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as processed, re-queueing it if it was added meanwhile
    pub fn done(&self, key: &ResourceKey) {
        let mut state = self.state.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.ready.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Number of keys ready for processing
    pub fn len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and drop pending delayed additions
    pub fn shut_down(&self) {
        self.shutdown.cancel();
        for (_, timer) in self.state.lock().waiting.drain() {
            timer.task.abort();
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("default", name)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(backoff.delay(0), Duration::from_millis(10));
        assert_eq!(backoff.delay(1), Duration::from_millis(20));
        assert_eq!(backoff.delay(2), Duration::from_millis(40));
        assert_eq!(backoff.delay(3), Duration::from_millis(50));
        assert_eq!(backoff.delay(64), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_add_deduplicates() {
        let queue = WorkQueue::new(Backoff::default());
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_key_in_flight_is_not_handed_out_twice() {
        let queue = WorkQueue::new(Backoff::default());
        queue.add(key("a"));
        let first = queue.get().await.unwrap();

        // Re-added while processing: parked until done
        queue.add(key("a"));
        assert!(queue.is_empty());

        queue.done(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_waits_for_delay() {
        let queue = WorkQueue::new(Backoff::default());
        queue.add_after(key("a"), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_keeps_earliest_deadline() {
        let queue = WorkQueue::new(Backoff::default());
        queue.add_after(key("a"), Duration::from_secs(60));
        queue.add_after(key("a"), Duration::from_secs(10));
        queue.add_after(key("a"), Duration::from_secs(120));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(queue.get().await, Some(key("a")));
        queue.done(&key("a"));

        // Superseded timers do not fire
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_timers_are_released() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let queue = WorkQueue::new(Backoff::default());
        let month = Duration::from_secs(30 * 24 * 60 * 60);

        for i in 0..1000u64 {
            queue.add_after(key("a"), month - Duration::from_secs(i));
        }
        // Let aborted timer tasks be reaped
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(queue.pending_timers(), 1);
        assert_eq!(metrics.num_alive_tasks(), 1);

        tokio::time::sleep(month).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_timers(), 0);
        assert_eq!(metrics.num_alive_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_pending_timers() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let queue = WorkQueue::new(Backoff::default());
        queue.add_after(key("a"), Duration::from_secs(3600));
        queue.add_after(key("b"), Duration::from_secs(7200));

        queue.shut_down();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(queue.pending_timers(), 0);
        assert_eq!(metrics.num_alive_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_backoff_and_forget() {
        let queue = WorkQueue::new(Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
        ));

        assert_eq!(queue.add_rate_limited(key("a")), Duration::from_secs(1));
        assert_eq!(queue.add_rate_limited(key("a")), Duration::from_secs(2));
        assert_eq!(queue.num_requeues(&key("a")), 2);

        queue.forget(&key("a"));
        assert_eq!(queue.num_requeues(&key("a")), 0);
        assert_eq!(queue.add_rate_limited(key("a")), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiters() {
        let queue = WorkQueue::new(Backoff::default());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::task::yield_now().await;
        queue.shut_down();
        assert_eq!(waiter.await.unwrap(), None);

        queue.add(key("late"));
        assert!(queue.is_empty());
    }
}
