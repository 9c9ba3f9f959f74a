use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

const SECOND: Duration = Duration::from_secs(1);
const HOUR: Duration = Duration::from_secs(3600);

/// Admission caps imposed by the remote provider.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub max_per_second: usize,
    pub max_per_hour: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_per_second: 80,
            max_per_hour: 32_000,
        }
    }
}

#[derive(Default)]
struct State {
    last_second: VecDeque<Instant>,
    last_hour: VecDeque<Instant>,
    waiters: VecDeque<oneshot::Sender<()>>,
    wake_scheduled: bool,
}

impl State {
    fn evict(&mut self, now: Instant) {
        while self.last_second.front().is_some_and(|&t| t + SECOND <= now) {
            self.last_second.pop_front();
        }
        while self.last_hour.front().is_some_and(|&t| t + HOUR <= now) {
            self.last_hour.pop_front();
        }
    }

    fn has_capacity(&self, limits: RateLimits) -> bool {
        self.last_second.len() < limits.max_per_second && self.last_hour.len() < limits.max_per_hour
    }

    fn record(&mut self, now: Instant) {
        self.last_second.push_back(now);
        self.last_hour.push_back(now);
    }

    /// The earliest instant at which both windows have headroom again.
    ///
    /// Returns `now` when they already do; after an eviction a saturated
    /// window always has a front entry that leaves strictly in the future.
    fn next_free_at(&self, limits: RateLimits, now: Instant) -> Instant {
        let mut deadline = now;
        if self.last_second.len() >= limits.max_per_second {
            if let Some(&front) = self.last_second.front() {
                deadline = deadline.max(front + SECOND);
            }
        }
        if self.last_hour.len() >= limits.max_per_hour {
            if let Some(&front) = self.last_hour.front() {
                deadline = deadline.max(front + HOUR);
            }
        }
        deadline
    }
}

/// Sliding-window request throttle with fair queuing on saturation.
///
/// Two windows (one second, one hour) hold the timestamps of recently
/// admitted requests. Saturation is never an error: callers over the cap are
/// suspended in arrival order and released one admission at a time as
/// capacity frees up. Window state and the wait queue share a single lock,
/// and the lock is never held across a suspension point.
pub struct RateLimiter {
    limits: RateLimits,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            state: Mutex::new(State::default()),
        })
    }

    /// Suspends until the caller may issue a request.
    ///
    /// Admission is immediate while both windows have headroom and nobody is
    /// queued ahead; the admission timestamps of queued callers are recorded
    /// by the releasing side, so the FIFO order cannot invert.
    pub async fn admit(self: &Arc<Self>) {
        let waiter = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            state.evict(now);

            if state.waiters.is_empty() && state.has_capacity(self.limits) {
                state.record(now);
                return;
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            self.schedule_wake(&mut state, now);
            rx
        };

        // The slot was recorded before the signal was sent; nothing left to
        // do here. An error only means the limiter itself went away.
        let _ = waiter.await;
    }

    /// Releases queued callers, in arrival order, for as much capacity as
    /// the windows currently have. Callers that gave up waiting are skipped
    /// and consume no capacity.
    fn wake_waiters(self: &Arc<Self>, state: &mut State) {
        let now = Instant::now();
        state.evict(now);

        while !state.waiters.is_empty() && state.has_capacity(self.limits) {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            if waiter.send(()).is_err() {
                continue;
            }
            state.record(now);
        }

        if !state.waiters.is_empty() {
            self.schedule_wake(state, now);
        }
    }

    /// Arranges for `wake_waiters` to run when the next slot frees up.
    /// At most one wake task is pending at a time.
    fn schedule_wake(self: &Arc<Self>, state: &mut State, now: Instant) {
        if state.wake_scheduled {
            return;
        }
        state.wake_scheduled = true;

        let deadline = state.next_free_at(self.limits, now);
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut state = limiter.state.lock().unwrap();
            state.wake_scheduled = false;
            limiter.wake_waiters(&mut state);
        });
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.state.lock().unwrap().waiters.len()
    }
}
