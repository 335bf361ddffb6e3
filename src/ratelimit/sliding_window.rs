//! Sliding-window log limiter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::backend::{AdmissionPolicy, Maintain};
use super::clock::{Clock, SystemClock};
use crate::config::SlidingWindowConfig;
use crate::error::Result;

/// Admits at most `max_requests` events per key in any trailing window of
/// `window_size`.
///
/// Each key keeps the instants of its admitted events, oldest first. Every
/// operation first drops the instants that have aged out of the window, and a
/// key whose history becomes empty is removed from the store entirely.
///
/// Histories live in a [`DashMap`]. Each operation holds the key's shard
/// lock for its whole cleanup/check/append sequence, so concurrent `record`
/// calls on the same key can never overshoot the limit.
///
/// A `max_requests` of zero makes `record` reject every event. This is kept
/// as a policy, not treated as a configuration error.
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    window_size: Duration,
    max_requests: u64,
    /// Admitted event instants per key, oldest first
    history: DashMap<String, VecDeque<Instant>>,
    clock: C,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a limiter reading the system clock.
    pub fn new(config: &SlidingWindowConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a limiter reading the given clock.
    pub fn with_clock(config: &SlidingWindowConfig, clock: C) -> Result<Self> {
        let window_size = config.window_size()?;

        if config.max_requests == 0 {
            warn!("Sliding window configured with max_requests = 0; every event will be rejected");
        }

        debug!(
            window_ms = window_size.as_millis() as u64,
            max_requests = config.max_requests,
            "Creating sliding window limiter"
        );

        Ok(Self {
            window_size,
            max_requests: config.max_requests,
            history: DashMap::new(),
            clock,
        })
    }

    /// Length of the trailing window.
    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    /// Maximum admitted events per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Drop every instant more than `window_size` older than `now`.
    ///
    /// An instant exactly `window_size` old stays. Returns the retained count.
    fn cleanup(window: &mut VecDeque<Instant>, window_size: Duration, now: Instant) -> usize {
        while let Some(&oldest) = window.front() {
            if now.saturating_duration_since(oldest) > window_size {
                window.pop_front();
            } else {
                break;
            }
        }
        window.len()
    }

    fn below_limit(&self, retained: usize) -> bool {
        (retained as u64) < self.max_requests
    }

    /// Run cleanup for `key` under its shard lock.
    ///
    /// Returns the retained count and the oldest retained instant, or `None`
    /// when the key holds no history. A key left empty is removed.
    fn cleanup_key(&self, key: &str, now: Instant) -> Option<(usize, Instant)> {
        let survivors = {
            let mut window = self.history.get_mut(key)?;
            let retained = Self::cleanup(window.value_mut(), self.window_size, now);
            window.front().map(|&oldest| (retained, oldest))
        };

        if survivors.is_none() {
            // The guard is released above; a concurrent record may have refilled it.
            self.history.remove_if(key, |_, window| window.is_empty());
        }
        survivors
    }

    /// Whether `key` would be admitted now. Never records an event.
    ///
    /// A key with no history is always admissible here, even with a
    /// `max_requests` of zero; [`SlidingWindowLimiter::record`] still rejects.
    pub fn can_admit(&self, key: &str) -> bool {
        let now = self.clock.now();

        let (allowed, retained) = match self.cleanup_key(key, now) {
            Some((retained, _)) => (self.below_limit(retained), retained),
            None => (true, 0),
        };

        trace!(
            key = %key,
            retained = retained,
            max_requests = self.max_requests,
            allowed = allowed,
            "Checked sliding window"
        );
        allowed
    }

    /// Admit and record an event for `key`, or reject it leaving the history
    /// untouched.
    pub fn record(&self, key: &str) -> bool {
        let now = self.clock.now();

        let (admitted, retained) = match self.history.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                let retained = Self::cleanup(window, self.window_size, now);
                if self.below_limit(retained) {
                    // Never append before the tail, even if the clock stepped back.
                    let stamp = window.back().map_or(now, |&last| last.max(now));
                    window.push_back(stamp);
                    (true, retained + 1)
                } else {
                    if retained == 0 {
                        entry.remove();
                    }
                    (false, retained)
                }
            }
            Entry::Vacant(entry) => {
                if self.max_requests > 0 {
                    entry.insert(VecDeque::from([now]));
                    (true, 1)
                } else {
                    (false, 0)
                }
            }
        };

        if admitted {
            trace!(key = %key, retained = retained, "Recorded event in sliding window");
        } else {
            debug!(
                key = %key,
                retained = retained,
                max_requests = self.max_requests,
                "Sliding window limit exceeded"
            );
        }
        admitted
    }

    /// Time until the oldest retained event for `key` leaves the window.
    ///
    /// That is when the next slot frees up. Zero if the key has no history.
    pub fn time_until_next_allowed(&self, key: &str) -> Duration {
        let now = self.clock.now();

        let wait = match self.cleanup_key(key, now) {
            Some((_, oldest)) => self
                .window_size
                .saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        };

        trace!(key = %key, wait_ms = wait.as_millis() as u64, "Computed sliding window wait");
        wait
    }

    /// Run cleanup over every key, dropping the ones left empty.
    ///
    /// Returns the number of keys removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let window_size = self.window_size;
        let mut removed = 0;

        self.history.retain(|_, window| {
            let keep = Self::cleanup(window, window_size, now) > 0;
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Number of keys currently holding history.
    pub fn tracked_keys(&self) -> usize {
        self.history.len()
    }

    /// Events stored for `key`, without running cleanup first.
    pub fn recorded(&self, key: &str) -> usize {
        self.history.get(key).map_or(0, |window| window.len())
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.history.clear();
    }
}

impl<C: Clock> AdmissionPolicy for SlidingWindowLimiter<C> {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn can_admit(&self, key: &str) -> bool {
        SlidingWindowLimiter::can_admit(self, key)
    }

    fn record(&self, key: &str) -> bool {
        SlidingWindowLimiter::record(self, key)
    }

    fn time_until_next_allowed(&self, key: &str) -> Duration {
        SlidingWindowLimiter::time_until_next_allowed(self, key)
    }
}

impl<C: Clock> Maintain for SlidingWindowLimiter<C> {
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}
