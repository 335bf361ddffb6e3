//! Minimum-interval throttle.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::{AdmissionPolicy, Maintain};
use super::clock::{Clock, SystemClock};
use crate::config::ThrottleConfig;
use crate::error::Result;

/// Admits at most one event per key per `min_interval`, measured from the
/// key's last admitted event.
///
/// Only the instant of the last admitted event is kept per key. Entries are
/// never dropped by the admission path; use [`IntervalThrottle::evict_idle`]
/// or a sweeper (see [`crate::ratelimit::spawn_sweeper`]) to bound memory
/// for long-lived, high-cardinality deployments.
pub struct IntervalThrottle<C: Clock = SystemClock> {
    min_interval: Duration,
    /// Last admitted instant per key
    last_admitted: DashMap<String, Instant>,
    clock: C,
}

impl IntervalThrottle<SystemClock> {
    /// Create a throttle reading the system clock.
    pub fn new(config: &ThrottleConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> IntervalThrottle<C> {
    /// Create a throttle reading the given clock.
    pub fn with_clock(config: &ThrottleConfig, clock: C) -> Result<Self> {
        let min_interval = config.min_interval()?;

        debug!(
            min_interval_ms = min_interval.as_millis() as u64,
            "Creating interval throttle"
        );

        Ok(Self {
            min_interval,
            last_admitted: DashMap::new(),
            clock,
        })
    }

    /// Minimum spacing between admitted events.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// A clock reading earlier than `last` counts as no time elapsed.
    fn is_spaced(&self, last: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last) >= self.min_interval
    }

    /// Whether `key` would be admitted now.
    pub fn can_admit(&self, key: &str) -> bool {
        let now = self.clock.now();
        let allowed = match self.last_admitted.get(key) {
            Some(last) => self.is_spaced(*last, now),
            None => true,
        };
        trace!(key = %key, allowed = allowed, "Checked throttle");
        allowed
    }

    /// Admit and record an event for `key`, or reject it with no change.
    pub fn record(&self, key: &str) -> bool {
        let now = self.clock.now();

        let admitted = match self.last_admitted.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                if self.is_spaced(*entry.get(), now) {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        if admitted {
            trace!(key = %key, "Recorded event in throttle");
        } else {
            debug!(
                key = %key,
                min_interval_ms = self.min_interval.as_millis() as u64,
                "Throttle interval not yet elapsed"
            );
        }
        admitted
    }

    /// How long until `key` would be admitted. Zero if admissible now.
    pub fn time_until_next_allowed(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let wait = match self.last_admitted.get(key) {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(*last)),
            None => Duration::ZERO,
        };
        trace!(key = %key, wait_ms = wait.as_millis() as u64, "Computed throttle wait");
        wait
    }

    /// Remove keys whose last admitted event is at least `idle_for` old.
    ///
    /// Returns the number of keys removed.
    pub fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        self.last_admitted.retain(|_, last| {
            let keep = now.saturating_duration_since(*last) < idle_for;
            if !keep {
                removed += 1;
            }
            keep
        });

        removed
    }

    /// Number of keys with a recorded last event.
    pub fn tracked_keys(&self) -> usize {
        self.last_admitted.len()
    }

    /// Instant of the last admitted event for `key`.
    pub fn last_admitted(&self, key: &str) -> Option<Instant> {
        self.last_admitted.get(key).map(|last| *last)
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.last_admitted.clear();
    }
}

impl<C: Clock> AdmissionPolicy for IntervalThrottle<C> {
    fn name(&self) -> &'static str {
        "throttle"
    }

    fn can_admit(&self, key: &str) -> bool {
        IntervalThrottle::can_admit(self, key)
    }

    fn record(&self, key: &str) -> bool {
        IntervalThrottle::record(self, key)
    }

    fn time_until_next_allowed(&self, key: &str) -> Duration {
        IntervalThrottle::time_until_next_allowed(self, key)
    }
}

impl<C: Clock> Maintain for IntervalThrottle<C> {
    /// Keys idle for a full interval are admissible regardless, so dropping
    /// them never changes a decision.
    fn sweep(&self) -> usize {
        self.evict_idle(self.min_interval)
    }
}
