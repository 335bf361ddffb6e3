//! Admission policy traits shared by every limiter implementation.

use std::time::Duration;

/// Outcome of [`AdmissionPolicy::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The event was admitted and recorded.
    Allowed,
    /// The event was rejected and nothing was recorded.
    Rejected {
        /// Time until an identical call would be admitted.
        retry_after: Duration,
    },
}

impl AdmissionDecision {
    /// Whether the event was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}

/// The three-operation admission contract.
///
/// Implementations are total over any key: none of these calls fail, and
/// none of them block beyond a short in-memory critical section.
pub trait AdmissionPolicy: Send + Sync {
    /// Short, stable policy name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Whether `key` would be admitted right now, without recording anything.
    fn can_admit(&self, key: &str) -> bool;

    /// Admit and record an event for `key`, or reject it with no side effect.
    fn record(&self, key: &str) -> bool;

    /// How long until `key` frees up its next slot. Zero if nothing blocks it.
    fn time_until_next_allowed(&self, key: &str) -> Duration;

    /// Record an event for `key` and report a retry hint on rejection.
    fn check(&self, key: &str) -> AdmissionDecision {
        if self.record(key) {
            AdmissionDecision::Allowed
        } else {
            AdmissionDecision::Rejected {
                retry_after: self.time_until_next_allowed(key),
            }
        }
    }
}

/// Background-maintainable state.
pub trait Maintain: Send + Sync {
    /// Drop per-key state that can no longer influence a decision.
    ///
    /// Returns the number of keys removed.
    fn sweep(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Toggle {
        open: AtomicBool,
    }

    impl AdmissionPolicy for Toggle {
        fn name(&self) -> &'static str {
            "toggle"
        }

        fn can_admit(&self, _key: &str) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn record(&self, key: &str) -> bool {
            self.can_admit(key)
        }

        fn time_until_next_allowed(&self, key: &str) -> Duration {
            if self.can_admit(key) {
                Duration::ZERO
            } else {
                Duration::from_secs(3)
            }
        }
    }

    #[test]
    fn test_check_allowed() {
        let policy = Toggle {
            open: AtomicBool::new(true),
        };
        assert_eq!(policy.check("k"), AdmissionDecision::Allowed);
        assert!(policy.check("k").is_allowed());
    }

    #[test]
    fn test_check_rejected_carries_retry_hint() {
        let policy = Toggle {
            open: AtomicBool::new(false),
        };
        assert_eq!(
            policy.check("k"),
            AdmissionDecision::Rejected {
                retry_after: Duration::from_secs(3)
            }
        );
    }
}
