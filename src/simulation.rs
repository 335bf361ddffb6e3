//! Synthetic multi-user traffic for exercising an admission policy.
//!
//! Two phases of messages are sent from a rotating set of users with a random
//! delay between messages and a pause between phases. Each message is passed
//! to [`AdmissionPolicy::record`], followed by a wait-time query, and the
//! outcomes are collected into a [`SimulationReport`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::ratelimit::AdmissionPolicy;

/// Pause between phases for the sliding window when none is configured.
const DEFAULT_WINDOW_PAUSE: Duration = Duration::from_secs(4);
/// Pause between phases for the throttle when none is configured.
const DEFAULT_THROTTLE_PAUSE: Duration = Duration::from_secs(10);

/// The result of a single simulated message.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    /// Phase number, starting at 1
    pub phase: u8,
    /// Sequential message number across both phases
    pub message_id: u32,
    /// Key of the sending user
    pub user: String,
    /// Whether the policy admitted the message
    pub admitted: bool,
    /// Wait reported right after the decision
    #[serde(rename = "wait_secs", serialize_with = "serialize_secs")]
    pub wait: Duration,
    /// Wall-clock time of the decision
    pub at: DateTime<Utc>,
}

fn serialize_secs<S: Serializer>(wait: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(wait.as_secs_f64())
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message {:2} | User {} | ", self.message_id, self.user)?;
        if self.admitted {
            write!(f, "ok")
        } else {
            write!(f, "rejected (wait {:.1}s)", self.wait.as_secs_f64())
        }
    }
}

/// All outcomes of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Name of the policy under test
    pub policy: String,
    /// Outcomes in send order
    pub outcomes: Vec<EventOutcome>,
}

impl SimulationReport {
    /// Number of admitted messages.
    pub fn admitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.admitted).count()
    }

    /// Number of rejected messages.
    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.admitted()
    }

    /// Outcomes of one phase.
    pub fn phase(&self, phase: u8) -> impl Iterator<Item = &EventOutcome> {
        self.outcomes.iter().filter(move |o| o.phase == phase)
    }
}

/// A two-phase traffic generator.
#[derive(Debug, Clone)]
pub struct Simulation {
    users: u32,
    messages_per_phase: u32,
    min_delay: Duration,
    max_delay: Duration,
    pause: Option<Duration>,
}

impl Simulation {
    /// Build a simulation from validated configuration.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let (min_delay, max_delay) = config.delay_bounds()?;
        Ok(Self {
            users: config.users,
            messages_per_phase: config.messages_per_phase,
            min_delay,
            max_delay,
            pause: config.pause()?,
        })
    }

    /// The pause used between phases for `policy`.
    pub fn pause_for<P: AdmissionPolicy + ?Sized>(&self, policy: &P) -> Duration {
        self.pause.unwrap_or(match policy.name() {
            "throttle" => DEFAULT_THROTTLE_PAUSE,
            _ => DEFAULT_WINDOW_PAUSE,
        })
    }

    /// Key of the user sending message `message_id`.
    fn user_for(&self, message_id: u32) -> String {
        (message_id % self.users + 1).to_string()
    }

    fn next_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        rng.gen_range(self.min_delay..=self.max_delay)
    }

    /// Drive both phases against `policy`.
    ///
    /// Sleeps with [`tokio::time::sleep`], so under paused test time the run
    /// completes instantly and deterministically.
    pub async fn run<P, R>(&self, policy: &P, rng: &mut R) -> SimulationReport
    where
        P: AdmissionPolicy + ?Sized,
        R: Rng,
    {
        let mut outcomes = Vec::with_capacity(self.messages_per_phase as usize * 2);
        let pause = self.pause_for(policy);

        for phase in 1..=2u8 {
            if phase > 1 {
                info!(policy = policy.name(), pause_ms = pause.as_millis() as u64, "Pausing between phases");
                tokio::time::sleep(pause).await;
            }

            info!(policy = policy.name(), phase = phase, "Starting simulation phase");
            let first = (phase as u32 - 1) * self.messages_per_phase + 1;

            for message_id in first..first + self.messages_per_phase {
                let user = self.user_for(message_id);
                let admitted = policy.record(&user);
                let wait = policy.time_until_next_allowed(&user);

                let outcome = EventOutcome {
                    phase,
                    message_id,
                    user,
                    admitted,
                    wait,
                    at: Utc::now(),
                };
                debug!(outcome = %outcome, "Simulated message");
                outcomes.push(outcome);

                tokio::time::sleep(self.next_delay(rng)).await;
            }
        }

        SimulationReport {
            policy: policy.name().to_string(),
            outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SlidingWindowConfig, ThrottleConfig};
    use crate::ratelimit::{IntervalThrottle, SlidingWindowLimiter, TokioClock};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_delay_simulation() -> Simulation {
        Simulation::from_config(&SimulationConfig {
            users: 5,
            messages_per_phase: 10,
            min_delay_secs: 0.5,
            max_delay_secs: 0.5,
            pause_secs: None,
        })
        .unwrap()
    }

    #[test]
    fn test_user_rotation() {
        let sim = fixed_delay_simulation();
        assert_eq!(sim.user_for(1), "2");
        assert_eq!(sim.user_for(4), "5");
        assert_eq!(sim.user_for(5), "1");
        assert_eq!(sim.user_for(11), "2");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            min_delay_secs: 3.0,
            max_delay_secs: 1.0,
            ..SimulationConfig::default()
        };
        assert!(Simulation::from_config(&config).is_err());
    }

    #[test]
    fn test_outcome_display() {
        let mut outcome = EventOutcome {
            phase: 1,
            message_id: 7,
            user: "3".to_string(),
            admitted: true,
            wait: Duration::ZERO,
            at: Utc::now(),
        };
        assert_eq!(outcome.to_string(), "Message  7 | User 3 | ok");

        outcome.admitted = false;
        outcome.wait = Duration::from_millis(4200);
        assert_eq!(outcome.to_string(), "Message  7 | User 3 | rejected (wait 4.2s)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window_run() {
        let limiter =
            SlidingWindowLimiter::with_clock(&SlidingWindowConfig::new(10.0, 1), TokioClock)
                .unwrap();
        let sim = fixed_delay_simulation();
        let mut rng = StdRng::seed_from_u64(7);

        let report = sim.run(&limiter, &mut rng).await;

        assert_eq!(report.policy, "sliding_window");
        assert_eq!(report.outcomes.len(), 20);

        // Each user gets one message through, the second round is rejected.
        let phase1: Vec<_> = report.phase(1).collect();
        assert!(phase1[..5].iter().all(|o| o.admitted));
        assert!(phase1[5..].iter().all(|o| !o.admitted));
        // Message 6 comes from user 2, admitted 2.5s earlier.
        assert_eq!(phase1[5].wait, Duration::from_millis(7500));

        // Phase 2 starts 9s in: the first round still sits inside the window.
        let phase2: Vec<_> = report.phase(2).collect();
        assert!(phase2[..5].iter().all(|o| !o.admitted && o.wait == Duration::from_secs(1)));
        assert!(phase2[5..].iter().all(|o| o.admitted));

        assert_eq!(report.admitted(), 10);
        assert_eq!(report.rejected(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_run() {
        let throttle =
            IntervalThrottle::with_clock(&ThrottleConfig::new(10.0), TokioClock).unwrap();
        let sim = fixed_delay_simulation();
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(sim.pause_for(&throttle), Duration::from_secs(10));

        let report = sim.run(&throttle, &mut rng).await;

        assert_eq!(report.policy, "throttle");
        // After a 10s pause every user is admitted again, once per phase.
        for phase in 1..=2 {
            let outcomes: Vec<_> = report.phase(phase).collect();
            assert!(outcomes[..5].iter().all(|o| o.admitted));
            assert!(outcomes[5..].iter().all(|o| !o.admitted));
        }
        // Message 16 is user 2 again, 2.5s after message 11.
        let message_16 = &report.outcomes[15];
        assert_eq!(message_16.message_id, 16);
        assert_eq!(message_16.wait, Duration::from_millis(7500));
        assert_eq!(report.admitted(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_delays_stay_in_bounds() {
        let limiter =
            SlidingWindowLimiter::with_clock(&SlidingWindowConfig::new(1.0, 1), TokioClock)
                .unwrap();
        let sim = Simulation::from_config(&SimulationConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let start = tokio::time::Instant::now();
        let report = sim.run(&limiter, &mut rng).await;
        let elapsed = start.elapsed();

        assert_eq!(report.outcomes.len(), 20);
        // 20 delays in [0.1s, 1.0s] plus the 4s pause.
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed <= Duration::from_secs(24));
    }

    #[test]
    fn test_report_serializes_wait_as_seconds() {
        let report = SimulationReport {
            policy: "throttle".to_string(),
            outcomes: vec![EventOutcome {
                phase: 1,
                message_id: 1,
                user: "2".to_string(),
                admitted: false,
                wait: Duration::from_millis(1500),
                at: Utc::now(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["wait_secs"], 1.5);
        assert_eq!(json["outcomes"][0]["user"], "2");
    }
}
