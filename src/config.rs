//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Sliding-window limiter configuration
    #[serde(default)]
    pub sliding_window: SlidingWindowConfig,

    /// Interval throttle configuration
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Demonstration traffic configuration
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Sliding-window limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Length of the trailing window in (fractional) seconds
    #[serde(default = "default_window_size")]
    pub window_size_secs: f64,

    /// Maximum admitted events per key inside one window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
}

impl SlidingWindowConfig {
    /// Create a configuration from raw values. Validation happens on use.
    pub fn new(window_size_secs: f64, max_requests: u64) -> Self {
        Self {
            window_size_secs,
            max_requests,
        }
    }

    /// The window length as a [`Duration`].
    ///
    /// Fails unless the window is finite and strictly positive.
    pub fn window_size(&self) -> Result<Duration> {
        seconds_to_duration("sliding_window.window_size_secs", self.window_size_secs, false)
    }

    /// Validate this section.
    pub fn validate(&self) -> Result<()> {
        self.window_size().map(|_| ())
    }
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size_secs: default_window_size(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_size() -> f64 {
    10.0
}

fn default_max_requests() -> u64 {
    1
}

/// Interval throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum spacing between admitted events per key, in (fractional) seconds
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: f64,
}

impl ThrottleConfig {
    /// Create a configuration from a raw interval. Validation happens on use.
    pub fn new(min_interval_secs: f64) -> Self {
        Self { min_interval_secs }
    }

    /// The minimum interval as a [`Duration`]. Zero is allowed.
    pub fn min_interval(&self) -> Result<Duration> {
        seconds_to_duration("throttle.min_interval_secs", self.min_interval_secs, true)
    }

    /// Validate this section.
    pub fn validate(&self) -> Result<()> {
        self.min_interval().map(|_| ())
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
        }
    }
}

fn default_min_interval() -> f64 {
    10.0
}

/// Synthetic traffic used by the `turnstile` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of distinct users sending messages
    #[serde(default = "default_users")]
    pub users: u32,

    /// Messages sent in each of the two phases
    #[serde(default = "default_messages_per_phase")]
    pub messages_per_phase: u32,

    /// Lower bound of the random delay between messages
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,

    /// Upper bound of the random delay between messages
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    /// Pause between the phases; policy-specific when unset
    #[serde(default)]
    pub pause_secs: Option<f64>,
}

impl SimulationConfig {
    /// Random delay bounds as durations.
    pub fn delay_bounds(&self) -> Result<(Duration, Duration)> {
        let min = seconds_to_duration("simulation.min_delay_secs", self.min_delay_secs, true)?;
        let max = seconds_to_duration("simulation.max_delay_secs", self.max_delay_secs, true)?;
        if min > max {
            return Err(TurnstileError::Config(format!(
                "simulation.min_delay_secs ({}) exceeds simulation.max_delay_secs ({})",
                self.min_delay_secs, self.max_delay_secs
            )));
        }
        Ok((min, max))
    }

    /// Explicit pause between phases, if configured.
    pub fn pause(&self) -> Result<Option<Duration>> {
        self.pause_secs
            .map(|secs| seconds_to_duration("simulation.pause_secs", secs, true))
            .transpose()
    }

    /// Validate this section.
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 {
            return Err(TurnstileError::Config(
                "simulation.users must be at least 1".to_string(),
            ));
        }
        self.delay_bounds()?;
        self.pause()?;
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            messages_per_phase: default_messages_per_phase(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            pause_secs: None,
        }
    }
}

fn default_users() -> u32 {
    5
}

fn default_messages_per_phase() -> u32 {
    10
}

fn default_min_delay() -> f64 {
    0.1
}

fn default_max_delay() -> f64 {
    1.0
}

/// Convert a seconds value from configuration into a [`Duration`].
fn seconds_to_duration(field: &str, secs: f64, allow_zero: bool) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 || (!allow_zero && secs == 0.0) {
        let expected = if allow_zero { "non-negative" } else { "positive" };
        return Err(TurnstileError::Config(format!(
            "{} must be a finite, {} number of seconds, got {}",
            field, expected, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| TurnstileError::Config(format!("{} is out of range: {}", field, e)))
}

impl TurnstileConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load layered configuration.
    ///
    /// Sources, lowest precedence first: built-in defaults, the optional YAML
    /// file, then `TURNSTILE__SECTION__FIELD` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TURNSTILE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TurnstileConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.sliding_window.validate()?;
        self.throttle.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();
        assert_eq!(config.sliding_window.window_size_secs, 10.0);
        assert_eq!(config.sliding_window.max_requests, 1);
        assert_eq!(config.throttle.min_interval_secs, 10.0);
        assert_eq!(config.simulation.users, 5);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let yaml = r#"
sliding_window:
  max_requests: 3
throttle:
  min_interval_secs: 2.5
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.sliding_window.window_size_secs, 10.0);
        assert_eq!(config.sliding_window.max_requests, 3);
        assert_eq!(
            config.throttle.min_interval().unwrap(),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = SlidingWindowConfig::new(0.0, 5);
        assert_err!(config.validate());
    }

    #[test]
    fn test_negative_or_nan_window_rejected() {
        assert_err!(SlidingWindowConfig::new(-1.0, 5).window_size());
        assert_err!(SlidingWindowConfig::new(f64::NAN, 5).window_size());
        assert_err!(SlidingWindowConfig::new(f64::INFINITY, 5).window_size());
    }

    #[test]
    fn test_fractional_window() {
        let config = SlidingWindowConfig::new(0.25, 1);
        assert_eq!(config.window_size().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_interval_allowed_negative_rejected() {
        assert_eq!(
            ThrottleConfig::new(0.0).min_interval().unwrap(),
            Duration::ZERO
        );
        assert_err!(ThrottleConfig::new(-0.5).min_interval());
    }

    #[test]
    fn test_invalid_yaml_section_is_config_error() {
        let yaml = r#"
throttle:
  min_interval_secs: -3
"#;
        let err = TurnstileConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
        assert!(err.to_string().contains("throttle.min_interval_secs"));
    }

    #[test]
    fn test_simulation_delay_bounds() {
        let mut sim = SimulationConfig::default();
        let (min, max) = sim.delay_bounds().unwrap();
        assert_eq!(min, Duration::from_millis(100));
        assert_eq!(max, Duration::from_secs(1));

        sim.min_delay_secs = 2.0;
        assert_err!(sim.validate());
    }

    #[test]
    fn test_simulation_requires_users() {
        let sim = SimulationConfig {
            users: 0,
            ..SimulationConfig::default()
        };
        assert_err!(sim.validate());
    }

    #[test]
    fn test_load_without_file_returns_defaults() {
        let config = TurnstileConfig::load(None).unwrap();
        assert_eq!(config.sliding_window.max_requests, 1);
        assert_eq!(config.simulation.pause_secs, None);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "sliding_window:\n  window_size_secs: 1.5\n  max_requests: 4\n",
        )
        .unwrap();

        let config = TurnstileConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.sliding_window.max_requests, 4);
        assert_eq!(
            config.sliding_window.window_size().unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(config.throttle.min_interval_secs, 10.0);
    }

    #[test]
    fn test_load_env_overrides_defaults() {
        // Only this test touches messages_per_phase, so parallel loads are unaffected.
        std::env::set_var("TURNSTILE__SIMULATION__MESSAGES_PER_PHASE", "42");
        let result = TurnstileConfig::load(None);
        std::env::remove_var("TURNSTILE__SIMULATION__MESSAGES_PER_PHASE");

        let config = assert_ok!(result);
        assert_eq!(config.simulation.messages_per_phase, 42);
        assert_eq!(config.simulation.users, 5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = TurnstileConfig::load(Some(Path::new("/nonexistent/turnstile.yaml")));
        assert_err!(result);
    }
}
