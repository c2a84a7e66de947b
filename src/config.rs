//! Configuration System using Figment
//!
//! Strongly-typed configuration for the controller and the CLI. Configuration
//! is loaded from:
//! 1. built-in defaults
//! 2. `config/ate_control.toml` (or the file given to [`ControllerConfig::load_from`])
//! 3. environment variables prefixed with `ATE_CONTROL_`, sections separated
//!    by a double underscore (`ATE_CONTROL_TIMING__SETTLE_DELAY=500ms`)
//!
//! Durations use humantime notation (`"2s"`, `"1500ms"`).
//!
//! # Example
//! ```no_run
//! use ate_control::config::ControllerConfig;
//!
//! # fn main() -> ate_control::error::AppResult<()> {
//! let config = ControllerConfig::load()?;
//! config.validate()?;
//! println!("Polling every {:?}", config.timing.polling_interval);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, ControlError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/ate_control.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ATE_CONTROL_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Controller timers
    pub timing: TimingConfig,
    /// Live status polling
    pub polling: PollingConfig,
    /// Actor channel sizes
    pub channels: ChannelConfig,
    /// Simulated bench used by the CLI
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
    /// Log span open/close events
    pub log_spans: bool,
    /// ANSI colors in pretty output
    pub log_ansi: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "ATE Instrument Control".to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            log_spans: false,
            log_ansi: true,
        }
    }
}

/// Controller timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay between a dispatch completing and its controls re-enabling
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Status polling cadence per bound panel
    #[serde(with = "humantime_serde")]
    pub polling_interval: Duration,
    /// Client identity refresh cadence
    #[serde(with = "humantime_serde")]
    pub session_refresh_interval: Duration,
    /// Lifetime of info/success notices
    #[serde(with = "humantime_serde")]
    pub notice_clear_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            polling_interval: Duration::from_secs(2),
            session_refresh_interval: Duration::from_secs(15),
            notice_clear_delay: Duration::from_secs(5),
        }
    }
}

/// Live status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// When false, bindings never start polling sessions
    pub enabled: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Actor channel capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Command mailbox of the controller actor
    pub command_capacity: usize,
    /// Broadcast buffer for UI events; slow subscribers lag beyond this
    pub event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_capacity: 32,
            event_capacity: 256,
        }
    }
}

/// Simulated bench settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Latency applied to every simulated call
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Whether the simulated backend serves `instrument-status`
    pub status_endpoint: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(150),
            status_endpoint: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the default file and environment variables.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ControlError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(ControlError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let timers = [
            ("settle_delay", self.timing.settle_delay),
            ("polling_interval", self.timing.polling_interval),
            ("session_refresh_interval", self.timing.session_refresh_interval),
            ("notice_clear_delay", self.timing.notice_clear_delay),
        ];
        for (name, value) in timers {
            if value.is_zero() {
                return Err(ControlError::Configuration(format!(
                    "timing.{name} must be greater than zero"
                )));
            }
        }

        if self.channels.command_capacity == 0 || self.channels.event_capacity == 0 {
            return Err(ControlError::Configuration(
                "channel capacities must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ControlError::Configuration(format!("Failed to render config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.settle_delay, Duration::from_secs(1));
        assert_eq!(config.timing.session_refresh_interval, Duration::from_secs(15));
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let config = ControllerConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_file_overrides_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[timing]
polling_interval = "500ms"

[polling]
enabled = false
"#
        )
        .unwrap();

        let config = ControllerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.timing.polling_interval, Duration::from_millis(500));
        assert!(!config.polling.enabled);
        // untouched keys keep their defaults
        assert_eq!(config.timing.settle_delay, Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        std::env::set_var("ATE_CONTROL_TIMING__SETTLE_DELAY", "250ms");
        let config = ControllerConfig::load_from("does/not/exist.toml");
        std::env::remove_var("ATE_CONTROL_TIMING__SETTLE_DELAY");

        assert_eq!(
            config.unwrap().timing.settle_delay,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ControllerConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ControlError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = ControllerConfig::default();
        config.application.log_format = "xml".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = ControllerConfig::default();
        config.timing.polling_interval = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("polling_interval"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ControllerConfig::default();
        config.channels.event_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trips_durations() {
        let rendered = ControllerConfig::default().to_toml().unwrap();
        assert!(rendered.contains("settle_delay = \"1s\""));
        assert!(rendered.contains("[simulation]"));
    }
}
