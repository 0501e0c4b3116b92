//! Monitor configuration
//!
//! The monitoring core consumes its tunables from the surrounding console;
//! it does not load them itself. `MonitorConfig` carries the two poll
//! cadences and the drain-cycle count applied after a run turns terminal.
//!
//! All intervals are host-driven: the platform is never asked to push.

use std::time::Duration;

/// Default status poll interval (a few seconds; status moves slowly)
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 5000;

/// Default log poll interval (logs move faster than status)
pub const DEFAULT_LOG_INTERVAL_MS: u64 = 1000;

/// Default number of extra tail cycles after a terminal status
pub const DEFAULT_DRAIN_CYCLES: u32 = 2;

/// Configuration for one run monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Interval between status fetches
    pub status_interval: Duration,

    /// Interval between log fetches
    pub log_interval: Duration,

    /// Extra tail cycles allowed after the run reports its terminal status,
    /// so output produced just before termination is still retrieved
    pub drain_cycles: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(DEFAULT_STATUS_INTERVAL_MS),
            log_interval: Duration::from_millis(DEFAULT_LOG_INTERVAL_MS),
            drain_cycles: DEFAULT_DRAIN_CYCLES,
        }
    }
}

impl MonitorConfig {
    /// Validate configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Intervals must be in (0, 300s]; zero would spin, anything beyond
        // five minutes makes the console useless as a live view.
        if self.status_interval.is_zero() || self.status_interval > Duration::from_secs(300) {
            return Err(ConfigError::StatusIntervalOutOfBounds {
                millis: self.status_interval.as_millis() as u64,
            });
        }

        if self.log_interval.is_zero() || self.log_interval > Duration::from_secs(300) {
            return Err(ConfigError::LogIntervalOutOfBounds {
                millis: self.log_interval.as_millis() as u64,
            });
        }

        // drain_cycles must be in [0, 100]
        if self.drain_cycles > 100 {
            return Err(ConfigError::DrainCyclesOutOfBounds {
                value: self.drain_cycles,
            });
        }

        Ok(())
    }

    /// Create a MonitorConfig from optional console settings, filling gaps
    /// with the defaults above
    pub fn from_settings(
        status_interval_ms: Option<u64>,
        log_interval_ms: Option<u64>,
        drain_cycles: Option<u32>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            status_interval: status_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.status_interval),
            log_interval: log_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.log_interval),
            drain_cycles: drain_cycles.unwrap_or(defaults.drain_cycles),
        }
    }

    /// Set both poll intervals to the same value (useful in tests)
    pub fn with_intervals(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self.log_interval = interval;
        self
    }

    /// Set the drain-cycle count
    pub fn with_drain_cycles(mut self, cycles: u32) -> Self {
        self.drain_cycles = cycles;
        self
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("status interval must be in (0, 300000] ms, got {millis}")]
    StatusIntervalOutOfBounds { millis: u64 },

    #[error("log interval must be in (0, 300000] ms, got {millis}")]
    LogIntervalOutOfBounds { millis: u64 },

    #[error("drain cycles must be in [0, 100], got {value}")]
    DrainCyclesOutOfBounds { value: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.status_interval, Duration::from_millis(5000));
        assert_eq!(config.log_interval, Duration::from_millis(1000));
        assert_eq!(config.drain_cycles, 2);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = MonitorConfig::default().with_intervals(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StatusIntervalOutOfBounds { millis: 0 })
        ));
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let mut config = MonitorConfig::default();
        config.log_interval = Duration::from_secs(301);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LogIntervalOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_drain_cycles_bounds() {
        let config = MonitorConfig::default().with_drain_cycles(101);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DrainCyclesOutOfBounds { value: 101 })
        ));

        // Zero drain cycles is allowed: stop tailing as soon as the run stops.
        let config = MonitorConfig::default().with_drain_cycles(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_settings_overlay() {
        let config = MonitorConfig::from_settings(Some(2000), None, Some(5));
        assert_eq!(config.status_interval, Duration::from_millis(2000));
        assert_eq!(config.log_interval, Duration::from_millis(1000));
        assert_eq!(config.drain_cycles, 5);
    }
}
