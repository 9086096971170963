use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(300_000);
pub const DEFAULT_MIN_GAP: Duration = Duration::from_millis(240_000);
pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcasterConfig {
    /// Period of the repeating timer.
    pub interval: Duration,
    /// Minimum time between the starts of two successful cycles.
    pub min_gap: Duration,
    /// Rows per ranking type in the public update.
    pub top_n: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("broadcast interval must be non-zero")]
    ZeroInterval,
    #[error("minimum gap {min_gap:?} must be strictly less than the interval {interval:?}")]
    GapNotBelowInterval { min_gap: Duration, interval: Duration },
    #[error("public top-N must be at least 1")]
    ZeroTopN,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            min_gap: DEFAULT_MIN_GAP,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl BroadcasterConfig {
    pub fn from_millis(
        interval_ms: u64,
        min_gap_ms: u64,
        top_n: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            interval: Duration::from_millis(interval_ms),
            min_gap: Duration::from_millis(min_gap_ms),
            top_n,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.min_gap >= self.interval {
            return Err(ConfigError::GapNotBelowInterval {
                min_gap: self.min_gap,
                interval: self.interval,
            });
        }
        if self.top_n == 0 {
            return Err(ConfigError::ZeroTopN);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BroadcasterConfig::default();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.min_gap, Duration::from_secs(240));
        assert_eq!(config.top_n, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn gap_must_be_below_interval() {
        let err = BroadcasterConfig::from_millis(1_000, 1_000, 10).unwrap_err();
        assert!(matches!(err, ConfigError::GapNotBelowInterval { .. }));
    }

    #[test]
    fn rejects_zero_values() {
        assert_eq!(
            BroadcasterConfig::from_millis(0, 0, 10).unwrap_err(),
            ConfigError::ZeroInterval
        );
        assert_eq!(
            BroadcasterConfig::from_millis(1_000, 500, 0).unwrap_err(),
            ConfigError::ZeroTopN
        );
    }
}
