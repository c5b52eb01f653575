//! Stats Configuration
//!
//! Settings can come from environment variables (12-factor style) or a TOML
//! document. Unparsable environment values fall back to the defaults.
//!
//! - `STATS_INTERVAL_SUB_BUCKETS`: sub-intervals per interval window (default: 4)
//! - `STATS_INITIAL_STATE`: `enabled` or `disabled` (default: enabled)

use crate::stats::{CollectionState, Result, StatsError};
use serde::{Deserialize, Serialize};

/// Configuration for a stats component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Number of sub-intervals an interval window is split into. The ring
    /// keeps one extra bucket for the partially expired tail.
    pub interval_sub_buckets: usize,
    /// Collection state of a freshly built view manager
    pub initial_state: CollectionState,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            interval_sub_buckets: 4,
            initial_state: CollectionState::Enabled,
        }
    }
}

impl StatsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        StatsConfig {
            interval_sub_buckets: std::env::var("STATS_INTERVAL_SUB_BUCKETS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.interval_sub_buckets),
            initial_state: std::env::var("STATS_INITIAL_STATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.initial_state),
        }
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StatsConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests (small rings)
    pub fn test() -> Self {
        StatsConfig {
            interval_sub_buckets: 2,
            initial_state: CollectionState::Enabled,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_sub_buckets == 0 {
            return Err(StatsError::Config {
                reason: "interval_sub_buckets must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StatsConfig::default();
        assert_eq!(config.interval_sub_buckets, 4);
        assert_eq!(config.initial_state, CollectionState::Enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = StatsConfig::from_toml_str(
            r#"
            interval_sub_buckets = 6
            initial_state = "disabled"
            "#,
        )
        .unwrap();
        assert_eq!(config.interval_sub_buckets, 6);
        assert_eq!(config.initial_state, CollectionState::Disabled);

        let partial = StatsConfig::from_toml_str("interval_sub_buckets = 3").unwrap();
        assert_eq!(partial.initial_state, CollectionState::Enabled);
    }

    #[test]
    fn test_from_toml_rejects_zero_buckets() {
        let err = StatsConfig::from_toml_str("interval_sub_buckets = 0").unwrap_err();
        assert!(matches!(err, StatsError::Config { .. }));
        assert!(StatsConfig::from_toml_str("initial_state = \"paused\"").is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("STATS_INTERVAL_SUB_BUCKETS", "8");
        std::env::set_var("STATS_INITIAL_STATE", "disabled");
        let config = StatsConfig::from_env();
        assert_eq!(config.interval_sub_buckets, 8);
        assert_eq!(config.initial_state, CollectionState::Disabled);

        std::env::set_var("STATS_INTERVAL_SUB_BUCKETS", "0");
        std::env::set_var("STATS_INITIAL_STATE", "bogus");
        let config = StatsConfig::from_env();
        assert_eq!(config, StatsConfig::default());

        std::env::remove_var("STATS_INTERVAL_SUB_BUCKETS");
        std::env::remove_var("STATS_INITIAL_STATE");
    }
}
