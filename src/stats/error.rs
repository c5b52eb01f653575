//! Stats errors
//!
//! Configuration problems are reported synchronously at construction or
//! registration time. Recording never fails.

/// Errors returned by the stats engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// A measure, view or tag name is malformed
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },
    /// Distribution bucket boundaries are not strictly increasing finite values
    InvalidBucketBoundaries { reason: String },
    /// Aggregation window is malformed (e.g. zero-length interval)
    InvalidWindow { reason: String },
    /// A view lists the same tag key more than once
    DuplicateColumns { view: String, key: String },
    /// A structurally different view is already registered under this name
    ViewConflict { name: String },
    /// A different measure is already registered under this name
    MeasureConflict { name: String },
    /// No view is registered under this name
    ViewNotRegistered { name: String },
    /// Configuration could not be loaded or is out of range
    Config { reason: String },
    /// Snapshot could not be serialized
    Serialization { reason: String },
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::InvalidName { kind, name, reason } => {
                write!(f, "invalid {} name '{}': {}", kind, name, reason)
            }
            StatsError::InvalidBucketBoundaries { reason } => {
                write!(f, "invalid bucket boundaries: {}", reason)
            }
            StatsError::InvalidWindow { reason } => {
                write!(f, "invalid aggregation window: {}", reason)
            }
            StatsError::DuplicateColumns { view, key } => {
                write!(f, "view '{}' has duplicate column '{}'", view, key)
            }
            StatsError::ViewConflict { name } => {
                write!(f, "a different view with the same name is already registered: {}", name)
            }
            StatsError::MeasureConflict { name } => {
                write!(
                    f,
                    "a different measure with the same name is already registered: {}",
                    name
                )
            }
            StatsError::ViewNotRegistered { name } => {
                write!(f, "view is not registered: {}", name)
            }
            StatsError::Config { reason } => write!(f, "invalid stats config: {}", reason),
            StatsError::Serialization { reason } => {
                write!(f, "failed to serialize view data: {}", reason)
            }
        }
    }
}

impl std::error::Error for StatsError {}

impl From<serde_json::Error> for StatsError {
    fn from(e: serde_json::Error) -> Self {
        StatsError::Serialization {
            reason: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for StatsError {
    fn from(e: toml::de::Error) -> Self {
        StatsError::Config {
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_conflict_kind() {
        let view = StatsError::ViewConflict {
            name: "rpc/latency".to_string(),
        };
        assert!(view.to_string().contains("different view"));

        let measure = StatsError::MeasureConflict {
            name: "rpc/latency_ms".to_string(),
        };
        assert!(measure.to_string().contains("different measure"));
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: StatsError = toml::from_str::<toml::Value>("= broken")
            .map_err(StatsError::from)
            .unwrap_err();
        assert!(matches!(err, StatsError::Config { .. }));
    }
}
