//! Configuration Module
//!
//! Handles loading and managing client configuration from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cache client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis connection URL
    pub url: String,
    /// Instance name used to namespace all keys, allowing a single backend
    /// to be partitioned between multiple apps/services
    pub instance_name: String,
    /// Whether a sustained run of transient errors may force-discard the
    /// shared connection
    pub use_force_reconnect: bool,
    /// Never force a reconnect more often than this
    #[serde(with = "duration_secs")]
    pub min_reconnect_interval: Duration,
    /// Required sustained error duration before forcing a reconnect, and the
    /// staleness bound for treating an error run as continuous
    #[serde(with = "duration_secs")]
    pub error_window: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_URL` - Redis connection URL (default: redis://127.0.0.1:6379)
    /// - `CACHE_INSTANCE_NAME` - Key namespace prefix (default: empty)
    /// - `USE_FORCE_RECONNECT` - Enable forced reconnects (default: true)
    /// - `MIN_RECONNECT_INTERVAL_SECS` - Reconnect rate limit (default: 60)
    /// - `ERROR_WINDOW_SECS` - Sustained-error threshold (default: 30)
    pub fn from_env() -> Self {
        Self {
            url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            instance_name: env::var("CACHE_INSTANCE_NAME").unwrap_or_default(),
            use_force_reconnect: env::var("USE_FORCE_RECONNECT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            min_reconnect_interval: Duration::from_secs(
                env::var("MIN_RECONNECT_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            error_window: Duration::from_secs(
                env::var("ERROR_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            instance_name: String::new(),
            use_force_reconnect: true,
            min_reconnect_interval: Duration::from_secs(60),
            error_window: Duration::from_secs(30),
        }
    }
}

// Serde helper: durations serialized as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
