use serde::{Deserialize, Serialize};

use crate::limiter::{HostKeyPolicy, LimiterError};

/// Default maximum number of requests in flight across all hosts
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Default maximum number of requests in flight to a single host
pub const DEFAULT_HOST_CONCURRENCY: usize = 2;

/// Validated concurrency limits.
///
/// Both values are at least 1. `per_host_max` may exceed `global_max`,
/// in which case the per-host cap is simply never the binding constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limits {
    global_max: usize,
    per_host_max: usize,
}

impl Limits {
    /// Create a new set of limits
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConfig`] if either limit is zero.
    pub const fn new(global_max: usize, per_host_max: usize) -> Result<Self, LimiterError> {
        if global_max == 0 || per_host_max == 0 {
            return Err(LimiterError::InvalidConfig {
                global_max,
                per_host_max,
            });
        }
        Ok(Self {
            global_max,
            per_host_max,
        })
    }

    /// Maximum number of admitted requests across all hosts
    #[must_use]
    pub const fn global_max(&self) -> usize {
        self.global_max
    }

    /// Maximum number of admitted requests per host
    #[must_use]
    pub const fn per_host_max(&self) -> usize {
        self.per_host_max
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            global_max: DEFAULT_MAX_CONCURRENCY,
            per_host_max: DEFAULT_HOST_CONCURRENCY,
        }
    }
}

impl<'de> Deserialize<'de> for Limits {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let config = LimiterConfig::deserialize(deserializer)?;
        config.limits().map_err(serde::de::Error::custom)
    }
}

/// User-facing limiter configuration, e.g. from a TOML file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Maximum concurrent requests across all hosts
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum concurrent requests per host
    #[serde(default = "default_host_concurrency")]
    pub host_concurrency: usize,

    /// How hosts are told apart
    #[serde(default)]
    pub host_key: HostKeyPolicy,
}

const fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

const fn default_host_concurrency() -> usize {
    DEFAULT_HOST_CONCURRENCY
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            host_concurrency: DEFAULT_HOST_CONCURRENCY,
            host_key: HostKeyPolicy::default(),
        }
    }
}

impl LimiterConfig {
    /// Create a `LimiterConfig` from CLI options, using defaults for missing values
    #[must_use]
    pub fn from_options(
        max_concurrency: Option<usize>,
        host_concurrency: Option<usize>,
        host_key: Option<HostKeyPolicy>,
    ) -> Self {
        Self {
            max_concurrency: max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            host_concurrency: host_concurrency.unwrap_or(DEFAULT_HOST_CONCURRENCY),
            host_key: host_key.unwrap_or_default(),
        }
    }

    /// Validate the configured values
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidConfig`] if either limit is zero.
    pub const fn limits(&self) -> Result<Limits, LimiterError> {
        Limits::new(self.max_concurrency, self.host_concurrency)
    }
}
