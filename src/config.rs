//! Dispatcher configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUNCH_DELAY_MS, DEFAULT_MAX_BUNCH_SIZE, DEFAULT_MAX_CONCURRENT_GROUPS,
    DEFAULT_MIN_BUNCH_SIZE, DEFAULT_MIN_CONCURRENT_GROUPS, DEFAULT_UNIT_DELAY_MS,
};
use crate::error::{BunchError, Result};

/// Limits and simulated latencies for a [`Dispatcher`](crate::Dispatcher).
///
/// # Defaults
///
/// | Setting                 | Default | Description                                  |
/// |-------------------------|---------|----------------------------------------------|
/// | `unit_delay`            | 2s      | Latency of the single-unit fast path         |
/// | `bunch_delay`           | 1s      | Latency paid before each unit of a group     |
/// | `min_bunch_size`        | 2       | Smaller batches must use the fast path       |
/// | `max_bunch_size`        | 4       | Larger batches are rejected                  |
/// | `min_concurrent_groups` | 2       | Groups `solve_all` keeps in flight           |
/// | `max_concurrent_groups` | 4       | Registry capacity                            |
/// | `group_ttl`             | none    | Idle groups older than this get evicted      |
///
/// # Example Configuration File
///
/// ```toml
/// unit_delay_ms = 500
/// bunch_delay_ms = 250
/// max_bunch_size = 8
/// max_concurrent_groups = 16
/// group_ttl_ms = 60000
/// ```
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use taskbunch::BunchConfig;
///
/// let config = BunchConfig::default()
///     .with_bunch_delay(Duration::from_millis(10))
///     .with_max_concurrent_groups(8);
/// assert_eq!(config.max_bunch_size, 4);
/// assert_eq!(config.max_concurrent_groups, 8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BunchConfig {
    /// Latency of the single-unit fast path.
    #[serde(rename = "unit_delay_ms", with = "millis")]
    pub unit_delay: Duration,

    /// Latency paid before computing each unit of a group.
    #[serde(rename = "bunch_delay_ms", with = "millis")]
    pub bunch_delay: Duration,

    /// Smallest batch `submit` accepts.
    pub min_bunch_size: usize,

    /// Largest batch `submit` accepts.
    pub max_bunch_size: usize,

    /// Groups `solve_all` keeps in flight at once. Leaves the rest of the
    /// registry capacity to other callers sharing the dispatcher.
    pub min_concurrent_groups: usize,

    /// Maximum groups registered at once.
    pub max_concurrent_groups: usize,

    /// Groups neither admitted nor polled within this window are evicted
    /// at the next admission. `None` keeps groups until harvested.
    #[serde(rename = "group_ttl_ms", with = "millis_opt")]
    pub group_ttl: Option<Duration>,
}

impl Default for BunchConfig {
    fn default() -> Self {
        Self {
            unit_delay: Duration::from_millis(DEFAULT_UNIT_DELAY_MS),
            bunch_delay: Duration::from_millis(DEFAULT_BUNCH_DELAY_MS),
            min_bunch_size: DEFAULT_MIN_BUNCH_SIZE,
            max_bunch_size: DEFAULT_MAX_BUNCH_SIZE,
            min_concurrent_groups: DEFAULT_MIN_CONCURRENT_GROUPS,
            max_concurrent_groups: DEFAULT_MAX_CONCURRENT_GROUPS,
            group_ttl: None,
        }
    }
}

impl BunchConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    ///
    /// The loaded configuration is validated before it is returned.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BunchError::invalid_config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string. Missing keys keep their
    /// defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BunchError::invalid_config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the limits are usable together.
    pub fn validate(&self) -> Result<()> {
        if self.min_bunch_size < 2 {
            return Err(BunchError::invalid_config(
                "min_bunch_size must be at least 2; single tasks use the fast path",
            ));
        }
        if self.max_bunch_size < self.min_bunch_size {
            return Err(BunchError::invalid_config(format!(
                "max_bunch_size ({}) is below min_bunch_size ({})",
                self.max_bunch_size, self.min_bunch_size
            )));
        }
        if self.min_concurrent_groups == 0 {
            return Err(BunchError::invalid_config(
                "min_concurrent_groups must be at least 1",
            ));
        }
        if self.max_concurrent_groups < self.min_concurrent_groups {
            return Err(BunchError::invalid_config(format!(
                "max_concurrent_groups ({}) is below min_concurrent_groups ({})",
                self.max_concurrent_groups, self.min_concurrent_groups
            )));
        }
        if self.group_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(BunchError::invalid_config("group_ttl must be non-zero"));
        }
        Ok(())
    }

    /// Set the fast-path latency.
    pub fn with_unit_delay(mut self, delay: Duration) -> Self {
        self.unit_delay = delay;
        self
    }

    /// Set the per-unit latency inside a group.
    pub fn with_bunch_delay(mut self, delay: Duration) -> Self {
        self.bunch_delay = delay;
        self
    }

    /// Set the accepted batch size range.
    pub fn with_bunch_size(mut self, min: usize, max: usize) -> Self {
        self.min_bunch_size = min;
        self.max_bunch_size = max;
        self
    }

    /// Set the number of groups `solve_all` keeps in flight.
    pub fn with_min_concurrent_groups(mut self, count: usize) -> Self {
        self.min_concurrent_groups = count;
        self
    }

    /// Set the registry capacity.
    pub fn with_max_concurrent_groups(mut self, count: usize) -> Self {
        self.max_concurrent_groups = count;
        self
    }

    /// Evict groups left idle for longer than `ttl`.
    pub fn with_group_ttl(mut self, ttl: Duration) -> Self {
        self.group_ttl = Some(ttl);
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::millis::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
