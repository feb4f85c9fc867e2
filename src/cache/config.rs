//! Result cache configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;
use time::Duration;

const DEFAULT_CAPACITY: usize = 256;
const DEFAULT_TTL_SECONDS: u64 = 300;

/// `[result_cache]` section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResultCacheConfig {
    pub enabled: bool,
    /// Maximum cached pages across all signatures.
    pub capacity: usize,
    pub ttl_seconds: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl ResultCacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
    }
}
