//! In-process cache of assembled search pages.
//!
//! Entries are keyed by query signature plus the page parameters that do not
//! participate in the signature, bounded by an LRU, and expire under the same
//! [`FreshnessPolicy`](crate::application::freshness::FreshnessPolicy) type
//! used for execution records. All entries of a signature are dropped when a
//! refresh for it is triggered or completes, or when its execution record is
//! found stale on lookup.
//!
//! ```toml
//! [result_cache]
//! enabled = true
//! capacity = 256
//! ttl_seconds = 300
//! ```

mod config;
mod keys;
mod lock;
mod store;

pub use config::ResultCacheConfig;
pub use keys::{ResultKey, hash_value};
pub use store::ResultCache;

pub const METRIC_HIT: &str = "eventscout_result_cache_hit_total";
pub const METRIC_MISS: &str = "eventscout_result_cache_miss_total";
