//! Result cache storage.

use std::sync::RwLock;

use eventscout_api_types::SearchResponse;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;

use crate::application::freshness::FreshnessPolicy;
use crate::domain::signature::QuerySignature;

use super::config::ResultCacheConfig;
use super::keys::ResultKey;
use super::lock::{rw_read, rw_write};
use super::{METRIC_HIT, METRIC_MISS};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone)]
struct Entry {
    response: SearchResponse,
    stored_at: OffsetDateTime,
}

/// LRU of assembled search responses.
pub struct ResultCache {
    entries: RwLock<LruCache<ResultKey, Entry>>,
    policy: FreshnessPolicy,
}

impl ResultCache {
    pub fn new(config: &ResultCacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            policy: FreshnessPolicy::new(config.ttl()),
        }
    }

    pub fn get(&self, key: &ResultKey) -> Option<SearchResponse> {
        self.get_at(key, OffsetDateTime::now_utc())
    }

    pub fn set(&self, key: ResultKey, response: SearchResponse) {
        self.set_at(key, response, OffsetDateTime::now_utc());
    }

    pub(crate) fn get_at(&self, key: &ResultKey, now: OffsetDateTime) -> Option<SearchResponse> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let hit = match entries.get(key) {
            Some(entry) if self.policy.is_within(entry.stored_at, now) => {
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };

        if hit.is_some() {
            counter!(METRIC_HIT).increment(1);
        } else {
            counter!(METRIC_MISS).increment(1);
        }
        hit
    }

    pub(crate) fn set_at(&self, key: ResultKey, response: SearchResponse, now: OffsetDateTime) {
        rw_write(&self.entries, SOURCE, "set").put(
            key,
            Entry {
                response,
                stored_at: now,
            },
        );
    }

    /// Drop every page cached for `signature`.
    pub fn invalidate_signature(&self, signature: &QuerySignature) {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_signature");
        let stale: Vec<ResultKey> = entries
            .iter()
            .filter(|(key, _)| &key.signature == signature)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
