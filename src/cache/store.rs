//! Cache store interface and the in-process query store.
//!
//! The router only ever talks to a store through [`CacheStore::invalidate`].
//! [`QueryStore`] is the reference implementation: an LRU-bounded map of query
//! results that marks entries stale by key prefix and queues observed entries
//! for background refetch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_QUERY_STORE_STALE_TOTAL: &str = "console_query_store_stale_total";

/// The one operation the invalidation layer needs from a cached-query store.
///
/// Implementations must not block and must tolerate redundant calls for a key
/// that is already stale.
pub trait CacheStore: Send + Sync {
    /// Mark `key` (and anything it prefixes) stale.
    fn invalidate(&self, key: &CacheKey);
}

impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    fn invalidate(&self, key: &CacheKey) {
        (**self).invalidate(key);
    }
}

/// Point-in-time view of one cached query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub data: Value,
    pub fetched_at: OffsetDateTime,
    pub stale: bool,
    pub observers: usize,
}

#[derive(Debug)]
struct QueryEntry {
    data: Value,
    fetched_at: OffsetDateTime,
    stale: bool,
    observers: usize,
}

impl QueryEntry {
    fn pending() -> Self {
        Self {
            data: Value::Null,
            fetched_at: OffsetDateTime::UNIX_EPOCH,
            stale: true,
            observers: 0,
        }
    }

    fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            data: self.data.clone(),
            fetched_at: self.fetched_at,
            stale: self.stale,
            observers: self.observers,
        }
    }
}

/// In-process cached-query store.
pub struct QueryStore {
    entries: RwLock<LruCache<CacheKey, QueryEntry>>,
    refetch: Mutex<VecDeque<CacheKey>>,
}

impl QueryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.query_store_limit_non_zero())),
            refetch: Mutex::new(VecDeque::new()),
        }
    }

    /// Store a freshly fetched result, clearing any stale mark.
    pub fn set(&self, key: CacheKey, data: Value) {
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        let observers = entries.peek(&key).map_or(0, |entry| entry.observers);
        entries.put(
            key,
            QueryEntry {
                data,
                fetched_at: OffsetDateTime::now_utc(),
                stale: false,
                observers,
            },
        );
    }

    pub fn get(&self, key: &CacheKey) -> Option<QuerySnapshot> {
        rw_write(&self.entries, SOURCE, "get")
            .get(key)
            .map(QueryEntry::snapshot)
    }

    /// Returns whether `key` is stale, or `None` if it is not cached.
    pub fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        rw_read(&self.entries, SOURCE, "is_stale")
            .peek(key)
            .map(|entry| entry.stale)
    }

    /// Register a live consumer of `key`.
    ///
    /// A consumer that mounts before the first fetch gets a pending entry.
    pub fn subscribe(&self, key: &CacheKey) {
        let mut entries = rw_write(&self.entries, SOURCE, "subscribe");
        match entries.get_mut(key) {
            Some(entry) => entry.observers += 1,
            None => {
                let mut entry = QueryEntry::pending();
                entry.observers = 1;
                entries.put(key.clone(), entry);
            }
        }
    }

    pub fn unsubscribe(&self, key: &CacheKey) {
        if let Some(entry) = rw_write(&self.entries, SOURCE, "unsubscribe").get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    /// Stale keys in key order.
    pub fn stale_keys(&self) -> Vec<CacheKey> {
        let entries = rw_read(&self.entries, SOURCE, "stale_keys");
        let mut keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Drain the keys whose observers should refetch, in the order they went stale.
    pub fn take_refetches(&self) -> Vec<CacheKey> {
        mutex_lock(&self.refetch, SOURCE, "take_refetches")
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
        mutex_lock(&self.refetch, SOURCE, "clear").clear();
    }
}

impl CacheStore for QueryStore {
    fn invalidate(&self, key: &CacheKey) {
        let mut marked = 0usize;
        let mut observed = Vec::new();
        {
            let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
            for (candidate, entry) in entries.iter_mut() {
                if !candidate.starts_with(key) {
                    continue;
                }
                if !entry.stale {
                    entry.stale = true;
                    marked += 1;
                }
                if entry.observers > 0 {
                    observed.push(candidate.clone());
                }
            }
        }

        if !observed.is_empty() {
            let mut refetch = mutex_lock(&self.refetch, SOURCE, "invalidate.refetch");
            for candidate in observed {
                if !refetch.contains(&candidate) {
                    refetch.push_back(candidate);
                }
            }
        }

        if marked > 0 {
            counter!(METRIC_QUERY_STORE_STALE_TOTAL).increment(marked as u64);
        }
        debug!(key = %key, marked, "Query store invalidated");
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use serde_json::json;

    use super::*;
    use crate::cache::keys::QueryKey;

    fn store() -> QueryStore {
        QueryStore::new(&CacheConfig::default())
    }

    #[test]
    fn set_and_get() {
        let store = store();
        let key = QueryKey::AdminUsers.cache_key();
        store.set(key.clone(), json!([{"name": "admin"}]));

        let snapshot = store.get(&key).expect("cached");
        assert_eq!(snapshot.data, json!([{"name": "admin"}]));
        assert!(!snapshot.stale);
    }

    #[test]
    fn invalidate_marks_prefix_matches_stale() {
        let store = store();
        let list = QueryKey::Repositories.cache_key();
        let detail = QueryKey::Repositories.child("npm-proxy");
        let recent = QueryKey::RecentRepositories.cache_key();
        store.set(list.clone(), json!([]));
        store.set(detail.clone(), json!({}));
        store.set(recent.clone(), json!([]));

        store.invalidate(&list);

        assert_eq!(store.is_stale(&list), Some(true));
        assert_eq!(store.is_stale(&detail), Some(true));
        assert_eq!(store.is_stale(&recent), Some(false));
    }

    #[test]
    fn invalidate_missing_key_is_no_op() {
        let store = store();
        store.invalidate(&QueryKey::Plugins.cache_key());
        assert!(store.is_empty());
        assert!(store.take_refetches().is_empty());
    }

    #[test]
    fn observed_entries_are_queued_for_refetch_once() {
        let store = store();
        let observed = QueryKey::Webhooks.cache_key();
        let unobserved = QueryKey::WebhookDeliveries.cache_key();
        store.set(observed.clone(), json!([]));
        store.set(unobserved.clone(), json!([]));
        store.subscribe(&observed);

        store.invalidate(&observed);
        store.invalidate(&observed);
        store.invalidate(&unobserved);

        assert_eq!(store.take_refetches(), vec![observed]);
        assert!(store.take_refetches().is_empty());
    }

    #[test]
    fn set_clears_stale_and_keeps_observers() {
        let store = store();
        let key = QueryKey::Backups.cache_key();
        store.subscribe(&key);
        assert_eq!(store.is_stale(&key), Some(true));

        store.set(key.clone(), json!(["nightly"]));
        let snapshot = store.get(&key).expect("cached");
        assert!(!snapshot.stale);
        assert_eq!(snapshot.observers, 1);

        store.unsubscribe(&key);
        store.unsubscribe(&key);
        assert_eq!(store.get(&key).expect("cached").observers, 0);
    }

    #[test]
    fn stale_keys_are_sorted() {
        let store = store();
        for key in [QueryKey::Webhooks, QueryKey::AdminGroups, QueryKey::Plugins] {
            store.set(key.cache_key(), json!(null));
            store.invalidate(&key.cache_key());
        }
        assert_eq!(
            store.stale_keys(),
            vec![
                QueryKey::AdminGroups.cache_key(),
                QueryKey::Plugins.cache_key(),
                QueryKey::Webhooks.cache_key(),
            ]
        );
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let config = CacheConfig {
            query_store_limit: 2,
            ..Default::default()
        };
        let store = QueryStore::new(&config);
        store.set(QueryKey::Artifacts.cache_key(), json!(1));
        store.set(QueryKey::Packages.cache_key(), json!(2));
        store.set(QueryKey::Backups.cache_key(), json!(3));

        assert_eq!(store.len(), 2);
        assert!(store.get(&QueryKey::Artifacts.cache_key()).is_none());
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = store();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set(QueryKey::Plugins.cache_key(), json!([]));
        assert_eq!(store.len(), 1);
    }
}
