//! Cache configuration.
//!
//! Controls the query store bound and event consumption via `artifact-console.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_QUERY_STORE_LIMIT: usize = 512;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_MAX_EVENT_QUEUE_LEN: usize = 10_000;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off, events are neither queued nor consumed.
    pub enabled: bool,
    /// Maximum entries held by the query store.
    pub query_store_limit: usize,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
    /// Maximum pending events; the oldest are dropped beyond this.
    pub max_event_queue_len: usize,
    /// Interval (ms) of the background consume timer.
    pub auto_consume_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_store_limit: DEFAULT_QUERY_STORE_LIMIT,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            max_event_queue_len: DEFAULT_MAX_EVENT_QUEUE_LEN,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            query_store_limit: settings.query_store_limit.get(),
            consume_batch_limit: settings.consume_batch_limit.get(),
            max_event_queue_len: settings.max_event_queue_len.get(),
            auto_consume_interval_ms: settings.auto_consume_interval.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Query store bound as `NonZeroUsize`, clamping to 1 if zero.
    pub fn query_store_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.query_store_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Batch size, clamping to 1 so a consume call always makes progress.
    pub fn consume_batch_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.consume_batch_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn max_event_queue_len_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_event_queue_len).unwrap_or(NonZeroUsize::MIN)
    }
}
