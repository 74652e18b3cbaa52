//! Event consumer.
//!
//! Drains the event queue, plans the batch and pushes the planned keys to the
//! cache store.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::planner::InvalidationPlan;
use super::store::CacheStore;

const METRIC_CACHE_CONSUME_MS: &str = "console_cache_consume_ms";
const METRIC_CACHE_INVALIDATE_TOTAL: &str = "console_cache_invalidate_total";
const METRIC_EVENT_UNROUTED_TOTAL: &str = "console_cache_event_unrouted_total";

/// Processes queued change events against a cache store.
pub struct EventConsumer {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    queue: Arc<EventQueue>,
}

impl EventConsumer {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, queue: Arc<EventQueue>) -> Self {
        Self {
            config,
            store,
            queue,
        }
    }

    /// Consume one batch of pending events.
    ///
    /// Returns true if any events were drained.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self
            .queue
            .drain(self.config.consume_batch_limit_non_zero().get());
        if events.is_empty() {
            return false;
        }

        let drained = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|queued| queued.event.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count = drained,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        self.execute(&plan);

        info!(
            event_count = drained,
            invalidated = plan.keys.len(),
            "Cache consumption complete"
        );

        histogram!(METRIC_CACHE_CONSUME_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        true
    }

    /// Consume batches until the queue is empty. Returns the number of batches.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }

    fn execute(&self, plan: &InvalidationPlan) {
        for event_type in &plan.unrouted {
            debug!(event_type = %event_type, "Change event has no invalidation route");
        }
        if !plan.unrouted.is_empty() {
            counter!(METRIC_EVENT_UNROUTED_TOTAL).increment(plan.unrouted.len() as u64);
        }

        for key in &plan.keys {
            debug!(key = %key, "Invalidating cache key");
            self.store.invalidate(key);
        }
        if !plan.keys.is_empty() {
            counter!(METRIC_CACHE_INVALIDATE_TOTAL, "source" => "queue")
                .increment(plan.keys.len() as u64);
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}
