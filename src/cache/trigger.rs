//! Cache trigger service.
//!
//! Entry point for call sites: realtime events and mutation completion
//! handlers publish through here, and may consume immediately.

use std::sync::Arc;

use tracing::debug;

use super::config::CacheConfig;
use super::consumer::EventConsumer;
use super::events::{ChangeEvent, EventKind, EventQueue};
use super::groups::InvalidationGroup;
use super::store::CacheStore;

/// Publishes change events and drives consumption.
///
/// # Usage
///
/// ```ignore
/// // After the "delete repository" dialog's request succeeds:
/// trigger.mutation_succeeded(EventKind::RepositoryDeleted, Some(&repo.key));
/// ```
pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<EventConsumer>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<EventConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Wire a queue and consumer in front of `store`.
    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let max_len = config.max_event_queue_len_non_zero().get();
        let queue = Arc::new(EventQueue::new_with_limit(max_len));
        let consumer = Arc::new(EventConsumer::new(config.clone(), store, queue.clone()));
        Self::new(config, queue, consumer)
    }

    /// Publish an event and optionally consume immediately.
    ///
    /// With `consume_now` false the event waits for the background consume
    /// timer or the next explicit consumption.
    pub fn trigger(&self, event: ChangeEvent, consume_now: bool) {
        if !self.config.is_enabled() {
            debug!(event_type = %event.event_type, "Cache trigger skipped: cache disabled");
            return;
        }

        self.queue.publish(event);

        if consume_now {
            self.consumer.consume();
        }
    }

    /// A local mutation finished; invalidate what it touched right away.
    pub fn mutation_succeeded(&self, kind: EventKind, entity_id: Option<&str>) {
        let event = match entity_id {
            Some(id) => ChangeEvent::new(kind).with_entity(id),
            None => ChangeEvent::new(kind),
        };
        self.trigger(event, true);
    }

    /// Invalidate a group directly, bypassing the queue.
    pub fn invalidate_group(&self, group: InvalidationGroup) {
        if !self.config.is_enabled() {
            debug!(group = group.name(), "Cache trigger skipped: cache disabled");
            return;
        }
        group.invalidate(self.consumer.store());
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<EventConsumer> {
        &self.consumer
    }
}
