//! Invalidation plan generation.
//!
//! Merges a batch of change events into one ordered, deduplicated set of keys.

use std::collections::HashSet;
use std::fmt;

use super::events::QueuedEvent;
use super::groups::InvalidationGroup;
use super::keys::CacheKey;
use super::router::route;

/// Work produced from one batch of events.
#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Events in the batch after dropping redelivered ids.
    pub event_count: usize,
    /// Redelivered events skipped by id.
    pub duplicate_count: usize,
    /// Groups to invalidate, in the order their first event arrived.
    pub groups: Vec<InvalidationGroup>,
    /// Keys to invalidate, flattened from `groups` with repeats removed.
    pub keys: Vec<CacheKey>,
    /// Wire types of events that route nowhere.
    pub unrouted: Vec<String>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<&str> = self.groups.iter().map(|group| group.name()).collect();
        write!(
            f,
            "InvalidationPlan {{ events: {}, duplicates: {}, groups: [{}], keys: {}, unrouted: {} }}",
            self.event_count,
            self.duplicate_count,
            groups.join(", "),
            self.keys.len(),
            self.unrouted.len(),
        )
    }
}

impl InvalidationPlan {
    /// Merge a batch into a plan.
    ///
    /// - Orders by epoch
    /// - Dedupes by event id
    /// - Unions groups, keeping first-seen order
    pub fn from_events(mut events: Vec<QueuedEvent>) -> Self {
        events.sort_by_key(|queued| queued.epoch);

        let mut plan = Self::default();
        let mut seen_ids = HashSet::new();
        let mut seen_groups = HashSet::new();

        for queued in events {
            if !seen_ids.insert(queued.event.id) {
                plan.duplicate_count += 1;
                continue;
            }
            plan.event_count += 1;

            match route(&queued.event.event_type) {
                Some(group) => {
                    if seen_groups.insert(group) {
                        plan.groups.push(group);
                    }
                }
                None => plan.unrouted.push(queued.event.event_type.to_string()),
            }
        }

        let mut seen_keys = HashSet::new();
        for group in &plan.groups {
            for key in group.keys() {
                if seen_keys.insert(*key) {
                    plan.keys.push(key.cache_key());
                }
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
