//! End-to-end invalidation behaviour through the public API.
//!
//! A recording store stands in for the console's cached-query store so the
//! exact sequence of `invalidate` calls can be asserted.

use std::sync::{Arc, Mutex};

use artifact_console::cache::{
    CacheConfig, CacheKey, CacheStore, CacheTrigger, ChangeEvent, EventKind, InvalidationGroup,
    QueryKey, QueryStore, group_keys, handle_event, invalidate_group, keys_for_event,
    resolve_group_for_event, router,
};

#[derive(Default)]
struct RecordingStore {
    calls: Mutex<Vec<CacheKey>>,
}

impl RecordingStore {
    fn calls(&self) -> Vec<CacheKey> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CacheStore for RecordingStore {
    fn invalidate(&self, key: &CacheKey) {
        self.calls.lock().expect("calls lock").push(key.clone());
    }
}

fn key(segments: &[&str]) -> CacheKey {
    CacheKey::from_segments(segments.iter().copied())
}

#[test]
fn repository_deleted_invalidates_six_repository_keys() {
    let store = RecordingStore::default();

    handle_event(&store, "repository.deleted");

    let calls = store.calls();
    assert_eq!(calls.len(), 6);
    assert!(calls.contains(&key(&["repositories"])));
    assert!(calls.contains(&key(&["recent-repositories"])));
    assert_eq!(calls, group_keys("repositories"));
}

#[test]
fn group_member_added_invalidates_groups_and_permissions() {
    let store = RecordingStore::default();

    handle_event(&store, "group.member_added");

    assert_eq!(
        resolve_group_for_event("group.member_added"),
        Some(InvalidationGroup::Groups)
    );
    assert_eq!(
        store.calls(),
        vec![key(&["admin-groups"]), key(&["admin-permissions"])]
    );
}

#[test]
fn unknown_event_type_makes_no_store_calls() {
    let store = RecordingStore::default();

    handle_event(&store, "widget.rotated");
    handle_event(&store, "");

    assert!(store.calls().is_empty());
    assert!(keys_for_event("widget.rotated").is_empty());
    assert!(keys_for_event("").is_empty());
    assert_eq!(resolve_group_for_event("widget.rotated"), None);
}

#[test]
fn keys_for_event_is_pure() {
    for (event_type, _) in router::event_routes() {
        assert_eq!(keys_for_event(event_type), keys_for_event(event_type));
    }
}

#[test]
fn every_routed_event_resolves_to_its_group_keys() {
    for (event_type, group) in router::event_routes() {
        let store = RecordingStore::default();
        handle_event(&store, event_type);
        assert_eq!(store.calls(), group.cache_keys(), "{event_type}");
    }
}

#[test]
fn duplicate_delivery_repeats_the_same_call_set() {
    let store = RecordingStore::default();

    handle_event(&store, "token.revoked");
    handle_event(&store, "token.revoked");

    assert_eq!(store.calls(), vec![key(&["api-tokens"]), key(&["api-tokens"])]);
}

#[test]
fn invalidate_group_by_name_follows_declared_order() {
    let store = RecordingStore::default();

    invalidate_group(&store, "security");
    invalidate_group(&store, "no-such-group");

    assert_eq!(
        store.calls(),
        vec![
            key(&["security-scans"]),
            key(&["security-policies"]),
            key(&["security", "dashboard"]),
            key(&["dashboard-stats"]),
        ]
    );
}

#[test]
fn queued_batch_invalidates_overlapping_keys_once() {
    let recording = Arc::new(RecordingStore::default());
    let trigger = CacheTrigger::with_store(CacheConfig::default(), recording.clone());

    // Both groups contain dashboard-stats and storage-usage.
    trigger.trigger(ChangeEvent::new(EventKind::RepositoryCreated), false);
    trigger.trigger(ChangeEvent::new(EventKind::ArtifactUploaded), false);
    trigger.trigger(ChangeEvent::new(EventKind::parse("widget.rotated")), false);
    assert!(trigger.consumer().consume());

    let calls = recording.calls();
    let dashboard = QueryKey::DashboardStats.cache_key();
    assert_eq!(calls.iter().filter(|k| **k == dashboard).count(), 1);
    assert!(calls.contains(&QueryKey::Packages.cache_key()));
    assert!(calls.contains(&QueryKey::VirtualMembers.cache_key()));
    assert_eq!(calls.len(), 9);
}

#[test]
fn redelivered_event_id_is_applied_once_per_batch() {
    let recording = Arc::new(RecordingStore::default());
    let trigger = CacheTrigger::with_store(CacheConfig::default(), recording.clone());

    let event = ChangeEvent::new(EventKind::WebhookDelivered).with_entity("hook-7");
    trigger.trigger(event.clone(), false);
    trigger.trigger(event, false);
    trigger.consumer().consume_all();

    assert_eq!(
        recording.calls(),
        vec![
            QueryKey::Webhooks.cache_key(),
            QueryKey::WebhookDeliveries.cache_key(),
        ]
    );
}

#[test]
fn parameterised_entries_go_stale_with_their_list_key() {
    let config = CacheConfig::default();
    let store = Arc::new(QueryStore::new(&config));
    let detail = QueryKey::Repositories.child("maven-central");
    store.set(QueryKey::Repositories.cache_key(), serde_json::json!([]));
    store.set(detail.clone(), serde_json::json!({"key": "maven-central"}));
    store.set(QueryKey::Plugins.cache_key(), serde_json::json!([]));
    store.subscribe(&detail);

    let trigger = CacheTrigger::with_store(config, store.clone());
    trigger.mutation_succeeded(EventKind::RepositoryUpdated, Some("maven-central"));

    assert_eq!(store.is_stale(&detail), Some(true));
    assert_eq!(store.is_stale(&QueryKey::Plugins.cache_key()), Some(false));
    assert_eq!(store.take_refetches(), vec![detail]);
}
