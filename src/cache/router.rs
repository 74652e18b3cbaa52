//! Event routing.
//!
//! Maps each change-event type to the one invalidation group responsible for
//! it. The mapping is an exhaustive `match`, so a new [`EventKind`] variant
//! does not compile until it is routed. Wire types this build does not know
//! route nowhere.

use metrics::counter;
use tracing::debug;

use super::events::{EventKind, KNOWN_EVENT_KINDS};
use super::groups::InvalidationGroup;
use super::keys::CacheKey;
use super::store::CacheStore;

const METRIC_EVENT_UNROUTED_TOTAL: &str = "console_cache_event_unrouted_total";

/// Group responsible for `kind`, or `None` for an unknown event type.
pub fn route(kind: &EventKind) -> Option<InvalidationGroup> {
    let group = match kind {
        EventKind::RepositoryCreated
        | EventKind::RepositoryUpdated
        | EventKind::RepositoryDeleted => InvalidationGroup::Repositories,

        EventKind::ArtifactUploaded | EventKind::ArtifactDeleted | EventKind::ArtifactPromoted => {
            InvalidationGroup::Artifacts
        }

        EventKind::UserCreated | EventKind::UserUpdated | EventKind::UserDeleted => {
            InvalidationGroup::Users
        }

        EventKind::GroupCreated
        | EventKind::GroupUpdated
        | EventKind::GroupDeleted
        | EventKind::GroupMemberAdded
        | EventKind::GroupMemberRemoved => InvalidationGroup::Groups,

        EventKind::PermissionCreated
        | EventKind::PermissionUpdated
        | EventKind::PermissionDeleted => InvalidationGroup::Permissions,

        EventKind::TokenCreated | EventKind::TokenRevoked => InvalidationGroup::Tokens,

        EventKind::WebhookCreated
        | EventKind::WebhookUpdated
        | EventKind::WebhookDeleted
        | EventKind::WebhookDelivered => InvalidationGroup::Webhooks,

        EventKind::ScanCompleted | EventKind::SecurityPolicyUpdated => InvalidationGroup::Security,

        EventKind::ReplicationPeerAdded
        | EventKind::ReplicationPeerRemoved
        | EventKind::ReplicationSyncCompleted => InvalidationGroup::Replication,

        EventKind::BackupCompleted | EventKind::BackupDeleted => InvalidationGroup::Backups,

        EventKind::SettingsUpdated => InvalidationGroup::Settings,

        EventKind::PluginInstalled
        | EventKind::PluginUninstalled
        | EventKind::PluginEnabled
        | EventKind::PluginDisabled => InvalidationGroup::Plugins,

        EventKind::LifecyclePolicyUpdated | EventKind::LifecycleCleanupCompleted => {
            InvalidationGroup::Lifecycle
        }

        EventKind::Other(_) => return None,
    };
    Some(group)
}

/// The event map as `(event type, group)` pairs, in declaration order.
pub fn event_routes() -> impl Iterator<Item = (&'static str, InvalidationGroup)> {
    KNOWN_EVENT_KINDS
        .iter()
        .filter_map(|kind| route(kind).map(|group| (kind.as_str(), group)))
}

/// Resolve the group for a wire event type.
pub fn resolve_group_for_event(event_type: &str) -> Option<InvalidationGroup> {
    route(&EventKind::parse(event_type))
}

/// Keys an event of this type would invalidate. Pure; empty when unmapped.
pub fn keys_for_event(event_type: &str) -> Vec<CacheKey> {
    resolve_group_for_event(event_type)
        .map(InvalidationGroup::cache_keys)
        .unwrap_or_default()
}

/// Invalidate the group routed from `kind`. Returns the group, if any.
pub fn dispatch<S>(store: &S, kind: &EventKind) -> Option<InvalidationGroup>
where
    S: CacheStore + ?Sized,
{
    match route(kind) {
        Some(group) => {
            group.invalidate(store);
            Some(group)
        }
        None => {
            debug!(event_type = %kind, "Change event has no invalidation route");
            counter!(METRIC_EVENT_UNROUTED_TOTAL).increment(1);
            None
        }
    }
}

/// Handle one inbound change event by wire type.
///
/// Safe to call repeatedly for the same event: invalidating a stale key is a
/// no-op at the store.
pub fn handle_event<S>(store: &S, event_type: &str)
where
    S: CacheStore + ?Sized,
{
    dispatch(store, &EventKind::parse(event_type));
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::cache::keys::QueryKey;

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

    #[test]
    fn every_known_kind_is_routed() {
        for kind in KNOWN_EVENT_KINDS {
            assert!(route(kind).is_some(), "{kind} has no route");
        }
        assert_eq!(event_routes().count(), KNOWN_EVENT_KINDS.len());
    }

    #[test]
    fn every_route_targets_a_declared_group() {
        for (event_type, group) in event_routes() {
            assert!(
                InvalidationGroup::ALL.contains(&group),
                "{event_type} routes to undeclared group {group}"
            );
            assert_eq!(InvalidationGroup::from_name(group.name()), Some(group));
        }
    }

    #[test]
    fn repository_deleted_invalidates_repositories_group() {
        assert_eq!(
            resolve_group_for_event("repository.deleted"),
            Some(InvalidationGroup::Repositories)
        );

        let keys = keys_for_event("repository.deleted");
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&CacheKey::from_segments(["repositories"])));
        assert!(keys.contains(&CacheKey::from_segments(["recent-repositories"])));
    }

    #[test]
    fn group_member_added_invalidates_groups_and_permissions() {
        assert_eq!(
            resolve_group_for_event("group.member_added"),
            Some(InvalidationGroup::Groups)
        );
        assert_eq!(
            keys_for_event("group.member_added"),
            vec![
                CacheKey::from_segments(["admin-groups"]),
                CacheKey::from_segments(["admin-permissions"]),
            ]
        );
    }

    #[test]
    fn unknown_event_types_resolve_to_nothing() {
        for event_type in ["widget.rotated", "", "repository", "REPOSITORY.DELETED"] {
            assert_eq!(resolve_group_for_event(event_type), None);
            assert!(keys_for_event(event_type).is_empty());
        }
    }

    #[test]
    fn keys_for_event_is_pure() {
        for (event_type, _) in event_routes() {
            assert_eq!(keys_for_event(event_type), keys_for_event(event_type));
        }
    }

    #[test]
    fn handle_event_invalidates_group_in_order() {
        let store = RecordingStore::default();
        handle_event(&store, "scan.completed");
        assert_eq!(
            store.calls(),
            vec![
                QueryKey::SecurityScans.cache_key(),
                QueryKey::SecurityPolicies.cache_key(),
                QueryKey::SecurityDashboard.cache_key(),
                QueryKey::DashboardStats.cache_key(),
            ]
        );
    }

    #[test]
    fn unrecognised_event_makes_no_store_calls() {
        let store = RecordingStore::default();
        handle_event(&store, "widget.rotated");
        assert!(store.calls().is_empty());
        assert_eq!(
            dispatch(&store, &EventKind::Other("widget.rotated".into())),
            None
        );
    }

    #[test]
    fn duplicate_delivery_repeats_the_same_calls() {
        let store = RecordingStore::default();
        handle_event(&store, "token.revoked");
        handle_event(&store, "token.revoked");
        assert_eq!(
            store.calls(),
            vec![QueryKey::ApiTokens.cache_key(), QueryKey::ApiTokens.cache_key()]
        );
    }

    #[test]
    fn handle_event_matches_keys_for_event() {
        for (event_type, _) in event_routes() {
            let store = RecordingStore::default();
            handle_event(&store, event_type);
            assert_eq!(store.calls(), keys_for_event(event_type));
        }
    }
}
