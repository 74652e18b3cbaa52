//! Invalidation groups.
//!
//! A group bundles the cache keys that change together when one kind of
//! domain entity changes. Groups are static data; an unknown group name
//! resolves to no keys at all.

use std::fmt;

use metrics::counter;
use tracing::debug;

use super::keys::{CacheKey, QueryKey};
use super::store::CacheStore;

const METRIC_CACHE_INVALIDATE_TOTAL: &str = "console_cache_invalidate_total";

/// Named bundle of cache keys invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InvalidationGroup {
    Repositories,
    Artifacts,
    Users,
    Groups,
    Permissions,
    Tokens,
    Webhooks,
    Security,
    Replication,
    Backups,
    Settings,
    Plugins,
    Lifecycle,
}

impl InvalidationGroup {
    pub const ALL: [InvalidationGroup; 13] = [
        InvalidationGroup::Repositories,
        InvalidationGroup::Artifacts,
        InvalidationGroup::Users,
        InvalidationGroup::Groups,
        InvalidationGroup::Permissions,
        InvalidationGroup::Tokens,
        InvalidationGroup::Webhooks,
        InvalidationGroup::Security,
        InvalidationGroup::Replication,
        InvalidationGroup::Backups,
        InvalidationGroup::Settings,
        InvalidationGroup::Plugins,
        InvalidationGroup::Lifecycle,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            InvalidationGroup::Repositories => "repositories",
            InvalidationGroup::Artifacts => "artifacts",
            InvalidationGroup::Users => "users",
            InvalidationGroup::Groups => "groups",
            InvalidationGroup::Permissions => "permissions",
            InvalidationGroup::Tokens => "tokens",
            InvalidationGroup::Webhooks => "webhooks",
            InvalidationGroup::Security => "security",
            InvalidationGroup::Replication => "replication",
            InvalidationGroup::Backups => "backups",
            InvalidationGroup::Settings => "settings",
            InvalidationGroup::Plugins => "plugins",
            InvalidationGroup::Lifecycle => "lifecycle",
        }
    }

    /// Member keys in invalidation order.
    pub const fn keys(self) -> &'static [QueryKey] {
        match self {
            InvalidationGroup::Repositories => &[
                QueryKey::Repositories,
                QueryKey::RecentRepositories,
                QueryKey::VirtualMembers,
                QueryKey::DashboardStats,
                QueryKey::StorageUsage,
                QueryKey::AdminPermissions,
            ],
            InvalidationGroup::Artifacts => &[
                QueryKey::Artifacts,
                QueryKey::RecentArtifacts,
                QueryKey::Packages,
                QueryKey::DashboardStats,
                QueryKey::StorageUsage,
            ],
            InvalidationGroup::Users => &[
                QueryKey::AdminUsers,
                QueryKey::AdminGroups,
                QueryKey::ApiTokens,
            ],
            InvalidationGroup::Groups => &[QueryKey::AdminGroups, QueryKey::AdminPermissions],
            InvalidationGroup::Permissions => &[QueryKey::AdminPermissions],
            InvalidationGroup::Tokens => &[QueryKey::ApiTokens],
            InvalidationGroup::Webhooks => &[QueryKey::Webhooks, QueryKey::WebhookDeliveries],
            InvalidationGroup::Security => &[
                QueryKey::SecurityScans,
                QueryKey::SecurityPolicies,
                QueryKey::SecurityDashboard,
                QueryKey::DashboardStats,
            ],
            InvalidationGroup::Replication => &[QueryKey::ReplicationPeers, QueryKey::SystemHealth],
            InvalidationGroup::Backups => &[QueryKey::Backups, QueryKey::StorageUsage],
            InvalidationGroup::Settings => &[QueryKey::SystemSettings],
            InvalidationGroup::Plugins => &[QueryKey::Plugins],
            InvalidationGroup::Lifecycle => &[QueryKey::LifecyclePolicies, QueryKey::StorageUsage],
        }
    }

    /// Member keys as structural cache keys.
    pub fn cache_keys(self) -> Vec<CacheKey> {
        self.keys().iter().map(|key| key.cache_key()).collect()
    }

    pub fn from_name(name: &str) -> Option<InvalidationGroup> {
        InvalidationGroup::ALL
            .into_iter()
            .find(|group| group.name() == name)
    }

    /// Issue one invalidation per member key, in declared order.
    pub fn invalidate<S>(self, store: &S)
    where
        S: CacheStore + ?Sized,
    {
        for key in self.keys() {
            let cache_key = key.cache_key();
            debug!(group = self.name(), key = %cache_key, "Invalidating cache key");
            store.invalidate(&cache_key);
            counter!(METRIC_CACHE_INVALIDATE_TOTAL, "source" => "direct").increment(1);
        }
    }
}

impl fmt::Display for InvalidationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keys of the named group; empty for an unknown name.
pub fn group_keys(group_name: &str) -> Vec<CacheKey> {
    InvalidationGroup::from_name(group_name)
        .map(InvalidationGroup::cache_keys)
        .unwrap_or_default()
}

/// Invalidate every key of the named group against `store`.
///
/// An unknown name is logged and otherwise ignored.
pub fn invalidate_group<S>(store: &S, group_name: &str)
where
    S: CacheStore + ?Sized,
{
    match InvalidationGroup::from_name(group_name) {
        Some(group) => group.invalidate(store),
        None => debug!(group = group_name, "Unknown invalidation group ignored"),
    }
}
