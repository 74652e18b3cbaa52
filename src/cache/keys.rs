//! Cache key definitions.
//!
//! `CacheKey` is the structural identifier the query store indexes fetched data
//! by. `QueryKey` is the fixed catalogue of symbolic names for those keys; the
//! fetch layer and the invalidation layer both build keys from it so that the
//! two can never disagree on spelling.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Ordered sequence of string segments identifying one cached query result.
///
/// Equality, hashing and ordering are segment by segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// Build a key from any sequence of segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one segment, producing a more specific key.
    ///
    /// `["repositories"]` becomes `["repositories", "<id>"]`.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Returns true if `prefix` matches the leading segments of this key.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment:?}")?;
        }
        f.write_str("]")
    }
}

impl From<QueryKey> for CacheKey {
    fn from(key: QueryKey) -> Self {
        key.cache_key()
    }
}

/// Named cache keys used by the admin console.
///
/// Adding a key is a code change: add the variant, its name and its segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    // Repositories
    Repositories,
    RecentRepositories,
    VirtualMembers,
    LifecyclePolicies,

    // Artifacts
    Artifacts,
    RecentArtifacts,
    Packages,

    // Dashboard
    DashboardStats,
    StorageUsage,

    // Access control
    AdminUsers,
    AdminGroups,
    AdminPermissions,
    ApiTokens,

    // Integrations
    Webhooks,
    WebhookDeliveries,
    ReplicationPeers,
    Plugins,

    // Security
    SecurityScans,
    SecurityPolicies,
    SecurityDashboard,

    // System
    Backups,
    SystemSettings,
    SystemHealth,
}

impl QueryKey {
    /// Every declared key, in declaration order.
    pub const ALL: [QueryKey; 23] = [
        QueryKey::Repositories,
        QueryKey::RecentRepositories,
        QueryKey::VirtualMembers,
        QueryKey::LifecyclePolicies,
        QueryKey::Artifacts,
        QueryKey::RecentArtifacts,
        QueryKey::Packages,
        QueryKey::DashboardStats,
        QueryKey::StorageUsage,
        QueryKey::AdminUsers,
        QueryKey::AdminGroups,
        QueryKey::AdminPermissions,
        QueryKey::ApiTokens,
        QueryKey::Webhooks,
        QueryKey::WebhookDeliveries,
        QueryKey::ReplicationPeers,
        QueryKey::Plugins,
        QueryKey::SecurityScans,
        QueryKey::SecurityPolicies,
        QueryKey::SecurityDashboard,
        QueryKey::Backups,
        QueryKey::SystemSettings,
        QueryKey::SystemHealth,
    ];

    /// Symbolic constant name, e.g. `ADMIN_USERS`.
    pub const fn name(self) -> &'static str {
        match self {
            QueryKey::Repositories => "REPOSITORIES",
            QueryKey::RecentRepositories => "RECENT_REPOSITORIES",
            QueryKey::VirtualMembers => "VIRTUAL_MEMBERS",
            QueryKey::LifecyclePolicies => "LIFECYCLE_POLICIES",
            QueryKey::Artifacts => "ARTIFACTS",
            QueryKey::RecentArtifacts => "RECENT_ARTIFACTS",
            QueryKey::Packages => "PACKAGES",
            QueryKey::DashboardStats => "DASHBOARD_STATS",
            QueryKey::StorageUsage => "STORAGE_USAGE",
            QueryKey::AdminUsers => "ADMIN_USERS",
            QueryKey::AdminGroups => "ADMIN_GROUPS",
            QueryKey::AdminPermissions => "ADMIN_PERMISSIONS",
            QueryKey::ApiTokens => "API_TOKENS",
            QueryKey::Webhooks => "WEBHOOKS",
            QueryKey::WebhookDeliveries => "WEBHOOK_DELIVERIES",
            QueryKey::ReplicationPeers => "REPLICATION_PEERS",
            QueryKey::Plugins => "PLUGINS",
            QueryKey::SecurityScans => "SECURITY_SCANS",
            QueryKey::SecurityPolicies => "SECURITY_POLICIES",
            QueryKey::SecurityDashboard => "SECURITY_DASHBOARD",
            QueryKey::Backups => "BACKUPS",
            QueryKey::SystemSettings => "SYSTEM_SETTINGS",
            QueryKey::SystemHealth => "SYSTEM_HEALTH",
        }
    }

    /// Raw segments of the key.
    pub const fn segments(self) -> &'static [&'static str] {
        match self {
            QueryKey::Repositories => &["repositories"],
            QueryKey::RecentRepositories => &["recent-repositories"],
            QueryKey::VirtualMembers => &["virtual-members"],
            QueryKey::LifecyclePolicies => &["lifecycle-policies"],
            QueryKey::Artifacts => &["artifacts"],
            QueryKey::RecentArtifacts => &["recent-artifacts"],
            QueryKey::Packages => &["packages"],
            QueryKey::DashboardStats => &["dashboard-stats"],
            QueryKey::StorageUsage => &["storage-usage"],
            QueryKey::AdminUsers => &["admin-users"],
            QueryKey::AdminGroups => &["admin-groups"],
            QueryKey::AdminPermissions => &["admin-permissions"],
            QueryKey::ApiTokens => &["api-tokens"],
            QueryKey::Webhooks => &["webhooks"],
            QueryKey::WebhookDeliveries => &["webhook-deliveries"],
            QueryKey::ReplicationPeers => &["replication-peers"],
            QueryKey::Plugins => &["plugins"],
            QueryKey::SecurityScans => &["security-scans"],
            QueryKey::SecurityPolicies => &["security-policies"],
            QueryKey::SecurityDashboard => &["security", "dashboard"],
            QueryKey::Backups => &["backups"],
            QueryKey::SystemSettings => &["system", "settings"],
            QueryKey::SystemHealth => &["system", "health"],
        }
    }

    /// The structural key this name stands for.
    pub fn cache_key(self) -> CacheKey {
        CacheKey::from_segments(self.segments().iter().copied())
    }

    /// Key for one parameterised query under this name, e.g. a single repository.
    pub fn child(self, segment: impl Into<String>) -> CacheKey {
        self.cache_key().child(segment)
    }

    /// Resolve a symbolic constant name.
    pub fn from_name(name: &str) -> Option<QueryKey> {
        NAME_INDEX.get(name).copied()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static NAME_INDEX: Lazy<HashMap<&'static str, QueryKey>> =
    Lazy::new(|| QueryKey::ALL.iter().map(|key| (key.name(), *key)).collect());

/// Look up a key by its symbolic name.
pub fn lookup(name: &str) -> Option<CacheKey> {
    QueryKey::from_name(name).map(QueryKey::cache_key)
}
