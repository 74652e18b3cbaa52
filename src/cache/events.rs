//! Change events and the in-memory event queue.
//!
//! Events arrive from the realtime transport or are synthesised by a mutation's
//! success handler. Event types the console does not know yet are kept as
//! [`EventKind::Other`] and route nowhere.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_EVENT_QUEUE_LEN: &str = "console_cache_event_queue_len";
const METRIC_EVENT_DROPPED_TOTAL: &str = "console_cache_event_dropped_total";

/// Monotonic, process-local ordering number assigned on enqueue.
pub type Epoch = u64;

/// Type of a change event, as named on the wire (`"repository.deleted"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    RepositoryCreated,
    RepositoryUpdated,
    RepositoryDeleted,

    ArtifactUploaded,
    ArtifactDeleted,
    ArtifactPromoted,

    UserCreated,
    UserUpdated,
    UserDeleted,

    GroupCreated,
    GroupUpdated,
    GroupDeleted,
    GroupMemberAdded,
    GroupMemberRemoved,

    PermissionCreated,
    PermissionUpdated,
    PermissionDeleted,

    TokenCreated,
    TokenRevoked,

    WebhookCreated,
    WebhookUpdated,
    WebhookDeleted,
    WebhookDelivered,

    ScanCompleted,
    SecurityPolicyUpdated,

    ReplicationPeerAdded,
    ReplicationPeerRemoved,
    ReplicationSyncCompleted,

    BackupCompleted,
    BackupDeleted,

    SettingsUpdated,

    PluginInstalled,
    PluginUninstalled,
    PluginEnabled,
    PluginDisabled,

    LifecyclePolicyUpdated,
    LifecycleCleanupCompleted,

    /// An event type this build does not know, kept verbatim.
    Other(String),
}

/// Every known event kind, in declaration order.
pub static KNOWN_EVENT_KINDS: &[EventKind] = &[
    EventKind::RepositoryCreated,
    EventKind::RepositoryUpdated,
    EventKind::RepositoryDeleted,
    EventKind::ArtifactUploaded,
    EventKind::ArtifactDeleted,
    EventKind::ArtifactPromoted,
    EventKind::UserCreated,
    EventKind::UserUpdated,
    EventKind::UserDeleted,
    EventKind::GroupCreated,
    EventKind::GroupUpdated,
    EventKind::GroupDeleted,
    EventKind::GroupMemberAdded,
    EventKind::GroupMemberRemoved,
    EventKind::PermissionCreated,
    EventKind::PermissionUpdated,
    EventKind::PermissionDeleted,
    EventKind::TokenCreated,
    EventKind::TokenRevoked,
    EventKind::WebhookCreated,
    EventKind::WebhookUpdated,
    EventKind::WebhookDeleted,
    EventKind::WebhookDelivered,
    EventKind::ScanCompleted,
    EventKind::SecurityPolicyUpdated,
    EventKind::ReplicationPeerAdded,
    EventKind::ReplicationPeerRemoved,
    EventKind::ReplicationSyncCompleted,
    EventKind::BackupCompleted,
    EventKind::BackupDeleted,
    EventKind::SettingsUpdated,
    EventKind::PluginInstalled,
    EventKind::PluginUninstalled,
    EventKind::PluginEnabled,
    EventKind::PluginDisabled,
    EventKind::LifecyclePolicyUpdated,
    EventKind::LifecycleCleanupCompleted,
];

static KIND_INDEX: Lazy<HashMap<&'static str, EventKind>> = Lazy::new(|| {
    KNOWN_EVENT_KINDS
        .iter()
        .map(|kind| (kind.known_str().unwrap_or_default(), kind.clone()))
        .collect()
});

impl EventKind {
    /// Parse a wire event type. Never fails; unknown types become `Other`.
    pub fn parse(event_type: &str) -> Self {
        KIND_INDEX
            .get(event_type)
            .cloned()
            .unwrap_or_else(|| EventKind::Other(event_type.to_string()))
    }

    /// Wire name of the event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Other(raw) => raw,
            known => known.known_str().unwrap_or_default(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Other(_))
    }

    fn known_str(&self) -> Option<&'static str> {
        let name = match self {
            EventKind::RepositoryCreated => "repository.created",
            EventKind::RepositoryUpdated => "repository.updated",
            EventKind::RepositoryDeleted => "repository.deleted",
            EventKind::ArtifactUploaded => "artifact.uploaded",
            EventKind::ArtifactDeleted => "artifact.deleted",
            EventKind::ArtifactPromoted => "artifact.promoted",
            EventKind::UserCreated => "user.created",
            EventKind::UserUpdated => "user.updated",
            EventKind::UserDeleted => "user.deleted",
            EventKind::GroupCreated => "group.created",
            EventKind::GroupUpdated => "group.updated",
            EventKind::GroupDeleted => "group.deleted",
            EventKind::GroupMemberAdded => "group.member_added",
            EventKind::GroupMemberRemoved => "group.member_removed",
            EventKind::PermissionCreated => "permission.created",
            EventKind::PermissionUpdated => "permission.updated",
            EventKind::PermissionDeleted => "permission.deleted",
            EventKind::TokenCreated => "token.created",
            EventKind::TokenRevoked => "token.revoked",
            EventKind::WebhookCreated => "webhook.created",
            EventKind::WebhookUpdated => "webhook.updated",
            EventKind::WebhookDeleted => "webhook.deleted",
            EventKind::WebhookDelivered => "webhook.delivered",
            EventKind::ScanCompleted => "scan.completed",
            EventKind::SecurityPolicyUpdated => "security.policy_updated",
            EventKind::ReplicationPeerAdded => "replication.peer_added",
            EventKind::ReplicationPeerRemoved => "replication.peer_removed",
            EventKind::ReplicationSyncCompleted => "replication.sync_completed",
            EventKind::BackupCompleted => "backup.completed",
            EventKind::BackupDeleted => "backup.deleted",
            EventKind::SettingsUpdated => "settings.updated",
            EventKind::PluginInstalled => "plugin.installed",
            EventKind::PluginUninstalled => "plugin.uninstalled",
            EventKind::PluginEnabled => "plugin.enabled",
            EventKind::PluginDisabled => "plugin.disabled",
            EventKind::LifecyclePolicyUpdated => "lifecycle.policy_updated",
            EventKind::LifecycleCleanupCompleted => "lifecycle.cleanup_completed",
            EventKind::Other(_) => return None,
        };
        Some(name)
    }
}

impl From<&str> for EventKind {
    fn from(event_type: &str) -> Self {
        EventKind::parse(event_type)
    }
}

impl From<String> for EventKind {
    fn from(event_type: String) -> Self {
        match KIND_INDEX.get(event_type.as_str()) {
            Some(kind) => kind.clone(),
            None => EventKind::Other(event_type),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete change notification.
///
/// Transport frames are camelCase JSON; only `eventType` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Delivery identifier; redelivered frames carry the same id.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub event_type: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(event_type: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            entity_id: None,
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Decode one JSON transport frame.
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// An event with its enqueue epoch.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub epoch: Epoch,
    pub event: ChangeEvent,
}

/// Bounded FIFO of pending change events.
///
/// When full, the oldest event is dropped; losing an invalidation only delays
/// a refresh until the next event for the same group.
pub struct EventQueue {
    queue: Mutex<VecDeque<QueuedEvent>>,
    epoch_counter: AtomicU64,
    max_len: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::new_with_limit(usize::MAX)
    }

    pub fn new_with_limit(max_len: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            max_len: max_len.max(1),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue an event and return its epoch.
    pub fn publish(&self, event: ChangeEvent) -> Epoch {
        let epoch = self.next_epoch();

        info!(
            event_id = %event.id,
            event_epoch = epoch,
            event_type = %event.event_type,
            "Change event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        if queue.len() >= self.max_len {
            if let Some(dropped) = queue.pop_front() {
                warn!(
                    event_id = %dropped.event.id,
                    event_epoch = dropped.epoch,
                    event_type = %dropped.event.event_type,
                    max_len = self.max_len,
                    "Change event queue full; dropped oldest event"
                );
                counter!(METRIC_EVENT_DROPPED_TOTAL).increment(1);
            }
        }
        queue.push_back(QueuedEvent { epoch, event });
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        epoch
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<QueuedEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(0.0);
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
