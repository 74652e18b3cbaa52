//! Query-key invalidation for the admin console.
//!
//! Three static tables drive cache consistency:
//!
//! - **Keys** (`QueryKey`): symbolic names for the keys query results are cached under
//! - **Groups** (`InvalidationGroup`): keys that go stale together
//! - **Routes** (`router::route`): change-event type to the group it invalidates
//!
//! Change events reach the store either directly (`router::handle_event`) or
//! through the queue (`CacheTrigger` → `EventQueue` → `EventConsumer`).
//!
//! ## Configuration
//!
//! Queue and store behaviour is controlled via `artifact-console.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! query_store_limit = 512
//! consume_batch_limit = 100
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
mod events;
mod groups;
pub mod integrity;
mod keys;
mod lock;
mod planner;
pub mod router;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use consumer::EventConsumer;
pub use events::{ChangeEvent, Epoch, EventKind, EventQueue, KNOWN_EVENT_KINDS, QueuedEvent};
pub use groups::{InvalidationGroup, group_keys, invalidate_group};
pub use keys::{CacheKey, QueryKey, lookup};
pub use planner::InvalidationPlan;
pub use router::{handle_event, keys_for_event, resolve_group_for_event};
pub use store::{CacheStore, QuerySnapshot, QueryStore};
pub use trigger::CacheTrigger;
