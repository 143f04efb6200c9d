//! Real-time entity synchronization for shared 3D scenes.
//!
//! Each client publishes a chosen subset of its entities' components to a
//! channel-scoped remote store and mirrors every other client's entities
//! into its own scene. Shared entities are arbitrated by ownership so that
//! exactly one client drives them at a time.

pub mod attribute;
pub mod broadcast;
pub mod client_id;
pub mod engine;
pub mod error;
pub mod memory_store;
pub mod record;
pub mod replica;
pub mod store;

pub use attribute::{AttributePath, PROPERTY_SEPARATOR, get_attribute, set_attribute};
pub use broadcast::{
    BroadcastComponent, BroadcastConfig, BroadcastEntry, BroadcastTable, DEFAULT_COMPONENTS,
    RegistrationState,
};
pub use client_id::ClientId;
pub use engine::{ENTITIES_PATH, EngineOptions, SyncEngine, SyncSystem};
pub use error::SyncError;
pub use memory_store::{ConnectionId, MemoryServer, MemoryStore};
pub use record::{BROADCAST_META_FIELD, BroadcastMeta, EntityRecord, ID_FIELD, PARENT_FIELD};
pub use replica::{ReplicaEntry, ReplicaTable};
pub use store::{Connector, EventKind, RemoteStore, RequestId, StoreError, StoreEvent, child_path};
