//! Remote store interface.
//!
//! The store is consumed, not implemented, by the engine. Every operation is
//! a fire-and-forget request; results and subscription notifications come
//! back later as [`StoreEvent`]s drained on the same thread, so no caller
//! can assume synchronous completion.

use std::collections::BTreeMap;

use scenecast_config::Config;

use crate::record::EntityRecord;

/// Correlates an asynchronous request with its completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Classes of remote notifications on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// One-shot snapshot of the whole collection.
    Value,
    /// A child record appeared.
    ChildAdded,
    /// A child record changed.
    ChildChanged,
    /// A child record was removed.
    ChildRemoved,
}

/// A notification or request completion delivered by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Full collection state answering a [`EventKind::Value`] subscription.
    Snapshot {
        /// Records keyed by remote id.
        records: BTreeMap<String, EntityRecord>,
    },
    /// A record was created.
    ChildAdded {
        /// Remote id of the record.
        key: String,
        /// The record as created.
        record: EntityRecord,
    },
    /// A record was updated. Carries the whole record after the merge.
    ChildChanged {
        /// Remote id of the record.
        key: String,
        /// The record after the update.
        record: EntityRecord,
    },
    /// A record was deleted.
    ChildRemoved {
        /// Remote id of the record.
        key: String,
    },
    /// A unique key was allocated for a [`RemoteStore::push_key`] request.
    KeyAllocated {
        /// The originating request.
        request: RequestId,
        /// The new key.
        key: String,
    },
    /// Answer to a [`RemoteStore::query_equal`] request.
    QueryResult {
        /// The originating request.
        request: RequestId,
        /// Matching records keyed by remote id.
        records: BTreeMap<String, EntityRecord>,
    },
}

/// Errors establishing a store connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The configuration lacks something the store needs.
    #[error("store rejected configuration: {0}")]
    InvalidConfig(String),

    /// The store could not be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),
}

/// A channel-scoped connection to a hierarchical key-value store with live
/// subscriptions. Paths are relative to the channel root.
pub trait RemoteStore {
    /// Subscribes to one class of events on the collection at `path`.
    fn subscribe(&mut self, path: &str, kind: EventKind);

    /// Requests a new unique child key under `path`.
    fn push_key(&mut self, path: &str, request: RequestId);

    /// Merges `fields` into the record at `path`, creating it if needed.
    fn update(&mut self, path: &str, fields: EntityRecord);

    /// Registers removal of the record at `path` when this connection drops.
    fn on_disconnect_remove(&mut self, path: &str);

    /// Requests the children of `path` whose `field` equals `value`.
    fn query_equal(&mut self, path: &str, field: &str, value: &str, request: RequestId);

    /// Takes every event delivered since the last call.
    fn drain_events(&mut self) -> Vec<StoreEvent>;
}

/// Opens store connections.
pub trait Connector {
    /// The connection type produced.
    type Store: RemoteStore;

    /// Connects to the store described by `config`, scoped to `channel`.
    fn connect(&mut self, config: &Config, channel: &str) -> Result<Self::Store, StoreError>;
}

/// Joins a collection path and a child key.
pub fn child_path(collection: &str, key: &str) -> String {
    format!("{collection}/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("entities", "-K1"), "entities/-K1");
    }
}
