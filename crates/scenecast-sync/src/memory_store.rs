//! In-process remote store.
//!
//! [`MemoryServer`] holds the data of every channel and fans notifications
//! out to its connections. Each [`MemoryStore`] connection queues its events
//! until [`RemoteStore::drain_events`] is called, so completions always land
//! on a later turn than the request that caused them. Single-threaded: the
//! server is shared through `Rc<RefCell<_>>`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use scenecast_config::Config;

use crate::record::EntityRecord;
use crate::store::{Connector, EventKind, RemoteStore, RequestId, StoreError, StoreEvent};

/// Identifies one connection to a [`MemoryServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

type Collection = BTreeMap<String, EntityRecord>;

#[derive(Debug, Default)]
struct Connection {
    channel: String,
    subscriptions: HashSet<(String, EventKind)>,
    queue: VecDeque<StoreEvent>,
    disconnect_removals: Vec<String>,
}

#[derive(Debug, Default)]
struct ServerState {
    /// channel → collection → key → record
    channels: HashMap<String, HashMap<String, Collection>>,
    connections: HashMap<ConnectionId, Connection>,
    next_connection: u64,
    next_key: u64,
    unreachable: bool,
}

fn split_path(path: &str) -> Option<(&str, &str)> {
    path.split_once('/')
        .filter(|(collection, key)| !collection.is_empty() && !key.is_empty())
}

fn notify(
    connections: &mut HashMap<ConnectionId, Connection>,
    channel: &str,
    collection: &str,
    kind: EventKind,
    event: &StoreEvent,
) {
    let subscription = (collection.to_string(), kind);
    for connection in connections.values_mut() {
        if connection.channel == channel && connection.subscriptions.contains(&subscription) {
            connection.queue.push_back(event.clone());
        }
    }
}

impl ServerState {
    fn write(&mut self, channel: &str, path: &str, fields: &EntityRecord) {
        let Some((collection, key)) = split_path(path) else {
            tracing::warn!(path, "Ignoring update to a non-record path");
            return;
        };
        let records = self
            .channels
            .entry(channel.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        let (kind, record) = match records.get_mut(key) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge(fields);
                if *existing == before {
                    return;
                }
                (EventKind::ChildChanged, existing.clone())
            }
            None => {
                let mut created = EntityRecord::new();
                created.merge(fields);
                records.insert(key.to_string(), created.clone());
                (EventKind::ChildAdded, created)
            }
        };

        let key = key.to_string();
        let event = match kind {
            EventKind::ChildAdded => StoreEvent::ChildAdded { key, record },
            _ => StoreEvent::ChildChanged { key, record },
        };
        notify(&mut self.connections, channel, collection, kind, &event);
    }

    fn remove(&mut self, channel: &str, path: &str) {
        let Some((collection, key)) = split_path(path) else {
            return;
        };
        let removed = self
            .channels
            .get_mut(channel)
            .and_then(|collections| collections.get_mut(collection))
            .and_then(|records| records.remove(key));
        if removed.is_some() {
            let event = StoreEvent::ChildRemoved {
                key: key.to_string(),
            };
            notify(
                &mut self.connections,
                channel,
                collection,
                EventKind::ChildRemoved,
                &event,
            );
        }
    }

    fn collection(&self, channel: &str, collection: &str) -> Collection {
        self.channels
            .get(channel)
            .and_then(|collections| collections.get(collection))
            .cloned()
            .unwrap_or_default()
    }
}

/// A shared in-memory database serving any number of connections.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Rc<RefCell<ServerState>>,
}

impl MemoryServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection scoped to `channel`.
    pub fn open(&self, channel: &str) -> Result<MemoryStore, StoreError> {
        let mut state = self.state.borrow_mut();
        if state.unreachable {
            return Err(StoreError::Unreachable("memory server offline".to_string()));
        }
        let id = ConnectionId(state.next_connection);
        state.next_connection += 1;
        state.connections.insert(
            id,
            Connection {
                channel: channel.to_string(),
                ..Connection::default()
            },
        );
        tracing::debug!(connection = id.0, channel, "Memory store connection opened");
        Ok(MemoryStore {
            server: self.clone(),
            connection: id,
        })
    }

    /// Makes subsequent connection attempts fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.borrow_mut().unreachable = unreachable;
    }

    /// Drops a connection and runs its disconnect hooks.
    pub fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.borrow_mut();
        let Some(closed) = state.connections.remove(&connection) else {
            return;
        };
        tracing::debug!(
            connection = connection.0,
            removals = closed.disconnect_removals.len(),
            "Memory store connection closed"
        );
        for path in &closed.disconnect_removals {
            state.remove(&closed.channel, path);
        }
    }

    /// Merges `fields` into the record at `path` as an outside writer.
    pub fn write(&self, channel: &str, path: &str, fields: EntityRecord) {
        self.state.borrow_mut().write(channel, path, &fields);
    }

    /// Deletes the record at `path` as an outside writer.
    pub fn remove(&self, channel: &str, path: &str) {
        self.state.borrow_mut().remove(channel, path);
    }

    /// Reads one record.
    pub fn record(&self, channel: &str, path: &str) -> Option<EntityRecord> {
        let (collection, key) = split_path(path)?;
        self.state
            .borrow()
            .collection(channel, collection)
            .get(key)
            .cloned()
    }

    /// Reads a whole collection.
    pub fn records(&self, channel: &str, collection: &str) -> BTreeMap<String, EntityRecord> {
        self.state.borrow().collection(channel, collection)
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.state.borrow().connections.len()
    }
}

impl Connector for MemoryServer {
    type Store = MemoryStore;

    fn connect(&mut self, _config: &Config, channel: &str) -> Result<MemoryStore, StoreError> {
        self.open(channel)
    }
}

/// One connection to a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryStore {
    server: MemoryServer,
    connection: ConnectionId,
}

impl MemoryStore {
    /// This connection's id.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// The server this connection belongs to.
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    fn with_connection<R>(&self, f: impl FnOnce(&mut ServerState, &str) -> R) -> Option<R> {
        let mut state = self.server.state.borrow_mut();
        let channel = state.connections.get(&self.connection)?.channel.clone();
        Some(f(&mut *state, &channel))
    }

    fn enqueue(state: &mut ServerState, connection: ConnectionId, event: StoreEvent) {
        if let Some(connection) = state.connections.get_mut(&connection) {
            connection.queue.push_back(event);
        }
    }
}

impl RemoteStore for MemoryStore {
    fn subscribe(&mut self, path: &str, kind: EventKind) {
        let connection = self.connection;
        self.with_connection(|state, channel| {
            let records = state.collection(channel, path);
            match kind {
                EventKind::Value => {
                    Self::enqueue(state, connection, StoreEvent::Snapshot { records });
                }
                EventKind::ChildAdded => {
                    for (key, record) in records {
                        Self::enqueue(state, connection, StoreEvent::ChildAdded { key, record });
                    }
                }
                EventKind::ChildChanged | EventKind::ChildRemoved => {}
            }
            if kind != EventKind::Value
                && let Some(conn) = state.connections.get_mut(&connection)
            {
                conn.subscriptions.insert((path.to_string(), kind));
            }
        });
    }

    fn push_key(&mut self, _path: &str, request: RequestId) {
        let connection = self.connection;
        self.with_connection(|state, _| {
            state.next_key += 1;
            let key = format!("-M{:010}", state.next_key);
            Self::enqueue(state, connection, StoreEvent::KeyAllocated { request, key });
        });
    }

    fn update(&mut self, path: &str, fields: EntityRecord) {
        self.with_connection(|state, channel| state.write(channel, path, &fields));
    }

    fn on_disconnect_remove(&mut self, path: &str) {
        let connection = self.connection;
        self.with_connection(|state, _| {
            if let Some(conn) = state.connections.get_mut(&connection) {
                conn.disconnect_removals.push(path.to_string());
            }
        });
    }

    fn query_equal(&mut self, path: &str, field: &str, value: &str, request: RequestId) {
        let connection = self.connection;
        self.with_connection(|state, channel| {
            let records = state
                .collection(channel, path)
                .into_iter()
                .filter(|(_, record)| {
                    record.get(field).and_then(serde_json::Value::as_str) == Some(value)
                })
                .collect();
            Self::enqueue(state, connection, StoreEvent::QueryResult { request, records });
        });
    }

    fn drain_events(&mut self) -> Vec<StoreEvent> {
        let mut state = self.server.state.borrow_mut();
        state
            .connections
            .get_mut(&self.connection)
            .map(|connection| connection.queue.drain(..).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> EntityRecord {
        EntityRecord::from_value(value).unwrap()
    }

    fn subscribe_all(store: &mut MemoryStore) {
        store.subscribe("entities", EventKind::ChildAdded);
        store.subscribe("entities", EventKind::ChildChanged);
        store.subscribe("entities", EventKind::ChildRemoved);
    }

    #[test]
    fn test_events_are_deferred_until_drain() {
        let server = MemoryServer::new();
        let mut store = server.open("room").unwrap();
        subscribe_all(&mut store);
        store.update("entities/a", record(json!({"position": 1})));

        // The record exists right away, the notification waits in the queue.
        assert!(server.record("room", "entities/a").is_some());
        let events = store.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StoreEvent::ChildAdded { key, .. } if key == "a"));
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn test_update_merges_and_reports_full_record() {
        let server = MemoryServer::new();
        let mut store = server.open("room").unwrap();
        store.update("entities/a", record(json!({"id": "x", "position": 1})));
        subscribe_all(&mut store);
        store.drain_events();

        store.update("entities/a", record(json!({"position": 2})));
        let events = store.drain_events();
        assert_eq!(
            events,
            vec![StoreEvent::ChildChanged {
                key: "a".to_string(),
                record: record(json!({"id": "x", "position": 2})),
            }]
        );
    }

    #[test]
    fn test_identical_update_is_silent() {
        let server = MemoryServer::new();
        let mut store = server.open("room").unwrap();
        subscribe_all(&mut store);
        store.update("entities/a", record(json!({"position": 1})));
        store.update("entities/a", record(json!({"position": 1})));
        assert_eq!(store.drain_events().len(), 1);
    }

    #[test]
    fn test_child_added_replays_existing_records() {
        let server = MemoryServer::new();
        server.write("room", "entities/a", record(json!({"position": 1})));
        server.write("room", "entities/b", record(json!({"position": 2})));

        let mut store = server.open("room").unwrap();
        store.subscribe("entities", EventKind::ChildAdded);
        assert_eq!(store.drain_events().len(), 2);
    }

    #[test]
    fn test_value_subscription_is_one_shot() {
        let server = MemoryServer::new();
        server.write("room", "entities/a", record(json!({"position": 1})));
        let mut store = server.open("room").unwrap();
        store.subscribe("entities", EventKind::Value);

        let events = store.drain_events();
        assert!(matches!(&events[0], StoreEvent::Snapshot { records } if records.len() == 1));

        server.write("room", "entities/b", record(json!({"position": 2})));
        assert!(store.drain_events().is_empty());
    }

    #[test]
    fn test_channels_are_isolated() {
        let server = MemoryServer::new();
        let mut lobby = server.open("lobby").unwrap();
        let mut other = server.open("other").unwrap();
        subscribe_all(&mut lobby);
        subscribe_all(&mut other);

        lobby.update("entities/a", record(json!({"position": 1})));
        assert_eq!(lobby.drain_events().len(), 1);
        assert!(other.drain_events().is_empty());
        assert!(server.record("other", "entities/a").is_none());
    }

    #[test]
    fn test_push_keys_are_unique() {
        let server = MemoryServer::new();
        let mut store = server.open("room").unwrap();
        store.push_key("entities", RequestId(1));
        store.push_key("entities", RequestId(2));
        let keys: Vec<String> = store
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                StoreEvent::KeyAllocated { key, .. } => Some(key),
                _ => None,
            })
            .collect();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }

    #[test]
    fn test_query_equal_filters_by_field() {
        let server = MemoryServer::new();
        server.write("room", "entities/a", record(json!({"id": "box1"})));
        server.write("room", "entities/b", record(json!({"id": "box2"})));
        let mut store = server.open("room").unwrap();
        store.query_equal("entities", "id", "box1", RequestId(7));

        let events = store.drain_events();
        let StoreEvent::QueryResult { request, records } = &events[0] else {
            panic!("expected a query result, got {events:?}");
        };
        assert_eq!(*request, RequestId(7));
        assert_eq!(records.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_disconnect_runs_removal_hooks() {
        let server = MemoryServer::new();
        let mut writer = server.open("room").unwrap();
        let mut watcher = server.open("room").unwrap();
        subscribe_all(&mut watcher);

        writer.update("entities/a", record(json!({"position": 1})));
        writer.on_disconnect_remove("entities/a");
        watcher.drain_events();

        server.disconnect(writer.connection_id());
        assert!(server.record("room", "entities/a").is_none());
        assert_eq!(
            watcher.drain_events(),
            vec![StoreEvent::ChildRemoved {
                key: "a".to_string()
            }]
        );
        assert_eq!(server.connection_count(), 1);
    }

    #[test]
    fn test_unreachable_server_refuses_connections() {
        let mut server = MemoryServer::new();
        server.set_unreachable(true);
        let result = server.connect(&Config::default(), "room");
        assert!(matches!(result, Err(StoreError::Unreachable(_))));
    }
}
