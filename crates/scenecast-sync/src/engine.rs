//! The sync engine: initial load, live remote events, ownership, parent
//! links, and the timed outbound broadcast.
//!
//! Remote events flow through [`SyncEngine::poll`] into the replica table
//! and onto local entities. Local state flows out on [`SyncEngine::tick`]
//! from the broadcast table into merge updates at `entities/<remote id>`.
//! Everything runs on one thread; store completions arrive as events on a
//! later turn, never inline with the request.

use std::collections::{BTreeMap, HashMap};

use scenecast_config::{ConfigSource, resolve_channel};
use scenecast_scene::SceneGraph;
use tracing::{debug, info, trace, warn};

use crate::attribute::{get_attribute, set_attribute};
use crate::broadcast::{BroadcastConfig, BroadcastTable, RegistrationState};
use crate::client_id::ClientId;
use crate::error::SyncError;
use crate::record::{BroadcastMeta, EntityRecord, ID_FIELD};
use crate::replica::ReplicaTable;
use crate::store::{Connector, EventKind, RemoteStore, RequestId, StoreEvent, child_path};

/// Collection holding every synchronized entity record of a channel.
pub const ENTITIES_PATH: &str = "entities";

/// Inputs for [`SyncEngine::init`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    /// Connection settings. `None` leaves the engine inert.
    pub config: Option<ConfigSource>,
    /// Host page location whose query string may override the channel.
    pub location: Option<String>,
}

impl EngineOptions {
    /// Options with no configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration source.
    pub fn with_config(mut self, config: impl Into<ConfigSource>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Sets the host location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// The system-level synchronization interface a host composes with its
/// scene.
pub trait SyncSystem<G: SceneGraph> {
    /// Store connection type used by the system.
    type Store: RemoteStore;

    /// Reads configuration, connects, and subscribes. Stays inert when no
    /// usable configuration or connection is available.
    fn init<C>(options: EngineOptions, connector: &mut C) -> Self
    where
        Self: Sized,
        C: Connector<Store = Self::Store>;

    /// Per-frame callback with a monotonic timestamp.
    fn tick(&mut self, scene: &G, time: f64);

    /// Starts broadcasting a local entity.
    fn register_broadcast(
        &mut self,
        scene: &G,
        entity: G::Handle,
        config: BroadcastConfig,
    ) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRequest<H> {
    OwnerCheck(H),
    RemoteKey(H),
}

/// Synchronizes a subset of a scene's entities through a remote store.
pub struct SyncEngine<S: RemoteStore, G: SceneGraph> {
    store: Option<S>,
    client_id: ClientId,
    channel: Option<String>,
    interval: f64,
    last_tick: f64,
    replicas: ReplicaTable<G::Handle>,
    broadcasts: BroadcastTable<G::Handle>,
    pending: HashMap<RequestId, PendingRequest<G::Handle>>,
    next_request: u64,
}

impl<S: RemoteStore, G: SceneGraph> SyncEngine<S, G> {
    /// An engine with no connection. Every operation on it is a no-op.
    pub fn inert() -> Self {
        Self {
            store: None,
            client_id: ClientId::generate(),
            channel: None,
            interval: scenecast_config::DEFAULT_INTERVAL,
            last_tick: 0.0,
            replicas: ReplicaTable::new(),
            broadcasts: BroadcastTable::new(),
            pending: HashMap::new(),
            next_request: 0,
        }
    }

    /// Resolves configuration and channel, connects, and subscribes to the
    /// entity collection.
    ///
    /// Absent or malformed configuration, or a failed connection, yields an
    /// inert engine and a warning rather than an error.
    pub fn init<C>(options: EngineOptions, connector: &mut C) -> Self
    where
        C: Connector<Store = S>,
    {
        let mut engine = Self::inert();

        let config = match options.config.as_ref().map(ConfigSource::resolve) {
            Some(Ok(Some(config))) => config,
            Some(Ok(None)) | None => {
                warn!("No sync configuration present, engine stays inert");
                return engine;
            }
            Some(Err(error)) => {
                warn!(%error, "Malformed sync configuration, engine stays inert");
                return engine;
            }
        };

        let channel = resolve_channel(options.location.as_deref(), &config);
        engine.interval = config.interval;

        let mut store = match connector.connect(&config, &channel) {
            Ok(store) => store,
            Err(error) => {
                warn!(%error, %channel, "Could not connect to store, engine stays inert");
                return engine;
            }
        };

        for kind in [
            EventKind::Value,
            EventKind::ChildAdded,
            EventKind::ChildChanged,
            EventKind::ChildRemoved,
        ] {
            store.subscribe(ENTITIES_PATH, kind);
        }

        info!(
            client = %engine.client_id,
            %channel,
            interval = engine.interval,
            "Sync engine connected"
        );
        engine.store = Some(store);
        engine.channel = Some(channel);
        engine
    }

    /// Returns `true` when there is no store connection.
    pub fn is_inert(&self) -> bool {
        self.store.is_none()
    }

    /// This client's identity.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// The resolved channel, when connected.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Minimum time between broadcast passes.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Remotely-originated entities.
    pub fn replicas(&self) -> &ReplicaTable<G::Handle> {
        &self.replicas
    }

    /// Locally-published entities.
    pub fn broadcasts(&self) -> &BroadcastTable<G::Handle> {
        &self.broadcasts
    }

    /// The store connection, when connected.
    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    /// Delivers every pending store event.
    pub fn poll(&mut self, scene: &mut G) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        for event in store.drain_events() {
            self.handle_event(scene, event);
        }
    }

    /// Dispatches one store event.
    pub fn handle_event(&mut self, scene: &mut G, event: StoreEvent) {
        if self.is_inert() {
            return;
        }
        match event {
            StoreEvent::Snapshot { records } => self.handle_initial_sync(scene, &records),
            StoreEvent::ChildAdded { key, record } => {
                self.handle_entity_added(scene, &key, &record)
            }
            StoreEvent::ChildChanged { key, record } => {
                self.handle_entity_changed(scene, &key, &record)
            }
            StoreEvent::ChildRemoved { key } => self.handle_entity_removed(scene, &key),
            StoreEvent::KeyAllocated { request, key } => self.handle_key_allocated(request, &key),
            StoreEvent::QueryResult { request, records } => {
                self.handle_owner_check(request, &records)
            }
        }
    }

    // --- Inbound ---

    /// Applies the collection state seen at subscribe time, skipping records
    /// this client publishes itself.
    pub fn handle_initial_sync(&mut self, scene: &mut G, records: &BTreeMap<String, EntityRecord>) {
        debug!(records = records.len(), "Initial sync");
        for (key, record) in records {
            if self.broadcasts.contains_remote(key) {
                continue;
            }
            self.handle_entity_added(scene, key, record);
        }
    }

    /// Creates (or, for shared entities, re-attaches) the local entity for a
    /// new remote record.
    pub fn handle_entity_added(&mut self, scene: &mut G, key: &str, record: &EntityRecord) {
        if self.replicas.contains(key) || self.broadcasts.contains_remote(key) {
            trace!(key, "Ignoring already-known record");
            return;
        }

        let meta = record.broadcast_meta();
        let stable_id = record.stable_id();
        let existing = if meta.shared && !stable_id.is_empty() {
            scene.find_by_id(stable_id)
        } else {
            None
        };
        let (entity, created) = match existing {
            Some(entity) => (entity, false),
            None => (scene.create_entity(), true),
        };

        self.replicas
            .insert(key, entity, meta.owner().map(str::to_string));
        for (name, value) in record.component_fields() {
            set_attribute(scene, entity, name, value.clone());
        }

        if created {
            let parent = record
                .parent_id()
                .and_then(|parent_id| self.local_handle(parent_id))
                .unwrap_or_else(|| scene.root());
            scene.attach(entity, parent);
        } else {
            self.adopt_owner(entity, meta.owner());
        }
        debug!(key, ?entity, created, shared = meta.shared, "Remote entity added");
    }

    /// Applies a changed remote record onto its replica. Own records and
    /// unknown ids are ignored; `parentId` and the broadcast metadata are
    /// never applied as components.
    pub fn handle_entity_changed(&mut self, scene: &mut G, key: &str, record: &EntityRecord) {
        if self.broadcasts.contains_remote(key) {
            trace!(key, "Ignoring change to own record");
            return;
        }
        let Some(entity) = self.replicas.handle(key) else {
            trace!(key, "Ignoring change to unknown record");
            return;
        };

        let owner = record.broadcast_meta().owner().map(str::to_string);
        self.replicas.set_owner(key, owner.clone());
        for (name, value) in record.component_fields() {
            set_attribute(scene, entity, name, value.clone());
        }
        self.adopt_owner(entity, owner.as_deref());
    }

    /// Detaches the replica of a removed record. Children are left where
    /// they are.
    pub fn handle_entity_removed(&mut self, scene: &mut G, key: &str) {
        let Some(entry) = self.replicas.remove(key) else {
            trace!(key, "Ignoring removal of unknown record");
            return;
        };

        if self.broadcasts.contains(entry.handle) {
            // Our own shared placeholder: only the link to the departed record goes.
            self.release_owner(entry.handle, entry.owner.as_deref());
        } else {
            scene.detach(entry.handle);
        }
        debug!(key, entity = ?entry.handle, "Remote entity removed");
    }

    fn local_handle(&self, remote_id: &str) -> Option<G::Handle> {
        self.replicas
            .handle(remote_id)
            .or_else(|| self.broadcasts.handle_for_remote(remote_id))
    }

    // --- Ownership ---

    /// Takes over a remote owner for one of our shared entities. An
    /// existing claim only yields to a smaller client identity, so two
    /// clients that claimed in the same window settle on the same owner.
    fn adopt_owner(&mut self, entity: G::Handle, remote_owner: Option<&str>) {
        let Some(remote_owner) = remote_owner else {
            return;
        };
        let Some(entry) = self.broadcasts.get_mut(entity) else {
            return;
        };
        if !entry.config.shared {
            return;
        }

        let adopt = entry
            .config
            .owner()
            .is_none_or(|local_owner| remote_owner < local_owner);
        if adopt {
            if entry.config.owner() == Some(self.client_id.as_str()) {
                info!(?entity, owner = remote_owner, "Yielding ownership of shared entity");
            }
            entry.config.owner = remote_owner.to_string();
        }
    }

    /// Clears an owner that belonged to a departed record, and lets a
    /// standby entity register again.
    fn release_owner(&mut self, entity: G::Handle, departed_owner: Option<&str>) {
        let Some(departed_owner) = departed_owner else {
            return;
        };
        if departed_owner == self.client_id.as_str() {
            return;
        }
        let Some(entry) = self.broadcasts.get_mut(entity) else {
            return;
        };
        if !entry.config.shared || entry.config.owner() != Some(departed_owner) {
            return;
        }

        entry.config.owner.clear();
        info!(?entity, departed_owner, "Owner left, shared entity is claimable");
        if entry.state == RegistrationState::Standby {
            entry.state = RegistrationState::AwaitingKey;
            self.request_key(entity);
        }
    }

    // --- Registration ---

    /// Starts broadcasting `entity`.
    ///
    /// Shared entities first look upstream for a record with the same
    /// stable id that another client already owns; only when none exists
    /// is a remote id requested. No-op on an inert engine, for an empty
    /// component list, or for an entity already registered.
    pub fn register_broadcast(
        &mut self,
        scene: &G,
        entity: G::Handle,
        config: BroadcastConfig,
    ) -> Result<(), SyncError> {
        if self.is_inert() {
            trace!(?entity, "Inert engine ignores registration");
            return Ok(());
        }
        if !scene.contains(entity) {
            return Err(SyncError::UnknownEntity(format!("{entity:?}")));
        }
        if config.components.is_empty() || self.broadcasts.contains(entity) {
            return Ok(());
        }

        if config.shared {
            let stable_id = scene.element_id(entity).unwrap_or_default();
            if stable_id.is_empty() {
                return Err(SyncError::SharedWithoutId(format!("{entity:?}")));
            }
            self.broadcasts
                .insert(entity, config, RegistrationState::AwaitingOwnerCheck);
            let request = self.next_request_id();
            self.pending
                .insert(request, PendingRequest::OwnerCheck(entity));
            if let Some(store) = self.store.as_mut() {
                store.query_equal(ENTITIES_PATH, ID_FIELD, &stable_id, request);
            }
            debug!(?entity, %stable_id, "Checking upstream owner before registering");
        } else {
            self.broadcasts
                .insert(entity, config, RegistrationState::AwaitingKey);
            self.request_key(entity);
        }
        Ok(())
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn request_key(&mut self, entity: G::Handle) {
        let request = self.next_request_id();
        self.pending
            .insert(request, PendingRequest::RemoteKey(entity));
        if let Some(store) = self.store.as_mut() {
            store.push_key(ENTITIES_PATH, request);
        }
    }

    fn handle_owner_check(&mut self, request: RequestId, records: &BTreeMap<String, EntityRecord>) {
        let Some(PendingRequest::OwnerCheck(entity)) = self.pending.remove(&request) else {
            trace!(?request, "Ignoring unexpected query result");
            return;
        };

        let claimed_by = records
            .iter()
            .filter(|(key, _)| !self.broadcasts.contains_remote(key))
            .map(|(_, record)| record.broadcast_meta())
            .filter(|meta| meta.shared)
            .filter_map(|meta| meta.owner().map(str::to_string))
            .filter(|owner| owner != self.client_id.as_str())
            .min();

        let Some(entry) = self.broadcasts.get_mut(entity) else {
            return;
        };
        match claimed_by {
            Some(owner) => {
                info!(?entity, %owner, "Shared entity already owned upstream, standing by");
                entry.config.owner = owner;
                entry.state = RegistrationState::Standby;
            }
            None => {
                entry.state = RegistrationState::AwaitingKey;
                self.request_key(entity);
            }
        }
    }

    fn handle_key_allocated(&mut self, request: RequestId, key: &str) {
        let Some(PendingRequest::RemoteKey(entity)) = self.pending.remove(&request) else {
            trace!(?request, "Ignoring unexpected key allocation");
            return;
        };
        if !self.broadcasts.contains(entity) {
            return;
        }

        self.broadcasts.activate(entity, key);
        if let Some(store) = self.store.as_mut() {
            store.on_disconnect_remove(&child_path(ENTITIES_PATH, key));
        }
        debug!(?entity, key, "Broadcast registered");
    }

    // --- Outbound ---

    /// Publishes every active broadcast entity, at most once per interval.
    pub fn tick(&mut self, scene: &G, time: f64) {
        if self.is_inert() || time - self.last_tick < self.interval {
            return;
        }
        self.last_tick = time;

        let outbound: Vec<(String, EntityRecord)> = self
            .broadcasts
            .handles()
            .into_iter()
            .filter_map(|entity| self.build_outbound(scene, entity))
            .collect();

        if let Some(store) = self.store.as_mut() {
            for (remote_id, record) in outbound {
                store.update(&child_path(ENTITIES_PATH, &remote_id), record);
            }
        }
    }

    /// Builds one entity's outbound record, or `None` when it must not be
    /// published this tick.
    fn build_outbound(&mut self, scene: &G, entity: G::Handle) -> Option<(String, EntityRecord)> {
        if !scene.contains(entity) || !scene.is_in_scene(entity) {
            trace!(?entity, "Skipping entity outside the scene");
            return None;
        }

        let client = self.client_id.as_str().to_string();
        let entry = self.broadcasts.get_mut(entity)?;
        let remote_id = entry.remote_id()?.to_string();

        let mut meta = BroadcastMeta {
            shared: entry.config.shared,
            owner: None,
        };
        if entry.config.shared {
            match entry.config.owner() {
                None => {
                    info!(?entity, %remote_id, "Claiming shared entity");
                    entry.config.owner = client.clone();
                    meta.owner = Some(client);
                }
                Some(owner) if owner == client => meta.owner = Some(client),
                Some(_) => return None,
            }
        }

        let parent_id = match scene.parent(entity) {
            Some(parent) if parent != scene.root() => match self.outbound_parent_id(parent) {
                Some(parent_id) => Some(parent_id),
                None => {
                    trace!(?entity, "Waiting for parent to register");
                    return None;
                }
            },
            _ => None,
        };

        let entry = self.broadcasts.get_mut(entity)?;
        let mut names = entry.config.components.clone();
        if !entry.once_sent && !entry.config.components_once.is_empty() {
            names.extend(entry.config.components_once.iter().cloned());
            entry.once_sent = true;
        }

        let mut record = EntityRecord::new();
        record.set_stable_id(&scene.element_id(entity).unwrap_or_default());
        record.set_broadcast_meta(&meta);
        if let Some(parent_id) = parent_id {
            record.set_parent_id(&parent_id);
        }
        for name in &names {
            if let Some(value) = get_attribute(scene, entity, name) {
                record.insert(name.clone(), value);
            }
        }
        Some((remote_id, record))
    }

    fn outbound_parent_id(&self, parent: G::Handle) -> Option<String> {
        self.broadcasts
            .remote_id(parent)
            .or_else(|| {
                let owner = self
                    .broadcasts
                    .get(parent)
                    .and_then(|entry| entry.config.owner());
                self.replicas.remote_id_of(parent, owner)
            })
            .map(str::to_string)
    }
}

impl<S: RemoteStore, G: SceneGraph> SyncSystem<G> for SyncEngine<S, G> {
    type Store = S;

    fn init<C>(options: EngineOptions, connector: &mut C) -> Self
    where
        C: Connector<Store = Self::Store>,
    {
        SyncEngine::init(options, connector)
    }

    fn tick(&mut self, scene: &G, time: f64) {
        SyncEngine::tick(self, scene, time);
    }

    fn register_broadcast(
        &mut self,
        scene: &G,
        entity: G::Handle,
        config: BroadcastConfig,
    ) -> Result<(), SyncError> {
        SyncEngine::register_broadcast(self, scene, entity, config)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
