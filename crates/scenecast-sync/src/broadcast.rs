//! Broadcast table: entities this client publishes, and the per-entity
//! broadcast component that registers them.

use std::collections::HashMap;
use std::hash::Hash;

use scenecast_config::parse_declarations;
use scenecast_scene::SceneGraph;

use crate::engine::SyncSystem;
use crate::error::SyncError;

/// Components published every tick when none are configured.
pub const DEFAULT_COMPONENTS: [&str; 2] = ["position", "rotation"];

/// Per-entity broadcast settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Remote id assigned once registration completes. Empty until then.
    pub id: String,
    /// Component (or `component|property`) names published every tick.
    pub components: Vec<String>,
    /// Names published only on the first emitted record.
    pub components_once: Vec<String>,
    /// Whether the entity is arbitrated by ownership across clients.
    pub shared: bool,
    /// Claimed owner's client identity. Empty when unowned.
    pub owner: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            components: DEFAULT_COMPONENTS.iter().map(|name| name.to_string()).collect(),
            components_once: Vec::new(),
            shared: false,
            owner: String::new(),
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl BroadcastConfig {
    /// Parses an inline declaration string such as
    /// `"components: position, material|color; shared: true"`.
    ///
    /// Lists are comma-separated. Unknown keys are ignored and absent keys
    /// keep their defaults.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        for (key, value) in parse_declarations(text) {
            match key.as_str() {
                "id" => config.id = value,
                "components" => config.components = parse_list(&value),
                "componentsOnce" => config.components_once = parse_list(&value),
                "shared" => config.shared = value == "true",
                "owner" => config.owner = value,
                _ => tracing::debug!(key = %key, "Ignoring unknown broadcast option"),
            }
        }
        config
    }

    /// The claimed owner, if any.
    pub fn owner(&self) -> Option<&str> {
        (!self.owner.is_empty()).then_some(self.owner.as_str())
    }
}

/// Where an entity is in the registration handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    /// Waiting for the upstream lookup of an existing owned record.
    AwaitingOwnerCheck,
    /// Waiting for the store to allocate a remote id.
    AwaitingKey,
    /// Publishing under the given remote id.
    Active {
        /// The entity's record key.
        remote_id: String,
    },
    /// Another client already owns the shared record; not publishing.
    Standby,
}

/// One published entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEntry {
    /// Broadcast settings, including the assigned id and claimed owner.
    pub config: BroadcastConfig,
    /// Registration progress.
    pub state: RegistrationState,
    /// Set once the once-components have gone out.
    pub once_sent: bool,
}

impl BroadcastEntry {
    /// The remote id, once registration completed.
    pub fn remote_id(&self) -> Option<&str> {
        match &self.state {
            RegistrationState::Active { remote_id } => Some(remote_id),
            _ => None,
        }
    }
}

/// Maps local entity handles to their broadcast entries, with a reverse
/// index from remote ids.
#[derive(Debug, Clone)]
pub struct BroadcastTable<H> {
    entries: HashMap<H, BroadcastEntry>,
    order: Vec<H>,
    by_remote: HashMap<String, H>,
}

impl<H: Copy + Eq + Hash> BroadcastTable<H> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            by_remote: HashMap::new(),
        }
    }

    /// Adds an entity in the given initial state. Returns `false` if the
    /// handle is already registered.
    pub fn insert(&mut self, handle: H, config: BroadcastConfig, state: RegistrationState) -> bool {
        if self.entries.contains_key(&handle) {
            return false;
        }
        self.entries.insert(
            handle,
            BroadcastEntry {
                config,
                state,
                once_sent: false,
            },
        );
        self.order.push(handle);
        true
    }

    /// Completes registration under `remote_id`.
    pub fn activate(&mut self, handle: H, remote_id: &str) {
        let Some(entry) = self.entries.get_mut(&handle) else {
            return;
        };
        if let Some(previous) = entry.remote_id() {
            self.by_remote.remove(previous);
        }
        entry.config.id = remote_id.to_string();
        entry.state = RegistrationState::Active {
            remote_id: remote_id.to_string(),
        };
        self.by_remote.insert(remote_id.to_string(), handle);
    }

    /// Returns `true` if the handle is registered.
    pub fn contains(&self, handle: H) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Returns `true` if `remote_id` is one of this client's own records.
    pub fn contains_remote(&self, remote_id: &str) -> bool {
        self.by_remote.contains_key(remote_id)
    }

    /// The local handle publishing under `remote_id`.
    pub fn handle_for_remote(&self, remote_id: &str) -> Option<H> {
        self.by_remote.get(remote_id).copied()
    }

    /// The remote id of a registered handle, once active.
    pub fn remote_id(&self, handle: H) -> Option<&str> {
        self.entries.get(&handle).and_then(BroadcastEntry::remote_id)
    }

    /// Reads an entry.
    pub fn get(&self, handle: H) -> Option<&BroadcastEntry> {
        self.entries.get(&handle)
    }

    /// Mutates an entry.
    pub fn get_mut(&mut self, handle: H) -> Option<&mut BroadcastEntry> {
        self.entries.get_mut(&handle)
    }

    /// Unregisters a handle.
    pub fn remove(&mut self, handle: H) -> Option<BroadcastEntry> {
        let entry = self.entries.remove(&handle)?;
        self.order.retain(|&registered| registered != handle);
        if let Some(remote_id) = entry.remote_id() {
            self.by_remote.remove(remote_id);
        }
        Some(entry)
    }

    /// Registered handles in registration order.
    pub fn handles(&self) -> Vec<H> {
        self.order.clone()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: Copy + Eq + Hash> Default for BroadcastTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// The broadcast capability attached to one local entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastComponent {
    /// Settings handed to the sync system on init.
    pub config: BroadcastConfig,
}

impl BroadcastComponent {
    /// Wraps the given settings.
    pub fn new(config: BroadcastConfig) -> Self {
        Self { config }
    }

    /// Builds the component from an inline declaration string.
    pub fn from_declarations(text: &str) -> Self {
        Self::new(BroadcastConfig::parse(text))
    }

    /// Activates broadcasting for `entity`. Does nothing when no components
    /// are configured.
    pub fn init<G, S>(&self, system: &mut S, scene: &G, entity: G::Handle) -> Result<(), SyncError>
    where
        G: SceneGraph,
        S: SyncSystem<G> + ?Sized,
    {
        if self.config.components.is_empty() {
            return Ok(());
        }
        system.register_broadcast(scene, entity, self.config.clone())
    }
}
