//! Replica table: remote ids of records this client applies locally.

use std::collections::HashMap;
use std::hash::Hash;

/// One remotely-originated (or remotely-claimed) entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaEntry<H> {
    /// Local entity the remote record is applied to.
    pub handle: H,
    /// Owner last reported by the remote record.
    pub owner: Option<String>,
}

/// Maps remote ids to local entity handles.
///
/// Several remote ids may point at the same handle when different clients
/// publish records for one shared entity.
#[derive(Debug, Clone)]
pub struct ReplicaTable<H> {
    entries: HashMap<String, ReplicaEntry<H>>,
}

impl<H: Copy + Eq + Hash> ReplicaTable<H> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Records a mapping. Returns `false` (and keeps the old entry) if the
    /// remote id is already known.
    pub fn insert(&mut self, remote_id: &str, handle: H, owner: Option<String>) -> bool {
        if self.entries.contains_key(remote_id) {
            return false;
        }
        self.entries
            .insert(remote_id.to_string(), ReplicaEntry { handle, owner });
        true
    }

    /// Returns `true` if the remote id is known.
    pub fn contains(&self, remote_id: &str) -> bool {
        self.entries.contains_key(remote_id)
    }

    /// The local handle for a remote id.
    pub fn handle(&self, remote_id: &str) -> Option<H> {
        self.entries.get(remote_id).map(|entry| entry.handle)
    }

    /// The full entry for a remote id.
    pub fn get(&self, remote_id: &str) -> Option<&ReplicaEntry<H>> {
        self.entries.get(remote_id)
    }

    /// Updates the owner last reported for a remote id.
    pub fn set_owner(&mut self, remote_id: &str, owner: Option<String>) {
        if let Some(entry) = self.entries.get_mut(remote_id) {
            entry.owner = owner;
        }
    }

    /// Removes and returns the entry for a remote id.
    pub fn remove(&mut self, remote_id: &str) -> Option<ReplicaEntry<H>> {
        self.entries.remove(remote_id)
    }

    /// The remote id mapped to `handle`.
    ///
    /// When several records map to one handle, the record reported as
    /// owned by `owner` wins, then the smallest remote id.
    pub fn remote_id_of(&self, handle: H, owner: Option<&str>) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.handle == handle)
            .min_by_key(|(remote_id, entry)| {
                let owned = owner.is_some() && entry.owner.as_deref() == owner;
                (!owned, remote_id.as_str())
            })
            .map(|(remote_id, _)| remote_id.as_str())
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: Copy + Eq + Hash> Default for ReplicaTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
