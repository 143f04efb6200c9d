//! The scene graph interface consumed by the sync layer.

use std::fmt::Debug;
use std::hash::Hash;

use serde_json::Value;

/// A hierarchical scene of entities carrying named component values.
///
/// Handles are opaque, cheap to copy, and owned by the implementation.
/// Callers must tolerate handles that have been detached from the tree.
pub trait SceneGraph {
    /// Opaque reference to one entity.
    type Handle: Copy + Eq + Hash + Debug;

    /// The scene root. Never detached.
    fn root(&self) -> Self::Handle;

    /// Creates a new entity that is not yet attached anywhere.
    fn create_entity(&mut self) -> Self::Handle;

    /// Returns `true` if the handle refers to a live entity.
    fn contains(&self, entity: Self::Handle) -> bool;

    /// Finds an entity attached to the scene by its stable element id.
    fn find_by_id(&self, id: &str) -> Option<Self::Handle>;

    /// The entity's stable element id, if it has one.
    fn element_id(&self, entity: Self::Handle) -> Option<String>;

    /// Assigns the entity's element id. An empty id clears it.
    fn set_element_id(&mut self, entity: Self::Handle, id: &str);

    /// The entity's current parent, or `None` for the root and detached
    /// entities.
    fn parent(&self, entity: Self::Handle) -> Option<Self::Handle>;

    /// Moves `child` under `parent`, detaching it from any previous parent.
    fn attach(&mut self, child: Self::Handle, parent: Self::Handle);

    /// Detaches the entity from its parent. Its own children stay under it.
    fn detach(&mut self, entity: Self::Handle);

    /// Reads a whole component value.
    fn component(&self, entity: Self::Handle, name: &str) -> Option<Value>;

    /// Replaces a whole component value.
    fn set_component(&mut self, entity: Self::Handle, name: &str, value: Value);

    /// Returns `true` if the entity is the root or reaches it through its
    /// parent chain.
    fn is_in_scene(&self, entity: Self::Handle) -> bool {
        let root = self.root();
        let mut current = entity;
        loop {
            if current == root {
                return true;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}
