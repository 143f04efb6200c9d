//! [`SceneGraph`] implementation backed by a `bevy_ecs` world.
//!
//! Hierarchy lives in [`ParentLink`] / [`ChildLinks`] components, named
//! component values in [`ComponentData`], and element ids in [`ElementId`]
//! plus an explicit id → entity index kept next to the world.

use std::collections::{BTreeMap, HashMap};

use bevy_ecs::prelude::*;
use serde_json::Value;

use crate::SceneGraph;

/// Marker for the single scene root entity.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SceneRoot;

/// Stable application-level id of an entity.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct ElementId(pub String);

/// The entity's parent. Absent on the root and on detached entities.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink(pub Entity);

/// Ordered children of an entity.
#[derive(Component, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildLinks(pub Vec<Entity>);

/// Named component values of an entity.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct ComponentData(pub BTreeMap<String, Value>);

/// An ECS-backed scene graph.
pub struct EcsScene {
    world: World,
    root: Entity,
    /// Entities per element id, in the order they took the id.
    ids: HashMap<String, Vec<Entity>>,
}

impl EcsScene {
    /// Creates a scene containing only the root.
    pub fn new() -> Self {
        let mut world = World::new();
        let root = world
            .spawn((SceneRoot, ChildLinks::default(), ComponentData::default()))
            .id();
        Self {
            world,
            root,
            ids: HashMap::new(),
        }
    }

    /// Spawns an entity with the given element id and attaches it under
    /// `parent`.
    pub fn spawn_with_id(&mut self, id: &str, parent: Entity) -> Entity {
        let entity = self.create_entity();
        self.set_element_id(entity, id);
        self.attach(entity, parent);
        entity
    }

    /// Children of `entity`, in attachment order.
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.world
            .get::<ChildLinks>(entity)
            .map(|links| links.0.clone())
            .unwrap_or_default()
    }

    /// Read access to the underlying world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the underlying world. Structural edits made here
    /// bypass the id index.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn is_ancestor_or_self(&self, candidate: Entity, entity: Entity) -> bool {
        let mut current = Some(entity);
        while let Some(node) = current {
            if node == candidate {
                return true;
            }
            current = self.parent(node);
        }
        false
    }
}

impl Default for EcsScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph for EcsScene {
    type Handle = Entity;

    fn root(&self) -> Entity {
        self.root
    }

    fn create_entity(&mut self) -> Entity {
        self.world
            .spawn((ChildLinks::default(), ComponentData::default()))
            .id()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.world.get_entity(entity).is_ok()
    }

    fn find_by_id(&self, id: &str) -> Option<Entity> {
        self.ids.get(id)?.iter().copied().find(|&entity| {
            self.contains(entity) && self.is_in_scene(entity)
        })
    }

    fn element_id(&self, entity: Entity) -> Option<String> {
        self.world.get::<ElementId>(entity).map(|id| id.0.clone())
    }

    fn set_element_id(&mut self, entity: Entity, id: &str) {
        let previous = self.element_id(entity);
        if previous.as_deref() == Some(id) {
            return;
        }
        if let Some(previous) = previous
            && let Some(holders) = self.ids.get_mut(&previous)
        {
            holders.retain(|&holder| holder != entity);
            if holders.is_empty() {
                self.ids.remove(&previous);
            }
        }

        let Ok(mut entity_mut) = self.world.get_entity_mut(entity) else {
            return;
        };
        if id.is_empty() {
            entity_mut.remove::<ElementId>();
        } else {
            entity_mut.insert(ElementId(id.to_string()));
            self.ids.entry(id.to_string()).or_default().push(entity);
        }
    }

    fn parent(&self, entity: Entity) -> Option<Entity> {
        self.world.get::<ParentLink>(entity).map(|link| link.0)
    }

    fn attach(&mut self, child: Entity, parent: Entity) {
        if child == self.root || !self.contains(child) || !self.contains(parent) {
            tracing::warn!(?child, ?parent, "Refusing to attach invalid entity");
            return;
        }
        if self.is_ancestor_or_self(child, parent) {
            tracing::warn!(?child, ?parent, "Refusing to attach entity under its own subtree");
            return;
        }

        self.detach(child);
        if let Some(mut links) = self.world.get_mut::<ChildLinks>(parent) {
            links.0.push(child);
        }
        if let Ok(mut entity_mut) = self.world.get_entity_mut(child) {
            entity_mut.insert(ParentLink(parent));
        }
    }

    fn detach(&mut self, entity: Entity) {
        let Some(parent) = self.parent(entity) else {
            return;
        };
        if let Some(mut links) = self.world.get_mut::<ChildLinks>(parent) {
            links.0.retain(|&child| child != entity);
        }
        if let Ok(mut entity_mut) = self.world.get_entity_mut(entity) {
            entity_mut.remove::<ParentLink>();
        }
    }

    fn component(&self, entity: Entity, name: &str) -> Option<Value> {
        self.world
            .get::<ComponentData>(entity)
            .and_then(|data| data.0.get(name).cloned())
    }

    fn set_component(&mut self, entity: Entity, name: &str, value: Value) {
        if let Some(mut data) = self.world.get_mut::<ComponentData>(entity) {
            data.0.insert(name.to_string(), value);
        }
    }
}
