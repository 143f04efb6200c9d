//! Scene graph seam for scenecast.
//!
//! The sync layer never owns scene entities; it only holds handles into a
//! host scene graph through the [`SceneGraph`] trait. [`EcsScene`] is a
//! ready-made implementation on a `bevy_ecs` world with an explicit
//! id → entity index.

mod ecs_scene;
mod graph;

pub use ecs_scene::{ChildLinks, ComponentData, EcsScene, ElementId, ParentLink, SceneRoot};
pub use graph::SceneGraph;

/// Component values are open-ended JSON-like data.
pub use serde_json::Value;
