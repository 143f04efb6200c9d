//! Attribute accessor: reads and writes `component` or `component|property`
//! values on a scene entity.

use scenecast_scene::SceneGraph;
use serde_json::{Map, Value};

use crate::record::ID_FIELD;

/// Separator between a component name and one of its properties.
pub const PROPERTY_SEPARATOR: char = '|';

/// A parsed attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePath<'a> {
    /// Component name.
    pub component: &'a str,
    /// Single property of the component, when addressed with `|`.
    pub property: Option<&'a str>,
}

impl<'a> AttributePath<'a> {
    /// Splits `name` at the first `|`.
    pub fn parse(name: &'a str) -> Self {
        match name.split_once(PROPERTY_SEPARATOR) {
            Some((component, property)) => Self {
                component,
                property: Some(property),
            },
            None => Self {
                component: name,
                property: None,
            },
        }
    }
}

/// Reads the value addressed by `name`.
///
/// The `id` attribute reads the element id.
pub fn get_attribute<G: SceneGraph>(scene: &G, entity: G::Handle, name: &str) -> Option<Value> {
    let path = AttributePath::parse(name);
    if path.component == ID_FIELD && path.property.is_none() {
        return scene.element_id(entity).map(Value::String);
    }

    let value = scene.component(entity, path.component)?;
    match path.property {
        None => Some(value),
        Some(property) => value.get(property).cloned(),
    }
}

/// Writes the value addressed by `name`.
///
/// A bare component name replaces the whole component. A
/// `component|property` name sets one property and keeps the others,
/// turning a missing or non-object component into an object. The `id`
/// attribute writes the element id.
pub fn set_attribute<G: SceneGraph>(scene: &mut G, entity: G::Handle, name: &str, value: Value) {
    let path = AttributePath::parse(name);
    if path.component == ID_FIELD && path.property.is_none() {
        match value {
            Value::String(id) => scene.set_element_id(entity, &id),
            Value::Null => scene.set_element_id(entity, ""),
            other => scene.set_element_id(entity, &other.to_string()),
        }
        return;
    }

    match path.property {
        None => scene.set_component(entity, path.component, value),
        Some(property) => {
            let mut object = match scene.component(entity, path.component) {
                Some(Value::Object(object)) => object,
                _ => Map::new(),
            };
            object.insert(property.to_string(), value);
            scene.set_component(entity, path.component, Value::Object(object));
        }
    }
}
