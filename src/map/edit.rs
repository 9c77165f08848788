//! Staged property edits applied to an entity as one unit.

use std::collections::BTreeMap;

use crate::script::value::HostValue;
use crate::{BridgeError, Result};

use super::{shared, EntityRef, Node, Shared};

/// A batch of named property edits against one entity.
///
/// Fixed fields (`x`, `y`, `width`, `height`) and property-bag keys share
/// one namespace, the same way scripts see them. The node list is staged
/// as a whole. Nothing reaches the entity until [`StagedEdit::apply`], which
/// validates every edit before writing any of them.
///
/// Wrapper handles are refused: they die with the operation that issued
/// them and must never end up in host data.
#[derive(Debug, Default)]
pub struct StagedEdit {
    fields: BTreeMap<String, HostValue>,
    nodes: Option<Shared<Vec<Node>>>,
}

impl StagedEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a value. `nil` removes a property-bag key on apply.
    pub fn set(&mut self, name: &str, value: HostValue) -> Result<()> {
        if value.holds_wrapper() {
            return Err(BridgeError::Validation(format!(
                "'{name}' cannot hold a wrapper handle: {value}"
            )));
        }
        if name == "nodes" {
            self.nodes = Some(shared(parse_nodes(value)?));
            return Ok(());
        }
        if matches!(name, "_id" | "_name") {
            return Err(BridgeError::Validation(format!("'{name}' is read-only")));
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.fields.get(name)
    }

    /// Names with a staged value, in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The staged node list, if nodes were touched.
    pub fn nodes(&self) -> Option<&Shared<Vec<Node>>> {
        self.nodes.as_ref()
    }

    /// Stage the node list, seeding it from the entity on first use.
    pub fn nodes_or_copy(&mut self, entity: &EntityRef) -> Shared<Vec<Node>> {
        self.nodes
            .get_or_insert_with(|| shared(entity.borrow().nodes.borrow().clone()))
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.nodes.is_none()
    }

    /// Number of staged edits (the node list counts as one).
    pub fn len(&self) -> usize {
        self.fields.len() + usize::from(self.nodes.is_some())
    }

    /// Apply every staged edit, or none of them.
    ///
    /// Returns whether the entity ended up different from before.
    pub fn apply(&self, entity: &EntityRef) -> Result<bool> {
        let mut fields = Vec::new();
        let mut data = Vec::new();
        for (name, value) in &self.fields {
            if super::Entity::is_field(name) {
                let number = value.to_int::<i32>().map_err(|e| {
                    BridgeError::Validation(format!("field '{name}': {e}"))
                })?;
                fields.push((name.as_str(), number));
            } else {
                data.push((name, value));
            }
        }

        let mut changed = false;
        let mut target = entity.borrow_mut();
        for (name, number) in fields {
            if let Some(slot) = target.field_mut(name) {
                changed |= *slot != number;
                *slot = number;
            }
        }
        {
            let mut bag = target.data.borrow_mut();
            for (name, value) in data {
                let previous = if value.is_nil() {
                    bag.remove(name)
                } else {
                    bag.insert(name.clone(), value.clone())
                };
                changed |= previous.as_ref().unwrap_or(&HostValue::Nil) != value;
            }
        }
        if let Some(staged) = &self.nodes {
            let staged = staged.borrow();
            let mut nodes = target.nodes.borrow_mut();
            if *nodes != *staged {
                nodes.clone_from(&staged);
                changed = true;
            }
        }
        Ok(changed)
    }
}

fn parse_nodes(value: HostValue) -> Result<Vec<Node>> {
    let HostValue::List(items) = value else {
        return Err(BridgeError::Validation(format!(
            "nodes must be a list, got {}",
            value.kind()
        )));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            Node::from_value(item).ok_or_else(|| {
                BridgeError::Validation(format!("node {} is not an {{x, y}} pair: {item}", i + 1))
            })
        })
        .collect()
}
