//! Single-node facade.

use std::any::Any;

use crate::map::{self, Node, Shared};
use crate::script::value::{HostValue, Key};
use crate::script::wrapper::{Field, Wrapper, WrapperKind};
use crate::{BridgeError, Result};

use super::next_in;

const KEYS: [Key; 2] = [Key::X, Key::Y];

/// One node of an entity, addressed by its position in a node list.
///
/// The list is either the entity's own or the staged copy an edit hook
/// works on, so `node.x = ..` lands wherever the list lives. A position
/// that no longer exists reads as `nil` and refuses writes.
pub struct NodeWrapper {
    nodes: Shared<Vec<Node>>,
    index: usize,
    read_only: bool,
}

impl NodeWrapper {
    /// `index` is zero-based.
    pub fn new(nodes: Shared<Vec<Node>>, index: usize) -> Self {
        Self {
            nodes,
            index,
            read_only: false,
        }
    }

    /// Refuse writes, for nodes of a live entity.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn node(&self) -> Option<Node> {
        self.nodes.borrow().get(self.index).copied()
    }
}

impl Wrapper for NodeWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::Node
    }

    fn identity(&self) -> usize {
        map::identity(&self.nodes)
    }

    fn position(&self) -> usize {
        self.index
    }

    fn get(&self, key: &Key) -> Field {
        let Some(node) = self.node() else {
            return Field::nil();
        };
        match key {
            Key::X => HostValue::Int(i64::from(node.x)).into(),
            Key::Y => HostValue::Int(i64::from(node.y)).into(),
            _ => Field::nil(),
        }
    }

    fn set(&self, key: &Key, value: HostValue) -> Result<()> {
        if self.read_only {
            return Err(BridgeError::Validation(format!(
                "node {} is read-only (writing {key})",
                self.index + 1
            )));
        }
        let coordinate = value
            .to_int::<i32>()
            .map_err(|e| BridgeError::Validation(format!("node {key}: {e}")))?;
        let mut nodes = self.nodes.borrow_mut();
        let len = nodes.len();
        let node = nodes.get_mut(self.index).ok_or_else(|| {
            BridgeError::Validation(format!(
                "node {} is gone from a list of {len}",
                self.index + 1
            ))
        })?;
        match key {
            Key::X => node.x = coordinate,
            Key::Y => node.y = coordinate,
            other => {
                return Err(BridgeError::Validation(format!(
                    "nodes only have x and y, not {other}"
                )))
            }
        }
        Ok(())
    }

    fn next(&self, after: Option<&Key>) -> Option<(Key, Field)> {
        self.node()?;
        next_in(&KEYS, after, |key| self.get(key))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
