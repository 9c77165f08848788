//! Ordered-list facade.

use std::any::Any;
use std::rc::Rc;

use crate::map::{self, Node, Shared};
use crate::script::value::{HostValue, Key};
use crate::script::wrapper::{Field, Wrapper, WrapperKind};
use crate::{BridgeError, Result};

use super::NodeWrapper;

enum Backing {
    Values(Shared<Vec<HostValue>>),
    Nodes(Shared<Vec<Node>>),
}

/// 1-based view over a shared host list.
///
/// Writing index `len + 1` appends; writing `nil` to the last index pops.
/// Holes are refused so the list stays a sequence. Node elements are handed
/// out as [`NodeWrapper`]s over the same list.
pub struct ListWrapper {
    backing: Backing,
    read_only: bool,
}

impl ListWrapper {
    pub fn values(items: Shared<Vec<HostValue>>) -> Self {
        Self {
            backing: Backing::Values(items),
            read_only: false,
        }
    }

    pub fn nodes(nodes: Shared<Vec<Node>>) -> Self {
        Self {
            backing: Backing::Nodes(nodes),
            read_only: false,
        }
    }

    /// Refuse writes to the list and to the node facades it hands out.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn slot(key: &Key) -> Option<usize> {
        match key.as_index() {
            Some(i) if i >= 1 => Some((i - 1) as usize),
            _ => None,
        }
    }
}

fn write<T, F>(items: &mut Vec<T>, slot: usize, value: HostValue, parse: F) -> Result<()>
where
    F: Fn(&HostValue) -> Option<T>,
{
    if value.holds_wrapper() {
        return Err(BridgeError::Validation(format!(
            "index {} cannot hold a wrapper handle: {value}",
            slot + 1
        )));
    }
    let len = items.len();
    if value.is_nil() {
        if len > 0 && slot == len - 1 {
            items.pop();
            return Ok(());
        }
        return Err(BridgeError::Validation(format!(
            "cannot clear index {} of a list of {len}",
            slot + 1
        )));
    }
    let parsed = parse(&value).ok_or_else(|| {
        BridgeError::Validation(format!("unsupported list element: {value}"))
    })?;
    if slot < len {
        items[slot] = parsed;
    } else if slot == len {
        items.push(parsed);
    } else {
        return Err(BridgeError::Validation(format!(
            "index {} leaves a hole in a list of {len}",
            slot + 1
        )));
    }
    Ok(())
}

impl Wrapper for ListWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::List
    }

    fn identity(&self) -> usize {
        match &self.backing {
            Backing::Values(items) => map::identity(items),
            Backing::Nodes(nodes) => map::identity(nodes),
        }
    }

    fn get(&self, key: &Key) -> Field {
        let Some(slot) = Self::slot(key) else {
            return Field::nil();
        };
        match &self.backing {
            Backing::Values(items) => {
                Field::Value(items.borrow().get(slot).cloned().unwrap_or_default())
            }
            Backing::Nodes(nodes) => {
                if slot < nodes.borrow().len() {
                    let node = NodeWrapper::new(Rc::clone(nodes), slot);
                    let node = if self.read_only { node.read_only() } else { node };
                    Field::Wrapper(Rc::new(node))
                } else {
                    Field::nil()
                }
            }
        }
    }

    fn set(&self, key: &Key, value: HostValue) -> Result<()> {
        if self.read_only {
            return Err(BridgeError::Validation(format!("list is read-only (writing {key})")));
        }
        let slot = Self::slot(key).ok_or_else(|| {
            BridgeError::Validation(format!("list index must be a positive integer, got {key}"))
        })?;
        match &self.backing {
            Backing::Values(items) => {
                write(&mut items.borrow_mut(), slot, value, |v| Some(v.clone()))
            }
            Backing::Nodes(nodes) => write(&mut nodes.borrow_mut(), slot, value, Node::from_value),
        }
    }

    fn len(&self) -> usize {
        match &self.backing {
            Backing::Values(items) => items.borrow().len(),
            Backing::Nodes(nodes) => nodes.borrow().len(),
        }
    }

    fn next(&self, after: Option<&Key>) -> Option<(Key, Field)> {
        let index = match after {
            None => 1,
            Some(key) => key.as_index()?.checked_add(1)?,
        };
        if usize::try_from(index).map_or(true, |i| i < 1 || i > self.len()) {
            return None;
        }
        let key = Key::Index(index);
        let field = self.get(&key);
        Some((key, field))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
