//! Copy-on-write entity facade used by edit hooks.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::map::{self, EntityRef, StagedEdit};
use crate::script::value::{HostValue, Key};
use crate::script::wrapper::{Field, Wrapper, WrapperKind};
use crate::{BridgeError, Result};

use super::{next_in, EntityWrapper, ListWrapper};

/// Entity view whose writes land in a [`StagedEdit`].
///
/// Reads see staged values first and fall through to the entity. The node
/// list is copied into the batch the first time a script touches it. The
/// entity itself is only changed by [`CowWrapper::commit`].
pub struct CowWrapper {
    base: EntityRef,
    staged: RefCell<StagedEdit>,
}

impl CowWrapper {
    pub fn new(base: EntityRef) -> Self {
        Self {
            base,
            staged: RefCell::new(StagedEdit::new()),
        }
    }

    pub fn base(&self) -> &EntityRef {
        &self.base
    }

    pub fn staged_len(&self) -> usize {
        self.staged.borrow().len()
    }

    /// Apply the staged batch to the entity, all or nothing. Returns
    /// whether the entity changed.
    pub fn commit(&self) -> Result<bool> {
        self.staged.borrow().apply(&self.base)
    }

    /// Throw the staged batch away.
    pub fn discard(&self) {
        *self.staged.borrow_mut() = StagedEdit::new();
    }
}

impl Wrapper for CowWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::CopyOnWrite
    }

    fn identity(&self) -> usize {
        map::identity(&self.base)
    }

    fn get(&self, key: &Key) -> Field {
        let Some(name) = key.as_str() else {
            return Field::nil();
        };
        if name == "nodes" {
            let nodes = self.staged.borrow_mut().nodes_or_copy(&self.base);
            return Field::Wrapper(Rc::new(ListWrapper::nodes(nodes)));
        }
        if let Some(value) = self.staged.borrow().get(name) {
            return Field::Value(value.clone());
        }
        EntityWrapper::read(&self.base, key)
    }

    fn set(&self, key: &Key, value: HostValue) -> Result<()> {
        let name = key.as_str().ok_or_else(|| {
            BridgeError::Validation(format!("entity keys must be text, got {key}"))
        })?;
        self.staged.borrow_mut().set(name, value)
    }

    fn next(&self, after: Option<&Key>) -> Option<(Key, Field)> {
        let keys = {
            let staged = self.staged.borrow();
            let extra: Vec<String> = staged_names(&staged);
            EntityWrapper::keys(&self.base.borrow(), extra)
        };
        next_in(&keys, after, |key| self.get(key))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn staged_names(staged: &StagedEdit) -> Vec<String> {
    staged.field_names().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Entity, Node};

    #[test]
    fn test_writes_are_staged() {
        let entity = Entity::new(1, "spring", 10, 0).into_ref();
        let cow = CowWrapper::new(Rc::clone(&entity));

        cow.set(&Key::X, HostValue::Int(40)).unwrap();
        assert_eq!(cow.staged_len(), 1);
        assert!(matches!(cow.get(&Key::X), Field::Value(HostValue::Int(40))));
        assert_eq!(entity.borrow().x, 10);

        cow.commit().unwrap();
        assert_eq!(entity.borrow().x, 40);
    }

    #[test]
    fn test_discard() {
        let entity = Entity::new(1, "spring", 10, 0).into_ref();
        let cow = CowWrapper::new(Rc::clone(&entity));

        cow.set(&Key::named("orientation"), HostValue::Text("left".into())).unwrap();
        cow.discard();
        cow.commit().unwrap();
        assert!(entity.borrow().data.borrow().is_empty());
    }

    #[test]
    fn test_nodes_copied_once() {
        let entity = Entity::new(1, "zipper", 0, 0).with_node(1, 1).into_ref();
        let cow = CowWrapper::new(Rc::clone(&entity));

        let Field::Wrapper(first) = cow.get(&Key::named("nodes")) else {
            panic!("nodes should be a wrapper");
        };
        first.set(&Key::Index(1), Node::new(9, 9).to_value()).unwrap();

        let Field::Wrapper(second) = cow.get(&Key::named("nodes")) else {
            panic!("nodes should be a wrapper");
        };
        assert_eq!(first.identity(), second.identity());
        assert_eq!(entity.borrow().nodes.borrow()[0], Node::new(1, 1));

        cow.commit().unwrap();
        assert_eq!(entity.borrow().nodes.borrow()[0], Node::new(9, 9));
    }

    #[test]
    fn test_node_field_writes_are_staged() {
        let entity = Entity::new(1, "zipper", 0, 0).with_node(16, 0).into_ref();
        let cow = CowWrapper::new(Rc::clone(&entity));

        let Field::Wrapper(nodes) = cow.get(&Key::named("nodes")) else {
            panic!("nodes should be a wrapper");
        };
        let Field::Wrapper(node) = nodes.get(&Key::Index(1)) else {
            panic!("node should be a wrapper");
        };
        node.set(&Key::X, HostValue::Int(24)).unwrap();
        node.set(&Key::Y, HostValue::Int(4)).unwrap();
        assert_eq!(entity.borrow().nodes.borrow()[0], Node::new(16, 0));

        assert!(cow.commit().unwrap());
        assert_eq!(entity.borrow().nodes.borrow()[0], Node::new(24, 4));
    }

    #[test]
    fn test_iteration_includes_staged_keys() {
        let entity = Entity::new(1, "a", 0, 0).into_ref();
        let cow = CowWrapper::new(entity);
        cow.set(&Key::named("added"), HostValue::Int(1)).unwrap();

        let mut last = None;
        while let Some((key, _)) = cow.next(last.as_ref()) {
            last = Some(key);
        }
        assert_eq!(last, Some(Key::named("added")));
    }
}
