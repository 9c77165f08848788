//! Read-only entity facade.

use std::any::Any;
use std::rc::Rc;

use crate::map::{self, Entity, EntityRef};
use crate::script::value::{HostValue, Key};
use crate::script::wrapper::{Field, Wrapper, WrapperKind};

use super::{next_in, ListWrapper};

/// Names every entity answers to before its property bag.
pub(crate) const FIXED_KEYS: [&str; 7] = ["_id", "_name", "x", "y", "width", "height", "nodes"];

/// Exposes an entity's fields, nodes and property bag.
///
/// Writes are refused; plugins that edit entities get a [`super::CowWrapper`].
pub struct EntityWrapper {
    entity: EntityRef,
}

impl EntityWrapper {
    pub fn new(entity: EntityRef) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Read `key` from `entity` the way scripts see it.
    pub(crate) fn read(entity: &EntityRef, key: &Key) -> Field {
        let target = entity.borrow();
        match key {
            Key::X => HostValue::Int(i64::from(target.x)).into(),
            Key::Y => HostValue::Int(i64::from(target.y)).into(),
            Key::Index(_) => Field::nil(),
            Key::Name(name) => match name.as_str() {
                "_id" => HostValue::Int(target.id).into(),
                "_name" => HostValue::Text(target.name.clone()).into(),
                "nodes" => Field::Wrapper(Rc::new(
                    ListWrapper::nodes(Rc::clone(&target.nodes)).read_only(),
                )),
                other => match target.field(other) {
                    Some(value) => HostValue::Int(i64::from(value)).into(),
                    None => target
                        .data
                        .borrow()
                        .get(other)
                        .cloned()
                        .unwrap_or_default()
                        .into(),
                },
            },
        }
    }

    /// Fixed keys followed by property-bag keys not shadowed by them.
    pub(crate) fn keys(entity: &Entity, extra: impl IntoIterator<Item = String>) -> Vec<Key> {
        let mut names: Vec<String> = entity
            .data
            .borrow()
            .keys()
            .cloned()
            .chain(extra)
            .filter(|name| !FIXED_KEYS.contains(&name.as_str()))
            .collect();
        names.sort();
        names.dedup();

        FIXED_KEYS
            .iter()
            .map(|name| Key::named(name))
            .chain(names.iter().map(|name| Key::named(name)))
            .collect()
    }
}

impl Wrapper for EntityWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::Entity
    }

    fn identity(&self) -> usize {
        map::identity(&self.entity)
    }

    fn get(&self, key: &Key) -> Field {
        Self::read(&self.entity, key)
    }

    fn next(&self, after: Option<&Key>) -> Option<(Key, Field)> {
        let keys = Self::keys(&self.entity.borrow(), None);
        next_in(&keys, after, |key| self.get(key))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(field: Field) -> HostValue {
        match field {
            Field::Value(value) => value,
            Field::Wrapper(w) => panic!("expected value, got {}", w.kind()),
        }
    }

    #[test]
    fn test_fields_and_bag() {
        let entity = Entity::new(7, "spring", 10, 20)
            .with_size(16, 8)
            .with_data("index", 3)
            .into_ref();
        let wrapper = EntityWrapper::new(entity);

        assert_eq!(value(wrapper.get(&Key::X)), HostValue::Int(10));
        assert_eq!(value(wrapper.get(&Key::named("y"))), HostValue::Int(20));
        assert_eq!(value(wrapper.get(&Key::named("width"))), HostValue::Int(16));
        assert_eq!(value(wrapper.get(&Key::named("_id"))), HostValue::Int(7));
        assert_eq!(value(wrapper.get(&Key::named("_name"))), HostValue::Text("spring".into()));
        assert_eq!(value(wrapper.get(&Key::named("index"))), HostValue::Int(3));
        assert_eq!(value(wrapper.get(&Key::named("missing"))), HostValue::Nil);
        assert_eq!(value(wrapper.get(&Key::Index(1))), HostValue::Nil);
    }

    #[test]
    fn test_nodes_is_a_list_facade() {
        let entity = Entity::new(1, "zipper", 0, 0).with_node(5, 6).into_ref();
        let wrapper = EntityWrapper::new(Rc::clone(&entity));

        match wrapper.get(&Key::named("nodes")) {
            Field::Wrapper(nodes) => {
                assert_eq!(nodes.kind(), WrapperKind::List);
                assert_eq!(nodes.len(), 1);
                assert_eq!(nodes.identity(), map::identity(&entity.borrow().nodes));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_writes_refused() {
        let wrapper = EntityWrapper::new(Entity::new(1, "a", 0, 0).into_ref());
        assert!(wrapper.set(&Key::X, HostValue::Int(4)).is_err());
        assert_eq!(wrapper.entity().borrow().x, 0);

        let entity = Entity::new(2, "zipper", 0, 0).with_node(1, 1).into_ref();
        let Field::Wrapper(nodes) = EntityWrapper::new(Rc::clone(&entity)).get(&Key::named("nodes"))
        else {
            panic!("nodes should be a wrapper");
        };
        assert!(nodes.set(&Key::Index(2), HostValue::Nil).is_err());
        assert_eq!(entity.borrow().nodes.borrow().len(), 1);
    }

    #[test]
    fn test_iteration_order() {
        let entity = Entity::new(1, "a", 0, 0)
            .with_data("zeta", 1)
            .with_data("alpha", 2)
            .into_ref();
        let wrapper = EntityWrapper::new(entity);

        let mut keys = Vec::new();
        let mut cursor = None;
        while let Some((key, _)) = wrapper.next(cursor.as_ref()) {
            keys.push(key.to_string());
            cursor = Some(key);
        }
        assert_eq!(
            keys,
            vec!["_id", "_name", "x", "y", "width", "height", "nodes", "alpha", "zeta"]
        );
    }

    #[test]
    fn test_iteration_survives_removed_key() {
        let entity = Entity::new(1, "a", 0, 0).with_data("alpha", 2).into_ref();
        let wrapper = EntityWrapper::new(Rc::clone(&entity));

        let after = Key::named("alpha");
        entity.borrow().data.borrow_mut().remove("alpha");
        assert!(wrapper.next(Some(&after)).is_none());
    }
}
