//! Room facade.

use std::any::Any;
use std::rc::Rc;

use crate::map::{self, RoomRef};
use crate::script::value::{HostValue, Key};
use crate::script::wrapper::{Field, Wrapper, WrapperKind};

use super::{next_in, EntityWrapper};

const ROOM_KEYS: [&str; 6] = ["name", "x", "y", "width", "height", "entities"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Room,
    Entities,
}

/// Read-only view of a room, or of its entity list.
///
/// The entity list is its own facade kind so `room.entities[i]` and `#room.entities`
/// dispatch without materializing a script table.
pub struct RoomWrapper {
    room: RoomRef,
    view: View,
}

impl RoomWrapper {
    pub fn new(room: RoomRef) -> Self {
        Self {
            room,
            view: View::Room,
        }
    }

    pub fn entities(room: RoomRef) -> Self {
        Self {
            room,
            view: View::Entities,
        }
    }

    pub fn room(&self) -> &RoomRef {
        &self.room
    }

    fn entity_at(&self, key: &Key) -> Field {
        let room = self.room.borrow();
        let entity = key
            .as_index()
            .filter(|i| *i >= 1)
            .and_then(|i| room.entities.get((i - 1) as usize));
        match entity {
            Some(entity) => Field::Wrapper(Rc::new(EntityWrapper::new(Rc::clone(entity)))),
            None => Field::nil(),
        }
    }

    fn room_field(&self, key: &Key) -> Field {
        let room = self.room.borrow();
        let value = match key {
            Key::X => HostValue::Int(i64::from(room.x)),
            Key::Y => HostValue::Int(i64::from(room.y)),
            Key::Index(_) => HostValue::Nil,
            Key::Name(name) => match name.as_str() {
                "name" => HostValue::Text(room.name.clone()),
                "width" => HostValue::Int(i64::from(room.width)),
                "height" => HostValue::Int(i64::from(room.height)),
                "entities" => {
                    return Field::Wrapper(Rc::new(RoomWrapper::entities(Rc::clone(&self.room))))
                }
                _ => HostValue::Nil,
            },
        };
        Field::Value(value)
    }
}

impl Wrapper for RoomWrapper {
    fn kind(&self) -> WrapperKind {
        match self.view {
            View::Room => WrapperKind::Room,
            View::Entities => WrapperKind::RoomEntities,
        }
    }

    fn identity(&self) -> usize {
        map::identity(&self.room)
    }

    fn get(&self, key: &Key) -> Field {
        match self.view {
            View::Room => self.room_field(key),
            View::Entities => self.entity_at(key),
        }
    }

    fn len(&self) -> usize {
        match self.view {
            View::Room => 0,
            View::Entities => self.room.borrow().entities.len(),
        }
    }

    fn next(&self, after: Option<&Key>) -> Option<(Key, Field)> {
        match self.view {
            View::Room => {
                let keys: Vec<Key> = ROOM_KEYS.iter().map(|name| Key::named(name)).collect();
                next_in(&keys, after, |key| self.get(key))
            }
            View::Entities => {
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
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Entity, Room};

    fn room() -> RoomRef {
        Room::new("lvl_a", 320, 180)
            .with_entity(Entity::new(1, "spring", 0, 0).into_ref())
            .with_entity(Entity::new(2, "refill", 0, 0).into_ref())
            .into_ref()
    }

    #[test]
    fn test_room_fields() {
        let wrapper = RoomWrapper::new(room());
        assert!(matches!(
            wrapper.get(&Key::named("name")),
            Field::Value(HostValue::Text(ref n)) if n == "lvl_a"
        ));
        assert!(matches!(wrapper.get(&Key::named("width")), Field::Value(HostValue::Int(320))));
    }

    #[test]
    fn test_entities_view() {
        let room = room();
        let wrapper = RoomWrapper::new(Rc::clone(&room));

        let Field::Wrapper(entities) = wrapper.get(&Key::named("entities")) else {
            panic!("entities should be a wrapper");
        };
        assert_eq!(entities.kind(), WrapperKind::RoomEntities);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities.identity(), wrapper.identity());

        let Field::Wrapper(second) = entities.get(&Key::Index(2)) else {
            panic!("entity should be a wrapper");
        };
        let second = second.as_any().downcast_ref::<EntityWrapper>().unwrap();
        assert!(Rc::ptr_eq(second.entity(), &room.borrow().entities[1]));
        assert!(matches!(entities.get(&Key::Index(3)), Field::Value(HostValue::Nil)));
    }

    #[test]
    fn test_entities_iteration_after_removal() {
        let room = room();
        let entities = RoomWrapper::entities(Rc::clone(&room));

        let (first, _) = entities.next(None).unwrap();
        let (second, _) = entities.next(Some(&first)).unwrap();
        room.borrow_mut().entities.clear();
        assert!(entities.next(Some(&second)).is_none());
    }

    #[test]
    fn test_entities_iteration_past_largest_index() {
        let entities = RoomWrapper::entities(room());
        assert!(entities.next(Some(&Key::Index(i64::MAX))).is_none());
    }
}
