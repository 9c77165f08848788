//! Rooms.

use super::{shared, EntityRef, Shared};

/// Shared handle to a host room.
pub type RoomRef = Shared<Room>;

/// A room and the entities placed in it, in placement order.
#[derive(Debug, Clone, Default)]
pub struct Room {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub entities: Vec<EntityRef>,
}

impl Room {
    pub fn new(name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn into_ref(self) -> RoomRef {
        shared(self)
    }

    pub fn entity_by_id(&self, id: i64) -> Option<EntityRef> {
        self.entities
            .iter()
            .find(|entity| entity.borrow().id == id)
            .cloned()
    }
}
