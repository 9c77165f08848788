//! Host-side map model exposed to plugins.
//!
//! These are the aggregates the bridge hands to scripts by reference. The
//! host owns them (shared, interior-mutable); facades in
//! [`crate::script::facade`] only ever hold non-owning clones of the
//! pointers.

use std::cell::RefCell;
use std::rc::Rc;

pub mod edit;
pub mod entity;
pub mod room;

pub use edit::StagedEdit;
pub use entity::{Entity, EntityRef, Node};
pub use room::{Room, RoomRef};

/// Host-owned, shared, interior-mutable aggregate.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a value for sharing with the bridge.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Pointer identity of a shared aggregate.
pub fn identity<T>(value: &Shared<T>) -> usize {
    Rc::as_ptr(value) as *const () as usize
}
