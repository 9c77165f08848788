//! Capability interface for host aggregates exposed to scripts.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use super::value::{HostValue, Key};
use crate::{BridgeError, Result};

/// Facade variants. Part of wrapper identity: an entity and its copy-on-write
/// clone share a backing object but are never equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    Entity,
    Map,
    List,
    CopyOnWrite,
    Room,
    RoomEntities,
    Node,
}

impl WrapperKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperKind::Entity => "entity",
            WrapperKind::Map => "map",
            WrapperKind::List => "list",
            WrapperKind::CopyOnWrite => "staged-entity",
            WrapperKind::Room => "room",
            WrapperKind::RoomEntities => "room-entities",
            WrapperKind::Node => "node",
        }
    }
}

impl fmt::Display for WrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an indexed read.
pub enum Field {
    /// Plain data, copied to the script.
    Value(HostValue),
    /// A nested aggregate, pushed by reference.
    Wrapper(Rc<dyn Wrapper>),
}

impl Field {
    pub fn nil() -> Self {
        Field::Value(HostValue::Nil)
    }
}

impl From<HostValue> for Field {
    fn from(value: HostValue) -> Self {
        Field::Value(value)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(value) => write!(f, "Field::Value({value})"),
            Field::Wrapper(wrapper) => write!(f, "Field::Wrapper({})", wrapper.kind()),
        }
    }
}

/// A host-side adapter giving scripts indexed access to a host aggregate.
///
/// Every capability but reads is optional; the defaults describe a
/// read-only, zero-length, non-iterable facade.
pub trait Wrapper {
    fn kind(&self) -> WrapperKind;

    /// Address of the backing aggregate. Two facades are the same script
    /// value iff kind, identity and position match.
    fn identity(&self) -> usize;

    /// Position within the backing aggregate, for facades over one element.
    fn position(&self) -> usize {
        0
    }

    /// Indexed read. Missing keys read as `nil`.
    fn get(&self, key: &Key) -> Field;

    /// Indexed write.
    fn set(&self, key: &Key, _value: HostValue) -> Result<()> {
        Err(BridgeError::Validation(format!(
            "{} is read-only (writing {key})",
            self.kind()
        )))
    }

    /// Length as seen by the `#` operator.
    fn len(&self) -> usize {
        0
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry following `after` in the backing collection's natural
    /// order; `None` for `after` starts iteration. Keys that vanished
    /// between calls must not fail; implementations fall back to a scan.
    fn next(&self, _after: Option<&Key>) -> Option<(Key, Field)> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Whether two facades stand for the same host object.
pub fn same_object(a: &dyn Wrapper, b: &dyn Wrapper) -> bool {
    a.kind() == b.kind() && a.identity() == b.identity() && a.position() == b.position()
}
