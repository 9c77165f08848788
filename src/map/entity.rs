//! Entities and their nodes.

use crate::script::value::{HostValue, PropertyBag};

use super::{shared, Shared};

/// Shared handle to a host entity.
pub type EntityRef = Shared<Entity>;

/// A secondary point attached to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Node {
    pub x: i32,
    pub y: i32,
}

impl Node {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Script-side representation: `{x = .., y = ..}`.
    pub fn to_value(self) -> HostValue {
        let mut map = PropertyBag::new();
        map.insert("x".to_string(), HostValue::Int(i64::from(self.x)));
        map.insert("y".to_string(), HostValue::Int(i64::from(self.y)));
        HostValue::Map(map)
    }

    /// Parse a `{x, y}` map back into a node.
    pub fn from_value(value: &HostValue) -> Option<Self> {
        let x = value.get("x")?.to_int::<i32>().ok()?;
        let y = value.get("y")?.to_int::<i32>().ok()?;
        Some(Self { x, y })
    }
}

/// A placed map entity.
///
/// `name` is the per-class identifier plugins are keyed by. `nodes` and
/// `data` are shared separately so facades can address them without
/// copying the whole entity.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub nodes: Shared<Vec<Node>>,
    pub data: Shared<PropertyBag>,
}

impl Entity {
    pub fn new(id: i64, name: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
            width: 0,
            height: 0,
            nodes: shared(Vec::new()),
            data: shared(PropertyBag::new()),
        }
    }

    pub fn with_size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_node(self, x: i32, y: i32) -> Self {
        self.nodes.borrow_mut().push(Node::new(x, y));
        self
    }

    pub fn with_data(self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.data.borrow_mut().insert(key.into(), value.into());
        self
    }

    /// Wrap into a shared reference.
    pub fn into_ref(self) -> EntityRef {
        shared(self)
    }

    /// Read one of the fixed numeric fields.
    pub fn field(&self, name: &str) -> Option<i32> {
        match name {
            "x" => Some(self.x),
            "y" => Some(self.y),
            "width" => Some(self.width),
            "height" => Some(self.height),
            _ => None,
        }
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut i32> {
        match name {
            "x" => Some(&mut self.x),
            "y" => Some(&mut self.y),
            "width" => Some(&mut self.width),
            "height" => Some(&mut self.height),
            _ => None,
        }
    }

    pub fn is_field(name: &str) -> bool {
        matches!(name, "x" | "y" | "width" | "height")
    }
}
