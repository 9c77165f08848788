//! Plugin declarations and member resolution.
//!
//! A plugin is a table returned by a script file. Each well-known member is
//! classified once at load time as absent, a constant, or a function. The
//! host then asks for a member's value through [`PluginDescriptor::resolve`],
//! which calls functions with the entity being rendered, and falls back to
//! the member's default whenever the plugin omits it or misbehaves.

use std::fmt;
use std::rc::Rc;

use mlua::{Table, Value};
use tracing::{debug, warn};

use super::engine::ScriptEngine;
use super::facade::{CowWrapper, NodeWrapper};
use super::marshal::Arg;
use super::reference::ScriptRef;
use super::value::{HostValue, PropertyBag};
use super::wrapper::Wrapper;
use crate::map::{EntityRef, RoomRef};
use crate::{BridgeError, Result};

macro_rules! members {
    ($($variant:ident => $name:literal,)*) => {
        /// Well-known plugin members.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Member {
            $($variant,)*
        }

        impl Member {
            pub const ALL: &'static [Member] = &[$(Member::$variant,)*];

            /// Key the member is declared under.
            pub fn name(self) -> &'static str {
                match self {
                    $(Member::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Member::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

members! {
    Depth => "depth",
    Texture => "texture",
    Justification => "justification",
    Scale => "scale",
    Rotation => "rotation",
    Offset => "offset",
    Color => "color",
    FillColor => "fillColor",
    BorderColor => "borderColor",
    NodeLimits => "nodeLimits",
    NodeVisibility => "nodeVisibility",
    NodeLineRenderType => "nodeLineRenderType",
    Sprite => "sprite",
    NodeSprite => "nodeSprite",
    NodeTexture => "nodeTexture",
    Selection => "selection",
    Rectangle => "rectangle",
    MinimumSize => "minimumSize",
    CanResize => "canResize",
    FieldInformation => "fieldInformation",
    FieldOrder => "fieldOrder",
    Flip => "flip",
    Rotate => "rotate",
    Move => "move",
}

fn pair(a: impl Into<HostValue>, b: impl Into<HostValue>) -> HostValue {
    HostValue::List(vec![a.into(), b.into()])
}

impl Member {
    /// Value used when the plugin does not supply one.
    pub fn fallback(self) -> HostValue {
        match self {
            Member::Depth => HostValue::Int(0),
            Member::Justification => pair(0.5, 0.5),
            Member::Scale => pair(1, 1),
            Member::Rotation => HostValue::Float(0.0),
            Member::Offset => pair(0, 0),
            Member::Color => HostValue::Text("ffffff".to_string()),
            Member::NodeLimits => pair(0, 0),
            Member::NodeVisibility => HostValue::Text("selected".to_string()),
            Member::Sprite | Member::NodeSprite | Member::FieldOrder => HostValue::List(Vec::new()),
            Member::MinimumSize => pair(8, 8),
            Member::CanResize => pair(true, true),
            Member::FieldInformation => HostValue::Map(PropertyBag::new()),
            Member::Flip | Member::Rotate | Member::Move => HostValue::Bool(false),
            Member::Texture
            | Member::FillColor
            | Member::BorderColor
            | Member::NodeLineRenderType
            | Member::NodeTexture
            | Member::Selection
            | Member::Rectangle => HostValue::Nil,
        }
    }

    /// Members that describe one node rather than the whole entity.
    pub fn is_per_node(self) -> bool {
        matches!(self, Member::NodeSprite | Member::NodeTexture)
    }

    /// Members that edit the entity through a staged facade.
    pub fn is_edit_hook(self) -> bool {
        matches!(self, Member::Flip | Member::Rotate | Member::Move)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a plugin supplies one member.
#[derive(Debug, Clone)]
pub enum MemberSlot {
    Absent,
    Constant(HostValue),
    Callable(Rc<ScriptRef>),
}

impl MemberSlot {
    pub fn is_absent(&self) -> bool {
        matches!(self, MemberSlot::Absent)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, MemberSlot::Callable(_))
    }
}

/// A named placement preset offered by the plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementPreset {
    pub name: String,
    pub data: PropertyBag,
}

/// Where a member is being evaluated.
#[derive(Default, Clone, Copy)]
pub struct Invocation<'a> {
    pub room: Option<&'a RoomRef>,
    pub entity: Option<&'a EntityRef>,
    /// Zero-based node index for per-node members.
    pub node: Option<usize>,
}

impl<'a> Invocation<'a> {
    pub fn entity(room: &'a RoomRef, entity: &'a EntityRef) -> Self {
        Self {
            room: Some(room),
            entity: Some(entity),
            node: None,
        }
    }

    pub fn node(room: &'a RoomRef, entity: &'a EntityRef, node: usize) -> Self {
        Self {
            room: Some(room),
            entity: Some(entity),
            node: Some(node),
        }
    }

    fn entity_label(&self) -> String {
        self.entity
            .map(|entity| entity.borrow().id.to_string())
            .unwrap_or_default()
    }

    /// Arguments in plugin calling order: room, entity, then node and its
    /// 1-based index for per-node members.
    fn args(&self, member: Member) -> Vec<Arg> {
        let mut args = vec![
            self.room.map(Arg::room).unwrap_or(Arg::Value(HostValue::Nil)),
            self.entity.map(Arg::entity).unwrap_or(Arg::Value(HostValue::Nil)),
        ];
        if member.is_per_node() {
            if let (Some(entity), Some(index)) = (self.entity, self.node) {
                let nodes = Rc::clone(&entity.borrow().nodes);
                let node = if index < nodes.borrow().len() {
                    Arg::Wrapper(Rc::new(NodeWrapper::new(nodes, index).read_only()))
                } else {
                    Arg::Value(HostValue::Nil)
                };
                args.push(node);
                args.push(Arg::Value(one_based(index)));
            }
        }
        args
    }
}

/// An edit requested through one of the edit hooks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditHook {
    Flip { horizontal: bool, vertical: bool },
    Rotate { direction: i64 },
    /// `node` is zero-based; `None` moves the entity itself.
    Move { node: Option<usize>, dx: i64, dy: i64 },
}

impl EditHook {
    pub fn member(&self) -> Member {
        match self {
            EditHook::Flip { .. } => Member::Flip,
            EditHook::Rotate { .. } => Member::Rotate,
            EditHook::Move { .. } => Member::Move,
        }
    }

    fn args(&self) -> Vec<Arg> {
        match *self {
            EditHook::Flip {
                horizontal,
                vertical,
            } => vec![HostValue::Bool(horizontal).into(), HostValue::Bool(vertical).into()],
            EditHook::Rotate { direction } => vec![HostValue::Int(direction).into()],
            EditHook::Move { node, dx, dy } => vec![
                node.map(one_based).unwrap_or(HostValue::Int(0)).into(),
                HostValue::Int(dx).into(),
                HostValue::Int(dy).into(),
            ],
        }
    }
}

/// One loaded plugin.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    name: String,
    source: String,
    slots: Vec<MemberSlot>,
    placements: Vec<PlacementPreset>,
}

impl PluginDescriptor {
    /// Classify every member of a declaration table.
    pub fn from_table(engine: &ScriptEngine, source: &str, table: &Table) -> Result<Self> {
        let name = match table.raw_get::<Value>("name") {
            Ok(Value::String(name)) => name
                .to_str()
                .map(|name| name.to_string())
                .map_err(|_| BridgeError::Contract("plugin name is not UTF-8".to_string()))?,
            Ok(other) => {
                return Err(BridgeError::Contract(format!(
                    "plugin name must be text, got {}",
                    other.type_name()
                )))
            }
            Err(e) => return Err(BridgeError::Contract(e.to_string())),
        };

        let slots = Member::ALL
            .iter()
            .map(|member| {
                let value = table.raw_get::<Value>(member.name()).unwrap_or(Value::Nil);
                classify(engine, &name, *member, value)
            })
            .collect();

        let placements = match table.raw_get::<Value>("placements").unwrap_or(Value::Nil) {
            Value::Nil => Vec::new(),
            value => parse_placements(engine, &name, value),
        };

        debug!(plugin = %name, source, "plugin classified");
        Ok(Self {
            name,
            source: source.to_string(),
            slots,
            placements,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chunk the plugin was declared in.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn slot(&self, member: Member) -> &MemberSlot {
        &self.slots[member as usize]
    }

    pub fn placements(&self) -> &[PlacementPreset] {
        &self.placements
    }

    /// Evaluate a member, surfacing any fault.
    ///
    /// Absent members yield their fallback. Constants are returned as
    /// declared. Functions are called with the invocation's arguments.
    pub fn invoke(
        &self,
        engine: &ScriptEngine,
        member: Member,
        invocation: &Invocation<'_>,
    ) -> Result<HostValue> {
        match self.slot(member) {
            MemberSlot::Absent => Ok(member.fallback()),
            MemberSlot::Constant(value) => Ok(value.clone()),
            MemberSlot::Callable(function) => {
                let label = format!("{}.{}", self.name, member);
                engine.call(&label, function, &invocation.args(member))
            }
        }
    }

    /// Evaluate a member, degrading any fault to the fallback.
    pub fn resolve(
        &self,
        engine: &ScriptEngine,
        member: Member,
        invocation: &Invocation<'_>,
    ) -> HostValue {
        match self.invoke(engine, member, invocation) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    plugin = %self.name,
                    member = %member,
                    entity = %invocation.entity_label(),
                    error = %e,
                    "plugin member failed, using fallback"
                );
                member.fallback()
            }
        }
    }

    /// Run an edit hook against `entity`.
    ///
    /// The plugin edits a staged copy. A truthy return commits the batch;
    /// a falsy return or a fault discards it. Returns whether the entity
    /// changed.
    pub fn apply_edit(
        &self,
        engine: &ScriptEngine,
        room: &RoomRef,
        entity: &EntityRef,
        hook: EditHook,
    ) -> Result<bool> {
        let member = hook.member();
        let function = match self.slot(member) {
            MemberSlot::Callable(function) => function,
            MemberSlot::Constant(_) | MemberSlot::Absent => return Ok(false),
        };

        let cow = Rc::new(CowWrapper::new(Rc::clone(entity)));
        let mut args = vec![Arg::room(room), Arg::Wrapper(Rc::clone(&cow) as Rc<dyn Wrapper>)];
        args.extend(hook.args());

        let label = format!("{}.{}", self.name, member);
        let accepted = match engine.call(&label, function, &args) {
            Ok(value) => value.is_truthy(),
            Err(e) => {
                warn!(
                    plugin = %self.name,
                    member = %member,
                    entity = entity.borrow().id,
                    error = %e,
                    "edit hook failed, discarding staged edits"
                );
                false
            }
        };

        if !accepted {
            cow.discard();
            return Ok(false);
        }
        cow.commit()
    }
}

fn one_based(index: usize) -> HostValue {
    i64::try_from(index)
        .ok()
        .and_then(|i| i.checked_add(1))
        .map_or(HostValue::Nil, HostValue::Int)
}

fn classify(engine: &ScriptEngine, plugin: &str, member: Member, value: Value) -> MemberSlot {
    match value {
        Value::Nil => MemberSlot::Absent,
        Value::Function(_) => match engine.capture(value) {
            Ok(function) => MemberSlot::Callable(Rc::new(function)),
            Err(e) => {
                warn!(plugin, member = %member, error = %e, "could not capture member function");
                MemberSlot::Absent
            }
        },
        other => match engine.pull_value(&other) {
            Ok(constant) => MemberSlot::Constant(constant),
            Err(e) => {
                warn!(
                    plugin,
                    member = %member,
                    error = %e,
                    "plugin contract violation: member is not a usable constant"
                );
                MemberSlot::Absent
            }
        },
    }
}

fn parse_placements(engine: &ScriptEngine, plugin: &str, value: Value) -> Vec<PlacementPreset> {
    let Value::Table(table) = value else {
        warn!(plugin, kind = value.type_name(), "placements must be a table, ignoring");
        return Vec::new();
    };

    if !table.raw_get::<Value>("name").unwrap_or(Value::Nil).is_nil() {
        return parse_preset(engine, plugin, &table).into_iter().collect();
    }

    let mut presets = Vec::new();
    for entry in table.sequence_values::<Value>() {
        match entry {
            Ok(Value::Table(preset)) => presets.extend(parse_preset(engine, plugin, &preset)),
            Ok(other) => {
                warn!(plugin, kind = other.type_name(), "placement entry is not a table, skipping")
            }
            Err(e) => warn!(plugin, error = %e, "unreadable placement entry, skipping"),
        }
    }
    presets
}

fn parse_preset(engine: &ScriptEngine, plugin: &str, table: &Table) -> Option<PlacementPreset> {
    let name = match table.raw_get::<Value>("name").ok()? {
        Value::String(name) => name.to_str().ok()?.to_string(),
        other => {
            warn!(plugin, kind = other.type_name(), "placement without a text name, skipping");
            return None;
        }
    };

    let mut data = PropertyBag::new();
    if let Ok(Value::Table(fields)) = table.raw_get::<Value>("data") {
        for pair in fields.pairs::<Value, Value>() {
            let (key, value) = match pair {
                Ok((Value::String(key), value)) => match key.to_str() {
                    Ok(key) => (key.to_string(), value),
                    Err(_) => {
                        warn!(plugin, placement = %name, "placement data key is not UTF-8, skipping");
                        continue;
                    }
                },
                Ok((key, _)) => {
                    warn!(
                        plugin,
                        placement = %name,
                        kind = key.type_name(),
                        "placement data must be keyed by name, skipping entry"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(plugin, placement = %name, error = %e, "unreadable placement data, skipping");
                    continue;
                }
            };
            match engine.pull_value(&value) {
                Ok(value) if value.is_primitive() => {
                    data.insert(key, value);
                }
                Ok(value) => warn!(
                    plugin,
                    placement = %name,
                    key = %key,
                    kind = value.kind(),
                    "nested placement data is not supported, dropping"
                ),
                Err(e) => warn!(
                    plugin,
                    placement = %name,
                    key = %key,
                    error = %e,
                    "placement data value dropped"
                ),
            }
        }
    }
    Some(PlacementPreset { name, data })
}
