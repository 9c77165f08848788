//! Conversion between host values and interpreter values.
//!
//! Plain data is copied. Wrappers are pushed as a small userdata carrying
//! only their registry handle; every userdata of that type shares one
//! metatable whose metamethods route indexing, writes, length, equality and
//! iteration back to the registered facade. Pulling a wrapper reads the
//! handle back out and resolves it, so the caller gets the very same facade
//! (and through it the same host aggregate) that was pushed.

use std::rc::Rc;

use mlua::{AnyUserData, Lua, MetaMethod, UserData, UserDataMethods, Value};

use super::facade::{CowWrapper, EntityWrapper, RoomWrapper};
use super::registry::{self, Handle};
use super::value::{integral, ConversionError, HostValue, Key, PropertyBag};
use super::wrapper::{same_object, Field, Wrapper};
use crate::map::{EntityRef, RoomRef};
use crate::{BridgeError, Result};

/// Deepest table nesting accepted when pulling.
pub const MAX_DEPTH: usize = 32;

/// Userdata pushed for every wrapper.
#[derive(Debug, Clone, Copy)]
pub struct WrapperRef(pub(crate) Handle);

/// A host argument for a script call.
pub enum Arg {
    Value(HostValue),
    Wrapper(Rc<dyn Wrapper>),
}

impl From<HostValue> for Arg {
    fn from(value: HostValue) -> Self {
        Arg::Value(value)
    }
}

impl From<Rc<dyn Wrapper>> for Arg {
    fn from(wrapper: Rc<dyn Wrapper>) -> Self {
        Arg::Wrapper(wrapper)
    }
}

impl Arg {
    pub fn entity(entity: &EntityRef) -> Self {
        Arg::Wrapper(Rc::new(EntityWrapper::new(Rc::clone(entity))))
    }

    pub fn room(room: &RoomRef) -> Self {
        Arg::Wrapper(Rc::new(RoomWrapper::new(Rc::clone(room))))
    }
}

fn resolve(lua: &Lua, handle: Handle) -> mlua::Result<Rc<dyn Wrapper>> {
    registry::shared(lua)?
        .borrow()
        .get(handle)
        .map_err(mlua::Error::external)
}

impl UserData for WrapperRef {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: Value| {
            let wrapper = resolve(lua, this.0)?;
            let key = decode_key(&key)?;
            push_field(lua, wrapper.get(&key))
        });

        methods.add_meta_method(
            MetaMethod::NewIndex,
            |lua, this, (key, value): (Value, Value)| {
                let wrapper = resolve(lua, this.0)?;
                let key = decode_key(&key)?;
                let value = pull_value(&value)?;
                wrapper.set(&key, value).map_err(mlua::Error::external)
            },
        );

        methods.add_meta_method(MetaMethod::Len, |lua, this, ()| {
            Ok(resolve(lua, this.0)?.len())
        });

        methods.add_meta_method(MetaMethod::Eq, |lua, this, other: AnyUserData| {
            let Ok(other) = other.borrow::<WrapperRef>() else {
                return Ok(false);
            };
            let a = resolve(lua, this.0)?;
            let b = resolve(lua, other.0)?;
            Ok(same_object(a.as_ref(), b.as_ref()))
        });

        methods.add_meta_method(MetaMethod::ToString, |lua, this, ()| {
            let kind = resolve(lua, this.0)
                .map(|w| w.kind().as_str())
                .unwrap_or("stale");
            Ok(format!("{kind}: {}", this.0))
        });

        methods.add_meta_function(MetaMethod::Pairs, |lua, ud: AnyUserData| {
            let next = lua.create_function(|lua, (ud, key): (AnyUserData, Value)| {
                let handle = ud.borrow::<WrapperRef>()?.0;
                let wrapper = resolve(lua, handle)?;
                let after = match key {
                    Value::Nil => None,
                    other => Some(decode_key(&other)?),
                };
                match wrapper.next(after.as_ref()) {
                    Some((key, field)) => Ok((push_key(lua, &key)?, push_field(lua, field)?)),
                    None => Ok((Value::Nil, Value::Nil)),
                }
            })?;
            Ok((next, ud, Value::Nil))
        });
    }
}

/// Decode an index key.
///
/// `"x"` and `"y"` are matched on raw bytes before any UTF-8 validation or
/// allocation.
pub fn decode_key(value: &Value) -> std::result::Result<Key, ConversionError> {
    match value {
        Value::String(s) => {
            let bytes = s.as_bytes();
            match &bytes[..] {
                b"x" => Ok(Key::X),
                b"y" => Ok(Key::Y),
                other => std::str::from_utf8(other)
                    .map(|name| Key::Name(name.to_string()))
                    .map_err(|_| ConversionError::new("string", "key").with_detail("not UTF-8")),
            }
        }
        Value::Integer(i) => Ok(Key::Index(*i)),
        Value::Number(n) => integral(*n).map(Key::Index).ok_or_else(|| {
            ConversionError::new("number", "key").with_detail(format!("{n} is not an exact integer"))
        }),
        other => Err(ConversionError::new(other.type_name(), "key")),
    }
}

fn push_key(lua: &Lua, key: &Key) -> mlua::Result<Value> {
    match key {
        Key::Index(i) => Ok(Value::Integer(*i)),
        other => Ok(Value::String(
            lua.create_string(other.as_str().unwrap_or_default())?,
        )),
    }
}

/// Push plain data (and handles of already registered wrappers).
pub fn push_value(lua: &Lua, value: &HostValue) -> mlua::Result<Value> {
    Ok(match value {
        HostValue::Nil => Value::Nil,
        HostValue::Bool(b) => Value::Boolean(*b),
        HostValue::Int(i) => Value::Integer(*i),
        HostValue::Float(n) => Value::Number(*n),
        HostValue::Text(s) => Value::String(lua.create_string(s)?),
        HostValue::List(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, push_value(lua, item)?)?;
            }
            Value::Table(table)
        }
        HostValue::Map(map) => {
            let table = lua.create_table()?;
            for (key, item) in map {
                table.raw_set(key.as_str(), push_value(lua, item)?)?;
            }
            Value::Table(table)
        }
        HostValue::Wrapper(handle) => push_handle(lua, *handle)?,
    })
}

/// Push a wrapper by reference. The aggregate behind it is never copied.
pub fn push_wrapper(lua: &Lua, wrapper: Rc<dyn Wrapper>) -> mlua::Result<Value> {
    let handle = registry::shared(lua)?.borrow_mut().register(wrapper);
    Ok(Value::UserData(lua.create_userdata(WrapperRef(handle))?))
}

fn push_handle(lua: &Lua, handle: Handle) -> mlua::Result<Value> {
    resolve(lua, handle)?;
    Ok(Value::UserData(lua.create_userdata(WrapperRef(handle))?))
}

pub fn push_field(lua: &Lua, field: Field) -> mlua::Result<Value> {
    match field {
        Field::Value(value) => push_value(lua, &value),
        Field::Wrapper(wrapper) => push_wrapper(lua, wrapper),
    }
}

pub fn push_arg(lua: &Lua, arg: &Arg) -> mlua::Result<Value> {
    match arg {
        Arg::Value(value) => push_value(lua, value),
        Arg::Wrapper(wrapper) => push_wrapper(lua, Rc::clone(wrapper)),
    }
}

/// Pull a script value into host data.
///
/// Functions, threads and foreign userdata have no host counterpart and
/// fail with a conversion error naming the script kind.
pub fn pull_value(value: &Value) -> std::result::Result<HostValue, ConversionError> {
    pull_at(value, 0)
}

fn pull_at(value: &Value, depth: usize) -> std::result::Result<HostValue, ConversionError> {
    match value {
        Value::Nil => Ok(HostValue::Nil),
        Value::Boolean(b) => Ok(HostValue::Bool(*b)),
        Value::Integer(i) => Ok(HostValue::Int(*i)),
        Value::Number(n) => Ok(HostValue::Float(*n)),
        Value::String(s) => text_of(s).map(HostValue::Text),
        Value::Table(table) => pull_table(table, depth),
        Value::UserData(ud) => ud
            .borrow::<WrapperRef>()
            .map(|r| HostValue::Wrapper(r.0))
            .map_err(|_| ConversionError::new("userdata", "value")),
        other => Err(ConversionError::new(other.type_name(), "value")),
    }
}

fn text_of(s: &mlua::String) -> std::result::Result<String, ConversionError> {
    s.to_str()
        .map(|text| text.to_string())
        .map_err(|_| ConversionError::new("string", "text").with_detail("not UTF-8"))
}

fn pull_table(table: &mlua::Table, depth: usize) -> std::result::Result<HostValue, ConversionError> {
    if depth >= MAX_DEPTH {
        return Err(ConversionError::new("table", "value")
            .with_detail(format!("nested deeper than {MAX_DEPTH} levels")));
    }

    let mut named = PropertyBag::new();
    let mut indexed = 0usize;
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, value) =
            pair.map_err(|e| ConversionError::new("table", "value").with_detail(e.to_string()))?;
        match key {
            Value::String(name) => {
                named.insert(text_of(&name)?, pull_at(&value, depth + 1)?);
            }
            Value::Integer(_) => indexed += 1,
            other => {
                return Err(ConversionError::new(other.type_name(), "text")
                    .with_detail("unsupported table key"))
            }
        }
    }

    if indexed == 0 {
        return Ok(if named.is_empty() {
            HostValue::List(Vec::new())
        } else {
            HostValue::Map(named)
        });
    }
    if !named.is_empty() {
        return Err(ConversionError::new("table", "value")
            .with_detail("table mixes list entries and named keys"));
    }

    let len = table.raw_len();
    if len != indexed {
        return Err(ConversionError::new("table", "list").with_detail("list has holes"));
    }
    let mut items = Vec::with_capacity(len);
    for i in 1..=len {
        let item: Value = table
            .raw_get(i)
            .map_err(|e| ConversionError::new("table", "list").with_detail(e.to_string()))?;
        items.push(pull_at(&item, depth + 1)?);
    }
    Ok(HostValue::List(items))
}

/// Resolve a pulled handle to the registered facade.
pub fn resolve_handle(lua: &Lua, handle: Handle) -> Result<Rc<dyn Wrapper>> {
    registry::shared(lua)
        .map_err(|e| BridgeError::Runtime {
            message: e.to_string(),
            traceback: None,
        })?
        .borrow()
        .get(handle)
}

/// Pull a wrapper, recovering the exact facade that was pushed.
pub fn pull_wrapper(lua: &Lua, value: &Value) -> Result<Rc<dyn Wrapper>> {
    let Value::UserData(ud) = value else {
        return Err(ConversionError::new(value.type_name(), "wrapper").into());
    };
    let handle = ud
        .borrow::<WrapperRef>()
        .map_err(|_| ConversionError::new("userdata", "wrapper"))?
        .0;
    resolve_handle(lua, handle)
}

/// Pull an entity reference out of an entity or staged-entity facade.
pub fn pull_entity(lua: &Lua, value: &Value) -> Result<EntityRef> {
    let wrapper = pull_wrapper(lua, value)?;
    let any = wrapper.as_any();
    if let Some(entity) = any.downcast_ref::<EntityWrapper>() {
        return Ok(Rc::clone(entity.entity()));
    }
    if let Some(cow) = any.downcast_ref::<CowWrapper>() {
        return Ok(Rc::clone(cow.base()));
    }
    Err(ConversionError::new("wrapper", "entity")
        .with_detail(format!("got a {} facade", wrapper.kind()))
        .into())
}
