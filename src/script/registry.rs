//! Append-only wrapper table keyed by small integer handles.
//!
//! The table is an arena: registering pushes onto a vector and the handle
//! is the slot index plus the current generation. Nothing is ever removed
//! individually; [`WrapperRegistry::clear`] drops every slot at once and
//! bumps the generation, so handles that leaked into script state from an
//! earlier operation are detected instead of dereferenced.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use mlua::Lua;

use super::wrapper::Wrapper;
use crate::{BridgeError, Result};

/// Stable identifier of one registered wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// The wrapper arena.
#[derive(Default)]
pub struct WrapperRegistry {
    slots: Vec<Rc<dyn Wrapper>>,
    generation: u32,
}

/// Registry shared between the engine and the dispatch metamethods.
pub type SharedRegistry = Rc<RefCell<WrapperRegistry>>;

impl WrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a wrapper and return its handle.
    pub fn register(&mut self, wrapper: Rc<dyn Wrapper>) -> Handle {
        let index = self.slots.len() as u32;
        self.slots.push(wrapper);
        Handle {
            index,
            generation: self.generation,
        }
    }

    /// Resolve a handle in O(1).
    pub fn get(&self, handle: Handle) -> Result<Rc<dyn Wrapper>> {
        if handle.generation != self.generation {
            return Err(self.stale(handle));
        }
        self.slots
            .get(handle.index as usize)
            .cloned()
            .ok_or_else(|| self.stale(handle))
    }

    /// Drop every wrapper and start a new generation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn stale(&self, handle: Handle) -> BridgeError {
        BridgeError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
            current: self.generation,
        }
    }
}

/// Install a registry as interpreter app data.
pub(crate) fn install(lua: &Lua, registry: SharedRegistry) {
    lua.set_app_data(registry);
}

/// The registry installed on this interpreter.
pub(crate) fn shared(lua: &Lua) -> mlua::Result<SharedRegistry> {
    lua.app_data_ref::<SharedRegistry>()
        .map(|registry| Rc::clone(&*registry))
        .ok_or_else(|| mlua::Error::RuntimeError("wrapper registry is not installed".to_string()))
}
