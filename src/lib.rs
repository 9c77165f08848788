//! mapscript - Lua plugin bridge for a map editor.
//!
//! Entity plugins written in Lua describe how map objects render and react
//! to edits. This crate hosts them: it loads plugin files, hands host
//! entities and rooms to plugin code without copying them, and evaluates
//! plugin members so that one broken plugin cannot take down the editor.

pub mod config;
pub mod error;
pub mod logging;
pub mod map;
pub mod script;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use map::{Entity, EntityRef, Node, Room, RoomRef, StagedEdit};
pub use script::{
    shared_engine, EditHook, HostValue, Invocation, LiteralEvaluator, Member, PluginCatalog,
    PluginDescriptor, PluginLoader, ScriptEngine,
};
