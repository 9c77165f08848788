//! Lua plugin bridge.
//!
//! Plugins are Lua files declaring how an entity class renders and edits.
//! This module loads them into one sandboxed interpreter, exposes host map
//! objects to them through handle-based facades, and evaluates their
//! declared members with faults contained per call.

pub mod contract;
pub mod engine;
pub mod facade;
pub mod fault;
pub mod frame;
pub mod helpers;
pub mod loader;
pub mod marshal;
pub mod modules;
pub mod reference;
pub mod registry;
pub mod sandbox;
pub mod value;
pub mod wrapper;

pub use contract::{EditHook, Invocation, Member, MemberSlot, PlacementPreset, PluginDescriptor};
pub use engine::{engine_state, shared_engine, shared_engine_with, EngineState, ScriptEngine};
pub use facade::{CowWrapper, EntityWrapper, ListWrapper, MapWrapper, NodeWrapper, RoomWrapper};
pub use frame::{Frame, InvocationStack};
pub use loader::{LoadReport, PluginCatalog, PluginLoader};
pub use marshal::Arg;
pub use modules::ModuleResolver;
pub use reference::{ReferenceManager, ScriptRef};
pub use registry::{Handle, WrapperRegistry};
pub use sandbox::LiteralEvaluator;
pub use value::{ConversionError, HostValue, Key, PropertyBag};
pub use wrapper::{Field, Wrapper, WrapperKind};
