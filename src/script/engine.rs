//! The plugin runtime: one sandboxed interpreter plus its host-side state.
//!
//! [`ScriptEngine`] owns the interpreter, the wrapper registry, the
//! captured-reference table and the invocation stack. A thread normally
//! uses a single engine obtained through [`shared_engine`], which builds it
//! on first use and remembers a failed build so later callers get the same
//! error instead of a half-initialized interpreter.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Lua, Value, Variadic};
use tracing::{debug, error, info};

use super::fault;
use super::frame::InvocationStack;
use super::helpers::HelperApi;
use super::marshal::{self, Arg};
use super::modules::ModuleResolver;
use super::reference::{ReferenceManager, ScriptRef};
use super::registry::{self, Handle, SharedRegistry, WrapperRegistry};
use super::value::HostValue;
use super::wrapper::Wrapper;
use crate::config::EngineConfig;
use crate::{BridgeError, Result};

/// Globals removed from every plugin environment.
const BLOCKED_GLOBALS: [&str; 7] = [
    "os",
    "io",
    "loadfile",
    "dofile",
    "load",
    "debug",
    "collectgarbage",
];

/// Lifecycle of the shared runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Unusable(String),
}

enum Slot {
    Uninitialized,
    Initializing,
    Ready(Rc<ScriptEngine>),
    Unusable(String),
}

thread_local! {
    static SHARED: RefCell<Slot> = const { RefCell::new(Slot::Uninitialized) };
}

/// The engine for this thread, built on first use.
///
/// A failed build leaves the slot unusable; every later call returns
/// [`BridgeError::Unusable`] with the original reason.
pub fn shared_engine(config: &EngineConfig) -> Result<Rc<ScriptEngine>> {
    shared_engine_with(|| ScriptEngine::new(config))
}

/// [`shared_engine`] with a caller-supplied builder.
///
/// `build` runs at most once per thread, and only while the slot is
/// uninitialized.
pub fn shared_engine_with<F>(build: F) -> Result<Rc<ScriptEngine>>
where
    F: FnOnce() -> Result<ScriptEngine>,
{
    let claimed = SHARED.with(|slot| {
        let mut slot = slot.borrow_mut();
        match &*slot {
            Slot::Ready(engine) => Err(Ok(Rc::clone(engine))),
            Slot::Unusable(reason) => Err(Err(BridgeError::Unusable(reason.clone()))),
            Slot::Initializing => Err(Err(BridgeError::Unusable(
                "runtime requested while it is still initializing".to_string(),
            ))),
            Slot::Uninitialized => {
                *slot = Slot::Initializing;
                Ok(())
            }
        }
    });
    if let Err(done) = claimed {
        return done;
    }

    let built = build();
    SHARED.with(|slot| {
        let mut slot = slot.borrow_mut();
        match built {
            Ok(engine) => {
                let engine = Rc::new(engine);
                *slot = Slot::Ready(Rc::clone(&engine));
                Ok(engine)
            }
            Err(e) => {
                let reason = e.to_string();
                error!(error = %reason, "script runtime failed to initialize");
                *slot = Slot::Unusable(reason.clone());
                Err(BridgeError::Unusable(reason))
            }
        }
    })
}

/// State of this thread's shared engine.
pub fn engine_state() -> EngineState {
    SHARED.with(|slot| match &*slot.borrow() {
        Slot::Uninitialized => EngineState::Uninitialized,
        Slot::Initializing => EngineState::Initializing,
        Slot::Ready(_) => EngineState::Ready,
        Slot::Unusable(reason) => EngineState::Unusable(reason.clone()),
    })
}

/// Sandboxed interpreter with host bookkeeping.
pub struct ScriptEngine {
    lua: Lua,
    registry: SharedRegistry,
    refs: ReferenceManager,
    stack: InvocationStack,
}

impl ScriptEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let lua = Lua::new();
        Self::apply_sandbox(&lua)?;

        if config.memory_limit_mb > 0 {
            lua.set_memory_limit(config.memory_limit_mb * 1024 * 1024)
                .map_err(|e| BridgeError::Config(format!("failed to set memory limit: {e}")))?;
        }

        let registry: SharedRegistry = Rc::new(RefCell::new(WrapperRegistry::new()));
        registry::install(&lua, Rc::clone(&registry));

        let roots = config.resolved_roots();
        debug!(roots = ?roots, "installing module searcher");
        ModuleResolver::new(roots)
            .install(&lua)
            .map_err(|e| fault::convert(e, "module searcher"))?;
        HelperApi::register(&lua).map_err(|e| fault::convert(e, "helpers"))?;
        let refs = ReferenceManager::install(&lua).map_err(|e| fault::convert(e, "references"))?;

        info!("script runtime ready");
        Ok(Self {
            lua,
            registry,
            refs,
            stack: InvocationStack::new(),
        })
    }

    fn apply_sandbox(lua: &Lua) -> Result<()> {
        let globals = lua.globals();
        for name in BLOCKED_GLOBALS {
            globals
                .set(name, Value::Nil)
                .map_err(|e| BridgeError::Unusable(format!("failed to disable {name}: {e}")))?;
        }
        Ok(())
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Compile and run a chunk, returning its first result.
    pub fn eval_source(&self, chunk: &str, source: &str) -> Result<Value> {
        let function = self
            .lua
            .load(source)
            .set_name(chunk)
            .into_function()
            .map_err(|e| fault::convert(e, chunk))?;

        let frame = self.stack.open(chunk);
        match fault::guard(chunk, || function.call::<Variadic<Value>>(())) {
            Ok(results) => {
                frame.close(results.len());
                Ok(results.first().cloned().unwrap_or(Value::Nil))
            }
            Err(e) => {
                frame.close(1);
                Err(e)
            }
        }
    }

    /// Call a captured function with host arguments.
    ///
    /// The stack is balanced afterwards whether the call returned, raised
    /// or panicked. Only the first result is kept; any others are residue.
    pub fn call(&self, label: &str, function: &ScriptRef, args: &[Arg]) -> Result<HostValue> {
        let frame = self.stack.open(label);
        let outcome = fault::guard(label, || {
            let Value::Function(callee) = self.refs.get(&self.lua, function)? else {
                return Err(mlua::Error::external(BridgeError::Contract(format!(
                    "{label} is not callable"
                ))));
            };
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(marshal::push_arg(&self.lua, arg)?);
            }
            callee.call::<Variadic<Value>>(Variadic::from_iter(values))
        });

        match outcome {
            Ok(results) => {
                frame.close(results.len());
                let first = results.first().cloned().unwrap_or(Value::Nil);
                Ok(marshal::pull_value(&first)?)
            }
            Err(e) => {
                frame.close(1);
                Err(e)
            }
        }
    }

    /// Keep a script value alive on the host side.
    pub fn capture(&self, value: Value) -> Result<ScriptRef> {
        self.refs
            .capture(&self.lua, value)
            .map_err(|e| fault::convert(e, "capture"))
    }

    pub fn push_value(&self, value: &HostValue) -> Result<Value> {
        marshal::push_value(&self.lua, value).map_err(|e| fault::convert(e, "push"))
    }

    pub fn push_wrapper(&self, wrapper: Rc<dyn Wrapper>) -> Result<Value> {
        marshal::push_wrapper(&self.lua, wrapper).map_err(|e| fault::convert(e, "push"))
    }

    pub fn pull_value(&self, value: &Value) -> Result<HostValue> {
        Ok(marshal::pull_value(value)?)
    }

    pub fn pull_wrapper(&self, value: &Value) -> Result<Rc<dyn Wrapper>> {
        marshal::pull_wrapper(&self.lua, value)
    }

    pub fn resolve_handle(&self, handle: Handle) -> Result<Rc<dyn Wrapper>> {
        self.registry.borrow().get(handle)
    }

    /// Release references dropped since the last tick.
    pub fn tick(&self) -> Result<usize> {
        self.refs
            .drain(&self.lua)
            .map_err(|e| fault::convert(e, "release"))
    }

    /// End a host operation: every wrapper handed out during it is dropped.
    pub fn finish_operation(&self) {
        let mut registry = self.registry.borrow_mut();
        let released = registry.len();
        registry.clear();
        debug!(released, generation = registry.generation(), "wrapper registry cleared");
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn contract_violations(&self) -> u64 {
        self.stack.violations()
    }

    pub fn live_references(&self) -> usize {
        self.refs.live()
    }

    pub fn wrapper_count(&self) -> usize {
        self.registry.borrow().len()
    }
}
