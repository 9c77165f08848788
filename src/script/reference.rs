//! Host-held references to script values.
//!
//! Script values the host keeps across calls (plugin functions, mostly)
//! live in a table on the interpreter keyed by a numeric id. The host holds
//! a [`ScriptRef`] for each. Dropping a `ScriptRef` never touches the
//! interpreter: it queues the id, and the owning thread releases queued ids
//! on its next [`ReferenceManager::drain`].

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use mlua::{Lua, Table, Value};
use tracing::{debug, trace};

use crate::BridgeError;

/// Global holding every captured value.
pub const REFS_GLOBAL: &str = "__host_refs";

static NEXT_RUNTIME: AtomicU64 = AtomicU64::new(1);

/// A host handle to a captured script value.
pub struct ScriptRef {
    id: u64,
    runtime: u64,
    releases: Sender<u64>,
}

impl ScriptRef {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRef")
            .field("id", &self.id)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl Drop for ScriptRef {
    fn drop(&mut self) {
        // The receiver is gone once the runtime itself is dropped.
        let _ = self.releases.send(self.id);
    }
}

/// Owner of the capture table and its release queue.
pub struct ReferenceManager {
    runtime: u64,
    next_id: Cell<u64>,
    live: Cell<usize>,
    releases: Sender<u64>,
    queue: Receiver<u64>,
}

impl ReferenceManager {
    /// Create the capture table on `lua`.
    pub fn install(lua: &Lua) -> mlua::Result<Self> {
        lua.globals().raw_set(REFS_GLOBAL, lua.create_table()?)?;
        let (releases, queue) = mpsc::channel();
        Ok(Self {
            runtime: NEXT_RUNTIME.fetch_add(1, Ordering::Relaxed),
            next_id: Cell::new(1),
            live: Cell::new(0),
            releases,
            queue,
        })
    }

    fn table(&self, lua: &Lua) -> mlua::Result<Table> {
        lua.globals().raw_get(REFS_GLOBAL)
    }

    /// Keep `value` alive until the returned reference is dropped and drained.
    pub fn capture(&self, lua: &Lua, value: Value) -> mlua::Result<ScriptRef> {
        if value.is_nil() {
            return Err(mlua::Error::external(BridgeError::Validation(
                "cannot capture nil".to_string(),
            )));
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.table(lua)?.raw_set(id, value)?;
        self.live.set(self.live.get() + 1);
        trace!(id, "captured script value");
        Ok(ScriptRef {
            id,
            runtime: self.runtime,
            releases: self.releases.clone(),
        })
    }

    /// Fetch the captured value.
    pub fn get(&self, lua: &Lua, reference: &ScriptRef) -> mlua::Result<Value> {
        if reference.runtime != self.runtime {
            return Err(mlua::Error::external(BridgeError::Validation(format!(
                "script reference {} belongs to another runtime",
                reference.id
            ))));
        }
        let value: Value = self.table(lua)?.raw_get(reference.id)?;
        if value.is_nil() {
            return Err(mlua::Error::external(BridgeError::Validation(format!(
                "script reference {} was already released",
                reference.id
            ))));
        }
        Ok(value)
    }

    /// Release every queued id. Returns how many were released.
    pub fn drain(&self, lua: &Lua) -> mlua::Result<usize> {
        let mut released = 0;
        let table = self.table(lua)?;
        while let Ok(id) = self.queue.try_recv() {
            table.raw_set(id, Value::Nil)?;
            released += 1;
        }
        if released > 0 {
            self.live.set(self.live.get().saturating_sub(released));
            debug!(released, live = self.live.get(), "released script references");
        }
        Ok(released)
    }

    /// Captured values not yet released.
    pub fn live(&self) -> usize {
        self.live.get()
    }
}
