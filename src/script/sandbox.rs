//! Time-boxed evaluation of untrusted literal text.
//!
//! Pasted placement fragments are parsed by a throwaway interpreter that
//! loads no libraries and runs on its own thread. The caller waits a bounded
//! time; if the wait elapses it raises an abort flag that an instruction
//! hook in the worker checks, so a runaway evaluation faults out instead of
//! spinning forever. Every failure, including the timeout, is reported as
//! `None`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Value, VmState};
use tracing::{debug, warn};

use super::marshal::pull_value;
use super::value::HostValue;
use crate::config::SandboxConfig;

/// Serializes evaluations across the process.
static EVALUATIONS: Mutex<()> = Mutex::new(());

/// Whether `text` is shaped `{ ... }` with balanced braces.
///
/// Braces inside quoted strings are ignored. The opening brace must be
/// closed by the final character, so `{a}{b}` is rejected.
pub fn is_literal_shaped(text: &str) -> bool {
    let text = text.trim();
    if !(text.starts_with('{') && text.ends_with('}')) {
        return false;
    }

    let last = text.len() - 1;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (at, c) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
                if depth == 0 && at != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && quote.is_none()
}

/// A flat text-keyed map of primitives, or a list of primitives.
fn accepted_shape(value: &HostValue) -> bool {
    match value {
        HostValue::Map(map) => map.values().all(HostValue::is_primitive),
        HostValue::List(items) => items.iter().all(HostValue::is_primitive),
        _ => false,
    }
}

/// Parser for pasted literal payloads.
pub struct LiteralEvaluator {
    config: SandboxConfig,
    invocations: AtomicU64,
}

impl LiteralEvaluator {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            invocations: AtomicU64::new(0),
        }
    }

    /// Number of times an interpreter was started.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Parse `text`, or `None` if it is malformed, unsafe, slow or the wrong shape.
    pub fn try_parse(&self, text: &str) -> Option<HostValue> {
        if !is_literal_shaped(text) {
            debug!("literal rejected before evaluation");
            return None;
        }

        let _guard = EVALUATIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let source = format!("return {}", text.trim());
        let hook_interval = self.config.hook_interval.max(1);
        let memory_limit = self.config.memory_limit_kb * 1024;
        let abort = Arc::new(AtomicBool::new(false));
        let worker_abort = Arc::clone(&abort);
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("literal-eval".to_string())
            .spawn(move || {
                let outcome = evaluate(&source, hook_interval, memory_limit, worker_abort);
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to start literal evaluator thread");
            return None;
        }

        match rx.recv_timeout(self.config.timeout()) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                abort.store(true, Ordering::SeqCst);
                warn!(
                    timeout_ms = self.config.timeout_ms,
                    "literal evaluation timed out, aborting"
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("literal evaluator thread exited without a result");
                None
            }
        }
    }
}

fn evaluate(
    source: &str,
    hook_interval: u32,
    memory_limit: usize,
    abort: Arc<AtomicBool>,
) -> Option<HostValue> {
    let lua = Lua::new_with(StdLib::NONE, LuaOptions::default()).ok()?;
    if memory_limit > 0 {
        lua.set_memory_limit(memory_limit).ok()?;
    }
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(hook_interval),
        move |_lua, _debug| {
            if abort.load(Ordering::SeqCst) {
                Err(mlua::Error::RuntimeError(
                    "literal evaluation aborted".to_string(),
                ))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    let function = match lua.load(source).set_name("=literal").into_function() {
        Ok(function) => function,
        Err(e) => {
            debug!(error = %e, "literal failed to compile");
            return None;
        }
    };
    let value = match function.call::<Value>(()) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "literal failed to evaluate");
            return None;
        }
    };
    let value = pull_value(&value).ok()?;
    accepted_shape(&value).then_some(value)
}
