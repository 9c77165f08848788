//! Balanced bookkeeping around every call into script code.
//!
//! The interpreter's own value stack is managed by `mlua` and is not
//! visible from here, so depth is modelled: each call opens a [`Frame`] on
//! a host-side stack of labels. Closing (or dropping) the frame truncates
//! that stack back to the depth it saw when it opened, so depth is the same
//! after a call as before it no matter how the call ended. What can be
//! observed is reported instead: results a call leaves beyond the one it
//! is expected to return are counted as residue, and a frame closing at
//! the wrong depth means a nested call escaped its own frame. Both are
//! logged as contract violations; neither fails the call.

use std::cell::{Cell, RefCell};

use tracing::warn;

#[derive(Default)]
pub struct InvocationStack {
    frames: RefCell<Vec<String>>,
    violations: Cell<u64>,
}

impl InvocationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, label: impl Into<String>) -> Frame<'_> {
        let mut frames = self.frames.borrow_mut();
        let base = frames.len();
        frames.push(label.into());
        Frame { stack: self, base }
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Label of the innermost open frame.
    pub fn current(&self) -> Option<String> {
        self.frames.borrow().last().cloned()
    }

    /// Contract violations seen so far.
    pub fn violations(&self) -> u64 {
        self.violations.get()
    }

    fn record_violation(&self) {
        self.violations.set(self.violations.get() + 1);
    }
}

/// An open call. Dropping it restores the stack.
pub struct Frame<'a> {
    stack: &'a InvocationStack,
    base: usize,
}

impl Frame<'_> {
    pub fn label(&self) -> String {
        self.stack
            .frames
            .borrow()
            .get(self.base)
            .cloned()
            .unwrap_or_default()
    }

    /// Close after a call that produced `results` values where one was expected.
    pub fn close(self, results: usize) {
        let residue = results.saturating_sub(1);
        if residue > 0 {
            warn!(
                frame = %self.label(),
                residue,
                "plugin contract violation: call left extra values on the stack"
            );
            self.stack.record_violation();
        }

        let depth = self.stack.depth();
        if depth != self.base + 1 {
            warn!(
                frame = %self.label(),
                expected = self.base + 1,
                depth,
                "unbalanced invocation stack, restoring"
            );
            self.stack.record_violation();
        }
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.stack.frames.borrow_mut().truncate(self.base);
    }
}
