// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-task stack.

use super::context_store::{ContextStore, Scoped};
use super::{CallStack, Frames};
use crate::invocation::InvocationKey;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/**
A stack whose contents belong to the logical task that is currently running.

`push` copies the current task's frames, appends the key and rebinds the copy; `pop`
does the inverse.  Tracked futures carry the frames that were current when they were
called and install them for each poll, so two chains interleaved on one thread never
observe each other's frames.

A future that is *not* tracked but should inherit the caller's frames (for example,
one handed to an executor's `spawn`) can be wrapped with [`ScopedStack::bind`].
*/
#[derive(Debug, Default)]
pub struct ScopedStack {
    store: ContextStore<Frames>,
    closed: AtomicBool,
}

impl ScopedStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `future` so that it runs with the frames current right now.
    pub fn bind<F: Future>(&self, future: F) -> Scoped<Frames, F> {
        self.store.scope_bound(self.store.get(), future)
    }
}

impl CallStack for ScopedStack {
    fn push(&self, key: InvocationKey) {
        if self.is_closed() {
            return;
        }
        let current = self.store.get().unwrap_or_default();
        self.store.enter_with(current.pushed(key));
    }

    fn pop(&self) -> Option<InvocationKey> {
        if self.is_closed() {
            return None;
        }
        let current = self.store.get()?;
        let (rest, top) = current.popped();
        //an emptied stack releases its slot rather than keeping an empty one
        if rest.is_empty() {
            self.store.take();
        } else {
            self.store.enter_with(rest);
        }
        top
    }

    fn peek(&self) -> Option<InvocationKey> {
        if self.is_closed() {
            return None;
        }
        self.store.get().and_then(|frames| frames.top().cloned())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.store.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn frames(&self) -> Frames {
        if self.is_closed() {
            return Frames::default();
        }
        self.store.get().unwrap_or_default()
    }

    fn capture(&self) -> Option<Frames> {
        Some(self.frames())
    }

    fn enter(&self, frames: &mut Frames, poll: &mut dyn FnMut()) {
        if self.is_closed() {
            poll();
            return;
        }
        let installed = (!frames.is_empty()).then(|| frames.clone());
        self.store.run_bound(installed, || {
            poll();
            *frames = self.store.get().unwrap_or_default();
        });
    }
}
