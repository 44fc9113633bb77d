// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call-context stacks: which invocation is active right now.
//!
//! When a tracked call starts, its tracker reads the top of a [`CallStack`] to find
//! the parent invocation, then pushes its own key so that anything it calls in turn
//! is attributed to it.
//!
//! # Implementations
//!
//! - [`PlainStack`]: one last-in-first-out list shared by everyone holding the
//!   instance.  Correct for strictly nested synchronous calls, and for asynchronous
//!   calls that never interleave with each other.  An asynchronous invocation's key
//!   stays pushed until the operation settles, so two interleaved chains see each
//!   other's frames.
//! - [`ScopedStack`]: every logical asynchronous task owns its own copy of the
//!   frames.  A tracked future captures the frames current when it was called and
//!   installs them for the duration of each of its polls, so interleaved chains
//!   never see each other's frames.
//!
//! ```rust
//! use trackwise::{CallStack, ScopedStack, Tracker, TrackerOptions};
//! use std::sync::Arc;
//!
//! // Two trackers sharing one stack correlate parents across trackers.
//! let stack: Arc<dyn CallStack> = Arc::new(ScopedStack::new());
//! let db = Tracker::new(TrackerOptions::new().name("db").stack(stack.clone()));
//! let api = Tracker::new(TrackerOptions::new().name("api").stack(stack.clone()));
//! let query = db.track("query", |_: ()| -> Result<(), ()> { Ok(()) });
//! let handler = api.track("handler", move |_: ()| query.call(()));
//! let _ = handler.call(());
//! ```
//!
//! # Per-task storage
//!
//! [`ContextStore`] is the per-task storage primitive behind [`ScopedStack`]: a
//! per-thread slot with `run`/`enter_with` semantics, and a [`Scoped`] future
//! wrapper that carries a value across suspension points.

mod context_store;
mod plain;
mod scoped;


pub use context_store::{ContextStore, Scoped};
pub use plain::PlainStack;
pub use scoped::ScopedStack;

use crate::invocation::InvocationKey;
use std::fmt::Debug;
use std::sync::Arc;

/**
An immutable snapshot of the keys on a stack, bottom first.

Cloning is cheap; pushing or popping produces a new snapshot.
*/
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frames(Arc<[InvocationKey]>);

impl Frames {
    pub fn new() -> Self {
        Frames(Arc::from(Vec::new()))
    }

    /// The most recently pushed key.
    pub fn top(&self) -> Option<&InvocationKey> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &InvocationKey) -> bool {
        self.0.contains(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InvocationKey> {
        self.0.iter()
    }

    pub(crate) fn pushed(&self, key: InvocationKey) -> Frames {
        let mut keys = Vec::with_capacity(self.0.len() + 1);
        keys.extend(self.0.iter().cloned());
        keys.push(key);
        Frames(keys.into())
    }

    pub(crate) fn popped(&self) -> (Frames, Option<InvocationKey>) {
        match self.0.split_last() {
            Some((top, rest)) => (Frames(rest.into()), Some(top.clone())),
            None => (self.clone(), None),
        }
    }
}

impl Default for Frames {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Frames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|k| k.id()))
            .finish()
    }
}

impl<'a> IntoIterator for &'a Frames {
    type Item = &'a InvocationKey;
    type IntoIter = std::slice::Iter<'a, InvocationKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/**
The active-invocation stack consulted by trackers.

Misuse is tolerated rather than reported: popping an empty stack returns `None`,
closing twice is harmless, and a closed stack ignores pushes.
*/
pub trait CallStack: Debug + Send + Sync {
    fn push(&self, key: InvocationKey);

    /// Removes and returns the top key.
    fn pop(&self) -> Option<InvocationKey>;

    /// Returns the top key without removing it.
    fn peek(&self) -> Option<InvocationKey>;

    /// Clears all entries.  Subsequent pushes are ignored.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Snapshot of the frames visible to the caller.
    fn frames(&self) -> Frames;

    /**
    Frames an asynchronous invocation should carry across its suspension points.

    `None` means the stack has a single shared view, and the invocation's key must stay
    pushed until the operation settles.
    */
    fn capture(&self) -> Option<Frames> {
        None
    }

    /**
    Runs `poll` with `frames` as the current task's stack.

    Changes `poll` makes to the stack are written back into `frames`, so they carry over
    to the next poll.
    */
    fn enter(&self, _frames: &mut Frames, poll: &mut dyn FnMut()) {
        poll()
    }
}
