// SPDX-License-Identifier: MIT OR Apache-2.0

//! The shared last-in-first-out stack.

use super::{CallStack, Frames};
use crate::invocation::InvocationKey;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct PlainState {
    keys: Vec<InvocationKey>,
    closed: bool,
}

/**
A single ordered list of keys, shared by every caller holding this instance.

Suitable when calls nest strictly, e.g. a command-line tool serving one request at a
time.  Interleaved asynchronous chains see each other's frames; use
[`ScopedStack`](super::ScopedStack) when that can happen.

```rust
use trackwise::{CallStack, PlainStack};

let stack = PlainStack::new();
assert_eq!(stack.pop(), None);
```
*/
#[derive(Debug, Default)]
pub struct PlainStack {
    state: Mutex<PlainState>,
}

impl PlainStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, PlainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CallStack for PlainStack {
    fn push(&self, key: InvocationKey) {
        let mut state = self.state();
        if !state.closed {
            state.keys.push(key);
        }
    }

    fn pop(&self) -> Option<InvocationKey> {
        self.state().keys.pop()
    }

    fn peek(&self) -> Option<InvocationKey> {
        self.state().keys.last().cloned()
    }

    fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.keys.clear();
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn frames(&self) -> Frames {
        Frames(self.state().keys.as_slice().into())
    }
}
