// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-task context storage.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::Poll;

static STORE_ID: AtomicU64 = AtomicU64::new(0);

struct Slot {
    generation: u64,
    value: Box<dyn Any>,
}

thread_local! {
    static SLOTS: RefCell<HashMap<u64, Slot>> = RefCell::new(HashMap::new());
}

/// Number of slots the current thread holds across every store.
#[cfg(test)]
pub(crate) fn slot_count() -> usize {
    SLOTS.with(|slots| slots.borrow().len())
}

#[derive(Debug)]
struct StoreInner {
    id: u64,
    generation: AtomicU64,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let id = self.id;
        //best effort: other threads' slots are unreachable once the id is gone
        let _ = SLOTS.try_with(|slots| slots.borrow_mut().remove(&id));
    }
}

/**
Storage for a value that belongs to the currently running logical task.

Each store owns one slot per thread.  [`ContextStore::run`] and the [`Scoped`] future
install a value into that slot for the duration of a call or a poll, then restore
whatever was there before, so a value follows one chain of execution across its
suspension points without leaking into chains interleaved with it.

[`ContextStore::clear`] invalidates the value on every thread: slots written before the
clear are ignored from then on.

```rust
use trackwise::ContextStore;

let store: ContextStore<&'static str> = ContextStore::new();
assert_eq!(store.get(), None);
let inner = store.run("request-1", || store.get());
assert_eq!(inner, Some("request-1"));
assert_eq!(store.get(), None);
```
*/
pub struct ContextStore<T> {
    inner: Arc<StoreInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ContextStore<T> {
    fn clone(&self) -> Self {
        ContextStore {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Debug for ContextStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("id", &self.inner.id)
            .field("generation", &self.inner.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Clone + 'static> Default for ContextStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ContextStore<T> {
    pub fn new() -> Self {
        ContextStore {
            inner: Arc::new(StoreInner {
                id: STORE_ID.fetch_add(1, Ordering::Relaxed),
                generation: AtomicU64::new(0),
            }),
            _marker: PhantomData,
        }
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// The value bound to the current task, if any.
    pub fn get(&self) -> Option<T> {
        let id = self.inner.id;
        let generation = self.generation();
        SLOTS
            .try_with(|slots| {
                slots
                    .borrow()
                    .get(&id)
                    .filter(|slot| slot.generation == generation)
                    .and_then(|slot| slot.value.downcast_ref::<T>())
                    .cloned()
            })
            .ok()
            .flatten()
    }

    /// Binds `value` to the current task, returning the previous value.
    pub fn enter_with(&self, value: T) -> Option<T> {
        self.replace(Some(value))
    }

    /**
    Unbinds the current task's value, returning it.

    The thread's slot for this store is released, so a store that is no longer bound
    anywhere holds no per-thread state.
    */
    pub fn take(&self) -> Option<T> {
        self.replace(None)
    }

    fn replace(&self, value: Option<T>) -> Option<T> {
        let id = self.inner.id;
        let generation = self.generation();
        let previous = SLOTS
            .try_with(|slots| {
                let mut slots = slots.borrow_mut();
                match value {
                    Some(value) => slots.insert(
                        id,
                        Slot {
                            generation,
                            value: Box::new(value),
                        },
                    ),
                    None => slots.remove(&id),
                }
            })
            .ok()
            .flatten()?;
        if previous.generation != generation {
            return None;
        }
        previous.value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /**
    Runs `f` with `value` bound, then restores the previous binding.

    The previous binding is restored even if `f` panics.
    */
    pub fn run<R, F: FnOnce() -> R>(&self, value: T, f: F) -> R {
        self.run_bound(Some(value), f)
    }

    /// Like [`ContextStore::run`]; `None` runs `f` with nothing bound.
    pub(crate) fn run_bound<R, F: FnOnce() -> R>(&self, value: Option<T>, f: F) -> R {
        let previous = self.replace(value);
        let _restore = Restore {
            store: self,
            previous: Some(previous),
        };
        f()
    }

    /// Invalidates the value bound on every thread.
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.replace(None);
    }

    /// Wraps `future` so that `value` is bound during each of its polls.
    pub fn scope<F: Future>(&self, value: T, future: F) -> Scoped<T, F> {
        self.scope_bound(Some(value), future)
    }

    pub(crate) fn scope_bound<F: Future>(&self, value: Option<T>, future: F) -> Scoped<T, F> {
        Scoped {
            store: self.clone(),
            value,
            future,
        }
    }
}

struct Restore<'a, T: Clone + 'static> {
    store: &'a ContextStore<T>,
    previous: Option<Option<T>>,
}

impl<T: Clone + 'static> Drop for Restore<'_, T> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = self.store.replace(previous);
        }
    }
}

/**
A [`Future`] wrapper that keeps a context value bound across suspension points.

Executors poll many futures on the same thread, so a value bound by one chain would
otherwise leak into whatever is polled next.  `Scoped` solves this by binding its value
before each poll of the inner future and restoring the prior binding afterwards.
Changes the inner future makes to the binding during a poll are kept for the next poll.

```rust
use trackwise::ContextStore;

# futures::executor::block_on(async {
let store: ContextStore<u32> = ContextStore::new();
let observed = store.scope(7, async { store.get() }).await;
assert_eq!(observed, Some(7));
assert_eq!(store.get(), None);
# });
```
*/
pub struct Scoped<T: Clone + 'static, F> {
    store: ContextStore<T>,
    value: Option<T>,
    future: F,
}

impl<T: Clone + 'static, F> Scoped<T, F> {
    /// The value the next poll will bind, if any.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

impl<T: Clone + 'static, F: Future> Future for Scoped<T, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is structurally pinned and never moved out of `self`;
        // `store` and `value` are not pinned.
        let (store, value, future) = unsafe {
            let d = self.get_unchecked_mut();
            (&d.store, &mut d.value, Pin::new_unchecked(&mut d.future))
        };
        let prior = store.replace(value.clone());
        let restore = Restore {
            store,
            previous: Some(prior),
        };
        let r = future.poll(cx);
        *value = store.get();
        drop(restore);
        r
    }
}

impl<T: Clone + Debug + 'static, F> Debug for Scoped<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scoped")
            .field("store", &self.store)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
