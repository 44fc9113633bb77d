// SPDX-License-Identifier: MIT OR Apache-2.0

//! The identity map shared by both caches.

use super::CacheHandle;
use crate::coordinator::{Coordinator, Operation};
use crate::dispatch::Narrator;
use crate::value::Outcome;
use futures::FutureExt;
use futures::channel::oneshot;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// When a settled operation's entry leaves the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eviction {
    OnSettle,
    OnFailure,
    Never,
}

impl Eviction {
    fn applies(self, failed: bool) -> bool {
        match self {
            Eviction::OnSettle => true,
            Eviction::OnFailure => failed,
            Eviction::Never => false,
        }
    }
}

struct Entry<T> {
    serial: u64,
    handle: CacheHandle<T>,
}

struct State<T> {
    next_serial: u64,
    entries: HashMap<String, Entry<T>>,
}

pub(crate) struct CacheMap<T> {
    state: Mutex<State<T>>,
    eviction: Eviction,
    name: Arc<str>,
    narrator: Narrator,
}

impl<T> CacheMap<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(eviction: Eviction, coordinator: &Coordinator) -> Arc<Self> {
        Arc::new(CacheMap {
            state: Mutex::new(State {
                next_serial: 0,
                entries: HashMap::new(),
            }),
            eviction,
            name: coordinator.name().into(),
            narrator: coordinator.narrator().clone(),
        })
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.state().entries.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        let removed = self.state().entries.remove(id).is_some();
        if removed {
            self.narrator.internal(&self.name, || format!("forgot {id}"));
        }
        removed
    }

    pub(crate) fn clear(&self) {
        let count = {
            let mut state = self.state();
            let count = state.entries.len();
            state.entries.clear();
            count
        };
        self.narrator
            .internal(&self.name, || format!("cleared {count} entries"));
    }

    /// Removes `id` only if it still names the entry created with `serial`.
    fn evict(&self, id: &str, serial: u64) {
        let mut state = self.state();
        if state.entries.get(id).is_some_and(|entry| entry.serial == serial) {
            state.entries.remove(id);
            drop(state);
            self.narrator.internal(&self.name, || format!("evicted {id}"));
        }
    }

    /**
    Returns the entry for `id`, invoking `supplier` through `coordinator` only if there is none.

    The entry is reserved before the supplier runs and the map is unlocked while it
    runs, so the supplier may use this cache; asking for `id` itself from inside the
    supplier shares the reserved entry.
    */
    pub(crate) fn get_or_track<S, F>(
        self: &Arc<Self>,
        coordinator: &Coordinator,
        id: &str,
        supplier: S,
    ) -> CacheHandle<T>
    where
        S: FnOnce() -> F,
        F: Future<Output = T> + Send + 'static,
    {
        let (serial, handle, start) = {
            let mut state = self.state();
            if let Some(entry) = state.entries.get(id) {
                self.narrator
                    .internal(&self.name, || format!("{id} already cached; sharing"));
                return entry.handle.clone();
            }
            let serial = state.next_serial;
            state.next_serial += 1;
            let (start, started) = oneshot::channel::<Operation<F>>();
            let handle = async move {
                match started.await {
                    Ok(operation) => operation.await,
                    Err(_) => unreachable!("a reserved entry is always sent its operation"),
                }
            }
            .boxed()
            .shared();
            state.entries.insert(
                id.to_string(),
                Entry {
                    serial,
                    handle: handle.clone(),
                },
            );
            (serial, handle, start)
        };

        let mut operation = coordinator.track_with(supplier, Some(id));
        if self.eviction != Eviction::Never {
            let map = Arc::downgrade(self);
            let eviction = self.eviction;
            let key = id.to_string();
            operation.on_settle(move |failed| {
                if !eviction.applies(failed) {
                    return;
                }
                if let Some(map) = map.upgrade() {
                    map.evict(&key, serial);
                }
            });
        }
        //`handle` owns the receiver
        let _ = start.send(operation);
        handle
    }
}
