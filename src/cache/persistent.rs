// SPDX-License-Identifier: MIT OR Apache-2.0

use super::CacheHandle;
use super::map::{CacheMap, Eviction};
use crate::coordinator::{Coordinator, CoordinatorOptions, Settlement};
use crate::event::Subscription;
use crate::value::Outcome;
use logwise::Logger;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/// Configuration for a [`PersistentCache`].
#[derive(Debug, Clone, Default)]
pub struct PersistentCacheOptions {
    forget_on_rejection: bool,
    coordinator: CoordinatorOptions,
}

impl PersistentCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /**
    Evict an entry as soon as its operation fails, so the next request retries.

    Off by default: failures stay cached until forgotten.
    */
    pub fn forget_on_rejection(mut self, forget: bool) -> Self {
        self.forget_on_rejection = forget;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.coordinator = self.coordinator.name(name);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.coordinator = self.coordinator.logger(logger);
        self
    }
}

/**
Deduplicates operations by identity and keeps their outcome.

Settled entries stay until [`PersistentCache::forget`] or [`PersistentCache::clear`],
so later requests receive the cached outcome without invoking their supplier.  Suited
to one-time initialization and rarely changing data.

```rust
use trackwise::{PersistentCache, PersistentCacheOptions};

# futures::executor::block_on(async {
let cache: PersistentCache<Result<u32, String>> =
    PersistentCache::new(PersistentCacheOptions::new().forget_on_rejection(true));

assert_eq!(cache.track("answer", || async { Ok(42) }).await, Ok(42));
// cached: this supplier is never invoked
assert_eq!(cache.track("answer", || async { Ok(0) }).await, Ok(42));

assert!(cache.track("flaky", || async { Err("down".to_string()) }).await.is_err());
assert!(!cache.has("flaky"));
# });
```
*/
pub struct PersistentCache<T> {
    coordinator: Coordinator,
    map: Arc<CacheMap<T>>,
    forget_on_rejection: bool,
}

impl<T> Default for PersistentCache<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(PersistentCacheOptions::default())
    }
}

impl<T> PersistentCache<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    pub fn new(options: PersistentCacheOptions) -> Self {
        let coordinator = Coordinator::new(options.coordinator);
        let eviction = if options.forget_on_rejection {
            Eviction::OnFailure
        } else {
            Eviction::Never
        };
        let map = CacheMap::new(eviction, &coordinator);
        PersistentCache {
            coordinator,
            map,
            forget_on_rejection: options.forget_on_rejection,
        }
    }

    /// Whether an entry exists for `id`, in flight or settled.
    pub fn has(&self, id: &str) -> bool {
        self.map.contains(id)
    }

    /// Returns the entry for `id`, or invokes `supplier` to create one.
    pub fn track<S, F>(&self, id: &str, supplier: S) -> CacheHandle<T>
    where
        S: FnOnce() -> F,
        F: Future<Output = T> + Send + 'static,
    {
        self.map.get_or_track(&self.coordinator, id, supplier)
    }

    /**
    Evicts the entry for `id`.  Returns whether there was one.

    Handles already returned keep resolving; an operation still in flight stays
    counted until it settles.
    */
    pub fn forget(&self, id: &str) -> bool {
        self.map.remove(id)
    }

    /// Evicts every entry.
    pub fn clear(&self) {
        self.map.clear()
    }

    pub fn forgets_on_rejection(&self) -> bool {
        self.forget_on_rejection
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// See [`Coordinator::wait`].
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        self.coordinator.wait()
    }

    pub fn size(&self) -> usize {
        self.coordinator.size()
    }

    pub fn on_settled<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&Settlement) + Send + Sync + 'static,
    {
        self.coordinator.on_settled(listener)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}

impl<T> Debug for PersistentCache<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("entries", &self.map.len())
            .field("in_flight", &self.coordinator.size())
            .field("forget_on_rejection", &self.forget_on_rejection)
            .finish()
    }
}
