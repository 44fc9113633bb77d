// SPDX-License-Identifier: MIT OR Apache-2.0

use super::CacheHandle;
use super::map::{CacheMap, Eviction};
use crate::coordinator::{Coordinator, CoordinatorOptions, Settlement};
use crate::event::Subscription;
use crate::value::Outcome;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/**
Deduplicates in-flight operations by identity.

An entry lives only while its operation is in flight; once it settles, successfully
or not, the next [`TransientCache::track`] for that identity invokes its supplier
again.

```rust
use trackwise::TransientCache;
use std::sync::atomic::{AtomicU32, Ordering};

# futures::executor::block_on(async {
let cache: TransientCache<Result<String, String>> = TransientCache::default();
let calls = AtomicU32::new(0);
let load = || {
    calls.fetch_add(1, Ordering::Relaxed);
    async { Ok("config".to_string()) }
};

let first = cache.track("config", load);
let second = cache.track("config", load);
assert_eq!(futures::join!(first, second), (Ok("config".into()), Ok("config".into())));
assert_eq!(calls.load(Ordering::Relaxed), 1);
assert!(!cache.has("config"));
# });
```
*/
pub struct TransientCache<T> {
    coordinator: Coordinator,
    map: Arc<CacheMap<T>>,
}

impl<T> Default for TransientCache<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CoordinatorOptions::default())
    }
}

impl<T> TransientCache<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    pub fn new(options: CoordinatorOptions) -> Self {
        let coordinator = Coordinator::new(options);
        let map = CacheMap::new(Eviction::OnSettle, &coordinator);
        TransientCache { coordinator, map }
    }

    /// Whether an operation for `id` is in flight.
    pub fn has(&self, id: &str) -> bool {
        self.map.contains(id)
    }

    /// Shares the in-flight operation for `id`, or invokes `supplier` to start one.
    pub fn track<S, F>(&self, id: &str, supplier: S) -> CacheHandle<T>
    where
        S: FnOnce() -> F,
        F: Future<Output = T> + Send + 'static,
    {
        self.map.get_or_track(&self.coordinator, id, supplier)
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

impl<T> Debug for TransientCache<T>
where
    T: Outcome + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientCache")
            .field("entries", &self.map.len())
            .field("in_flight", &self.coordinator.size())
            .finish()
    }
}
