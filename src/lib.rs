//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# trackwise

trackwise is a lightweight in-process tracking layer.  It tells you what your program is
doing right now, what caused it, and how long it took, without a tracing backend.

# Development status

trackwise is experimental and the API may change.

# The problem

Logging tells you *that* something happened.  When many asynchronous operations
interleave on one thread, it rarely tells you *which* caller it happened for.  A
`fetch_user` that logs "started" twice and "failed" once leaves you guessing which
request failed and what that request was in the middle of.

Two further problems tend to show up alongside:

* The same expensive work is requested concurrently by several callers, and runs
  once per caller.
* Shutdown code wants to wait for "everything currently running", and nobody is
  counting.

# Invocation tracking

A [`Tracker`] wraps functions.  Every call publishes an [`InvocationRecord`] when it
starts and exactly one more when it completes or fails.  Records carry a unique
[`InvocationKey`] and the key of the *parent* invocation: the tracked call that was
active when this one started.

```rust
use trackwise::{Tracker, TrackerOptions};
use std::sync::{Arc, Mutex};

let tracker = Tracker::new(TrackerOptions::new().name("shop"));
let parents = Arc::new(Mutex::new(Vec::new()));
let p = parents.clone();
let _subscription = tracker.on_started(move |record| {
    let parent = record.parent.as_ref().map(|k| k.operation().to_string());
    p.lock().unwrap().push((record.key.operation().to_string(), parent));
});

let price = tracker.track("price", |sku: u32| -> Result<u32, String> { Ok(sku * 100) });
let checkout = tracker.track("checkout", move |sku: u32| price.call(sku));
assert_eq!(checkout.call(3), Ok(300));

assert_eq!(
    *parents.lock().unwrap(),
    [
        ("checkout".to_string(), None),
        ("price".to_string(), Some("checkout".to_string()))
    ]
);
```

Parents are read from a [`CallStack`].  The default, [`ScopedStack`], keeps a separate
stack for every logical asynchronous task, so interleaved futures never see each other's
frames.  [`PlainStack`] is a single shared list, adequate when calls never interleave.

Whether a result counts as a failure is decided by the [`Outcome`] trait: `Err` fails,
while `Ok`, `()`, numbers, strings and most other plain returns succeed.  A return type
trackwise does not know can be wrapped in [`Success`].  Panics are recorded and then
resumed unchanged.

Arguments are recorded as their `Debug` rendering.  Functions whose arguments are not
`Debug` are wrapped with [`Tracker::track_opaque`] instead, which records no arguments.

# Coordination and deduplication

A [`Coordinator`] counts in-flight operations and can [wait](Coordinator::wait) for a
snapshot of them.  [`TransientCache`] and [`PersistentCache`] build on it to share one
execution among every concurrent request for the same identity.

# Logging

trackwise narrates its own lifecycle through [logwise](https://docs.rs/logwise).  By
default records go to logwise's global loggers: lifecycle narration at `debuginternal`,
early drops at `info`, misuse at `warning`.  A specific `logwise::Logger` can be passed
through the options structs instead, and `logwise::InMemoryLogger` captures narration
for tests.

# Multithreading

Trackers, coordinators and caches are `Send + Sync` and may be shared between threads.
[`ScopedStack`] keeps frames per thread and per task; a future handed to another thread's
executor can carry its caller's frames with [`ScopedStack::bind`].
*/

logwise::declare_logging_domain!();

mod dispatch;
mod sys;
mod value;
pub mod event;
mod stack;
mod invocation;
mod coordinator;
mod cache;

pub use value::{Outcome, PanicMessage, Success, Value};

pub use stack::{CallStack, ContextStore, Frames, PlainStack, Scoped, ScopedStack};
pub use invocation::{
    Capture, InvocationKey, InvocationRecord, Invoke, Opaque, Phase, Rendered, Tag, Tracked,
    TrackedAsync, TrackedBy, TrackedFuture, Tracker, TrackerId, TrackerOptions,
};
pub use coordinator::{Coordinator, CoordinatorOptions, Operation, Settlement};
pub use cache::{CacheHandle, PersistentCache, PersistentCacheOptions, TransientCache};

pub use sys::Duration;
