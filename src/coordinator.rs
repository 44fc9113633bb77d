// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coordination of in-flight asynchronous operations.
//!
//! A [`Coordinator`] counts the operations it tracked that have not settled yet,
//! emits a [`Settlement`] for each one as it leaves that set, and can wait for a
//! snapshot of the set to drain.
//!
//! Operations are ordinary futures.  Like every Rust future they make progress only
//! while polled; the coordinator observes them from inside [`Operation::poll`] and
//! never drives them itself.
//!
//! ```rust
//! use trackwise::{Coordinator, CoordinatorOptions};
//!
//! # futures::executor::block_on(async {
//! let coordinator = Coordinator::new(CoordinatorOptions::new());
//! let a = coordinator.track(async { Ok::<u32, ()>(1) }, Some("a"));
//! let b = coordinator.track_with(|| async { Ok::<u32, ()>(2) }, None);
//! assert_eq!(coordinator.size(), 2);
//!
//! let wait = coordinator.wait();
//! let (a, b) = futures::join!(a, b);
//! wait.await;
//! assert_eq!((a, b), (Ok(1), Ok(2)));
//! assert_eq!(coordinator.size(), 0);
//! # });
//! ```

mod operation;


pub use operation::{Operation, Settlement};

use crate::dispatch::Narrator;
use crate::event::{Event, Subscription};
use crate::sys::Instant;
use crate::value::Outcome;
use futures::channel::oneshot;
use logwise::Logger;
use operation::Body;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_NAME: &str = "coordinator";

/// Configuration for a [`Coordinator`].
#[derive(Debug, Clone, Default)]
pub struct CoordinatorOptions {
    name: Option<String>,
    logger: Option<Arc<dyn Logger>>,
}

impl CoordinatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used when narrating.  Defaults to `"coordinator"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Logger for the coordinator's own narration.  Defaults to logwise's global loggers.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

#[derive(Debug)]
struct Flight {
    label: Option<Arc<str>>,
    waiters: Vec<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct Flights {
    next_id: u64,
    active: HashMap<u64, Flight>,
}

#[derive(Debug)]
pub(crate) struct CoordinatorInner {
    name: Arc<str>,
    pub(crate) narrator: Narrator,
    flights: Mutex<Flights>,
    settled: Event<Settlement>,
}

impl CoordinatorInner {
    fn flights(&self) -> MutexGuard<'_, Flights> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, label: Option<Arc<str>>) -> u64 {
        let mut flights = self.flights();
        let id = flights.next_id;
        flights.next_id += 1;
        flights.active.insert(
            id,
            Flight {
                label,
                waiters: Vec::new(),
            },
        );
        id
    }

    /// Removes `id` from the in-flight set and releases everyone waiting on it.
    pub(crate) fn finish(&self, id: u64) {
        let flight = self.flights().active.remove(&id);
        if let Some(flight) = flight {
            for waiter in flight.waiters {
                let _ = waiter.send(());
            }
        }
    }

    pub(crate) fn emit(&self, settlement: &Settlement) {
        self.narrator.internal(&self.name, || {
            let label = settlement.label.as_deref().unwrap_or("<unlabeled>");
            let verb = if settlement.failed { "failed" } else { "settled" };
            format!("{label} {verb} in {:?}", settlement.duration)
        });
        self.settled.emit(settlement);
    }
}

/**
Tracks a dynamic set of in-flight operations.

Cloning a `Coordinator` yields another handle to the same set.
*/
#[derive(Debug, Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorOptions::default())
    }
}

impl Coordinator {
    pub fn new(options: CoordinatorOptions) -> Self {
        let narrator = Narrator::new(options.logger);
        let name: Arc<str> = options.name.as_deref().unwrap_or(DEFAULT_NAME).into();
        Coordinator {
            inner: Arc::new(CoordinatorInner {
                settled: Event::with_narrator("on_settled", narrator.clone()),
                flights: Mutex::new(Flights::default()),
                name,
                narrator,
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.inner.name()
    }

    pub(crate) fn narrator(&self) -> &Narrator {
        &self.inner.narrator
    }

    fn start<F>(&self, body: Body<F>, label: Option<Arc<str>>, start: Instant) -> Operation<F> {
        let id = self.inner.register(label.clone());
        self.inner.narrator.internal(&self.inner.name, || {
            format!(
                "tracking {} as #{id}",
                label.as_deref().unwrap_or("<unlabeled>")
            )
        });
        Operation::new(body, self.inner.clone(), id, label, start)
    }

    /// Tracks an operation that already exists.  Timing starts now.
    pub fn track<F>(&self, future: F, label: Option<&str>) -> Operation<F>
    where
        F: Future,
        F::Output: Outcome,
    {
        self.start(Body::Running(future), label.map(Arc::from), Instant::now())
    }

    /**
    Invokes `supplier` and tracks the operation it returns.

    Timing starts immediately before `supplier` runs.  If `supplier` panics, the
    returned operation is already failed: it settles as failed when first polled and
    then resumes the panic.
    */
    pub fn track_with<S, F>(&self, supplier: S, label: Option<&str>) -> Operation<F>
    where
        S: FnOnce() -> F,
        F: Future,
        F::Output: Outcome,
    {
        let label = label.map(Arc::from);
        let start = Instant::now();
        let body = match catch_unwind(AssertUnwindSafe(supplier)) {
            Ok(future) => Body::Running(future),
            Err(payload) => Body::Panicked(Some(payload)),
        };
        self.start(body, label, start)
    }

    /**
    Resolves once every operation in flight right now has settled.

    Operations tracked after this call are not waited for.  Resolves immediately
    when nothing is in flight.  An operation dropped before settling is never waited
    out.
    */
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let receivers: Vec<oneshot::Receiver<()>> = {
            let mut flights = self.inner.flights();
            flights
                .active
                .values_mut()
                .map(|flight| {
                    let (sender, receiver) = oneshot::channel();
                    flight.waiters.push(sender);
                    receiver
                })
                .collect()
        };
        async move {
            futures::future::join_all(receivers).await;
        }
    }

    /// Number of tracked operations that have not settled.
    pub fn size(&self) -> usize {
        self.inner.flights().active.len()
    }

    /// Labels of the operations in flight, in no particular order.
    pub fn in_flight(&self) -> Vec<Option<Arc<str>>> {
        self.inner
            .flights()
            .active
            .values()
            .map(|flight| flight.label.clone())
            .collect()
    }

    pub fn on_settled<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&Settlement) + Send + Sync + 'static,
    {
        self.inner.settled.subscribe(listener)
    }

    /// The settlement event, for [`Event::next`].
    pub fn settled(&self) -> &Event<Settlement> {
        &self.inner.settled
    }
}
