// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-to-many lifecycle notification.
//!
//! Every trackwise component exposes its lifecycle through an [`Event`]: listeners
//! are registered with [`Event::subscribe`], removed through the returned
//! [`Subscription`], and a single upcoming emission can be awaited with
//! [`Event::next`].
//!
//! Listeners run synchronously, in registration order, on the thread that emits.
//! A panicking listener is caught and narrated; the remaining listeners still run
//! and the emitter never observes the panic.
//!
//! ```rust
//! use trackwise::event::Event;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let event: Event<u32> = Event::new("example");
//! let total = Arc::new(AtomicU32::new(0));
//! let seen = total.clone();
//! let subscription = event.subscribe(move |v: &u32| {
//!     seen.fetch_add(*v, Ordering::Relaxed);
//! });
//!
//! event.emit(&2);
//! event.emit(&3);
//! assert_eq!(total.load(Ordering::Relaxed), 5);
//!
//! assert!(subscription.dispose());
//! event.emit(&100);
//! assert_eq!(total.load(Ordering::Relaxed), 5);
//! ```

use crate::dispatch::Narrator;
use crate::value::PanicMessage;
use futures::channel::oneshot;
use logwise::Logger;
use std::fmt::Debug;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
    waiters: Vec<oneshot::Sender<T>>,
}

struct EventInner<T> {
    name: &'static str,
    narrator: Narrator,
    registry: Mutex<Registry<T>>,
}

impl<T> EventInner<T> {
    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64) -> bool;
}

impl<T: Send> Unsubscribe for EventInner<T> {
    fn unsubscribe(&self, id: u64) -> bool {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _)| *listener_id != id);
        registry.listeners.len() != before
    }
}

/**
A lifecycle event that listeners can subscribe to.
*/
pub struct Event<T> {
    inner: Arc<EventInner<T>>,
}

impl<T: Send + 'static> Event<T> {
    /// Creates an event that narrates listener panics to logwise's global loggers.
    pub fn new(name: &'static str) -> Self {
        Self::with_narrator(name, Narrator::default())
    }

    /// Creates an event that narrates listener panics to `logger`.
    pub fn with_logger(name: &'static str, logger: Arc<dyn Logger>) -> Self {
        Self::with_narrator(name, Narrator::new(Some(logger)))
    }

    pub(crate) fn with_narrator(name: &'static str, narrator: Narrator) -> Self {
        Event {
            inner: Arc::new(EventInner {
                name,
                narrator,
                registry: Mutex::new(Registry {
                    next_id: 0,
                    listeners: Vec::new(),
                    waiters: Vec::new(),
                }),
            }),
        }
    }

    /// Registers `listener` for every future emission.
    pub fn subscribe<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        let event: Weak<dyn Unsubscribe> = Arc::downgrade(&self.inner) as Weak<dyn Unsubscribe>;
        Subscription { id, event }
    }

    /// Resolves with the next emitted value, or `None` if the event is cleared first.
    pub fn next(&self) -> impl Future<Output = Option<T>> + Send + 'static {
        let (sender, receiver) = oneshot::channel();
        self.inner.registry().waiters.push(sender);
        async move { receiver.await.ok() }
    }

    /// Removes every listener and releases pending [`Event::next`] waiters with `None`.
    pub fn clear(&self) {
        let mut registry = self.inner.registry();
        registry.listeners.clear();
        registry.waiters.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry().listeners.len()
    }
}

impl<T: Clone + Send + 'static> Event<T> {
    /// Delivers `value` to every listener, then to pending waiters.
    pub fn emit(&self, value: &T) {
        let (listeners, waiters) = {
            let mut registry = self.inner.registry();
            let listeners: Vec<Listener<T>> = registry
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            (listeners, std::mem::take(&mut registry.waiters))
        };
        for listener in listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(value))) {
                let message = PanicMessage::from_payload(&*payload);
                self.inner.narrator.warn(self.inner.name, || {
                    format!("listener {message}; continuing delivery")
                });
            }
        }
        for waiter in waiters {
            //a dropped receiver simply isn't waiting anymore
            let _ = waiter.send(value.clone());
        }
    }
}

impl<T> Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self
            .inner
            .registry
            .lock()
            .map(|r| r.listeners.len())
            .unwrap_or(0);
        f.debug_struct("Event")
            .field("name", &self.inner.name)
            .field("listeners", &listeners)
            .finish()
    }
}

/**
Handle to a registered listener.

Dropping a `Subscription` leaves the listener registered; call [`Subscription::dispose`]
to remove it.
*/
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    event: Weak<dyn Unsubscribe>,
}

impl Subscription {
    /// Removes the listener.  Returns `false` if it was already removed or the event is gone.
    pub fn dispose(self) -> bool {
        match self.event.upgrade() {
            Some(event) => event.unsubscribe(self.id),
            None => false,
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logwise::InMemoryLogger;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_executors::async_test;

    #[test]
    fn listeners_run_in_registration_order() {
        let event: Event<&'static str> = Event::new("order");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let seen = seen.clone();
            let _ = event.subscribe(move |v: &&'static str| {
                seen.lock().unwrap().push(format!("{name}:{v}"));
            });
        }
        event.emit(&"x");
        assert_eq!(*seen.lock().unwrap(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let logger = Arc::new(InMemoryLogger::new());
        let event: Event<u32> = Event::with_logger("isolation", logger.clone());
        let delivered = Arc::new(AtomicUsize::new(0));

        let _ = event.subscribe(|_: &u32| panic!("listener exploded"));
        let d = delivered.clone();
        let _ = event.subscribe(move |_: &u32| {
            d.fetch_add(1, Ordering::Relaxed);
        });

        event.emit(&1);
        event.emit(&2);
        assert_eq!(delivered.load(Ordering::Relaxed), 2);
        let logs = logger.drain_logs();
        assert!(logs.contains("listener panicked: listener exploded"), "{logs}");
    }

    #[test]
    fn dispose_is_one_shot() {
        let event: Event<u32> = Event::new("dispose");
        let subscription = event.subscribe(|_: &u32| {});
        let copy = subscription.clone();
        assert_eq!(event.listener_count(), 1);
        assert!(subscription.dispose());
        assert!(!copy.dispose());
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn dispose_after_event_dropped() {
        let event: Event<u32> = Event::new("dropped");
        let subscription = event.subscribe(|_: &u32| {});
        drop(event);
        assert!(!subscription.dispose());
    }

    #[async_test]
    async fn next_resolves_with_emitted_value() {
        let event: Event<u32> = Event::new("next");
        let next = event.next();
        event.emit(&7);
        event.emit(&8);
        assert_eq!(next.await, Some(7));
    }

    #[async_test]
    async fn clear_releases_waiters() {
        let event: Event<u32> = Event::new("clear");
        let _ = event.subscribe(|_: &u32| {});
        let next = event.next();
        event.clear();
        assert_eq!(event.listener_count(), 0);
        assert_eq!(next.await, None);
    }
}
