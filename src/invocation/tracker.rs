// SPDX-License-Identifier: MIT OR Apache-2.0

use super::key::{InvocationKey, TrackerId};
use super::record::{InvocationRecord, Phase, Tag};
use super::tracked::{Invoke, Opaque, Tracked, TrackedAsync};
use crate::dispatch::Narrator;
use crate::event::{Event, Subscription};
use crate::stack::{CallStack, ScopedStack};
use crate::sys::{Instant, elapsed_since};
use crate::value::{Outcome, PanicMessage, Value};
use std::any::Any;
use logwise::Logger;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_NAME: &str = "tracker";

/**
Configuration for a [`Tracker`].

```rust
use trackwise::{PlainStack, Tracker, TrackerOptions};
use std::sync::Arc;

let tracker = Tracker::new(
    TrackerOptions::new()
        .name("billing")
        .stack(Arc::new(PlainStack::new()))
        .tag("service", "billing")
        .capture_args(false),
);
assert!(tracker.id().as_str().starts_with("billing-"));
```
*/
#[derive(Debug, Clone)]
pub struct TrackerOptions {
    name: Option<String>,
    stack: Option<Arc<dyn CallStack>>,
    tags: Vec<Tag>,
    logger: Option<Arc<dyn Logger>>,
    capture_args: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        TrackerOptions {
            name: None,
            stack: None,
            tags: Vec::new(),
            logger: None,
            capture_args: true,
        }
    }
}

impl TrackerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix of the tracker's id.  Defaults to `"tracker"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /**
    Uses a stack shared with other trackers.

    A shared stack is not closed when the tracker closes.  Without this option the
    tracker owns a fresh [`ScopedStack`].
    */
    pub fn stack(mut self, stack: Arc<dyn CallStack>) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Adds a tag to every record this tracker publishes.
    pub fn tag(mut self, name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        self.tags.push(Tag::new(name, value));
        self
    }

    /// Logger for the tracker's own narration.  Defaults to logwise's global loggers.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Whether records carry a `Debug` rendering of call arguments.  On by default.
    pub fn capture_args(mut self, capture: bool) -> Self {
        self.capture_args = capture;
        self
    }
}

/// Answer of [`Tracker::is_tracked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedBy {
    /// Wrapped by the tracker that was asked.
    This,
    /// Wrapped by some other tracker.
    Other,
    Untracked,
}

/// An invocation that has started but not yet published its terminal record.
#[derive(Debug)]
pub(crate) struct Invocation {
    key: InvocationKey,
    parent: Option<InvocationKey>,
    args: Option<Arc<str>>,
    tags: Arc<[Tag]>,
    start: Instant,
}

impl Invocation {
    pub(crate) fn key(&self) -> &InvocationKey {
        &self.key
    }

    fn record(&self, phase: Phase) -> InvocationRecord {
        InvocationRecord {
            key: self.key.clone(),
            parent: self.parent.clone(),
            args: self.args.clone(),
            tags: self.tags.clone(),
            phase,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TrackerInner {
    pub(crate) id: TrackerId,
    pub(crate) stack: Arc<dyn CallStack>,
    owns_stack: bool,
    tags: Arc<[Tag]>,
    pub(crate) narrator: Narrator,
    capture_args: bool,
    closed: AtomicBool,
    indices: Mutex<HashMap<Arc<str>, u64>>,
    invoked: Event<InvocationRecord>,
    started: Event<InvocationRecord>,
    completed: Event<InvocationRecord>,
    errored: Event<InvocationRecord>,
}

impl TrackerInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn capture_args<R>(&self, render: R) -> Option<Arc<str>>
    where
        R: FnOnce() -> Option<Arc<str>>,
    {
        if self.capture_args { render() } else { None }
    }

    fn next_index(&self, operation: &Arc<str>) -> u64 {
        let mut indices = self.indices.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = indices.entry(operation.clone()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    /**
    Starts an invocation: reads the parent, allocates the index, publishes `started`
    and pushes the new key.

    The caller owns popping the key.
    */
    pub(crate) fn begin(
        &self,
        operation: &Arc<str>,
        args: Option<Arc<str>>,
        tags: &Arc<[Tag]>,
    ) -> Invocation {
        let parent = self.stack.peek();
        let index = self.next_index(operation);
        let mut invocation = Invocation {
            key: InvocationKey::new(self.id.clone(), operation.clone(), index),
            parent,
            args,
            tags: tags.clone(),
            start: Instant::now(),
        };
        self.publish(invocation.record(Phase::Started));
        self.stack.push(invocation.key.clone());
        invocation.start = Instant::now();
        invocation
    }

    /// Publishes the terminal record for a returned or resolved value.
    pub(crate) fn settle<O: Outcome>(&self, invocation: Invocation, was_async: bool, out: &O) {
        let duration = elapsed_since(invocation.start);
        if self.is_closed() {
            return;
        }
        let phase = if out.is_failure() {
            Phase::Errored {
                duration,
                was_async,
                error: out.to_value(),
            }
        } else {
            Phase::Completed {
                duration,
                was_async,
                result: out.to_value(),
            }
        };
        self.publish(invocation.record(phase));
    }

    /// Publishes the terminal record for a panic.  The caller resumes the panic.
    pub(crate) fn panicked(
        &self,
        invocation: Invocation,
        was_async: bool,
        payload: &(dyn Any + Send),
    ) {
        let duration = elapsed_since(invocation.start);
        if self.is_closed() {
            return;
        }
        let phase = Phase::Errored {
            duration,
            was_async,
            error: Value::new(PanicMessage::from_payload(payload)),
        };
        self.publish(invocation.record(phase));
    }

    fn publish(&self, record: InvocationRecord) {
        if self.is_closed() {
            return;
        }
        self.narrator.internal(self.id.as_str(), || match &record.phase {
            Phase::Started => match &record.parent {
                Some(parent) => format!("started {} under {parent}", record.key),
                None => format!("started {}", record.key),
            },
            Phase::Completed { duration, .. } => {
                format!("completed {} in {duration:?}", record.key)
            }
            Phase::Errored {
                duration, error, ..
            } => format!("errored {} in {duration:?}: {error:?}", record.key),
        });
        self.invoked.emit(&record);
        match record.phase {
            Phase::Started => self.started.emit(&record),
            Phase::Completed { .. } => self.completed.emit(&record),
            Phase::Errored { .. } => self.errored.emit(&record),
        }
    }

    pub(crate) fn warn_closed(&self, operation: &str) {
        self.narrator.warn(self.id.as_str(), || {
            format!("{operation} called after close; running untracked")
        });
    }
}

/**
Wraps functions so that their calls publish lifecycle records.

Dropping a `Tracker` does not close it; functions it wrapped keep it alive and keep
publishing until [`Tracker::close`] is called.
*/
#[derive(Debug, Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerOptions::default())
    }
}

impl Tracker {
    pub fn new(options: TrackerOptions) -> Self {
        let name = options.name.as_deref().unwrap_or(DEFAULT_NAME);
        let id = TrackerId::next(name);
        let narrator = Narrator::new(options.logger);
        let (stack, owns_stack) = match options.stack {
            Some(stack) => (stack, false),
            None => (Arc::new(ScopedStack::new()) as Arc<dyn CallStack>, true),
        };
        let event = |name| Event::with_narrator(name, narrator.clone());
        let inner = TrackerInner {
            stack,
            owns_stack,
            tags: options.tags.into(),
            capture_args: options.capture_args,
            closed: AtomicBool::new(false),
            indices: Mutex::new(HashMap::new()),
            invoked: event("on_invoked"),
            started: event("on_started"),
            completed: event("on_completed"),
            errored: event("on_errored"),
            id,
            narrator,
        };
        inner.narrator.internal(inner.id.as_str(), || "created".to_string());
        Tracker {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> &TrackerId {
        &self.inner.id
    }

    /// The stack this tracker reads parents from.
    pub fn stack(&self) -> &Arc<dyn CallStack> {
        &self.inner.stack
    }

    /**
    Wraps a synchronous function.

    Wrapping a function this tracker already wrapped returns a wrapper that calls
    straight through, so each call is still recorded once.
    */
    pub fn track<A, R, F>(&self, operation: &str, f: F) -> Tracked<F>
    where
        F: Invoke<A, R>,
    {
        let passthrough = self.is_tracked(&f) == TrackedBy::This;
        Tracked::new(
            f,
            self.inner.clone(),
            operation.into(),
            self.inner.tags.clone(),
            passthrough,
        )
    }

    /// Wraps a function that returns a future.
    pub fn track_async<A, R, F>(&self, operation: &str, f: F) -> TrackedAsync<F>
    where
        F: Invoke<A, R>,
    {
        let passthrough = self.is_tracked(&f) == TrackedBy::This;
        TrackedAsync::new(
            f,
            self.inner.clone(),
            operation.into(),
            self.inner.tags.clone(),
            passthrough,
        )
    }

    /**
    Like [`Tracker::track`], for functions whose arguments are not `Debug`.

    Records of these calls carry no `args`.
    */
    pub fn track_opaque<A, R, F>(&self, operation: &str, f: F) -> Tracked<F, Opaque>
    where
        F: Invoke<A, R>,
    {
        let passthrough = self.is_tracked(&f) == TrackedBy::This;
        Tracked::new(
            f,
            self.inner.clone(),
            operation.into(),
            self.inner.tags.clone(),
            passthrough,
        )
    }

    /// Like [`Tracker::track_async`], for functions whose arguments are not `Debug`.
    pub fn track_async_opaque<A, R, F>(&self, operation: &str, f: F) -> TrackedAsync<F, Opaque>
    where
        F: Invoke<A, R>,
    {
        let passthrough = self.is_tracked(&f) == TrackedBy::This;
        TrackedAsync::new(
            f,
            self.inner.clone(),
            operation.into(),
            self.inner.tags.clone(),
            passthrough,
        )
    }

    pub fn is_tracked<A, R, F>(&self, f: &F) -> TrackedBy
    where
        F: Invoke<A, R>,
    {
        match f.tracker_id() {
            Some(id) if *id == self.inner.id => TrackedBy::This,
            Some(_) => TrackedBy::Other,
            None => TrackedBy::Untracked,
        }
    }

    /// Every record, in publication order.
    pub fn on_invoked<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&InvocationRecord) + Send + Sync + 'static,
    {
        self.inner.invoked.subscribe(listener)
    }

    pub fn on_started<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&InvocationRecord) + Send + Sync + 'static,
    {
        self.inner.started.subscribe(listener)
    }

    pub fn on_completed<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&InvocationRecord) + Send + Sync + 'static,
    {
        self.inner.completed.subscribe(listener)
    }

    pub fn on_errored<L>(&self, listener: L) -> Subscription
    where
        L: Fn(&InvocationRecord) + Send + Sync + 'static,
    {
        self.inner.errored.subscribe(listener)
    }

    /// The `invoked` event, for [`Event::next`].
    pub fn invoked(&self) -> &Event<InvocationRecord> {
        &self.inner.invoked
    }

    /**
    Stops publishing and removes all listeners.

    Calls made afterwards run untracked.  Calls already in flight still complete but
    publish nothing.  The stack is closed too, unless it was supplied through
    [`TrackerOptions::stack`].  Closing twice is harmless.
    */
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.invoked.clear();
        self.inner.started.clear();
        self.inner.completed.clear();
        self.inner.errored.clear();
        if self.inner.owns_stack {
            self.inner.stack.close();
        }
        self.inner
            .narrator
            .internal(self.inner.id.as_str(), || "closed".to_string());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// `tags` followed by `tag`.
pub(crate) fn with_tag(tags: &[Tag], tag: Tag) -> Arc<[Tag]> {
    tags.iter().cloned().chain(std::iter::once(tag)).collect()
}
