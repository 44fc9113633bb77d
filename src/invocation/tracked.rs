// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wrapped functions and the futures they return.

use super::key::{InvocationKey, TrackerId};
use super::record::Tag;
use super::tracker::{Invocation, TrackerInner, with_tag};
use crate::stack::Frames;
use crate::value::Outcome;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/**
Something that can be called with an argument of type `A`.

Implemented for every `Fn(A) -> R` and for the wrappers a [`Tracker`](super::Tracker)
returns, so wrapped functions can be wrapped, composed and passed around like the
functions they wrap.  Several arguments are passed as a tuple.
*/
pub trait Invoke<A, R> {
    fn invoke(&self, args: A) -> R;

    /// The tracker that wrapped this function, if any.
    fn tracker_id(&self) -> Option<&TrackerId> {
        None
    }
}

impl<A, R, F> Invoke<A, R> for F
where
    F: Fn(A) -> R,
{
    #[inline]
    fn invoke(&self, args: A) -> R {
        self(args)
    }
}

/**
How a wrapper turns call arguments into the `args` of its records.

[`Rendered`] keeps the `Debug` rendering and is what [`Tracker::track`](super::Tracker::track)
uses.  [`Opaque`] keeps nothing and places no bound on the argument type; it is what
[`Tracker::track_opaque`](super::Tracker::track_opaque) uses.
*/
pub trait Capture<A> {
    fn render(args: &A) -> Option<Arc<str>>;
}

/// Records arguments by their `Debug` rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rendered;

impl<A: Debug> Capture<A> for Rendered {
    fn render(args: &A) -> Option<Arc<str>> {
        Some(format!("{args:?}").into())
    }
}

/// Records no arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Opaque;

impl<A> Capture<A> for Opaque {
    fn render(_args: &A) -> Option<Arc<str>> {
        None
    }
}

/**
A synchronous function wrapped by a [`Tracker`](super::Tracker).

Each [`Tracked::call`] publishes `started`, runs the function with its key on the
stack, pops the key and publishes `completed` or `errored`.  If the function panics,
an `errored` record holding a [`PanicMessage`](crate::PanicMessage) is published and
the panic continues unwinding.
*/
pub struct Tracked<F, C = Rendered> {
    f: F,
    tracker: Arc<TrackerInner>,
    operation: Arc<str>,
    tags: Arc<[Tag]>,
    passthrough: bool,
    capture: PhantomData<fn() -> C>,
}

impl<F: Clone, C> Clone for Tracked<F, C> {
    fn clone(&self) -> Self {
        Tracked {
            f: self.f.clone(),
            tracker: self.tracker.clone(),
            operation: self.operation.clone(),
            tags: self.tags.clone(),
            passthrough: self.passthrough,
            capture: PhantomData,
        }
    }
}

impl<F, C> Tracked<F, C> {
    pub(crate) fn new(
        f: F,
        tracker: Arc<TrackerInner>,
        operation: Arc<str>,
        tags: Arc<[Tag]>,
        passthrough: bool,
    ) -> Self {
        Tracked {
            f,
            tracker,
            operation,
            tags,
            passthrough,
            capture: PhantomData,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Tracker tags followed by this function's own tags.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Adds a tag to every record of this function.
    pub fn with_tag(mut self, name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        self.tags = with_tag(&self.tags, Tag::new(name, value));
        self
    }

    pub fn call<A, R>(&self, args: A) -> R
    where
        F: Invoke<A, R>,
        C: Capture<A>,
        R: Outcome,
    {
        let tracker = &*self.tracker;
        if self.passthrough {
            return self.f.invoke(args);
        }
        if tracker.is_closed() {
            tracker.warn_closed(&self.operation);
            return self.f.invoke(args);
        }
        let rendered = tracker.capture_args(|| C::render(&args));
        let invocation = tracker.begin(&self.operation, rendered, &self.tags);
        let returned = catch_unwind(AssertUnwindSafe(|| self.f.invoke(args)));
        tracker.stack.pop();
        match returned {
            Ok(out) => {
                tracker.settle(invocation, false, &out);
                out
            }
            Err(payload) => {
                tracker.panicked(invocation, false, &*payload);
                resume_unwind(payload)
            }
        }
    }
}

impl<A, R, F, C> Invoke<A, R> for Tracked<F, C>
where
    F: Invoke<A, R>,
    C: Capture<A>,
    R: Outcome,
{
    fn invoke(&self, args: A) -> R {
        self.call(args)
    }

    fn tracker_id(&self) -> Option<&TrackerId> {
        Some(&self.tracker.id)
    }
}

impl<F, C> Debug for Tracked<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("tracker", &self.tracker.id)
            .field("operation", &self.operation)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/**
A function returning a future, wrapped by a [`Tracker`](super::Tracker).

[`TrackedAsync::call`] publishes `started` and invokes the function immediately.  The
returned [`TrackedFuture`] publishes the terminal record when the inner future
resolves.  If the function panics before producing a future, the panic is recorded
and resumed just as for [`Tracked`].
*/
pub struct TrackedAsync<F, C = Rendered> {
    f: F,
    tracker: Arc<TrackerInner>,
    operation: Arc<str>,
    tags: Arc<[Tag]>,
    passthrough: bool,
    capture: PhantomData<fn() -> C>,
}

impl<F: Clone, C> Clone for TrackedAsync<F, C> {
    fn clone(&self) -> Self {
        TrackedAsync {
            f: self.f.clone(),
            tracker: self.tracker.clone(),
            operation: self.operation.clone(),
            tags: self.tags.clone(),
            passthrough: self.passthrough,
            capture: PhantomData,
        }
    }
}

impl<F, C> TrackedAsync<F, C> {
    pub(crate) fn new(
        f: F,
        tracker: Arc<TrackerInner>,
        operation: Arc<str>,
        tags: Arc<[Tag]>,
        passthrough: bool,
    ) -> Self {
        TrackedAsync {
            f,
            tracker,
            operation,
            tags,
            passthrough,
            capture: PhantomData,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn with_tag(mut self, name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        self.tags = with_tag(&self.tags, Tag::new(name, value));
        self
    }

    pub fn call<A, Fut>(&self, args: A) -> TrackedFuture<Fut>
    where
        F: Invoke<A, Fut>,
        C: Capture<A>,
        Fut: Future,
        Fut::Output: Outcome,
    {
        let tracker = &*self.tracker;
        if self.passthrough {
            return TrackedFuture::untracked(self.f.invoke(args));
        }
        if tracker.is_closed() {
            tracker.warn_closed(&self.operation);
            return TrackedFuture::untracked(self.f.invoke(args));
        }
        let rendered = tracker.capture_args(|| C::render(&args));
        let invocation = tracker.begin(&self.operation, rendered, &self.tags);
        let future = match catch_unwind(AssertUnwindSafe(|| self.f.invoke(args))) {
            Ok(future) => future,
            Err(payload) => {
                tracker.stack.pop();
                tracker.panicked(invocation, false, &*payload);
                resume_unwind(payload)
            }
        };
        //stacks with per-task frames carry them in the future; shared stacks keep the key
        //pushed until settlement
        let frames = tracker.stack.capture();
        if frames.is_some() {
            tracker.stack.pop();
        }
        TrackedFuture {
            future,
            pending: Some(Pending {
                tracker: self.tracker.clone(),
                invocation,
                frames,
            }),
        }
    }
}

impl<A, Fut, F, C> Invoke<A, TrackedFuture<Fut>> for TrackedAsync<F, C>
where
    F: Invoke<A, Fut>,
    C: Capture<A>,
    Fut: Future,
    Fut::Output: Outcome,
{
    fn invoke(&self, args: A) -> TrackedFuture<Fut> {
        self.call(args)
    }

    fn tracker_id(&self) -> Option<&TrackerId> {
        Some(&self.tracker.id)
    }
}

impl<F, C> Debug for TrackedAsync<F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedAsync")
            .field("tracker", &self.tracker.id)
            .field("operation", &self.operation)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

struct Pending {
    tracker: Arc<TrackerInner>,
    invocation: Invocation,
    frames: Option<Frames>,
}

impl Pending {
    fn release(&self) {
        if self.frames.is_none() {
            self.tracker.stack.pop();
        }
    }

    fn complete<O: Outcome>(self, out: &O) {
        self.release();
        self.tracker.settle(self.invocation, true, out);
    }

    fn panicked(self, payload: &(dyn std::any::Any + Send)) {
        self.release();
        self.tracker.panicked(self.invocation, true, payload);
    }
}

/**
The future returned by [`TrackedAsync::call`].

Resolves to the inner future's output.  Dropping it before it resolves publishes no
terminal record.
*/
pub struct TrackedFuture<Fut> {
    future: Fut,
    pending: Option<Pending>,
}

impl<Fut> TrackedFuture<Fut> {
    fn untracked(future: Fut) -> Self {
        TrackedFuture {
            future,
            pending: None,
        }
    }

    /// Key of the invocation this future settles, unless it already settled or runs untracked.
    pub fn key(&self) -> Option<&InvocationKey> {
        self.pending.as_ref().map(|p| p.invocation.key())
    }
}

impl<Fut> Future for TrackedFuture<Fut>
where
    Fut: Future,
    Fut::Output: Outcome,
{
    type Output = Fut::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is structurally pinned and never moved out of `self`;
        // `pending` is not pinned.
        let (mut future, pending) = unsafe {
            let d = self.get_unchecked_mut();
            (Pin::new_unchecked(&mut d.future), &mut d.pending)
        };
        let Some(Pending {
            tracker, frames, ..
        }) = pending.as_mut()
        else {
            return future.poll(cx);
        };

        let mut polled = None;
        let caught = catch_unwind(AssertUnwindSafe(|| match frames {
            Some(frames) => tracker.stack.enter(frames, &mut || {
                polled = Some(future.as_mut().poll(cx));
            }),
            None => polled = Some(future.as_mut().poll(cx)),
        }));
        if let Err(payload) = caught {
            if let Some(pending) = pending.take() {
                pending.panicked(&*payload);
            }
            resume_unwind(payload);
        }
        let polled = match polled {
            Some(polled) => polled,
            None => future.as_mut().poll(cx),
        };
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(out) => {
                if let Some(pending) = pending.take() {
                    pending.complete(&out);
                }
                Poll::Ready(out)
            }
        }
    }
}

impl<Fut> Drop for TrackedFuture<Fut> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.release();
            pending.tracker.narrator.info(pending.tracker.id.as_str(), || {
                format!("{} dropped before settling", pending.invocation.key())
            });
        }
    }
}

impl<Fut> Debug for TrackedFuture<Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedFuture")
            .field("key", &self.key())
            .finish_non_exhaustive()
    }
}
