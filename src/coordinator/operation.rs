// SPDX-License-Identifier: MIT OR Apache-2.0

use super::CoordinatorInner;
use crate::sys::{Duration, Instant, elapsed_since};
use crate::value::{Outcome, PanicMessage, Value};
use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Emitted once per tracked operation, as it leaves the in-flight set.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub label: Option<Arc<str>>,
    /// Time from tracking (or from invoking the supplier) to settlement.
    pub duration: Duration,
    pub failed: bool,
    /// The success or failure value; a [`PanicMessage`] for panics.
    pub result: Value,
}

pub(crate) enum Body<F> {
    Running(F),
    /// The supplier panicked; the payload is resumed on first poll.
    Panicked(Option<Box<dyn Any + Send>>),
}

type SettleHook = Box<dyn FnOnce(bool) + Send>;

/**
An operation tracked by a [`Coordinator`](super::Coordinator).

Resolves to the inner future's output.  Settling removes the operation from the
in-flight set and emits a [`Settlement`].  An `Operation` dropped before it settles
stays counted by [`Coordinator::size`](super::Coordinator::size).
*/
pub struct Operation<F> {
    body: Body<F>,
    coordinator: Arc<CoordinatorInner>,
    id: u64,
    label: Option<Arc<str>>,
    start: Instant,
    hook: Option<SettleHook>,
    settled: bool,
}

impl<F> Operation<F> {
    pub(crate) fn new(
        body: Body<F>,
        coordinator: Arc<CoordinatorInner>,
        id: u64,
        label: Option<Arc<str>>,
        start: Instant,
    ) -> Self {
        Operation {
            body,
            coordinator,
            id,
            label,
            start,
            hook: None,
            settled: false,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Runs `hook` with the failure flag when the operation settles, before `on_settled`.
    pub(crate) fn on_settle<H>(&mut self, hook: H)
    where
        H: FnOnce(bool) + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
    }

    fn settle(&mut self, failed: bool, result: Value) {
        if self.settled {
            return;
        }
        self.settled = true;
        let duration = elapsed_since(self.start);
        self.coordinator.finish(self.id);
        if let Some(hook) = self.hook.take() {
            hook(failed);
        }
        self.coordinator.emit(&Settlement {
            label: self.label.clone(),
            duration,
            failed,
            result,
        });
    }
}

impl<F> Future for Operation<F>
where
    F: Future,
    F::Output: Outcome,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: the future inside `body` is structurally pinned and never moved;
        // the remaining fields are not pinned.
        let this = unsafe { self.get_unchecked_mut() };
        let future = match &mut this.body {
            Body::Running(future) => unsafe { Pin::new_unchecked(future) },
            Body::Panicked(payload) => match payload.take() {
                Some(payload) => {
                    this.settle(true, Value::new(PanicMessage::from_payload(&*payload)));
                    resume_unwind(payload)
                }
                None => panic!("operation polled after its supplier panicked"),
            },
        };
        match catch_unwind(AssertUnwindSafe(|| future.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(out)) => {
                this.settle(out.is_failure(), out.to_value());
                Poll::Ready(out)
            }
            Err(payload) => {
                this.settle(true, Value::new(PanicMessage::from_payload(&*payload)));
                resume_unwind(payload)
            }
        }
    }
}

impl<F> Drop for Operation<F> {
    fn drop(&mut self) {
        if !self.settled {
            let label = self.label.as_deref().unwrap_or("<unlabeled>");
            self.coordinator.narrator.info(self.coordinator.name(), || {
                format!("{label} dropped before settling; still counted")
            });
        }
    }
}

impl<F> Debug for Operation<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}
