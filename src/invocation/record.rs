// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle observations published by trackers.

use super::key::InvocationKey;
use crate::sys::Duration;
use crate::value::Value;
use std::sync::Arc;

/// A name/value annotation attached to every record of a tracked function.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    name: Arc<str>,
    value: Arc<str>,
}

impl Tag {
    pub fn new(name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        Tag {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Where an invocation is in its lifecycle.
#[derive(Clone, Debug)]
pub enum Phase {
    /// Published immediately before the tracked function runs.
    Started,
    /// The function returned, or its future resolved, with a success value.
    Completed {
        duration: Duration,
        was_async: bool,
        result: Value,
    },
    /// The function returned or resolved a failure, or panicked.
    ///
    /// For panics `error` holds a [`PanicMessage`](crate::PanicMessage).
    Errored {
        duration: Duration,
        was_async: bool,
        error: Value,
    },
}

/**
One lifecycle observation.

Every call produces exactly one [`Phase::Started`] record followed by exactly one
terminal record.  Records are never changed after publication; listeners receive a
shared reference and may clone it.
*/
#[derive(Clone, Debug)]
pub struct InvocationRecord {
    pub key: InvocationKey,
    /// The invocation that was active on the stack when this one started.
    pub parent: Option<InvocationKey>,
    /// `Debug` rendering of the call's arguments, when argument capture is on.
    pub args: Option<Arc<str>>,
    /// Tracker tags followed by the tags of the tracked function.
    pub tags: Arc<[Tag]>,
    pub phase: Phase,
}

impl InvocationRecord {
    pub fn is_started(&self) -> bool {
        matches!(self.phase, Phase::Started)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_started()
    }

    pub fn is_errored(&self) -> bool {
        matches!(self.phase, Phase::Errored { .. })
    }

    /// Duration of a terminal record.
    pub fn duration(&self) -> Option<Duration> {
        match self.phase {
            Phase::Started => None,
            Phase::Completed { duration, .. } | Phase::Errored { duration, .. } => Some(duration),
        }
    }

    pub fn was_async(&self) -> Option<bool> {
        match self.phase {
            Phase::Started => None,
            Phase::Completed { was_async, .. } | Phase::Errored { was_async, .. } => {
                Some(was_async)
            }
        }
    }

    /// Tags named `name`, in order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.name() == name)
            .map(Tag::value)
    }
}
