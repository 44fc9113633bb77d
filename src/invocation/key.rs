// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity of trackers and of single invocations.

use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static TRACKER_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a tracker.
///
/// Rendered as `{name}-{n}`, where `n` increases for every tracker created in the
/// process.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TrackerId(Arc<str>);

impl TrackerId {
    pub(crate) fn next(name: &str) -> TrackerId {
        let n = TRACKER_SERIAL.fetch_add(1, Ordering::Relaxed);
        TrackerId(format!("{name}-{n}").into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackerId({})", self.0)
    }
}

/**
Identity of one call to a tracked function.

`index` counts calls per operation name within one tracker, starting at zero.  `id` is
`{tracker_id}:{operation}:{index}` and is therefore unique for the life of the process.
*/
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InvocationKey {
    id: Arc<str>,
    tracker_id: TrackerId,
    operation: Arc<str>,
    index: u64,
}

impl InvocationKey {
    pub(crate) fn new(tracker_id: TrackerId, operation: Arc<str>, index: u64) -> Self {
        InvocationKey {
            id: format!("{tracker_id}:{operation}:{index}").into(),
            tracker_id,
            operation,
            index,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracker_id(&self) -> &TrackerId {
        &self.tracker_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Display for InvocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

impl Debug for InvocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvocationKey({})", self.id)
    }
}
