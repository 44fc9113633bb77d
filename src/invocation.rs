// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invocation tracking.
//!
//! A [`Tracker`] wraps functions so that every call publishes a `started` record
//! before the function runs and exactly one terminal record (`completed` or
//! `errored`) when it finishes.  Each record carries the call's [`InvocationKey`]
//! and the key of its parent, read from the tracker's [`CallStack`](crate::CallStack).
//!
//! Synchronous functions are wrapped with [`Tracker::track`]; functions returning a
//! future with [`Tracker::track_async`].  Whether a result is a failure is decided by
//! its [`Outcome`](crate::Outcome) implementation; a panic is recorded as an
//! `errored` record holding a [`PanicMessage`](crate::PanicMessage) and then resumed.
//!
//! ```rust
//! use trackwise::{Phase, Tracker, TrackerOptions};
//! use std::sync::{Arc, Mutex};
//!
//! let tracker = Tracker::new(TrackerOptions::new().name("users"));
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let s = seen.clone();
//! let _subscription = tracker.on_invoked(move |record| {
//!     let phase = match record.phase {
//!         Phase::Started => "started",
//!         Phase::Completed { .. } => "completed",
//!         Phase::Errored { .. } => "errored",
//!     };
//!     s.lock().unwrap().push(format!("{} {}", record.key.operation(), phase));
//! });
//!
//! let parse = tracker.track("parse", |s: &str| s.parse::<u32>().map_err(|e| e.to_string()));
//! assert_eq!(parse.call("12"), Ok(12));
//! assert!(parse.call("twelve").is_err());
//! assert_eq!(
//!     *seen.lock().unwrap(),
//!     ["parse started", "parse completed", "parse started", "parse errored"]
//! );
//! ```

mod key;
mod record;
mod tracked;
mod tracker;


pub use key::{InvocationKey, TrackerId};
pub use record::{InvocationRecord, Phase, Tag};
pub use tracked::{Capture, Invoke, Opaque, Rendered, Tracked, TrackedAsync, TrackedFuture};
pub use tracker::{TrackedBy, Tracker, TrackerOptions};
