// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deduplicating caches built on [`Coordinator`].
//!
//! Both caches map a caller-chosen string identity to a shared handle for the
//! operation producing that identity's value.  While an entry exists, tracking the
//! same identity again returns a clone of the existing handle without invoking the
//! supplier, so concurrent requests share one execution.
//!
//! - [`TransientCache`] removes an entry as soon as its operation settles, so the
//!   next request starts fresh work.
//! - [`PersistentCache`] keeps settled entries until [`PersistentCache::forget`] or
//!   [`PersistentCache::clear`], optionally evicting failures immediately.
//!
//! Identities are not checked against the work they name: two unrelated suppliers
//! tracked under the same identity share whichever ran first.
//!
//! The entry is reserved before the supplier is invoked, and the map is not locked
//! while the supplier runs.  A supplier may therefore use the cache it was tracked
//! into; asking for its own identity shares the reserved entry.

mod map;
mod persistent;
mod transient;

#[cfg(test)]
mod tests;

pub use persistent::{PersistentCache, PersistentCacheOptions};
pub use transient::TransientCache;

use futures::future::{BoxFuture, Shared};

/// A cloneable handle resolving to the cached operation's output.
pub type CacheHandle<T> = Shared<BoxFuture<'static, T>>;
