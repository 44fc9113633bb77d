// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform-specific time types for cross-platform compatibility.
//!
//! Durations reported by trackwise are measured with a monotonic [`Instant`].
//! On native platforms these come from `std::time`, while on WASM they come
//! from `web_time`.

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};
#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};

/// Time elapsed since `start`, clamped at zero.
#[inline]
pub(crate) fn elapsed_since(start: Instant) -> Duration {
    Instant::now().saturating_duration_since(start)
}
