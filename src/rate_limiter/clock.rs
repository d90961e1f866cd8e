//! # Time Sources
//!
//! Every engine operation takes an explicit `now: Instant`; the convenience
//! variants without a timestamp ask the engine's [`Clock`]. Production code
//! uses [`SystemClock`], tests drive a [`ManualClock`] so refill arithmetic
//! is deterministic.
//!
//! ```text
//!     SystemClock ──► Instant::now()
//!
//!     ManualClock ──► base + offset
//!                       │
//!                       ├─ advance(d)  offset += d
//!                       └─ rewind(d)   offset -= d   (simulated clock anomaly)
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

/// Source of timestamps for an engine.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Monotonic wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline(always)]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for tests and simulations.
///
/// Starts at the instant it was created and only moves when told to.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(6));
/// assert_eq!(clock.now() - start, Duration::from_secs(6));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// The instant this clock started at.
    pub fn start(&self) -> Instant {
        self.base
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset = offset.saturating_add(by);
    }

    /// Moves the clock backward, never before its start.
    pub fn rewind(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset = offset.saturating_sub(by);
    }

    /// Sets the clock to `start() + offset`.
    pub fn set(&self, offset: Duration) {
        *self.offset.lock() = offset;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}
