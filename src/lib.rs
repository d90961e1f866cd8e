//! # Tokengate - Per-Key Token-Bucket Admission Control
//!
//! An in-process admission engine: callers ask "may this unit of work
//! proceed for key K now?" and get back a yes, or a no plus how long to wait.
//! Every distinct key (a client IP, an API key, a tenant id) gets its own
//! token bucket, refilled continuously at a configurable rate.
//!
//! ## The Token Bucket Algorithm
//!
//! ```text
//!     rate = 10 / minute, capacity = 10
//!
//!     t=0s     [🪙🪙🪙🪙🪙🪙🪙🪙🪙🪙] 10 requests ✅
//!     t=0s     [          ]  request 11 ⛔ wait 6s
//!     t=6s     [🪙         ]  1 token accrued ✅
//! ```
//!
//! - **Tokens** refill lazily: nothing runs in the background, a bucket is
//!   brought up to date when its key is next used.
//! - **Capacity** is the steady-state maximum; **burst** is extra headroom
//!   above it.
//! - A **denial** never consumes anything, and reports the exact time until
//!   the next token.
//!
//! ## Quick Start
//!
//! ```rust
//! use tokengate::LimiterBuilder;
//!
//! // 100 requests per second per key
//! let engine = LimiterBuilder::new(100).capacity(100).seconds(1).build()?;
//!
//! let decision = engine.decide("203.0.113.7")?;
//! if decision.allowed {
//!     // handle the request
//! } else {
//!     println!("⛔ retry in {:.2}s", decision.retry_after_secs());
//! }
//! # Ok::<(), tokengate::LimiterError>(())
//! ```
//!
//! ### Per-request gating
//!
//! ```rust
//! use std::net::IpAddr;
//! use std::sync::Arc;
//! use tokengate::{Gate, LimiterBuilder, RemoteAddrKey};
//!
//! let engine = Arc::new(LimiterBuilder::new(10).capacity(10).minutes(1).build()?);
//! let gate: Gate<IpAddr> = Gate::new(engine, RemoteAddrKey);
//!
//! let client: IpAddr = "192.168.1.100".parse().unwrap();
//! match gate.check(&client) {
//!     Ok(_) => { /* process */ }
//!     Err(rejection) => println!("{} {}", rejection.status(), rejection),
//! }
//! # Ok::<(), tokengate::LimiterError>(())
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your Application      │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │   Gate (optional)       │ key extraction, 429s
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │   RateLimiterEngine     │
//!                    ├─────────────────────────┤
//!                    │  • decide()             │
//!                    │  • wait_time()          │
//!                    │  • reset() / update_*() │
//!                    │  • stats()              │
//!                    └──────────┬──────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!   ┌──────▼───────┐    ┌───────▼──────┐     ┌───────▼──────┐
//!   │ BucketStore  │    │ Stats        │     │ Callbacks    │
//!   ├──────────────┤    ├──────────────┤     ├──────────────┤
//!   │ sharded map  │    │ sliding      │     │ ordered,     │
//!   │ per-key lock │    │ window       │     │ isolated     │
//!   └──────────────┘    └──────────────┘     └──────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity |
//! |-----------|----------------|
//! | decide() | O(1) + callbacks |
//! | wait_time() | O(1) |
//! | stats() | O(events evicted) |
//! | reset(None) | O(keys) |
//!
//! ## Thread Safety
//!
//! [`RateLimiterEngine`] is `Send + Sync`; share it via `Arc`
//! ([`SharedEngine`]). Decisions for one key are linearizable; decisions for
//! different keys proceed in parallel. Configuration updates are published
//! as whole snapshots, so a decision never sees half of an update.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `info` for construction, resets and
//! reconfiguration, `debug` for bucket creation and denials, `warn` for
//! failing callbacks. Install any subscriber to see them.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Internal module
mod rate_limiter;

// Public re-exports
pub use rate_limiter::{
    interval_from_parts, Bucket, BucketHandle, BucketStore, Callback, CallbackError,
    CallbackRegistry, Clock, Decision, Gate, HealthStatus, KeyExtractor, KeyStats, LimiterConfig,
    LimiterError, ManualClock, RateLimiterEngine, Rejection, RemoteAddr, RemoteAddrKey, Result,
    StatsAggregator, StoreStats, SystemClock, DEFAULT_BURST, DEFAULT_CAPACITY, DEFAULT_KEY,
    DEFAULT_STATS_WINDOW, TOO_MANY_REQUESTS,
};

use std::sync::Arc;
use std::time::Duration;

/// An engine wrapped in `Arc` for sharing across threads.
///
/// # Example
/// ```rust
/// use tokengate::{LimiterBuilder, SharedEngine};
/// use std::sync::Arc;
///
/// let shared: SharedEngine = Arc::new(LimiterBuilder::new(5).seconds(1).build().unwrap());
///
/// let engine = shared.clone();
/// std::thread::spawn(move || {
///     engine.decide("worker").unwrap();
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedEngine = Arc<RateLimiterEngine>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use tokengate::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical admission-control use cases.
    //!
    //! # Example
    //! ```rust
    //! use tokengate::prelude::*;
    //!
    //! let engine = LimiterBuilder::new(50).seconds(1).build().unwrap();
    //! let decision: Decision = engine.decide("k").unwrap();
    //! assert!(decision.allowed);
    //! let status = HealthStatus::Healthy;
    //! ```

    pub use crate::{
        Decision, Gate, HealthStatus, KeyStats, LimiterBuilder, LimiterConfig, LimiterError,
        RateLimiterEngine, Rejection, RemoteAddrKey, SharedEngine,
    };
}

/// Fluent construction of a [`RateLimiterEngine`].
///
/// The rate is mandatory; the interval is assembled from
/// [`seconds`](Self::seconds), [`minutes`](Self::minutes) and
/// [`hours`](Self::hours) (summed), or set whole with
/// [`interval`](Self::interval). Everything else has a default.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::{LimiterBuilder, LimiterError};
///
/// // 100 requests per 90 seconds, with 20 extra for bursts
/// let engine = LimiterBuilder::new(100)
///     .capacity(100)
///     .burst(20)
///     .minutes(1)
///     .seconds(30)
///     .build()?;
/// assert_eq!(engine.config().interval, Duration::from_secs(90));
///
/// // No interval at all is rejected
/// let result = LimiterBuilder::new(100).build();
/// assert_eq!(result.unwrap_err(), LimiterError::InvalidInterval);
/// # Ok::<(), LimiterError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LimiterBuilder {
    rate: u32,
    capacity: u64,
    burst: u64,
    seconds: u64,
    minutes: u64,
    hours: u64,
    interval: Option<Duration>,
    stats_window: Duration,
    stats_enabled: bool,
    clock: Option<Arc<dyn Clock>>,
}

impl LimiterBuilder {
    /// Starts a builder admitting `rate` units per interval.
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            capacity: DEFAULT_CAPACITY,
            burst: DEFAULT_BURST,
            seconds: 0,
            minutes: 0,
            hours: 0,
            interval: None,
            stats_window: DEFAULT_STATS_WINDOW,
            stats_enabled: true,
            clock: None,
        }
    }

    /// Steady-state bucket maximum (must be > 0).
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Headroom above capacity that refill may fill.
    pub fn burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Seconds component of the interval.
    pub fn seconds(mut self, seconds: u64) -> Self {
        self.seconds = seconds;
        self
    }

    /// Minutes component of the interval.
    pub fn minutes(mut self, minutes: u64) -> Self {
        self.minutes = minutes;
        self
    }

    /// Hours component of the interval.
    pub fn hours(mut self, hours: u64) -> Self {
        self.hours = hours;
        self
    }

    /// Sets the whole interval, overriding the component setters.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Lookback for [`RateLimiterEngine::stats`].
    pub fn stats_window(mut self, window: Duration) -> Self {
        self.stats_window = window;
        self
    }

    /// Whether decisions are recorded from the start.
    pub fn stats_enabled(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    /// Time source; the system clock if unset.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The configuration `build` would validate.
    pub fn config(&self) -> LimiterConfig {
        let interval = self
            .interval
            .unwrap_or_else(|| interval_from_parts(self.seconds, self.minutes, self.hours));

        LimiterConfig::new(self.rate, interval)
            .with_capacity(self.capacity)
            .with_burst(self.burst)
            .with_stats_window(self.stats_window)
            .with_stats_enabled(self.stats_enabled)
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Any violation reported by [`LimiterConfig::validate`], including
    /// [`LimiterError::InvalidInterval`] when no interval was given.
    pub fn build(self) -> Result<RateLimiterEngine> {
        let config = self.config();
        match self.clock {
            Some(clock) => RateLimiterEngine::with_clock(config, clock),
            None => RateLimiterEngine::new(config),
        }
    }
}
