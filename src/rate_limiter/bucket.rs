//! # Token Bucket Arithmetic
//!
//! The per-key state and the pure functions that move it forward in time.
//! Nothing in here is shared or synchronized: callers hold the key's lock
//! (see [`BucketStore`](super::BucketStore)) and pass in the configuration
//! snapshot that applies to this call.
//!
//! ## Lazy, Continuous Refill
//!
//! ```text
//!     No timer per key. Tokens are computed when the key is touched:
//!
//!     last_refill                         now
//!         │◄──────────── elapsed ──────────►│
//!
//!     added  = elapsed × rate / interval
//!     tokens = min(capacity + burst, tokens + added)
//!
//!     rate=10, interval=60s  ⇒  one token every 6s, accrued smoothly
//!     (no step at interval boundaries, no thundering refill)
//! ```
//!
//! ## Consume
//!
//! ```text
//!     tokens ≥ 1 ──Yes──► tokens -= 1 ──► ✅ allowed, wait 0
//!         │
//!         No
//!         ▼
//!     ❌ denied, wait = (1 − tokens) × interval / rate
//!        (tokens untouched: no partial spend, no debt)
//! ```

use super::config::LimiterConfig;
use std::time::{Duration, Instant};

/// Slack for floating point accrual when comparing against one whole token.
///
/// A caller that waits exactly the reported `wait_time` must be admitted even
/// if the accrued amount lands a few ulps short of 1.0.
const TOKEN_EPSILON: f64 = 1e-9;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the unit of work was admitted.
    pub allowed: bool,

    /// Zero when admitted; otherwise the time until the bucket holds one
    /// full token at the current rate.
    pub wait_time: Duration,
}

impl Decision {
    /// An admitting decision.
    #[inline]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            wait_time: Duration::ZERO,
        }
    }

    /// A rejecting decision with the given retry hint.
    #[inline]
    pub const fn deny(wait_time: Duration) -> Self {
        Self {
            allowed: false,
            wait_time,
        }
    }

    /// Retry hint in fractional seconds.
    #[inline]
    pub fn retry_after_secs(&self) -> f64 {
        self.wait_time.as_secs_f64()
    }
}

/// Token-bucket state for a single key.
///
/// ## Example
///
/// ```rust
/// use std::time::{Duration, Instant};
/// use tokengate::{Bucket, LimiterConfig};
///
/// let config = LimiterConfig::per_minute(10).with_capacity(10);
/// let t0 = Instant::now();
/// let mut bucket = Bucket::new(&config, t0);
///
/// for _ in 0..10 {
///     assert!(bucket.try_consume(&config, t0).allowed);
/// }
/// let denied = bucket.try_consume(&config, t0);
/// assert!(!denied.allowed);
/// assert_eq!(denied.wait_time, Duration::from_secs(6));
///
/// assert!(bucket.try_consume(&config, t0 + Duration::from_secs(6)).allowed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// A full bucket: `capacity` tokens, last refilled at `now`.
    #[inline]
    pub fn new(config: &LimiterConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity as f64,
            last_refill: now,
        }
    }

    /// Tokens currently held, as of the last refill.
    #[inline]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Instant of the last refill computation.
    #[inline]
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Accrues tokens for the time since the last refill.
    ///
    /// A `now` earlier than the last refill counts as zero elapsed time. The
    /// ceiling is applied even then, so a bucket above a lowered ceiling is
    /// clamped down here.
    #[inline]
    pub fn refill(&mut self, config: &LimiterConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = accrued(config, elapsed);

        self.tokens = (self.tokens + added).min(config.ceiling()).max(0.0);

        // Never move backwards; a later touch would otherwise re-accrue
        // time that was already counted.
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// The state `refill` would produce, leaving `self` untouched.
    #[inline]
    pub fn projected(&self, config: &LimiterConfig, now: Instant) -> Self {
        let mut next = *self;
        next.refill(config, now);
        next
    }

    /// Refills, then tries to take one token.
    pub fn try_consume(&mut self, config: &LimiterConfig, now: Instant) -> Decision {
        self.refill(config, now);

        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            Decision::allow()
        } else {
            Decision::deny(self.wait_time(config))
        }
    }

    /// Time until one full token is available, from the current token count.
    ///
    /// Does not refill; call on a refilled or projected bucket.
    pub fn wait_time(&self, config: &LimiterConfig) -> Duration {
        let needed = 1.0 - self.tokens;
        if needed <= TOKEN_EPSILON {
            return Duration::ZERO;
        }
        if config.rate == 0 {
            return Duration::MAX;
        }
        duration_from_secs_ceil(needed * config.interval.as_secs_f64() / config.rate as f64)
    }
}

/// Tokens accrued over `elapsed` at the configured rate.
#[inline]
fn accrued(config: &LimiterConfig, elapsed: Duration) -> f64 {
    let interval = config.interval.as_secs_f64();
    if elapsed.is_zero() || interval == 0.0 {
        return 0.0;
    }
    elapsed.as_secs_f64() * config.rate as f64 / interval
}

/// Rounds up to the next nanosecond so waiting the returned duration is
/// always enough.
fn duration_from_secs_ceil(secs: f64) -> Duration {
    let nanos = (secs * 1e9).ceil();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
