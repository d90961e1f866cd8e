//! # Limiter Configuration
//!
//! The "settings panel" shared by every bucket the engine manages. A
//! configuration is an immutable value: the engine keeps the live one behind
//! an atomic pointer and replaces it whole on every update, so a reader always
//! sees a combination of fields that was actually applied together.
//!
//! ## Token Bucket Parameters
//!
//! ```text
//!     ┌──────────────────────────────────┐
//!     │  capacity + burst  (ceiling)     │ ← transient headroom
//!     │  ┌────────────────────────────┐  │
//!     │  │  capacity                  │  │ ← steady-state ceiling
//!     │  │  🪙 🪙 🪙 🪙 🪙 🪙 🪙     │  │
//!     │  └────────────────────────────┘  │
//!     │                                  │
//!     │  rate: 10 tokens / interval: 60s │ ← continuous refill
//!     └──────────────────────────────────┘
//! ```

use super::error::{LimiterError, Result};
use std::time::Duration;

/// Default steady-state capacity of a bucket.
pub const DEFAULT_CAPACITY: u64 = 1024;

/// Default burst headroom above capacity.
pub const DEFAULT_BURST: u64 = 0;

/// Default trailing window for statistics.
pub const DEFAULT_STATS_WINDOW: Duration = Duration::from_secs(60);

/// Converts an interval given as seconds, minutes and hours into one duration.
///
/// The three parts are summed, so `interval_from_parts(30, 1, 0)` is 90
/// seconds. Saturates instead of overflowing.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::interval_from_parts;
///
/// assert_eq!(interval_from_parts(30, 1, 0), Duration::from_secs(90));
/// assert_eq!(interval_from_parts(0, 0, 2), Duration::from_secs(7200));
/// ```
pub fn interval_from_parts(seconds: u64, minutes: u64, hours: u64) -> Duration {
    let total = seconds
        .saturating_add(minutes.saturating_mul(60))
        .saturating_add(hours.saturating_mul(3600));
    Duration::from_secs(total)
}

/// Immutable snapshot of the limiter parameters.
///
/// Every bucket computation receives a `&LimiterConfig` taken from the live
/// snapshot at call time. Changing a field means building a new snapshot,
/// which the engine does for you in its `update_*` methods.
///
/// ## Examples
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::LimiterConfig;
///
/// // 10 requests per minute, default capacity 1024
/// let config = LimiterConfig::new(10, Duration::from_secs(60));
/// assert!(config.validate().is_ok());
/// assert_eq!(config.ceiling(), 1024.0);
///
/// let tight = config.with_capacity(10).with_burst(5);
/// assert_eq!(tight.ceiling(), 15.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    /// Tokens added per `interval`.
    pub rate: u32,

    /// Period over which `rate` tokens accrue. Must be non-zero.
    pub interval: Duration,

    /// Steady-state ceiling. Fresh buckets start full at this value.
    pub capacity: u64,

    /// Extra headroom above `capacity`; the effective ceiling is
    /// `capacity + burst`.
    pub burst: u64,

    /// Trailing window over which allowed/denied counts are reported.
    pub stats_window: Duration,

    /// Whether decisions are recorded into the statistics.
    pub stats_enabled: bool,
}

impl LimiterConfig {
    /// Creates a configuration with the given rate and interval and the
    /// documented defaults for everything else.
    pub fn new(rate: u32, interval: Duration) -> Self {
        Self {
            rate,
            interval,
            capacity: DEFAULT_CAPACITY,
            burst: DEFAULT_BURST,
            stats_window: DEFAULT_STATS_WINDOW,
            stats_enabled: true,
        }
    }

    /// `rate` tokens per second.
    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    /// `rate` tokens per minute.
    pub fn per_minute(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(60))
    }

    /// `rate` tokens per hour.
    pub fn per_hour(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(3600))
    }

    /// Sets the steady-state capacity.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the burst headroom.
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    /// Sets the statistics window.
    pub fn with_stats_window(mut self, window: Duration) -> Self {
        self.stats_window = window;
        self
    }

    /// Enables or disables statistics recording.
    pub fn with_stats_enabled(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    /// Validates every field.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint:
    /// - `rate` is 0
    /// - `interval` is zero
    /// - `capacity` is 0
    /// - `stats_window` is zero
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use tokengate::{LimiterConfig, LimiterError};
    ///
    /// let config = LimiterConfig::new(0, Duration::from_secs(1));
    /// assert_eq!(config.validate(), Err(LimiterError::InvalidRate));
    /// ```
    pub fn validate(&self) -> Result<()> {
        validate_rate(self.rate)?;
        validate_interval(self.interval)?;
        validate_capacity(self.capacity)?;
        validate_stats_window(self.stats_window)?;
        Ok(())
    }

    /// Maximum number of tokens any bucket may hold: `capacity + burst`.
    #[inline]
    pub fn ceiling(&self) -> f64 {
        self.capacity.saturating_add(self.burst) as f64
    }

    /// Refill speed in tokens per second.
    ///
    /// ```rust
    /// use tokengate::LimiterConfig;
    ///
    /// assert_eq!(LimiterConfig::per_minute(120).tokens_per_second(), 2.0);
    /// ```
    #[inline]
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.interval.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rate as f64 / secs
        }
    }
}

#[inline]
pub(crate) fn validate_rate(rate: u32) -> Result<()> {
    if rate == 0 {
        return Err(LimiterError::InvalidRate);
    }
    Ok(())
}

#[inline]
pub(crate) fn validate_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(LimiterError::InvalidInterval);
    }
    Ok(())
}

#[inline]
pub(crate) fn validate_capacity(capacity: u64) -> Result<()> {
    if capacity == 0 {
        return Err(LimiterError::InvalidCapacity);
    }
    Ok(())
}

#[inline]
pub(crate) fn validate_stats_window(window: Duration) -> Result<()> {
    if window.is_zero() {
        return Err(LimiterError::InvalidStatsWindow);
    }
    Ok(())
}
