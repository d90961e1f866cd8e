//! # Admission Engine
//!
//! The façade callers talk to. It owns the bucket store, the statistics, the
//! callbacks and the live configuration, and wires them together:
//!
//! ```text
//!     decide(key, now)
//!          │
//!          ├─► config.load()            immutable snapshot, lock-free
//!          │
//!          ├─► store.get_or_create(key) ──► lock(key) ──► bucket.try_consume
//!          │                                                   │
//!          │                                   Decision ◄──────┘
//!          ├─► stats.record(key, allowed, now)
//!          ├─► callbacks.invoke(allowed, key)
//!          ▼
//!       Decision
//! ```
//!
//! ## Reconfiguration
//!
//! Every `update_*` validates first, then installs a complete new
//! [`LimiterConfig`] with read-copy-update. Readers hold whichever snapshot
//! they loaded for the whole call, so they never observe a mix of two
//! updates. Buckets are not rescaled; the new values apply from their next
//! refill on.

use super::{
    bucket::Decision,
    callbacks::CallbackRegistry,
    clock::{Clock, SystemClock},
    config::{
        interval_from_parts, validate_capacity, validate_interval, validate_rate,
        validate_stats_window, LimiterConfig,
    },
    error::{CallbackError, LimiterError, Result},
    stats::{KeyStats, StatsAggregator},
    store::{BucketStore, StoreStats},
};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-key token-bucket admission engine.
///
/// Share it behind an `Arc`; every method takes `&self`.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use tokengate::LimiterBuilder;
///
/// let engine = LimiterBuilder::new(10)
///     .capacity(10)
///     .minutes(1)
///     .build()
///     .expect("valid configuration");
///
/// let now = std::time::Instant::now();
/// for _ in 0..10 {
///     assert!(engine.decide_at("203.0.113.9", now)?.allowed);
/// }
///
/// let denied = engine.decide_at("203.0.113.9", now)?;
/// assert!(!denied.allowed);
/// assert_eq!(denied.wait_time, Duration::from_secs(6));
/// # Ok::<(), tokengate::LimiterError>(())
/// ```
pub struct RateLimiterEngine {
    config: ArcSwap<LimiterConfig>,
    buckets: BucketStore,
    stats: StatsAggregator,
    callbacks: CallbackRegistry,
    clock: Arc<dyn Clock>,
}

impl RateLimiterEngine {
    /// Creates an engine using the system clock.
    ///
    /// # Errors
    ///
    /// Any violation reported by [`LimiterConfig::validate`].
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an engine with an explicit time source.
    ///
    /// # Errors
    ///
    /// Any violation reported by [`LimiterConfig::validate`].
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        info!(
            rate = config.rate,
            interval_ms = config.interval.as_millis() as u64,
            capacity = config.capacity,
            burst = config.burst,
            "rate limiter engine created"
        );

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            buckets: BucketStore::new(),
            stats: StatsAggregator::new(),
            callbacks: CallbackRegistry::new(),
            clock,
        })
    }

    /// Admission check for `key` at the clock's current time.
    ///
    /// # Errors
    ///
    /// [`LimiterError::EmptyKey`] for an empty key.
    #[inline]
    pub fn decide(&self, key: &str) -> Result<Decision> {
        self.decide_at(key, self.clock.now())
    }

    /// Admission check for `key` at `now`.
    ///
    /// Consumes one token when admitted, then records the outcome and runs
    /// the callbacks. A rejection is `Ok` with `allowed == false`.
    ///
    /// # Errors
    ///
    /// [`LimiterError::EmptyKey`] for an empty key.
    pub fn decide_at(&self, key: &str, now: Instant) -> Result<Decision> {
        validate_key(key)?;
        let config = self.config.load_full();

        let decision = {
            let handle = self.buckets.get_or_create(key, now, &config);
            let mut bucket = handle.lock();
            bucket.try_consume(&config, now)
        };

        if !decision.allowed {
            debug!(key, wait_ms = decision.wait_time.as_millis() as u64, "request denied");
        }

        self.stats.record(key, decision.allowed, now, &config);
        self.callbacks.invoke(decision.allowed, key);

        Ok(decision)
    }

    /// What `decide` would report as wait time right now, without consuming.
    ///
    /// # Errors
    ///
    /// [`LimiterError::EmptyKey`] for an empty key.
    #[inline]
    pub fn wait_time(&self, key: &str) -> Result<Duration> {
        self.wait_time_at(key, self.clock.now())
    }

    /// What `decide_at` would report as wait time at `now`, without
    /// consuming or refilling. Unseen keys have no wait.
    ///
    /// # Errors
    ///
    /// [`LimiterError::EmptyKey`] for an empty key.
    pub fn wait_time_at(&self, key: &str, now: Instant) -> Result<Duration> {
        validate_key(key)?;
        let config = self.config.load();
        Ok(self
            .buckets
            .peek(key)
            .map(|bucket| bucket.projected(&config, now).wait_time(&config))
            .unwrap_or(Duration::ZERO))
    }

    /// Tokens `key` would hold at `now`, without mutating anything.
    ///
    /// Unseen keys report a full bucket (`capacity`).
    ///
    /// # Errors
    ///
    /// [`LimiterError::EmptyKey`] for an empty key.
    pub fn available_tokens_at(&self, key: &str, now: Instant) -> Result<f64> {
        validate_key(key)?;
        let config = self.config.load();
        Ok(self
            .buckets
            .peek(key)
            .map(|bucket| bucket.projected(&config, now).tokens())
            .unwrap_or(config.capacity as f64))
    }

    /// Resets one key, or every key when `key` is `None`.
    ///
    /// Clears both the bucket and the statistics; the next decision for a
    /// reset key behaves as for a never-seen key.
    pub fn reset(&self, key: Option<&str>) {
        match key {
            Some(key) => self.reset_key(key),
            None => self.reset_all(),
        }
    }

    /// Resets a single key.
    pub fn reset_key(&self, key: &str) {
        self.buckets.reset(key);
        self.stats.reset(key);
        info!(key, "rate limiter key reset");
    }

    /// Resets every key.
    pub fn reset_all(&self) {
        let buckets = self.buckets.reset_all();
        let records = self.stats.reset_all();
        info!(buckets, records, "rate limiter reset");
    }

    /// Changes the number of tokens added per interval.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidRate`] for zero.
    pub fn update_rate(&self, rate: u32) -> Result<()> {
        validate_rate(rate)?;
        self.apply(|config| config.rate = rate);
        info!(rate, "rate updated");
        Ok(())
    }

    /// Changes the steady-state capacity.
    ///
    /// Buckets holding more than the new ceiling are clamped on their next
    /// refill.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidCapacity`] for zero.
    pub fn update_capacity(&self, capacity: u64) -> Result<()> {
        validate_capacity(capacity)?;
        self.apply(|config| config.capacity = capacity);
        info!(capacity, "capacity updated");
        Ok(())
    }

    /// Changes the burst headroom. Any value is valid.
    pub fn update_burst(&self, burst: u64) -> Result<()> {
        self.apply(|config| config.burst = burst);
        info!(burst, "burst updated");
        Ok(())
    }

    /// Changes the refill interval.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidInterval`] for a zero duration.
    pub fn update_interval(&self, interval: Duration) -> Result<()> {
        validate_interval(interval)?;
        self.apply(|config| config.interval = interval);
        info!(interval_ms = interval.as_millis() as u64, "interval updated");
        Ok(())
    }

    /// Changes the refill interval from seconds, minutes and hours, summed.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidInterval`] if the parts sum to zero.
    pub fn update_time(&self, seconds: u64, minutes: u64, hours: u64) -> Result<()> {
        self.update_interval(interval_from_parts(seconds, minutes, hours))
    }

    /// Changes the statistics window. Takes effect for the next query.
    ///
    /// # Errors
    ///
    /// [`LimiterError::InvalidStatsWindow`] for a zero duration.
    pub fn update_stats_window(&self, window: Duration) -> Result<()> {
        validate_stats_window(window)?;
        self.apply(|config| config.stats_window = window);
        info!(window_ms = window.as_millis() as u64, "stats window updated");
        Ok(())
    }

    /// Resumes recording decisions. Existing history is kept.
    pub fn enable_stats(&self) {
        self.apply(|config| config.stats_enabled = true);
        info!("stats collection enabled");
    }

    /// Stops recording decisions. Existing history is kept and stays
    /// queryable.
    pub fn disable_stats(&self) {
        self.apply(|config| config.stats_enabled = false);
        info!("stats collection disabled");
    }

    /// Whether decisions are currently being recorded.
    pub fn stats_enabled(&self) -> bool {
        self.config.load().stats_enabled
    }

    /// Statistics for `key` at the clock's current time.
    pub fn stats(&self, key: &str) -> KeyStats {
        self.stats_at(key, self.clock.now())
    }

    /// Statistics for `key` over the window ending at `now`.
    pub fn stats_at(&self, key: &str, now: Instant) -> KeyStats {
        let config = self.config.load();
        self.stats.query(key, now, &config)
    }

    /// Registers a decision observer.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(bool, &str) -> std::result::Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.add(callback);
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<LimiterConfig> {
        self.config.load_full()
    }

    /// Bucket population counters.
    pub fn store_stats(&self) -> StoreStats {
        self.buckets.stats()
    }

    /// Keys currently holding a bucket.
    pub fn keys(&self) -> Vec<String> {
        self.buckets.keys()
    }

    /// The engine's time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Installs `current` with `change` applied, retrying if another update
    /// lands in between.
    fn apply<F>(&self, change: F)
    where
        F: Fn(&mut LimiterConfig),
    {
        self.config.rcu(|current| {
            let mut next = LimiterConfig::clone(current);
            change(&mut next);
            next
        });
    }
}

#[inline]
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LimiterError::EmptyKey);
    }
    Ok(())
}

impl fmt::Debug for RateLimiterEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterEngine")
            .field("config", &*self.config.load())
            .field("buckets", &self.buckets)
            .field("stats", &self.stats)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
