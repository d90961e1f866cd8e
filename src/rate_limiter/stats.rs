//! # Windowed Decision Statistics
//!
//! Per-key allowed/denied counts over a trailing window, kept apart from the
//! bucket arithmetic so turning statistics off never changes a decision.
//!
//! ## Sliding Window
//!
//! ```text
//!     window = 60s, query at now
//!
//!       evicted          counted
//!     ──●──●──────┼──●────●──●───●──┤
//!                 │                 │
//!            now − 60s             now
//! ```
//!
//! Events are evicted lazily whenever the key is recorded or queried; there
//! is no sweeper thread.
//!
//! ## Health
//!
//! ```text
//!     Healthy ──────► window success rate ≥ 50%
//!        │
//!     Degraded ─────► more denials than admissions
//!        │
//!     Critical ─────► ≥ 90% of the window denied
//! ```

use super::config::LimiterConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Window rejection ratio at or above which a key is reported critical.
const CRITICAL_REJECTION_RATIO: f64 = 0.9;

/// Decision history for a single key.
#[derive(Debug, Default)]
struct StatsRecord {
    /// `(timestamp, allowed)` in arrival order.
    events: VecDeque<(Instant, bool)>,
    lifetime_allowed: u64,
    lifetime_denied: u64,
    last_allowed: Option<Instant>,
    last_denied: Option<Instant>,

    /// Latest instant the record was recorded or queried at.
    newest: Option<Instant>,
}

impl StatsRecord {
    fn push(&mut self, allowed: bool, at: Instant) {
        if allowed {
            self.lifetime_allowed += 1;
            self.last_allowed = Some(latest(self.last_allowed, at));
        } else {
            self.lifetime_denied += 1;
            self.last_denied = Some(latest(self.last_denied, at));
        }
        self.events.push_back((at, allowed));
    }

    /// Drops leading events that no query near the newest instant seen can
    /// count.
    ///
    /// Eviction trails the newest instant by two windows, so a query stamped
    /// slightly earlier than a concurrent record (or than a rewound clock)
    /// still finds every event inside its own window.
    fn evict(&mut self, seen: Instant, window: Duration) {
        let newest = latest(self.newest, seen);
        self.newest = Some(newest);

        let Some(horizon) = newest.checked_sub(window.saturating_mul(2)) else {
            return;
        };
        while let Some(&(at, _)) = self.events.front() {
            if at < horizon {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn snapshot(&self, now: Instant, window: Duration) -> KeyStats {
        let (allowed, denied) = self
            .events
            .iter()
            .filter(|(at, _)| *at <= now && now.saturating_duration_since(*at) <= window)
            .fold((0u64, 0u64), |(a, d), (_, ok)| if *ok { (a + 1, d) } else { (a, d + 1) });

        KeyStats {
            allowed,
            denied,
            total: allowed + denied,
            window,
            lifetime_allowed: self.lifetime_allowed,
            lifetime_denied: self.lifetime_denied,
            since_last_allowed: self.last_allowed.map(|at| now.saturating_duration_since(at)),
            since_last_denied: self.last_denied.map(|at| now.saturating_duration_since(at)),
        }
    }
}

#[inline]
fn latest(previous: Option<Instant>, at: Instant) -> Instant {
    previous.map_or(at, |prev| prev.max(at))
}

/// Per-key statistics as of one query.
///
/// `allowed`, `denied` and `total` cover the trailing window ending at the
/// query time. The `lifetime_*` counters cover everything since the key was
/// first recorded or last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStats {
    /// Admitted decisions inside the window.
    pub allowed: u64,

    /// Rejected decisions inside the window.
    pub denied: u64,

    /// `allowed + denied`.
    pub total: u64,

    /// Window the counts were computed over.
    pub window: Duration,

    /// Admitted decisions since the key was first recorded.
    pub lifetime_allowed: u64,

    /// Rejected decisions since the key was first recorded.
    pub lifetime_denied: u64,

    /// Time since the most recent admitted decision.
    pub since_last_allowed: Option<Duration>,

    /// Time since the most recent rejected decision.
    pub since_last_denied: Option<Duration>,
}

impl KeyStats {
    /// Statistics for a key with no recorded history.
    pub fn empty(window: Duration) -> Self {
        Self {
            allowed: 0,
            denied: 0,
            total: 0,
            window,
            lifetime_allowed: 0,
            lifetime_denied: 0,
            since_last_allowed: None,
            since_last_denied: None,
        }
    }

    /// Fraction of window decisions that were admitted; 1.0 with no traffic.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.allowed as f64 / self.total as f64
        }
    }

    /// Fraction of window decisions that were rejected.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// Three-level assessment of the key's recent traffic.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use tokengate::{HealthStatus, KeyStats};
    ///
    /// let quiet = KeyStats::empty(Duration::from_secs(60));
    /// assert_eq!(quiet.health_status(), HealthStatus::Healthy);
    /// ```
    pub fn health_status(&self) -> HealthStatus {
        let rejection = self.rejection_rate();
        if rejection >= CRITICAL_REJECTION_RATIO {
            HealthStatus::Critical
        } else if rejection > 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        format!(
            "Key Stats (window {:.1}s):\n\
             ├─ Window:\n\
             │  ├─ Allowed: {}\n\
             │  ├─ Denied: {}\n\
             │  └─ Success Rate: {:.2}%\n\
             ├─ Lifetime:\n\
             │  ├─ Allowed: {}\n\
             │  └─ Denied: {}\n\
             └─ Health: {}",
            self.window.as_secs_f64(),
            self.allowed,
            self.denied,
            self.success_rate() * 100.0,
            self.lifetime_allowed,
            self.lifetime_denied,
            self.health_status(),
        )
    }
}

impl fmt::Display for KeyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Health of a key's recent traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// At least half of recent requests were admitted.
    Healthy,

    /// Most recent requests were rejected.
    Degraded,

    /// Nearly every recent request was rejected.
    Critical,
}

impl HealthStatus {
    /// `true` for anything other than `Healthy`.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "✅ Healthy"),
            Self::Degraded => write!(f, "⚠️ Degraded"),
            Self::Critical => write!(f, "🔴 Critical"),
        }
    }
}

/// Concurrent per-key decision history.
pub struct StatsAggregator {
    records: DashMap<String, Arc<Mutex<StatsRecord>>, ahash::RandomState>,
}

impl StatsAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self {
            records: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Appends a decision for `key`. No-op when `config.stats_enabled` is off.
    pub fn record(&self, key: &str, allowed: bool, at: Instant, config: &LimiterConfig) {
        if !config.stats_enabled {
            return;
        }

        // Clone the handle out so the shard guard is released before locking.
        let existing = self.records.get(key).map(|entry| Arc::clone(entry.value()));
        let handle = existing.unwrap_or_else(|| {
            Arc::clone(self.records.entry(key.to_owned()).or_default().value())
        });

        let mut record = handle.lock();
        record.push(allowed, at);
        record.evict(at, config.stats_window);
    }

    /// Counts for `key` over `[now − stats_window, now]`.
    ///
    /// Reads whatever was recorded, even while recording is disabled.
    pub fn query(&self, key: &str, now: Instant, config: &LimiterConfig) -> KeyStats {
        let window = config.stats_window;
        let Some(handle) = self.records.get(key).map(|entry| Arc::clone(entry.value())) else {
            return KeyStats::empty(window);
        };

        let mut record = handle.lock();
        record.evict(now, window);
        record.snapshot(now, window)
    }

    /// Drops the history of one key. Returns `true` if it had any.
    pub fn reset(&self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    /// Drops all history. Returns how many keys were cleared.
    pub fn reset_all(&self) -> usize {
        let keys: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter(|key| self.records.remove(key.as_str()).is_some()).count()
    }

    /// Number of keys with recorded history.
    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsAggregator")
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}
