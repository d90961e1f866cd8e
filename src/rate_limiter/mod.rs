//! # Rate Limiter Module
//!
//! Internal implementation of the admission engine, split by concern.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Limiter settings and validation)
//!     ├── error.rs        (Error types)
//!     ├── clock.rs        (Time sources)
//!     ├── bucket.rs       (Token bucket arithmetic)
//!     ├── store.rs        (Per-key bucket map)
//!     ├── stats.rs        (Sliding-window statistics)
//!     ├── callbacks.rs    (Decision observers)
//!     ├── engine.rs       (The façade tying it together)
//!     └── gate.rs         (Request → key → decision glue)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Request
//!        │
//!        ▼
//!     ┌────────┐
//!     │  Gate  │ ◄── Key extraction, 429 rejection
//!     └───┬────┘
//!         │
//!         ▼
//!     ┌────────┐      ┌────────┐
//!     │ Engine │ ───► │ Config │ ◄── Atomic snapshots
//!     └───┬────┘      └────────┘
//!         │
//!    ┌────┼────────────┐
//!    ▼    ▼            ▼
//!  Store  Stats    Callbacks
//!    │
//!    ▼
//!  Bucket ◄── Lazy refill + consume
//! ```

mod bucket;
mod callbacks;
mod clock;
mod config;
mod engine;
mod error;
mod gate;
mod stats;
mod store;

/// Settings and their defaults
pub use config::{
    interval_from_parts, LimiterConfig, DEFAULT_BURST, DEFAULT_CAPACITY, DEFAULT_STATS_WINDOW,
};

/// Error types
pub use error::{CallbackError, LimiterError, Result};

/// Time sources
pub use clock::{Clock, ManualClock, SystemClock};

/// Token bucket and decision outcome
pub use bucket::{Bucket, Decision};

/// Per-key bucket storage
pub use store::{BucketHandle, BucketStore, StoreStats};

/// Statistics and health
pub use stats::{HealthStatus, KeyStats, StatsAggregator};

/// Decision observers
pub use callbacks::{Callback, CallbackRegistry};

/// The admission engine
pub use engine::RateLimiterEngine;

/// Transport glue
pub use gate::{
    Gate, KeyExtractor, Rejection, RemoteAddr, RemoteAddrKey, DEFAULT_KEY, TOO_MANY_REQUESTS,
};
