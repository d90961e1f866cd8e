//! Error types.
//!
//! Only caller mistakes surface as errors. A denied request is a normal
//! [`Decision`](super::Decision), never an `Err`.

use thiserror::Error;

/// Usage errors reported by the engine and its configuration surface.
///
/// Every operation validates its input before touching shared state, so an
/// `Err` always means nothing was changed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    /// The key was the empty string.
    #[error("rate limit key must not be empty")]
    EmptyKey,

    /// The rate was zero.
    #[error("the rate must be greater than zero")]
    InvalidRate,

    /// The capacity was zero.
    #[error("the capacity must be greater than zero")]
    InvalidCapacity,

    /// The refill interval was zero.
    #[error("the total refill interval must be greater than zero")]
    InvalidInterval,

    /// The statistics window was zero.
    #[error("the stats window must be greater than zero")]
    InvalidStatsWindow,
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Error a decision callback may return.
///
/// Callbacks are observers: whatever they return is logged and otherwise
/// ignored.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;
