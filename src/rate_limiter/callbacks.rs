//! Decision observers.
//!
//! Callbacks run synchronously after every decision, in registration order.
//! They observe; they never gate. A callback that returns an error or panics
//! is logged and skipped, and the rest still run.

use super::error::CallbackError;
use arc_swap::ArcSwap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Observer invoked with `(allowed, key)` after each decision.
pub type Callback = Arc<dyn Fn(bool, &str) -> Result<(), CallbackError> + Send + Sync + 'static>;

/// Ordered, append-only list of decision callbacks.
///
/// Invocation reads an immutable snapshot of the list, so a concurrent
/// [`add`](Self::add) never blocks or disturbs callbacks already running.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use tokengate::CallbackRegistry;
///
/// let registry = CallbackRegistry::new();
/// let denied = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&denied);
/// registry.add(move |allowed, _key| {
///     if !allowed {
///         counter.fetch_add(1, Ordering::Relaxed);
///     }
///     Ok(())
/// });
///
/// registry.invoke(false, "client-a");
/// assert_eq!(denied.load(Ordering::Relaxed), 1);
/// ```
pub struct CallbackRegistry {
    callbacks: ArcSwap<Vec<Callback>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            callbacks: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Appends a callback after all previously registered ones.
    pub fn add<F>(&self, callback: F)
    where
        F: Fn(bool, &str) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.callbacks.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&callback));
            next
        });
    }

    /// Runs every callback in order. Returns how many failed.
    pub fn invoke(&self, allowed: bool, key: &str) -> usize {
        let callbacks = self.callbacks.load();
        let mut failures = 0;

        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(allowed, key))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    failures += 1;
                    warn!(index, key, allowed, %error, "rate limiter callback failed");
                }
                Err(panic) => {
                    failures += 1;
                    warn!(
                        index,
                        key,
                        allowed,
                        panic = panic_message(panic.as_ref()),
                        "rate limiter callback panicked"
                    );
                }
            }
        }

        failures
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.load().len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}
