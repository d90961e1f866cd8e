//! Transport-facing glue.
//!
//! The engine only knows keys. A [`Gate`] adds the two things a request
//! pipeline needs on top: a replaceable strategy for turning a request into a
//! key, and a [`Rejection`] value carrying the "too many requests" status and
//! message for the transport to render.
//!
//! ```text
//!     request ──► KeyExtractor ──► engine.decide(key)
//!                                       │
//!                      allowed ◄────────┴────────► Rejection (429)
//!                         │
//!                      handler(request)
//! ```

use super::{bucket::Decision, engine::RateLimiterEngine};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Key used when a request carries no usable identity.
pub const DEFAULT_KEY: &str = "default";

/// HTTP status a transport should answer a [`Rejection`] with.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Strategy for deriving a rate-limit key from a request.
///
/// Any `Fn(&R) -> String` closure is an extractor.
pub trait KeyExtractor<R: ?Sized>: Send + Sync {
    /// Returns the key `request` is accounted under.
    fn extract_key(&self, request: &R) -> String;
}

impl<R, F> KeyExtractor<R> for F
where
    R: ?Sized,
    F: Fn(&R) -> String + Send + Sync,
{
    fn extract_key(&self, request: &R) -> String {
        self(request)
    }
}

/// Requests that know their peer address.
pub trait RemoteAddr {
    /// Address of the client that sent the request, if known.
    fn remote_addr(&self) -> Option<IpAddr>;
}

impl RemoteAddr for IpAddr {
    fn remote_addr(&self) -> Option<IpAddr> {
        Some(*self)
    }
}

impl RemoteAddr for SocketAddr {
    fn remote_addr(&self) -> Option<IpAddr> {
        Some(self.ip())
    }
}

impl<T: RemoteAddr> RemoteAddr for Option<T> {
    fn remote_addr(&self) -> Option<IpAddr> {
        self.as_ref().and_then(RemoteAddr::remote_addr)
    }
}

/// Default extractor: the client's IP address, or [`DEFAULT_KEY`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteAddrKey;

impl<R: RemoteAddr + ?Sized> KeyExtractor<R> for RemoteAddrKey {
    fn extract_key(&self, request: &R) -> String {
        request
            .remote_addr()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| DEFAULT_KEY.to_owned())
    }
}

/// A request the engine refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Key the request was accounted under.
    pub key: String,

    /// How long until the key has a token again.
    pub wait_time: Duration,
}

impl Rejection {
    /// Status code for the response, always 429.
    pub fn status(&self) -> u16 {
        TOO_MANY_REQUESTS
    }

    /// Response detail text.
    pub fn message(&self) -> String {
        format!(
            "Rate limit exceeded. Try again in {:.2} seconds.",
            self.wait_time.as_secs_f64()
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Rejection {}

/// Engine plus key-extraction strategy for one request type.
///
/// # Example
///
/// ```rust
/// use std::net::SocketAddr;
/// use std::sync::Arc;
/// use tokengate::{Gate, LimiterBuilder, RemoteAddrKey};
///
/// let engine = Arc::new(LimiterBuilder::new(1).capacity(1).seconds(10).build()?);
/// let gate: Gate<SocketAddr> = Gate::new(engine, RemoteAddrKey);
///
/// let handler = gate.wrap(|peer: &SocketAddr| format!("hello {}", peer));
/// let peer: SocketAddr = "198.51.100.4:5000".parse().unwrap();
///
/// assert!(handler(&peer).is_ok());
/// let rejected = handler(&peer).unwrap_err();
/// assert_eq!(rejected.status(), 429);
/// assert_eq!(rejected.key, "198.51.100.4");
/// # Ok::<(), tokengate::LimiterError>(())
/// ```
pub struct Gate<R: ?Sized> {
    engine: Arc<RateLimiterEngine>,
    extractor: Arc<dyn KeyExtractor<R>>,
}

impl<R: ?Sized> Gate<R> {
    /// Creates a gate using `extractor` to key requests.
    pub fn new<E>(engine: Arc<RateLimiterEngine>, extractor: E) -> Self
    where
        E: KeyExtractor<R> + 'static,
    {
        Self {
            engine,
            extractor: Arc::new(extractor),
        }
    }

    /// Replaces the key-extraction strategy.
    pub fn with_extractor<E>(mut self, extractor: E) -> Self
    where
        E: KeyExtractor<R> + 'static,
    {
        self.extractor = Arc::new(extractor);
        self
    }

    /// The engine decisions are delegated to.
    pub fn engine(&self) -> &Arc<RateLimiterEngine> {
        &self.engine
    }

    /// Key `request` is accounted under. Empty keys map to [`DEFAULT_KEY`].
    pub fn key_for(&self, request: &R) -> String {
        let key = self.extractor.extract_key(request);
        if key.is_empty() {
            DEFAULT_KEY.to_owned()
        } else {
            key
        }
    }

    /// Admission check for `request`.
    ///
    /// # Errors
    ///
    /// A [`Rejection`] when the key is out of tokens.
    pub fn check(&self, request: &R) -> Result<Decision, Rejection> {
        let key = self.key_for(request);
        // key_for never yields an empty key, the only engine error.
        let decision = match self.engine.decide(&key) {
            Ok(decision) => decision,
            Err(_) => {
                return Err(Rejection {
                    key,
                    wait_time: Duration::ZERO,
                })
            }
        };

        if decision.allowed {
            Ok(decision)
        } else {
            Err(Rejection {
                key,
                wait_time: decision.wait_time,
            })
        }
    }

    /// Wraps `handler` so it only runs for admitted requests.
    pub fn wrap<H, T>(&self, handler: H) -> impl Fn(&R) -> Result<T, Rejection>
    where
        H: Fn(&R) -> T,
    {
        let gate = self.clone();
        move |request: &R| {
            gate.check(request)?;
            Ok(handler(request))
        }
    }
}

impl<R: ?Sized> Clone for Gate<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<R: ?Sized> fmt::Debug for Gate<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate").field("engine", &self.engine).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::{clock::ManualClock, config::LimiterConfig};
    use std::net::Ipv4Addr;

    struct FakeRequest {
        peer: Option<SocketAddr>,
        api_key: &'static str,
    }

    impl RemoteAddr for FakeRequest {
        fn remote_addr(&self) -> Option<IpAddr> {
            self.peer.map(|addr| addr.ip())
        }
    }

    fn engine(capacity: u64) -> (Arc<RateLimiterEngine>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = LimiterConfig::new(1, Duration::from_secs(4)).with_capacity(capacity);
        let engine = RateLimiterEngine::with_clock(config, clock.clone()).unwrap();
        (Arc::new(engine), clock)
    }

    #[test]
    fn test_remote_addr_key() {
        let extractor = RemoteAddrKey;
        let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(extractor.extract_key(&ip), "10.1.2.3");

        let anonymous = FakeRequest {
            peer: None,
            api_key: "",
        };
        assert_eq!(extractor.extract_key(&anonymous), DEFAULT_KEY);

        let none: Option<SocketAddr> = None;
        assert_eq!(extractor.extract_key(&none), DEFAULT_KEY);
    }

    #[test]
    fn test_check_rejects_with_wait_time() {
        let (engine, clock) = engine(2);
        let gate: Gate<IpAddr> = Gate::new(engine, RemoteAddrKey);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert!(gate.check(&ip).is_ok());
        assert!(gate.check(&ip).is_ok());
        let rejection = gate.check(&ip).unwrap_err();
        assert_eq!(rejection.status(), TOO_MANY_REQUESTS);
        assert_eq!(rejection.wait_time, Duration::from_secs(4));
        assert_eq!(
            rejection.to_string(),
            "Rate limit exceeded. Try again in 4.00 seconds."
        );

        clock.advance(Duration::from_secs(4));
        assert!(gate.check(&ip).is_ok());
    }

    #[test]
    fn test_custom_extractor_replaces_default() {
        let (engine, _) = engine(1);
        let gate: Gate<FakeRequest> = Gate::new(engine, RemoteAddrKey)
            .with_extractor(|req: &FakeRequest| req.api_key.to_owned());

        let shared_peer: SocketAddr = "192.0.2.1:80".parse().unwrap();
        let a = FakeRequest {
            peer: Some(shared_peer),
            api_key: "key-a",
        };
        let b = FakeRequest {
            peer: Some(shared_peer),
            api_key: "key-b",
        };

        assert!(gate.check(&a).is_ok());
        assert!(gate.check(&b).is_ok(), "same peer, different key");
        assert!(gate.check(&a).is_err());

        let blank = FakeRequest {
            peer: None,
            api_key: "",
        };
        assert_eq!(gate.key_for(&blank), DEFAULT_KEY);
    }

    #[test]
    fn test_wrap_skips_handler_when_rejected() {
        let (engine, _) = engine(1);
        let gate: Gate<IpAddr> = Gate::new(engine, RemoteAddrKey);
        let calls = std::sync::atomic::AtomicUsize::new(0);

        let handler = gate.wrap(|_ip: &IpAddr| {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            "ok"
        });

        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));
        assert_eq!(handler(&ip), Ok("ok"));
        assert!(handler(&ip).is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
