//! Per-client sliding-window admission.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Keys tracked before stale windows are swept out.
const MAX_TRACKED_KEYS: usize = 10_000;

/// Approximate sliding-window rate limiter.
///
/// Keeps the request timestamps of each client inside the trailing window.
/// Stale timestamps are dropped lazily on every check.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or deny one request from `client_key`. Admission records it.
    pub fn admit(&self, client_key: &str) -> bool {
        self.admit_at(client_key, Instant::now())
    }

    pub(crate) fn admit_at(&self, client_key: &str, now: Instant) -> bool {
        // Check and record under one lock so concurrent requests can't overshoot.
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > MAX_TRACKED_KEYS {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleventh_request_in_window_is_denied() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let now = Instant::now();
        for i in 0..10 {
            assert!(limiter.admit_at("client", now), "request {i} should pass");
        }
        assert!(!limiter.admit_at("client", now));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.admit("a"));
        assert!(!limiter.admit("a"));
        assert!(limiter.admit("b"));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.admit_at("k", start));
        assert!(limiter.admit_at("k", start + Duration::from_secs(30)));
        assert!(!limiter.admit_at("k", start + Duration::from_secs(59)));
        // First stamp has left the window
        assert!(limiter.admit_at("k", start + Duration::from_secs(61)));
        assert!(!limiter.admit_at("k", start + Duration::from_secs(62)));
    }

    #[test]
    fn denied_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.admit_at("k", start));
        for s in 1..10 {
            assert!(!limiter.admit_at("k", start + Duration::from_secs(s)));
        }
        assert!(limiter.admit_at("k", start + Duration::from_secs(10)));
    }
}
