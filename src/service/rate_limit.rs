use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Bounded-rate admission control keyed by caller identity. The trait is
/// the seam: a multi-instance deployment can swap the in-memory window
/// for a shared-store implementation without touching call sites.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(&self, key: &str) -> bool;
}

/// In-process sliding window: at most `max_hits` admissions per key per
/// `window`.
pub struct SlidingWindowLimiter {
    max_hits: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits: max_hits as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;

        // Opportunistic cleanup keeps the map from growing with dead keys.
        hits.retain(|_, window| {
            while let Some(front) = window.front() {
                if now.duration_since(*front) > self.window {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });

        let window = hits.entry(key.to_string()).or_default();
        if window.len() >= self.max_hits {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_limit_then_rejects() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.allow("1.2.3.4").await);
        assert!(limiter.allow("1.2.3.4").await);
        assert!(limiter.allow("1.2.3.4").await);
        assert!(!limiter.allow("1.2.3.4").await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.allow("a").await);
        assert!(!limiter.allow("a").await);
        assert!(limiter.allow("b").await);
    }

    #[tokio::test]
    async fn window_expiry_readmits() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.allow("a").await);
        assert!(!limiter.allow("a").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.allow("a").await);
    }
}
