//! Rate Limiter (Token Bucket Algorithm)
//!
//! Bounds request throughput on write methods.

use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by all RPC handlers
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    max_tokens: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    /// # Arguments
    /// * `max_tokens` - Maximum burst size
    /// * `refill_rate` - Tokens added per second
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: max_tokens as f64,
                last_refill: Instant::now(),
            }),
            max_tokens: max_tokens as f64,
            refill_per_sec: refill_rate as f64,
        }
    }

    /// Consume one token; false when the bucket is empty
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap();

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        bucket.last_refill = now.max(bucket.last_refill);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn remaining(&self) -> u32 {
        self.bucket.lock().unwrap().tokens as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_allows_burst_then_denies() {
        let limiter = RateLimiter::new(10, 10);
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.check_at(start));
        }
        assert!(!limiter.check_at(start));
    }

    #[test]
    fn test_refills_over_time() {
        let limiter = RateLimiter::new(5, 10); // 10 tokens/sec
        let start = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at(start));
        }
        assert!(!limiter.check_at(start));

        // 100ms at 10/s = one token
        assert!(limiter.check_at(start + Duration::from_millis(100)));
        assert!(!limiter.check_at(start + Duration::from_millis(100)));

        // Never refills past the burst size
        assert!(limiter.check_at(start + Duration::from_secs(60)));
        assert_eq!(limiter.remaining(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_bucket() {
        let limiter = Arc::new(RateLimiter::new(100, 1));

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.check()).count()
            }));
        }

        let mut total_allowed = 0;
        for handle in handles {
            total_allowed += handle.await.unwrap();
        }

        // 200 attempts against a burst of 100 (refill is negligible here)
        assert!(
            (100..=102).contains(&total_allowed),
            "expected about 100 allowed, got {}",
            total_allowed
        );
    }
}
