//! Rate Limiter (Token Bucket Algorithm)
//!
//! Bounds the enqueue rate accepted over RPC. Lock-free: tokens and the
//! refill clock live in one packed atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub(crate) struct RateLimiter {
    // Upper 32 bits: tokens
    // Lower 32 bits: refill clock (ms since creation)
    packed: AtomicU64,
    created: Instant,
    max_tokens: u32,
    refill_rate: u32, // tokens per second
}

fn pack(tokens: u32, clock_ms: u32) -> u64 {
    ((tokens as u64) << 32) | clock_ms as u64
}

fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, (packed & 0xFFFF_FFFF) as u32)
}

impl RateLimiter {
    /// `RateLimiter::new(200, 100)` allows 100 requests/sec with bursts of 200
    pub(crate) fn new(max_tokens: u32, refill_rate: u32) -> Self {
        Self {
            packed: AtomicU64::new(pack(max_tokens, 0)),
            created: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Consume one token; false when the bucket is empty
    pub(crate) fn try_acquire(&self) -> bool {
        loop {
            let packed = self.packed.load(Ordering::Acquire);
            let (tokens, clock_ms) = unpack(packed);

            // The 32-bit clock wraps every ~49.7 days; elapsed time is taken modulo 2^32
            let now_ms = self.created.elapsed().as_millis() as u32;
            let delta_ms = now_ms.wrapping_sub(clock_ms) as u64;
            let refill = (delta_ms * self.refill_rate as u64 / 1000).min(self.max_tokens as u64) as u32;

            // Only advance the clock by the time actually converted into tokens
            let (available, clock_ms) = if refill > 0 || tokens >= self.max_tokens {
                ((tokens.saturating_add(refill)).min(self.max_tokens), now_ms)
            } else {
                (tokens, clock_ms)
            };

            if available == 0 {
                return false;
            }

            let next = pack(available - 1, clock_ms);
            if self
                .packed
                .compare_exchange(packed, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[test]
    fn test_rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new(10, 10);

        for _ in 0..10 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_rate_limiter_refills() {
        let limiter = RateLimiter::new(5, 10);

        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());

        sleep(Duration::from_millis(300)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_rate_limiter_refills_across_clock_wrap() {
        let limiter = RateLimiter::new(1000, 1000);
        // Empty bucket, last refill just before the 32-bit clock wraps
        limiter.packed.store(pack(0, u32::MAX - 5), Ordering::Release);

        sleep(Duration::from_millis(500)).await;
        let acquired = (0..1000).filter(|_| limiter.try_acquire()).count();
        assert!(acquired >= 400, "Expected refill after wrap, got {}", acquired);
    }

    #[tokio::test]
    async fn test_rate_limiter_concurrent() {
        let limiter = Arc::new(RateLimiter::new(100, 1));

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.try_acquire()).count()
            }));
        }

        let mut total_allowed = 0;
        for handle in handles {
            total_allowed += handle.await.unwrap();
        }

        assert!(
            (100..=102).contains(&total_allowed),
            "Expected about 100 allowed, got {}",
            total_allowed
        );
    }
}
