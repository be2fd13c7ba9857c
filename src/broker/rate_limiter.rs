// =============================================================================
// Self-enforced token-bucket rate limiter
// =============================================================================
//
// The teacher's `binance::rate_limit::RateLimitTracker` is reactive: it reads
// the venue's own rate-limit headers and blocks once a threshold is crossed.
// The signed crypto venue here does not return such headers, so the adapter
// itself must serialise bursts to stay under the caps (§4.1, §5) — this is a
// proactive limiter: every caller awaits `acquire()` before sending, and it
// sleeps exactly as long as needed to stay under both the per-second and
// per-hour ceilings.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct RateLimiter {
    per_second_cap: usize,
    per_hour_cap: usize,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(per_second_cap: usize, per_hour_cap: usize) -> Self {
        Self {
            per_second_cap,
            per_hour_cap,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Block until a slot under both caps is available, then record the
    /// request. Safe to call concurrently from multiple tasks.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut recent = self.recent.lock();
                let now = Instant::now();
                while recent
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(3600))
                {
                    recent.pop_front();
                }

                let in_last_second = recent
                    .iter()
                    .filter(|t| now.duration_since(**t) <= Duration::from_secs(1))
                    .count();
                let in_last_hour = recent.len();

                if in_last_second >= self.per_second_cap {
                    let oldest_in_window = recent
                        .iter()
                        .rev()
                        .find(|t| now.duration_since(**t) <= Duration::from_secs(1))
                        .copied();
                    oldest_in_window
                        .map(|t| Duration::from_secs(1).saturating_sub(now.duration_since(t)))
                } else if in_last_hour >= self.per_hour_cap {
                    recent
                        .front()
                        .map(|t| Duration::from_secs(3600).saturating_sub(now.duration_since(*t)))
                } else {
                    recent.push_back(now);
                    None
                }
            };

            match wait {
                Some(d) if !d.is_zero() => {
                    debug!(wait_ms = d.as_millis(), "rate limiter backing off");
                    tokio::time::sleep(d).await;
                }
                Some(_) => continue,
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_bursts_under_cap() {
        let limiter = RateLimiter::new(10, 1000);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn serialises_past_per_second_cap() {
        let limiter = RateLimiter::new(2, 1000);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // The third request must wait roughly a second.
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
