//! Client-side request budget
//!
//! Two sliding windows of send timestamps (a short burst window and a long
//! hourly window) plus randomized pacing between requests. Every outgoing
//! request, retries included, passes through [`RateLimiter::acquire`].

use crate::config::RateLimitConfig;
use crate::ingest::{jitter, FetchError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Extra wait after the long window frees a slot
const LONG_WINDOW_MARGIN: Duration = Duration::from_secs(1);

pub struct RateLimiter {
    short_window: Duration,
    short_capacity: usize,
    long_window: Duration,
    long_capacity: usize,
    max_wait: Duration,
    safety_margin: Duration,
    pacing_ms: (u64, u64),
    burst_every: u64,
    burst_pause_ms: (u64, u64),
    short: VecDeque<Instant>,
    long: VecDeque<Instant>,
    acquired: u64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            short_window: config.short_window(),
            short_capacity: config.per_second.max(1),
            long_window: config.long_window(),
            long_capacity: config.per_hour.max(1),
            max_wait: config.max_wait(),
            safety_margin: Duration::from_millis(config.safety_margin_ms),
            pacing_ms: (config.pacing_min_ms, config.pacing_max_ms),
            burst_every: config.burst_every,
            burst_pause_ms: (config.burst_pause_min_ms, config.burst_pause_max_ms),
            short: VecDeque::with_capacity(config.per_second),
            long: VecDeque::with_capacity(config.per_hour),
            acquired: 0,
        }
    }

    /// Waits until one more request fits both windows, then records it
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The caller may send exactly one request now
    /// * `Err(FetchError::HourlyBudgetExhausted)` - The long window would
    ///   need a wait beyond the configured maximum
    pub async fn acquire(&mut self) -> Result<(), FetchError> {
        let now = Instant::now();
        self.evict(now);

        if self.short.len() >= self.short_capacity {
            if let Some(&oldest) = self.short.front() {
                let wait =
                    self.short_window.saturating_sub(now - oldest) + self.safety_margin;
                debug!("Short window full, waiting {:?}", wait);
                sleep(wait).await;
            }
        }

        let now = Instant::now();
        self.evict(now);

        if self.long.len() >= self.long_capacity {
            if let Some(&oldest) = self.long.front() {
                let wait = self.long_window.saturating_sub(now - oldest) + LONG_WINDOW_MARGIN;
                if wait > self.max_wait {
                    return Err(FetchError::HourlyBudgetExhausted {
                        wait,
                        max: self.max_wait,
                    });
                }
                warn!("Hourly request cap reached - sleeping {:?}", wait);
                sleep(wait).await;
            }
        }

        let pause = jitter(self.pacing_ms.0, self.pacing_ms.1);
        if !pause.is_zero() {
            sleep(pause).await;
        }

        self.acquired += 1;
        if self.burst_every > 0 && self.acquired % self.burst_every == 0 {
            let pause = jitter(self.burst_pause_ms.0, self.burst_pause_ms.1);
            debug!("Request #{} - extra pause {:?}", self.acquired, pause);
            sleep(pause).await;
        }

        self.record(Instant::now());
        Ok(())
    }

    /// Drops timestamps that have aged out of their window
    fn evict(&mut self, now: Instant) {
        while let Some(&front) = self.short.front() {
            if now - front >= self.short_window {
                self.short.pop_front();
            } else {
                break;
            }
        }
        while let Some(&front) = self.long.front() {
            if now - front >= self.long_window {
                self.long.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, at: Instant) {
        self.evict(at);
        self.short.push_back(at);
        self.long.push_back(at);
    }

    /// Total permits handed out
    pub fn acquired(&self) -> u64 {
        self.acquired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> RateLimitConfig {
        RateLimitConfig {
            per_second: 5,
            per_hour: 1000,
            short_window_ms: 1000,
            long_window_secs: 3600,
            max_wait_secs: 600,
            safety_margin_ms: 50,
            pacing_min_ms: 0,
            pacing_max_ms: 0,
            burst_every: 0,
            burst_pause_min_ms: 0,
            burst_pause_max_ms: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_window_forces_wait() {
        let mut limiter = RateLimiter::new(&quiet_config());
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(limiter.acquired(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_window_exceeds_budget() {
        let mut limiter = RateLimiter::new(&quiet_config());
        let mut sent = Vec::new();

        for _ in 0..23 {
            limiter.acquire().await.unwrap();
            sent.push(Instant::now());
        }

        for (i, &t) in sent.iter().enumerate() {
            let in_window = sent[i..]
                .iter()
                .filter(|&&s| s - t < Duration::from_secs(1))
                .count();
            assert!(in_window <= 5, "{} requests within 1s of #{}", in_window, i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_window_sleeps_when_within_max_wait() {
        let mut config = quiet_config();
        config.per_hour = 2;
        config.long_window_secs = 10;
        let mut limiter = RateLimiter::new(&config);
        let mut sent = Vec::new();

        for _ in 0..5 {
            limiter.acquire().await.unwrap();
            sent.push(Instant::now());
        }

        // at most two sends inside any 10s span
        for (i, &t) in sent.iter().enumerate() {
            let in_window = sent[i..]
                .iter()
                .filter(|&&s| s - t < Duration::from_secs(10))
                .count();
            assert!(in_window <= 2, "{} requests within 10s of #{}", in_window, i);
        }
        assert!(sent[2] - sent[0] >= Duration::from_secs(10));
        assert_eq!(limiter.acquired(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_window_beyond_max_wait_fails() {
        let mut config = quiet_config();
        config.per_hour = 2;
        let mut limiter = RateLimiter::new(&config);

        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        match limiter.acquire().await {
            Err(FetchError::HourlyBudgetExhausted { wait, max }) => {
                assert!(wait > max);
                assert_eq!(max, Duration::from_secs(600));
            }
            other => panic!("expected HourlyBudgetExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_and_burst_pause() {
        let mut config = quiet_config();
        config.per_second = 100;
        config.pacing_min_ms = 300;
        config.pacing_max_ms = 300;
        config.burst_every = 3;
        config.burst_pause_min_ms = 2000;
        config.burst_pause_max_ms = 2000;
        let mut limiter = RateLimiter::new(&config);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::from_millis(3 * 300 + 2000));
    }
}
