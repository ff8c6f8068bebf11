//! Token bucket with lazy, whole-token refill.

use tokio::time::{Duration, Instant};

/// Rate limit status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub tokens_available: u32,
    pub burst_size: u32,
    pub interval: Duration,
    /// Time until the next token is minted, `None` when a token is available.
    pub next_token_in: Option<Duration>,
}

/// Token bucket holding at most `burst_size` whole tokens.
///
/// One token is minted per `interval`. Tokens are only added when observed,
/// there is no background timer.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    burst_size: u32,
    interval: Duration,
    tokens: u32,
    last_update: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(interval: Duration, burst_size: u32) -> Self {
        Self::restored(interval, burst_size, burst_size, Instant::now())
    }

    /// Create a bucket from previously recorded state.
    ///
    /// The token count is clamped to `[0, burst_size]`.
    pub fn restored(interval: Duration, burst_size: u32, tokens: u32, last_update: Instant) -> Self {
        let burst_size = burst_size.max(1);
        Self {
            burst_size,
            interval,
            tokens: tokens.min(burst_size),
            last_update,
        }
    }

    pub fn burst_size(&self) -> u32 {
        self.burst_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Current token count after refilling up to `now`.
    pub fn tokens(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens
    }

    /// Try to take one token.
    ///
    /// Returns `Err(wait)` with the delay before the next attempt is worth making.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1 {
            self.tokens -= 1;
            Ok(())
        } else {
            Err(self.wait_time(now))
        }
    }

    /// Apply a new interval and burst size, keeping the current tokens
    /// (clamped to the new burst size).
    pub fn reconfigure(&mut self, interval: Duration, burst_size: u32) {
        self.interval = interval;
        self.burst_size = burst_size.max(1);
        self.tokens = self.tokens.min(self.burst_size);
    }

    pub fn status(&mut self, now: Instant) -> RateLimitStatus {
        self.refill(now);
        RateLimitStatus {
            tokens_available: self.tokens,
            burst_size: self.burst_size,
            interval: self.interval,
            next_token_in: if self.tokens >= 1 {
                None
            } else {
                Some(self.wait_time(now))
            },
        }
    }

    fn wait_time(&self, now: Instant) -> Duration {
        let since = now.saturating_duration_since(self.last_update);
        if since < self.interval {
            self.interval - since
        } else {
            self.interval
        }
    }

    /// Mint whole tokens for the time elapsed since the last mint.
    ///
    /// `last_update` only moves when a token was actually added, otherwise
    /// frequent polling would keep resetting the clock and starve the bucket.
    /// A full bucket earns nothing, so its clock simply follows `now`.
    fn refill(&mut self, now: Instant) {
        if self.tokens >= self.burst_size {
            self.last_update = self.last_update.max(now);
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_update);
        let new_tokens = if self.interval.is_zero() {
            u128::from(self.burst_size)
        } else {
            elapsed.as_nanos() / self.interval.as_nanos()
        };

        if new_tokens > 0 {
            let room = u128::from(self.burst_size - self.tokens);
            // Bounded by `room`, which fits in a u32.
            self.tokens += new_tokens.min(room) as u32;
            self.last_update = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bucket_is_full() {
        let now = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 4, 4, now);
        assert_eq!(bucket.tokens(now), 4);
        assert_eq!(bucket.burst_size(), 4);
    }

    #[test]
    fn test_acquire_until_empty() {
        let now = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 3, 3, now);

        for _ in 0..3 {
            assert!(bucket.try_acquire(now).is_ok());
        }

        let wait = bucket.try_acquire(now).unwrap_err();
        assert_eq!(wait, Duration::from_secs(2));
        assert_eq!(bucket.tokens(now), 0);
    }

    #[test]
    fn test_wait_accounts_for_time_since_last_mint() {
        let start = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 1, 0, start);

        let wait = bucket
            .try_acquire(start + Duration::from_millis(500))
            .unwrap_err();
        assert_eq!(wait, Duration::from_millis(1500));
    }

    #[test]
    fn test_refill_mints_whole_tokens_only() {
        let start = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 10, 0, start);

        assert_eq!(bucket.tokens(start + Duration::from_millis(1999)), 0);
        assert_eq!(bucket.last_update(), start);

        let later = start + Duration::from_millis(5000);
        assert_eq!(bucket.tokens(later), 2);
        assert_eq!(bucket.last_update(), later);
    }

    #[test]
    fn test_zero_gain_checks_do_not_drift() {
        let start = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 10, 0, start);

        // Poll repeatedly without ever crossing a full interval in between.
        for ms in [500, 1000, 1500, 1900] {
            assert_eq!(bucket.tokens(start + Duration::from_millis(ms)), 0);
        }
        assert_eq!(bucket.tokens(start + Duration::from_millis(2000)), 1);
    }

    #[test]
    fn test_idle_full_bucket_does_not_bank_extra_tokens() {
        let start = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(1), 2, 2, start);

        let later = start + Duration::from_secs(100);
        assert!(bucket.try_acquire(later).is_ok());
        assert!(bucket.try_acquire(later).is_ok());
        assert!(bucket.try_acquire(later).is_err());
    }

    #[test]
    fn test_refill_is_clamped_to_burst_size() {
        let start = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(1), 5, 1, start);
        assert_eq!(bucket.tokens(start + Duration::from_secs(3600)), 5);
    }

    #[test]
    fn test_restored_tokens_are_clamped() {
        let now = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(1), 5, 50, now);
        assert_eq!(bucket.tokens(now), 5);
    }

    #[test]
    fn test_reconfigure_clamps_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 10, 8, now);

        bucket.reconfigure(Duration::from_secs(1), 20);
        assert_eq!(bucket.tokens(now), 8);

        bucket.reconfigure(Duration::from_secs(1), 3);
        assert_eq!(bucket.tokens(now), 3);
        assert_eq!(bucket.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_status() {
        let now = Instant::now();
        let mut bucket = TokenBucket::restored(Duration::from_secs(2), 1, 1, now);

        let status = bucket.status(now);
        assert_eq!(status.tokens_available, 1);
        assert!(status.next_token_in.is_none());

        bucket.try_acquire(now).unwrap();
        let status = bucket.status(now);
        assert_eq!(status.tokens_available, 0);
        assert_eq!(status.next_token_in, Some(Duration::from_secs(2)));
    }
}
