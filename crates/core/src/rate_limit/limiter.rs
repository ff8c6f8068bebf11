//! Shared, awaitable rate limiter.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use super::bucket::{RateLimitStatus, TokenBucket};
use super::state_store::{BucketState, BucketStateStore};
use crate::metrics::RATE_LIMIT_WAITS;

/// Token bucket shared by every catalog call in the process.
///
/// The bucket lock is only held to refill and take a token. Waiting callers
/// release it before sleeping and race for the next token when they wake.
///
/// With a state store, every take first merges the stored state, keeping
/// whichever pool is emptier, so processes sharing one store share a pool.
/// Store I/O runs on the blocking pool and never under the bucket lock.
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    store: Option<Arc<dyn BucketStateStore>>,
    /// Serializes saves so the latest snapshot is the one left on disk.
    save_lock: Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(interval: Duration, burst_size: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(interval, burst_size)),
            store: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Create a limiter backed by durable state.
    ///
    /// Saved tokens are aged by the wall-clock time since they were written.
    /// Missing or unreadable state falls back to a full bucket.
    pub fn with_store(
        interval: Duration,
        burst_size: u32,
        store: Arc<dyn BucketStateStore>,
    ) -> Self {
        let bucket = match store.load() {
            Ok(Some(state)) => {
                debug!(tokens = state.tokens, "Restored rate limiter state");
                restore(interval, burst_size, &state, Instant::now())
            }
            Ok(None) => TokenBucket::new(interval, burst_size),
            Err(e) => {
                warn!(error = %e, "Failed to load rate limiter state, starting full");
                TokenBucket::new(interval, burst_size)
            }
        };

        Self {
            bucket: Mutex::new(bucket),
            store: Some(store),
            save_lock: Mutex::new(()),
        }
    }

    /// Wait until a token is available and take it.
    pub async fn consume(&self) {
        loop {
            let stored = self.load_shared().await;

            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                if let Some(state) = &stored {
                    merge_stored(&mut bucket, state, now);
                }
                match bucket.try_acquire(now) {
                    Ok(()) => None,
                    Err(wait) => Some(wait),
                }
            };

            let Some(wait) = wait else {
                self.persist().await;
                return;
            };

            RATE_LIMIT_WAITS.inc();
            warn!(
                wait_secs = format!("{:.2}", wait.as_secs_f64()),
                "Waiting for next request token"
            );
            sleep(wait).await;
        }
    }

    /// Apply a configuration change without resetting the pool.
    pub async fn reconfigure(&self, interval: Duration, burst_size: u32) {
        self.bucket.lock().await.reconfigure(interval, burst_size);
    }

    pub async fn status(&self) -> RateLimitStatus {
        self.bucket.lock().await.status(Instant::now())
    }

    async fn load_shared(&self) -> Option<BucketState> {
        let store = Arc::clone(self.store.as_ref()?);
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to reload rate limiter state");
                None
            }
            Err(e) => {
                warn!(error = %e, "Rate limiter state load task failed");
                None
            }
        }
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let _saving = self.save_lock.lock().await;
        let state = {
            let mut bucket = self.bucket.lock().await;
            snapshot(&mut bucket, Instant::now())
        };

        let store = Arc::clone(store);
        match tokio::task::spawn_blocking(move || store.save(&state)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist rate limiter state"),
            Err(e) => warn!(error = %e, "Rate limiter state save task failed"),
        }
    }
}

/// Rebuild a bucket from stored state, aged to `now`.
fn restore(interval: Duration, burst_size: u32, state: &BucketState, now: Instant) -> TokenBucket {
    let age = (Utc::now() - state.updated_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    let last_update = now.checked_sub(age).unwrap_or(now);
    TokenBucket::restored(interval, burst_size, state.tokens, last_update)
}

/// Replace `bucket` with the stored state when the stored pool is emptier.
fn merge_stored(bucket: &mut TokenBucket, state: &BucketState, now: Instant) {
    let mut stored = restore(bucket.interval(), bucket.burst_size(), state, now);
    let stored_tokens = stored.tokens(now);
    let own_tokens = bucket.tokens(now);
    if stored_tokens < own_tokens {
        debug!(
            stored = stored_tokens,
            own = own_tokens,
            "Rate limiter pool drained elsewhere"
        );
        *bucket = stored;
    }
}

fn snapshot(bucket: &mut TokenBucket, now: Instant) -> BucketState {
    let tokens = bucket.tokens(now);
    let since_update = now.saturating_duration_since(bucket.last_update());
    let updated_at = Utc::now()
        - chrono::Duration::from_std(since_update).unwrap_or_else(|_| chrono::Duration::zero());
    BucketState { tokens, updated_at }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::JsonFileStateStore;
    use tempfile::TempDir;

    #[tokio::test(start_paused = true)]
    async fn test_burst_passes_without_waiting() {
        let limiter = RateLimiter::new(Duration::from_secs(2), 4);
        let start = Instant::now();

        for _ in 0..4 {
            limiter.consume().await;
        }

        assert_eq!(Instant::now(), start);
        assert_eq!(limiter.status().await.tokens_available, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_past_burst_waits_one_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(2), 4);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.consume().await;
        }

        assert!(Instant::now() - start >= Duration::from_secs(2));
        assert!(Instant::now() - start < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_never_share_a_token() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(1), 3));
        let start = Instant::now();

        let handles: Vec<_> = (0..9)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.consume().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap() - start);
        }
        finished.sort();

        // Three from the initial burst, then one per second.
        assert!(finished[2] < Duration::from_secs(1));
        for (i, elapsed) in finished.iter().enumerate().skip(3) {
            assert!(*elapsed >= Duration::from_secs((i - 2) as u64));
        }

        let status = limiter.status().await;
        assert!(status.tokens_available <= status.burst_size);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_keeps_pool() {
        let limiter = RateLimiter::new(Duration::from_secs(2), 10);
        limiter.consume().await;

        limiter.reconfigure(Duration::from_secs(1), 4).await;
        let status = limiter.status().await;
        assert_eq!(status.tokens_available, 4);
        assert_eq!(status.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn BucketStateStore> =
            Arc::new(JsonFileStateStore::new(dir.path().join("bucket.json")));

        let limiter = RateLimiter::with_store(Duration::from_secs(3600), 3, Arc::clone(&store));
        limiter.consume().await;
        limiter.consume().await;
        drop(limiter);

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.tokens, 1);

        let restarted = RateLimiter::with_store(Duration::from_secs(3600), 3, store);
        assert_eq!(restarted.status().await.tokens_available, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiters_sharing_a_store_share_the_pool() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn BucketStateStore> =
            Arc::new(JsonFileStateStore::new(dir.path().join("bucket.json")));
        let interval = Duration::from_secs(3600);

        let first = RateLimiter::with_store(interval, 2, Arc::clone(&store));
        let second = RateLimiter::with_store(interval, 2, Arc::clone(&store));

        first.consume().await;
        first.consume().await;
        assert_eq!(store.load().unwrap().unwrap().tokens, 0);

        let blocked = tokio::time::timeout(Duration::from_secs(60), second.consume()).await;
        assert!(blocked.is_err(), "second limiter must see the drained pool");
        assert_eq!(second.status().await.tokens_available, 0);
    }

    #[test]
    fn test_merge_keeps_emptier_pool() {
        let interval = Duration::from_secs(3600);
        let now = Instant::now();
        let mut bucket = TokenBucket::new(interval, 3);

        let drained = BucketState {
            tokens: 1,
            updated_at: Utc::now(),
        };
        merge_stored(&mut bucket, &drained, now);
        assert_eq!(bucket.tokens(now), 1);

        let fuller = BucketState {
            tokens: 3,
            updated_at: Utc::now(),
        };
        merge_stored(&mut bucket, &fuller, now);
        assert_eq!(bucket.tokens(now), 1);
    }
}
