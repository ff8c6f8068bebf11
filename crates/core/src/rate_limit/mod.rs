//! Process-wide request throttling for the remote catalog.
//!
//! A single [`RateLimiter`] is built at startup and handed to every catalog
//! client, so all concurrent callers draw from one token pool.

mod bucket;
mod limiter;
mod state_store;

pub use bucket::{RateLimitStatus, TokenBucket};
pub use limiter::RateLimiter;
pub use state_store::{BucketState, BucketStateStore, JsonFileStateStore, StateStoreError};
