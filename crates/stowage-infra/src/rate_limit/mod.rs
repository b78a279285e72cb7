//! Per-IP upload rate limiting.
//!
//! State is held behind [`RateLimitStore`]. The in-memory store is process local:
//! each instance of a horizontally scaled deployment keeps its own view of an
//! address, so limits are per instance unless a shared store is plugged in.

mod ip;
mod store;

pub use ip::IpRateLimiter;
pub use store::{InMemoryRateLimitStore, RateLimitStore, RateLimitStoreError};
