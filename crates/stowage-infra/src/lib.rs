//! Stowage Infrastructure Library
//!
//! Shared infrastructure used by the API and the CLI:
//! - Per-IP upload rate limiting behind a pluggable `RateLimitStore`
//! - Tracing initialisation

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

// Re-export commonly used types
#[cfg(feature = "rate-limit")]
pub use rate_limit::{
    InMemoryRateLimitStore, IpRateLimiter, RateLimitStore, RateLimitStoreError,
};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};
