//! Resilience primitives for calls between services.
//!
//! - [`retry`]: bounded exponential backoff with jitter and a status-code classifier
//! - [`rate_limit`]: token-bucket admission decision
//! - [`admission`]: Tower layer rejecting inbound calls when the bucket is empty

pub mod admission;
pub mod rate_limit;
pub mod retry;

pub use admission::{AdmissionLayer, AdmissionService, RateLimited};
pub use rate_limit::{InvalidRateLimit, RateLimiter, TokioClock};
pub use retry::{
    InvalidRetryPolicy, RetryAction, RetryClassifier, RetryError, RetryPolicy, StatusCoded,
};
