//! Admission-control middleware for inbound calls.
//!
//! Consults the shared [`RateLimiter`] before every request. When the bucket
//! is empty the request is rejected immediately with [`RateLimited`] and the
//! inner service is never invoked, so a rejection has no side effects.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::debug;

use super::rate_limit::RateLimiter;
use crate::rpc::status::{RemoteError, StatusCode};

/// Rejection produced when the token bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, try again later")]
pub struct RateLimited;

impl From<RateLimited> for RemoteError {
    fn from(err: RateLimited) -> Self {
        RemoteError::new(StatusCode::ResourceExhausted, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// AdmissionLayer
// ---------------------------------------------------------------------------

/// Tower layer that gates requests through a token bucket.
///
/// Rejected requests are not queued; the caller decides the user-visible
/// response from the `RateLimited` conversion of its error type.
#[derive(Debug, Clone)]
pub struct AdmissionLayer {
    limiter: Arc<RateLimiter>,
}

impl AdmissionLayer {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AdmissionService
// ---------------------------------------------------------------------------

/// Service wrapper that rejects requests once the token bucket is empty.
#[derive(Debug, Clone)]
pub struct AdmissionService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S, Req> Service<Req> for AdmissionService<S>
where
    S: Service<Req> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: From<RateLimited> + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        if !self.limiter.admit() {
            debug!("rejecting request: token bucket empty");
            metrics::counter!("cinemesh_admission_rejected_total").increment(1);
            return Box::pin(async { Err(RateLimited.into()) });
        }
        Box::pin(self.inner.call(req))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
