//! Serving side of the remote-call layer.
//!
//! An [`RpcHandler`] implements the operations of one service. [`RpcServer`]
//! adapts it to a Tower service that refuses work unless the node is ready and
//! tracks every admitted call as in-flight. [`build_rpc_stack`] puts the
//! admission layer in front of it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tower::{Service, ServiceBuilder};
use tracing::{debug, debug_span, Instrument};

use super::status::RemoteError;
use super::transport::RpcRequest;
use crate::resilience::{AdmissionLayer, AdmissionService, RateLimiter};
use crate::shutdown::ShutdownController;

/// Implements the remote operations of one service.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handles one call.
    ///
    /// # Errors
    ///
    /// Returns a `RemoteError` whose code tells the caller whether retrying
    /// can help.
    async fn handle(&self, operation: &str, payload: Bytes) -> Result<Bytes, RemoteError>;
}

// ---------------------------------------------------------------------------
// RpcServer
// ---------------------------------------------------------------------------

/// Tower service dispatching requests to an [`RpcHandler`].
///
/// Calls arriving while the node is starting or draining fail with
/// `Unavailable` so callers retry against another instance.
#[derive(Clone)]
pub struct RpcServer {
    handler: Arc<dyn RpcHandler>,
    shutdown: Arc<ShutdownController>,
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("health", &self.shutdown.health_state())
            .finish_non_exhaustive()
    }
}

impl RpcServer {
    #[must_use]
    pub fn new(handler: Arc<dyn RpcHandler>, shutdown: Arc<ShutdownController>) -> Self {
        Self { handler, shutdown }
    }
}

impl Service<RpcRequest> for RpcServer {
    type Response = Bytes;
    type Error = RemoteError;
    type Future = Pin<Box<dyn Future<Output = Result<Bytes, RemoteError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RpcRequest) -> Self::Future {
        if !self.shutdown.is_accepting() {
            debug!(operation = %request.operation, state = ?self.shutdown.health_state(), "refusing call: not accepting");
            return Box::pin(async {
                Err(RemoteError::unavailable("instance is not accepting requests"))
            });
        }

        let guard = self.shutdown.in_flight_guard();
        let handler = Arc::clone(&self.handler);
        let span = debug_span!("rpc", operation = %request.operation);

        Box::pin(
            async move {
                let _guard = guard;
                handler.handle(&request.operation, request.payload).await
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Stack composition
// ---------------------------------------------------------------------------

/// The full inbound stack of one service instance.
pub type RpcStack = AdmissionService<RpcServer>;

/// Wraps `handler` with the inbound middleware.
///
/// Layer order (outermost to innermost):
/// 1. `AdmissionLayer` -- reject with `ResourceExhausted` when the bucket is empty
/// 2. `RpcServer` -- drain gate, in-flight tracking, dispatch
#[must_use]
pub fn build_rpc_stack(
    handler: Arc<dyn RpcHandler>,
    shutdown: Arc<ShutdownController>,
    limiter: Arc<RateLimiter>,
) -> RpcStack {
    ServiceBuilder::new()
        .layer(AdmissionLayer::new(limiter))
        .service(RpcServer::new(handler, shutdown))
}
