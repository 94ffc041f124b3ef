//! In-process transport.
//!
//! Routes an address to the inbound stack bound to it, so every node of a
//! single-process deployment (and every integration test) goes through the
//! same admission, drain and codec paths a networked deployment would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tower::ServiceExt;
use tracing::debug;

use super::server::RpcStack;
use super::status::RemoteError;
use super::transport::{RemoteConnection, RemoteTransport, RpcRequest};

/// Routing table from address to inbound stack.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    routes: DashMap<String, RpcStack>,
    open_connections: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `stack` reachable at `address`, replacing any previous binding.
    pub fn bind(&self, address: impl Into<String>, stack: RpcStack) {
        let address = address.into();
        debug!(%address, "bound loopback listener");
        self.routes.insert(address, stack);
    }

    /// Removes the binding at `address`. Returns `false` if nothing was bound.
    pub fn unbind(&self, address: &str) -> bool {
        self.routes.remove(address).is_some()
    }

    /// Number of connections currently open through this transport.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RemoteTransport for LoopbackTransport {
    async fn connect(&self, address: &str) -> Result<Box<dyn RemoteConnection>, RemoteError> {
        let stack = self
            .routes
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RemoteError::unavailable(format!("connection refused: {address}")))?;

        self.open_connections.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(LoopbackConnection {
            address: address.to_string(),
            stack,
            open_connections: Arc::clone(&self.open_connections),
        }))
    }
}

struct LoopbackConnection {
    address: String,
    stack: RpcStack,
    open_connections: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteConnection for LoopbackConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, operation: &str, payload: Bytes) -> Result<Bytes, RemoteError> {
        self.stack
            .clone()
            .oneshot(RpcRequest::new(operation, payload))
            .await
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.open_connections.fetch_sub(1, Ordering::AcqRel);
    }
}
