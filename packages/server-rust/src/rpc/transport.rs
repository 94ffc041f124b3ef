//! Client side of the remote-call transport.
//!
//! A transport turns a resolved address into a connection; a connection
//! invokes named operations with encoded payloads. Connections are
//! short-lived and released when dropped.

use async_trait::async_trait;
use bytes::Bytes;

use super::status::RemoteError;

/// One inbound call as seen by the serving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    /// Operation name (see `cinemesh_core::operations`).
    pub operation: String,
    /// Encoded request message.
    pub payload: Bytes,
}

impl RpcRequest {
    #[must_use]
    pub fn new(operation: impl Into<String>, payload: Bytes) -> Self {
        Self {
            operation: operation.into(),
            payload,
        }
    }
}

/// Opens connections to service instances.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Connects to the instance listening at `address`.
    ///
    /// # Errors
    ///
    /// Returns a `RemoteError` (normally `Unavailable`) if the address cannot
    /// be reached.
    async fn connect(&self, address: &str) -> Result<Box<dyn RemoteConnection>, RemoteError>;
}

/// An open connection to one service instance.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Address this connection was opened to.
    fn address(&self) -> &str;

    /// Invokes `operation` with an encoded request and returns the encoded
    /// response.
    ///
    /// # Errors
    ///
    /// Returns the categorised `RemoteError` reported by the peer or the
    /// transport.
    async fn call(&self, operation: &str, payload: Bytes) -> Result<Bytes, RemoteError>;
}
