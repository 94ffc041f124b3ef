//! Client-side gateways to remote services.
//!
//! Every gateway call follows the same path: resolve a live address through
//! the registry (never cached, never retried), open a short-lived connection,
//! run the remote operation under the retry policy, then decode the response.
//! The connection is dropped on every exit path.

pub mod metadata;
pub mod rating;

use std::sync::Arc;

use bytes::Bytes;
use cinemesh_core::{decode, encode, CodecError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::discovery::{Registry, RegistryError};
use crate::resilience::{RetryError, RetryPolicy};
use crate::rpc::status::{RemoteError, StatusCode};
use crate::rpc::transport::RemoteTransport;

pub use metadata::MetadataGateway;
pub use rating::RatingGateway;

/// Failure of a gateway call, categorised for the caller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Discovery returned no live instance. Not retried.
    #[error("{service}: no live instances available")]
    Unavailable { service: String },
    /// The remote service reported that the entity does not exist.
    #[error("{service}: not found")]
    NotFound { service: String },
    /// Every attempt failed with a transient error.
    #[error("{service}: gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        service: String,
        attempts: u32,
        last: RemoteError,
    },
    /// The remote call failed with a non-retryable error.
    #[error("{service}: {error}")]
    Fatal { service: String, error: RemoteError },
    /// The caller's cancellation token fired.
    #[error("{service}: call cancelled")]
    Cancelled { service: String },
    /// The resolved address could not be connected to.
    #[error("{service}: failed to connect to {address}: {error}")]
    Connect {
        service: String,
        address: String,
        error: RemoteError,
    },
    #[error("{service}: {source}")]
    Codec {
        service: String,
        #[source]
        source: CodecError,
    },
    /// The discovery store itself failed.
    #[error("{service}: discovery failed: {source}")]
    Registry {
        service: String,
        #[source]
        source: RegistryError,
    },
}

impl GatewayError {
    /// `true` for failures expected to clear without caller intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Registry { .. } => true,
            Self::ExhaustedRetries { last, .. } => last.is_transient(),
            Self::Connect { error, .. } => error.is_transient(),
            Self::NotFound { .. } | Self::Fatal { .. } | Self::Cancelled { .. } | Self::Codec { .. } => {
                false
            }
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

// ---------------------------------------------------------------------------
// GatewayClient
// ---------------------------------------------------------------------------

/// Discovery, transport and retry wiring shared by the typed gateways.
#[derive(Clone)]
pub struct GatewayClient {
    service: &'static str,
    registry: Registry,
    transport: Arc<dyn RemoteTransport>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("service", &self.service)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    #[must_use]
    pub fn new(
        service: &'static str,
        registry: Registry,
        transport: Arc<dyn RemoteTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            registry,
            transport,
            retry,
        }
    }

    #[must_use]
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Invokes `operation` on one live instance of the service.
    ///
    /// # Errors
    ///
    /// See [`GatewayError`] for the categories.
    pub async fn invoke<Req, Resp>(
        &self,
        operation: &'static str,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Resp, GatewayError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = Bytes::from(encode(request).map_err(|source| self.codec_error(source))?);

        let resolved = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.cancelled()),
            resolved = self.registry.resolve(self.service) => resolved,
        };
        let address = resolved.map_err(|source| self.registry_error(source))?;

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(self.cancelled()),
            connected = self.transport.connect(&address) => connected,
        };
        let connection = connected.map_err(|error| GatewayError::Connect {
            service: self.service.to_string(),
            address: address.clone(),
            error,
        })?;
        let connection = connection.as_ref();
        let address = address.as_str();

        let response = self
            .retry
            .run(cancel, |attempt| {
                let payload = payload.clone();
                async move {
                    debug!(service = self.service, operation, %address, attempt, "calling remote operation");
                    connection.call(operation, payload).await
                }
            })
            .await
            .map_err(|err| self.retry_error(operation, err))?;

        decode(&response).map_err(|source| self.codec_error(source))
    }

    fn cancelled(&self) -> GatewayError {
        GatewayError::Cancelled {
            service: self.service.to_string(),
        }
    }

    fn codec_error(&self, source: CodecError) -> GatewayError {
        GatewayError::Codec {
            service: self.service.to_string(),
            source,
        }
    }

    fn registry_error(&self, source: RegistryError) -> GatewayError {
        let service = self.service.to_string();
        if source.is_not_found() {
            GatewayError::Unavailable { service }
        } else {
            GatewayError::Registry { service, source }
        }
    }

    fn retry_error(&self, operation: &str, err: RetryError<RemoteError>) -> GatewayError {
        let service = self.service.to_string();
        match err {
            RetryError::Exhausted { attempts, last } => {
                warn!(%service, operation, attempts, error = %last, "remote call exhausted retries");
                GatewayError::ExhaustedRetries {
                    service,
                    attempts,
                    last,
                }
            }
            RetryError::Fatal { error, .. } if error.code == StatusCode::NotFound => {
                GatewayError::NotFound { service }
            }
            RetryError::Fatal { error, .. } => GatewayError::Fatal { service, error },
            RetryError::Cancelled { .. } => GatewayError::Cancelled { service },
        }
    }
}
