//! Gateway to the metadata service.

use std::sync::Arc;

use cinemesh_core::messages::{GetMetadataRequest, GetMetadataResponse};
use cinemesh_core::{operations, service_names, Metadata};
use tokio_util::sync::CancellationToken;

use super::{GatewayClient, GatewayError};
use crate::discovery::Registry;
use crate::resilience::RetryPolicy;
use crate::rpc::transport::RemoteTransport;

/// Typed client of the metadata service.
#[derive(Debug, Clone)]
pub struct MetadataGateway {
    client: GatewayClient,
}

impl MetadataGateway {
    #[must_use]
    pub fn new(registry: Registry, transport: Arc<dyn RemoteTransport>, retry: RetryPolicy) -> Self {
        Self {
            client: GatewayClient::new(service_names::METADATA, registry, transport, retry),
        }
    }

    /// Fetches the metadata of a movie.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the movie is unknown; see
    /// [`GatewayError`] for the other categories.
    pub async fn get(
        &self,
        movie_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Metadata, GatewayError> {
        let request = GetMetadataRequest {
            movie_id: movie_id.to_string(),
        };
        let response: GetMetadataResponse = self
            .client
            .invoke(operations::GET_METADATA, &request, cancel)
            .await?;
        Ok(response.metadata)
    }
}
