//! RPC handlers of the rating and metadata services.
//!
//! Each handler decodes the request, calls its controller and maps controller
//! errors to status codes: missing data is `NotFound`, a bad request is
//! `InvalidArgument`, everything else is `Other`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cinemesh_core::messages::{
    GetAggregatedRatingRequest, GetAggregatedRatingResponse, GetMetadataRequest,
    GetMetadataResponse, PutMetadataRequest, PutRatingRequest, PutRatingResponse,
};
use cinemesh_core::{decode, encode, operations};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::server::RpcHandler;
use super::status::{RemoteError, StatusCode};
use crate::controller::{ControllerError, MetadataController, RatingController};

impl From<ControllerError> for RemoteError {
    fn from(err: ControllerError) -> Self {
        let code = match &err {
            ControllerError::NotFound => StatusCode::NotFound,
            ControllerError::InvalidRating(_) => StatusCode::InvalidArgument,
            ControllerError::Repository(_)
            | ControllerError::NoIngester
            | ControllerError::Ingest(_) => StatusCode::Other,
        };
        RemoteError::new(code, err.to_string())
    }
}

fn decode_request<T: DeserializeOwned>(payload: &[u8]) -> Result<T, RemoteError> {
    decode(payload).map_err(|err| RemoteError::invalid_argument(err.to_string()))
}

fn encode_response<T: Serialize>(response: &T) -> Result<Bytes, RemoteError> {
    encode(response)
        .map(Bytes::from)
        .map_err(|err| RemoteError::new(StatusCode::Other, err.to_string()))
}

fn unknown_operation(operation: &str) -> RemoteError {
    warn!(operation, "unknown operation");
    RemoteError::new(StatusCode::Other, format!("unknown operation {operation}"))
}

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

/// Serves `rating.getAggregated` and `rating.put`.
pub struct RatingRpcHandler {
    controller: Arc<RatingController>,
}

impl RatingRpcHandler {
    #[must_use]
    pub fn new(controller: Arc<RatingController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl RpcHandler for RatingRpcHandler {
    async fn handle(&self, operation: &str, payload: Bytes) -> Result<Bytes, RemoteError> {
        match operation {
            operations::GET_AGGREGATED_RATING => {
                let request: GetAggregatedRatingRequest = decode_request(&payload)?;
                let rating_value = self
                    .controller
                    .get_aggregated_rating(&request.record_id, &request.record_type)
                    .await?;
                encode_response(&GetAggregatedRatingResponse { rating_value })
            }
            operations::PUT_RATING => {
                let request: PutRatingRequest = decode_request(&payload)?;
                self.controller
                    .put_rating(&request.record_id, &request.record_type, request.rating)
                    .await?;
                encode_response(&PutRatingResponse::default())
            }
            other => Err(unknown_operation(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Serves `metadata.get` and `metadata.put`.
pub struct MetadataRpcHandler {
    controller: Arc<MetadataController>,
}

impl MetadataRpcHandler {
    #[must_use]
    pub fn new(controller: Arc<MetadataController>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl RpcHandler for MetadataRpcHandler {
    async fn handle(&self, operation: &str, payload: Bytes) -> Result<Bytes, RemoteError> {
        match operation {
            operations::GET_METADATA => {
                let request: GetMetadataRequest = decode_request(&payload)?;
                let metadata = self.controller.get(&request.movie_id).await?;
                encode_response(&GetMetadataResponse { metadata })
            }
            operations::PUT_METADATA => {
                let request: PutMetadataRequest = decode_request(&payload)?;
                self.controller.put(request.metadata).await?;
                Ok(Bytes::new())
            }
            other => Err(unknown_operation(other)),
        }
    }
}
