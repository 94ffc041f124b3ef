//! RPC message schemas exchanged between cinemesh services.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and are encoded as
//! named `MsgPack` via `rmp_serde::to_vec_named()`, so fields can be added
//! without breaking older peers.

pub mod metadata;
pub mod rating;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use metadata::{GetMetadataRequest, GetMetadataResponse, PutMetadataRequest};
pub use rating::{
    GetAggregatedRatingRequest, GetAggregatedRatingResponse, PutRatingRequest, PutRatingResponse,
};

/// Logical names under which services register in discovery.
pub mod service_names {
    pub const METADATA: &str = "metadata";
    pub const RATING: &str = "rating";
    pub const MOVIE: &str = "movie";
}

/// Names of the remote operations. A transport routes a call by this name.
pub mod operations {
    pub const GET_METADATA: &str = "metadata.get";
    pub const PUT_METADATA: &str = "metadata.put";
    pub const GET_AGGREGATED_RATING: &str = "rating.getAggregated";
    pub const PUT_RATING: &str = "rating.put";
}

/// Errors from encoding or decoding an RPC payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encodes a message as named `MsgPack`.
///
/// # Errors
///
/// Returns `CodecError::Encode` if the value cannot be serialized.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec_named(message)?)
}

/// Decodes a named `MsgPack` message.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes do not form a valid `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
