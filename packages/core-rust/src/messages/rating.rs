//! Rating service messages.

use serde::{Deserialize, Serialize};

use crate::types::{Rating, RecordId, RecordType};

/// Request for the mean rating of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAggregatedRatingRequest {
    pub record_id: RecordId,
    pub record_type: RecordType,
}

/// Mean rating of a record. Only sent when at least one rating exists;
/// otherwise the service answers with a not-found status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAggregatedRatingResponse {
    pub rating_value: f64,
}

/// Request to store one rating of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRatingRequest {
    pub record_id: RecordId,
    pub record_type: RecordType,
    pub rating: Rating,
}

/// Acknowledgement of a stored rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PutRatingResponse {}
