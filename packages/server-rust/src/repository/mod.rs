//! Storage contracts for ratings and movie metadata.
//!
//! Implementations must be safe for concurrent access: request handlers and
//! the ingestion loop write through the same repository at the same time.

pub mod memory;

use async_trait::async_trait;
use cinemesh_core::{Metadata, Rating, RecordId, RecordType};

pub use memory::{InMemoryMetadataRepository, InMemoryRatingRepository};

/// Errors surfaced by a repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Nothing is stored under the requested key.
    #[error("not found")]
    NotFound,
    /// The backing storage could not complete the operation.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl RepositoryError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Append-only store of ratings keyed by `(record_id, record_type)`.
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Returns every rating stored for the record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the record has no ratings.
    async fn get(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
    ) -> Result<Vec<Rating>, RepositoryError>;

    /// Appends one rating. Identical ratings are stored again, never merged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Storage` if the write fails.
    async fn put(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        rating: Rating,
    ) -> Result<(), RepositoryError>;
}

/// Store of movie metadata keyed by movie ID.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no metadata exists for `id`.
    async fn get(&self, id: &str) -> Result<Metadata, RepositoryError>;

    /// Inserts or replaces the metadata stored under `metadata.id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Storage` if the write fails.
    async fn put(&self, metadata: Metadata) -> Result<(), RepositoryError>;
}
