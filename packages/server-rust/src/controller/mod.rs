//! Service controllers: the business operations behind each RPC handler.
//!
//! - [`rating`]: aggregated ratings, rating writes and event ingestion
//! - [`metadata`]: movie metadata lookups
//! - [`movie`]: composite movie details built from the other two services

pub mod metadata;
pub mod movie;
pub mod rating;

use cinemesh_core::InvalidRating;

use crate::ingest::IngestError;
use crate::repository::RepositoryError;

pub use metadata::MetadataController;
pub use movie::{MetadataLookup, MovieController, MovieError, RatingLookup};
pub use rating::{
    IngestionError, IngestionSummary, IngestionTask, RatingController, RatingControllerConfig,
};

/// Errors returned by the local controllers.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The requested record has no data.
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    InvalidRating(#[from] InvalidRating),
    #[error("repository failure: {0}")]
    Repository(RepositoryError),
    /// `start_ingestion` was called on a controller built without an ingester.
    #[error("no rating ingester configured")]
    NoIngester,
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl ControllerError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<RepositoryError> for ControllerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            other @ RepositoryError::Storage(_) => Self::Repository(other),
        }
    }
}
