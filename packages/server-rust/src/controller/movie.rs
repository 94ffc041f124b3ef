//! Movie controller: composite details built from the metadata and rating
//! services.

use std::sync::Arc;

use async_trait::async_trait;
use cinemesh_core::{Metadata, MovieDetails, RecordId, RecordType};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::gateway::{GatewayError, MetadataGateway, RatingGateway};

/// Source of movie metadata.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// # Errors
    ///
    /// Returns a categorised `GatewayError`.
    async fn get_metadata(
        &self,
        movie_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Metadata, GatewayError>;
}

/// Source of aggregated ratings.
#[async_trait]
pub trait RatingLookup: Send + Sync {
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the record has no ratings.
    async fn get_aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        cancel: &CancellationToken,
    ) -> Result<f64, GatewayError>;
}

#[async_trait]
impl MetadataLookup for MetadataGateway {
    async fn get_metadata(
        &self,
        movie_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Metadata, GatewayError> {
        self.get(movie_id, cancel).await
    }
}

#[async_trait]
impl RatingLookup for RatingGateway {
    async fn get_aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        cancel: &CancellationToken,
    ) -> Result<f64, GatewayError> {
        RatingGateway::get_aggregated_rating(self, record_id, record_type, cancel).await
    }
}

/// Failure of a movie details fetch.
#[derive(Debug, thiserror::Error)]
pub enum MovieError {
    /// The movie has no metadata.
    #[error("movie not found")]
    NotFound,
    #[error("metadata lookup failed: {0}")]
    Metadata(#[source] GatewayError),
    #[error("rating lookup failed: {0}")]
    Rating(#[source] GatewayError),
}

impl MovieError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Answers movie details queries by fanning out to both services.
pub struct MovieController {
    metadata: Arc<dyn MetadataLookup>,
    rating: Arc<dyn RatingLookup>,
}

impl MovieController {
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataLookup>, rating: Arc<dyn RatingLookup>) -> Self {
        Self { metadata, rating }
    }

    /// Fetches metadata and the aggregated rating concurrently.
    ///
    /// A movie without ratings still succeeds, with `rating` absent.
    ///
    /// # Errors
    ///
    /// Returns `MovieError::NotFound` if the metadata service does not know the
    /// movie, or the failing lookup's error for anything else.
    pub async fn get_details(
        &self,
        movie_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MovieDetails, MovieError> {
        let record_id = RecordId::from(movie_id);
        let record_type = RecordType::movie();

        let (metadata, rating) = tokio::join!(
            self.metadata.get_metadata(movie_id, cancel),
            self.rating.get_aggregated_rating(&record_id, &record_type, cancel),
        );

        let metadata = metadata.map_err(|err| {
            if err.is_not_found() {
                MovieError::NotFound
            } else {
                MovieError::Metadata(err)
            }
        })?;

        let rating = match rating {
            Ok(value) => Some(value),
            Err(err) if err.is_not_found() => {
                debug!(movie_id, "movie has no ratings yet");
                None
            }
            Err(err) => return Err(MovieError::Rating(err)),
        };

        Ok(MovieDetails { metadata, rating })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::status::RemoteError;

    struct FixedMetadata(Result<Metadata, fn() -> GatewayError>);

    #[async_trait]
    impl MetadataLookup for FixedMetadata {
        async fn get_metadata(
            &self,
            _movie_id: &str,
            _cancel: &CancellationToken,
        ) -> Result<Metadata, GatewayError> {
            self.0.clone().map_err(|make| make())
        }
    }

    struct FixedRating(Result<f64, fn() -> GatewayError>);

    #[async_trait]
    impl RatingLookup for FixedRating {
        async fn get_aggregated_rating(
            &self,
            _record_id: &RecordId,
            _record_type: &RecordType,
            _cancel: &CancellationToken,
        ) -> Result<f64, GatewayError> {
            self.0.map_err(|make| make())
        }
    }

    fn metadata() -> Metadata {
        Metadata {
            id: "m1".to_string(),
            title: "Arrival".to_string(),
            description: "First contact.".to_string(),
            director: "Denis Villeneuve".to_string(),
        }
    }

    fn not_found() -> GatewayError {
        GatewayError::NotFound {
            service: "rating".to_string(),
        }
    }

    fn unavailable() -> GatewayError {
        GatewayError::Unavailable {
            service: "rating".to_string(),
        }
    }

    fn fatal() -> GatewayError {
        GatewayError::Fatal {
            service: "metadata".to_string(),
            error: RemoteError::invalid_argument("bad id"),
        }
    }

    fn controller(
        metadata: Result<Metadata, fn() -> GatewayError>,
        rating: Result<f64, fn() -> GatewayError>,
    ) -> MovieController {
        MovieController::new(
            Arc::new(FixedMetadata(metadata)),
            Arc::new(FixedRating(rating)),
        )
    }

    #[tokio::test]
    async fn combines_metadata_and_rating() {
        let details = controller(Ok(metadata()), Ok(4.5))
            .get_details("m1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(details.metadata, metadata());
        assert_eq!(details.rating, Some(4.5));
    }

    #[tokio::test]
    async fn missing_rating_is_partial_success() {
        let details = controller(Ok(metadata()), Err(not_found))
            .get_details("m1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(details.metadata, metadata());
        assert_eq!(details.rating, None);
    }

    #[tokio::test]
    async fn other_rating_failure_fails_the_call() {
        let err = controller(Ok(metadata()), Err(unavailable))
            .get_details("m1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MovieError::Rating(GatewayError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn missing_metadata_is_not_found() {
        let err = controller(Err(not_found), Ok(4.0))
            .get_details("m1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn metadata_failure_fails_the_call() {
        let err = controller(Err(fatal), Err(not_found))
            .get_details("m1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MovieError::Metadata(GatewayError::Fatal { .. })));
    }
}
