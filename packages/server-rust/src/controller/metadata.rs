//! Metadata controller.

use std::sync::Arc;

use cinemesh_core::Metadata;

use super::ControllerError;
use crate::repository::MetadataRepository;

/// Reads and writes movie metadata.
pub struct MetadataController {
    repo: Arc<dyn MetadataRepository>,
}

impl MetadataController {
    #[must_use]
    pub fn new(repo: Arc<dyn MetadataRepository>) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotFound` if the movie is unknown.
    pub async fn get(&self, id: &str) -> Result<Metadata, ControllerError> {
        Ok(self.repo.get(id).await?)
    }

    /// # Errors
    ///
    /// Returns `ControllerError::Repository` if the write fails.
    pub async fn put(&self, metadata: Metadata) -> Result<(), ControllerError> {
        Ok(self.repo.put(metadata).await?)
    }
}
