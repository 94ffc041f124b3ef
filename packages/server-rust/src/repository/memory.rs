//! In-memory repositories backed by [`DashMap`].
//!
//! Writers take a per-key shard lock only, so concurrent writes to different
//! records never contend.

use async_trait::async_trait;
use cinemesh_core::{Metadata, Rating, RecordId, RecordType};
use dashmap::DashMap;

use super::{MetadataRepository, RatingRepository, RepositoryError};

type RatingKey = (RecordType, RecordId);

/// Ratings kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRatingRepository {
    ratings: DashMap<RatingKey, Vec<Rating>>,
}

impl InMemoryRatingRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ratings stored for a record.
    #[must_use]
    pub fn count(&self, record_id: &RecordId, record_type: &RecordType) -> usize {
        self.ratings
            .get(&(record_type.clone(), record_id.clone()))
            .map_or(0, |entry| entry.len())
    }
}

#[async_trait]
impl RatingRepository for InMemoryRatingRepository {
    async fn get(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
    ) -> Result<Vec<Rating>, RepositoryError> {
        match self.ratings.get(&(record_type.clone(), record_id.clone())) {
            Some(entry) if !entry.is_empty() => Ok(entry.clone()),
            _ => Err(RepositoryError::NotFound),
        }
    }

    async fn put(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        rating: Rating,
    ) -> Result<(), RepositoryError> {
        self.ratings
            .entry((record_type.clone(), record_id.clone()))
            .or_default()
            .push(rating);
        Ok(())
    }
}

/// Movie metadata kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryMetadataRepository {
    entries: DashMap<String, Metadata>,
}

impl InMemoryMetadataRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a repository pre-populated with `entries`.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = Metadata>) -> Self {
        let repo = Self::new();
        for metadata in entries {
            repo.entries.insert(metadata.id.clone(), metadata);
        }
        repo
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn get(&self, id: &str) -> Result<Metadata, RepositoryError> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn put(&self, metadata: Metadata) -> Result<(), RepositoryError> {
        self.entries.insert(metadata.id.clone(), metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn movie(id: &str) -> (RecordId, RecordType) {
        (RecordId::from(id), RecordType::movie())
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let repo = InMemoryRatingRepository::new();
        let (id, kind) = movie("m1");
        assert!(repo.get(&id, &kind).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn identical_puts_accumulate() {
        let repo = InMemoryRatingRepository::new();
        let (id, kind) = movie("m1");
        let rating = Rating::new("u1", 5).unwrap();

        repo.put(&id, &kind, rating.clone()).await.unwrap();
        repo.put(&id, &kind, rating.clone()).await.unwrap();

        assert_eq!(repo.get(&id, &kind).await.unwrap(), vec![rating.clone(), rating]);
        assert_eq!(repo.count(&id, &kind), 2);
    }

    #[tokio::test]
    async fn record_types_are_separate_keys() {
        let repo = InMemoryRatingRepository::new();
        let id = RecordId::from("m1");
        repo.put(&id, &RecordType::movie(), Rating::new("u1", 3).unwrap())
            .await
            .unwrap();
        let err = repo.get(&id, &RecordType::from("series")).await.unwrap_err();
        assert_eq!(err, RepositoryError::NotFound);
    }

    #[tokio::test]
    async fn concurrent_writers_lose_nothing() {
        let repo = Arc::new(InMemoryRatingRepository::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    let (id, kind) = movie("m1");
                    for _ in 0..50 {
                        repo.put(&id, &kind, Rating::new(format!("u{i}"), 4).unwrap())
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let (id, kind) = movie("m1");
        assert_eq!(repo.count(&id, &kind), 800);
    }

    #[tokio::test]
    async fn metadata_put_replaces_by_id() {
        let repo = InMemoryMetadataRepository::new();
        assert!(repo.get("m1").await.unwrap_err().is_not_found());

        let mut metadata = Metadata {
            id: "m1".to_string(),
            title: "Heat".to_string(),
            description: String::new(),
            director: "Michael Mann".to_string(),
        };
        repo.put(metadata.clone()).await.unwrap();
        metadata.description = "Crime drama".to_string();
        repo.put(metadata.clone()).await.unwrap();

        assert_eq!(repo.get("m1").await.unwrap(), metadata);
    }
}
