//! Rating controller: aggregate reads, write-through puts and the ingestion
//! loop that turns rating events into repository writes.

use std::sync::Arc;

use cinemesh_core::{mean_rating, Rating, RecordId, RecordType};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::ControllerError;
use crate::ingest::RatingIngester;
use crate::repository::RatingRepository;

/// Construction-time settings of a [`RatingController`].
#[derive(Clone, Default)]
pub struct RatingControllerConfig {
    /// Event source consumed by [`RatingController::start_ingestion`].
    /// Without one, the controller only serves reads and direct writes.
    pub ingester: Option<Arc<dyn RatingIngester>>,
}

impl std::fmt::Debug for RatingControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingControllerConfig")
            .field("ingester", &self.ingester.is_some())
            .finish()
    }
}

/// Business operations of the rating service.
pub struct RatingController {
    repo: Arc<dyn RatingRepository>,
    config: RatingControllerConfig,
}

impl RatingController {
    #[must_use]
    pub fn new(repo: Arc<dyn RatingRepository>, config: RatingControllerConfig) -> Self {
        Self { repo, config }
    }

    /// Returns the arithmetic mean of every rating stored for the record.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::NotFound` if the record has no ratings.
    pub async fn get_aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
    ) -> Result<f64, ControllerError> {
        let ratings = self.repo.get(record_id, record_type).await?;
        mean_rating(&ratings).ok_or(ControllerError::NotFound)
    }

    /// Stores one rating. Repeated identical calls store repeated ratings.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::InvalidRating` for an out-of-range value, or
    /// `ControllerError::Repository` if the write fails.
    pub async fn put_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        rating: Rating,
    ) -> Result<(), ControllerError> {
        rating.validate()?;
        self.repo.put(record_id, record_type, rating).await?;
        Ok(())
    }

    /// Starts consuming the configured event source on a dedicated task.
    ///
    /// The loop applies events in channel order until the source closes the
    /// channel, `parent` is cancelled, or a write fails. A failed write ends
    /// the loop and is reported through [`IngestionTask::join`].
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::NoIngester` if no source is configured, or
    /// `ControllerError::Ingest` if the source cannot be started.
    pub async fn start_ingestion(
        self: &Arc<Self>,
        parent: &CancellationToken,
    ) -> Result<IngestionTask, ControllerError> {
        let ingester = self
            .config
            .ingester
            .as_ref()
            .ok_or(ControllerError::NoIngester)?;

        let cancel = parent.child_token();
        let mut events = ingester.ingest(cancel.clone()).await?;
        info!("started ingestion");

        let controller = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            // Stops the source on every exit path, including a fatal write.
            let _source_guard = token.clone().drop_guard();
            let mut summary = IngestionSummary::default();

            loop {
                let event = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };

                let applied = match event.to_rating() {
                    Ok(rating) => {
                        controller
                            .put_rating(&event.record_id, &event.record_type, rating)
                            .await
                    }
                    Err(invalid) => Err(ControllerError::from(invalid)),
                };
                if let Err(source) = applied {
                    error!(
                        record_id = %event.record_id,
                        record_type = %event.record_type,
                        applied = summary.applied,
                        error = %source,
                        "ingestion stopped: failed to apply rating event"
                    );
                    return Err(IngestionError::Write {
                        record_id: event.record_id,
                        applied: summary.applied,
                        source,
                    });
                }
                summary.applied += 1;
                metrics::counter!("cinemesh_ingested_events_total").increment(1);
            }

            summary.cancelled = token.is_cancelled();
            info!(applied = summary.applied, cancelled = summary.cancelled, "stopped ingestion");
            Ok(summary)
        });

        Ok(IngestionTask { cancel, handle })
    }
}

// ---------------------------------------------------------------------------
// IngestionTask
// ---------------------------------------------------------------------------

/// Outcome of an ingestion loop that ended without a fatal error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionSummary {
    /// Events written to the repository.
    pub applied: u64,
    /// `true` if the loop ended because its token was cancelled.
    pub cancelled: bool,
}

/// Fatal termination of an ingestion loop.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("failed to apply rating event for {record_id} after {applied} events: {source}")]
    Write {
        record_id: RecordId,
        applied: u64,
        #[source]
        source: ControllerError,
    },
    /// The loop panicked or was aborted.
    #[error("ingestion task terminated abnormally: {0}")]
    Aborted(String),
}

/// Handle to a running ingestion loop.
#[derive(Debug)]
pub struct IngestionTask {
    cancel: CancellationToken,
    handle: JoinHandle<Result<IngestionSummary, IngestionError>>,
}

impl IngestionTask {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the loop and waits for it. The source closes its channel and
    /// the loop exits between two writes.
    ///
    /// # Errors
    ///
    /// See [`IngestionTask::join`].
    pub async fn stop(self) -> Result<IngestionSummary, IngestionError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Waits for the loop to end on its own.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::Write` if a repository write failed, or
    /// `IngestionError::Aborted` if the task panicked.
    pub async fn join(self) -> Result<IngestionSummary, IngestionError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "ingestion task terminated abnormally");
                Err(IngestionError::Aborted(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use cinemesh_core::RatingEvent;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ingest::{IngestError, StaticIngester};
    use crate::repository::{InMemoryRatingRepository, RepositoryError};

    fn movie(id: &str) -> (RecordId, RecordType) {
        (RecordId::from(id), RecordType::movie())
    }

    fn controller_with(
        repo: Arc<dyn RatingRepository>,
        events: Option<Vec<RatingEvent>>,
    ) -> Arc<RatingController> {
        let ingester = events.map(|events| Arc::new(StaticIngester::new(events)) as Arc<dyn RatingIngester>);
        Arc::new(RatingController::new(repo, RatingControllerConfig { ingester }))
    }

    /// Accepts `limit` writes, then fails every write.
    struct FlakyRepository {
        inner: InMemoryRatingRepository,
        limit: usize,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl RatingRepository for FlakyRepository {
        async fn get(
            &self,
            record_id: &RecordId,
            record_type: &RecordType,
        ) -> Result<Vec<Rating>, RepositoryError> {
            self.inner.get(record_id, record_type).await
        }

        async fn put(
            &self,
            record_id: &RecordId,
            record_type: &RecordType,
            rating: Rating,
        ) -> Result<(), RepositoryError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(RepositoryError::Storage("disk full".to_string()));
            }
            self.inner.put(record_id, record_type, rating).await
        }
    }

    /// Source that never sends and only closes on cancellation.
    struct IdleIngester;

    #[async_trait]
    impl RatingIngester for IdleIngester {
        async fn ingest(
            &self,
            cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<RatingEvent>, IngestError> {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                cancel.cancelled().await;
                drop(tx);
            });
            Ok(rx)
        }
    }

    /// Replays fixed events, keeps the token it was handed and closes only
    /// once that token is cancelled.
    struct WatchingIngester {
        events: Vec<RatingEvent>,
        token: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl RatingIngester for WatchingIngester {
        async fn ingest(
            &self,
            cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<RatingEvent>, IngestError> {
            *self.token.lock() = Some(cancel.clone());
            let (tx, rx) = mpsc::channel(self.events.len().max(1));
            for event in self.events.clone() {
                tx.try_send(event).unwrap();
            }
            tokio::spawn(async move {
                cancel.cancelled().await;
                drop(tx);
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn mean_of_three_ratings() {
        let controller = controller_with(Arc::new(InMemoryRatingRepository::new()), None);
        let (id, kind) = movie("m1");
        for value in [3, 4, 5] {
            controller
                .put_rating(&id, &kind, Rating::new("u1", value).unwrap())
                .await
                .unwrap();
        }
        let mean = controller.get_aggregated_rating(&id, &kind).await.unwrap();
        assert!((mean - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn no_ratings_is_not_found() {
        let controller = controller_with(Arc::new(InMemoryRatingRepository::new()), None);
        let (id, kind) = movie("m1");
        let err = controller.get_aggregated_rating(&id, &kind).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn identical_puts_are_both_stored() {
        let repo = Arc::new(InMemoryRatingRepository::new());
        let controller = controller_with(repo.clone(), None);
        let (id, kind) = movie("m1");
        let rating = Rating::new("u1", 5).unwrap();
        controller.put_rating(&id, &kind, rating.clone()).await.unwrap();
        controller.put_rating(&id, &kind, rating).await.unwrap();
        assert_eq!(repo.count(&id, &kind), 2);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected_without_write() {
        let repo = Arc::new(InMemoryRatingRepository::new());
        let controller = controller_with(repo.clone(), None);
        let (id, kind) = movie("m1");
        let rating = Rating {
            user_id: "u1".into(),
            value: 9,
        };
        let err = controller.put_rating(&id, &kind, rating).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRating(_)));
        assert_eq!(repo.count(&id, &kind), 0);
    }

    #[tokio::test]
    async fn ingestion_of_single_event_terminates_cleanly() {
        let repo = Arc::new(InMemoryRatingRepository::new());
        let controller = controller_with(
            repo.clone(),
            Some(vec![RatingEvent::put("m1", "movie", "u1", 5)]),
        );

        let task = controller.start_ingestion(&CancellationToken::new()).await.unwrap();
        let summary = task.join().await.unwrap();
        assert_eq!(summary, IngestionSummary { applied: 1, cancelled: false });

        let (id, kind) = movie("m1");
        let mean = controller.get_aggregated_rating(&id, &kind).await.unwrap();
        assert!((mean - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn write_failure_is_fatal_to_the_loop() {
        let repo = Arc::new(FlakyRepository {
            inner: InMemoryRatingRepository::new(),
            limit: 2,
            writes: AtomicUsize::new(0),
        });
        let events = (1..=5)
            .map(|i| RatingEvent::put("m1", "movie", format!("u{i}"), 4))
            .collect();
        let controller = controller_with(repo.clone(), Some(events));

        let task = controller.start_ingestion(&CancellationToken::new()).await.unwrap();
        let err = task.join().await.unwrap_err();
        assert!(matches!(err, IngestionError::Write { applied: 2, .. }));
        // No retry, no skip-and-continue.
        assert_eq!(repo.writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalid_event_value_is_fatal_to_the_loop() {
        let repo = Arc::new(InMemoryRatingRepository::new());
        let controller = controller_with(
            repo.clone(),
            Some(vec![
                RatingEvent::put("m1", "movie", "u1", 4),
                RatingEvent::put("m1", "movie", "u2", 0),
                RatingEvent::put("m1", "movie", "u3", 4),
            ]),
        );

        let task = controller.start_ingestion(&CancellationToken::new()).await.unwrap();
        let err = task.join().await.unwrap_err();
        match err {
            IngestionError::Write { source, applied, .. } => {
                assert_eq!(applied, 1);
                assert!(matches!(source, ControllerError::InvalidRating(_)));
            }
            IngestionError::Aborted(msg) => panic!("unexpected abort: {msg}"),
        }
        let (id, kind) = movie("m1");
        assert_eq!(repo.count(&id, &kind), 1);
    }

    #[tokio::test]
    async fn fatal_event_stops_the_source() {
        let ingester = Arc::new(WatchingIngester {
            events: vec![
                RatingEvent::put("m1", "movie", "u1", 4),
                RatingEvent::put("m1", "movie", "u2", 0),
            ],
            token: Mutex::new(None),
        });
        let controller = Arc::new(RatingController::new(
            Arc::new(InMemoryRatingRepository::new()),
            RatingControllerConfig {
                ingester: Some(ingester.clone()),
            },
        ));
        let root = CancellationToken::new();

        let task = controller.start_ingestion(&root).await.unwrap();
        assert!(matches!(
            task.join().await.unwrap_err(),
            IngestionError::Write { applied: 1, .. }
        ));

        let source_token = ingester.token.lock().clone().unwrap();
        assert!(source_token.is_cancelled());
        // Only this loop's token; siblings under the same parent keep running.
        assert!(!root.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_an_idle_loop() {
        let controller = Arc::new(RatingController::new(
            Arc::new(InMemoryRatingRepository::new()),
            RatingControllerConfig {
                ingester: Some(Arc::new(IdleIngester)),
            },
        ));
        let root = CancellationToken::new();
        let task = controller.start_ingestion(&root).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!task.is_finished());

        root.cancel();
        let summary = task.join().await.unwrap();
        assert_eq!(summary, IngestionSummary { applied: 0, cancelled: true });
    }

    #[tokio::test]
    async fn stop_cancels_only_this_task() {
        let controller = Arc::new(RatingController::new(
            Arc::new(InMemoryRatingRepository::new()),
            RatingControllerConfig {
                ingester: Some(Arc::new(IdleIngester)),
            },
        ));
        let root = CancellationToken::new();
        let task = controller.start_ingestion(&root).await.unwrap();
        let summary = task.stop().await.unwrap();
        assert!(summary.cancelled);
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn start_without_ingester_fails() {
        let controller = controller_with(Arc::new(InMemoryRatingRepository::new()), None);
        let err = controller
            .start_ingestion(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NoIngester));
    }
}
