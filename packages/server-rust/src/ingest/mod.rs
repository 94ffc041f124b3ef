//! Rating event sources.
//!
//! A [`RatingIngester`] hands out a bounded channel of events. The source
//! owns the sending side: it closes the channel once it runs out of events or
//! once the cancellation token passed to `ingest` fires.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cinemesh_core::RatingEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default capacity of the event channel handed to consumers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Errors raised while setting up an event source.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid rating event on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read events from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("event source unavailable: {0}")]
    Unavailable(String),
}

/// Source of rating events.
#[async_trait]
pub trait RatingIngester: Send + Sync {
    /// Starts delivering events and returns the receiving end of the channel.
    ///
    /// The channel is closed when the source is exhausted or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` if the source cannot be started.
    async fn ingest(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RatingEvent>, IngestError>;
}

// ---------------------------------------------------------------------------
// StaticIngester
// ---------------------------------------------------------------------------

/// Replays a fixed list of events, in order, then closes the channel.
#[derive(Debug, Clone)]
pub struct StaticIngester {
    events: Vec<RatingEvent>,
    capacity: usize,
}

impl StaticIngester {
    #[must_use]
    pub fn new(events: Vec<RatingEvent>) -> Self {
        Self {
            events,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Overrides the channel capacity (minimum 1).
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Parses one JSON-encoded event per non-blank line.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Decode` with the 1-based line number of the first
    /// malformed event.
    pub fn from_json_lines(input: &str) -> Result<Self, IngestError> {
        let events = input
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                RatingEvent::from_json(line.as_bytes()).map_err(|source| IngestError::Decode {
                    line: index + 1,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(events))
    }

    /// Reads a JSON-lines file of events.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Io` if the file cannot be read, or
    /// `IngestError::Decode` for a malformed line.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let input = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| IngestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_lines(&input)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl RatingIngester for StaticIngester {
    async fn ingest(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RatingEvent>, IngestError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let events = self.events.clone();

        tokio::spawn(async move {
            let total = events.len();
            let mut sent = 0usize;
            for event in events {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    delivered = tx.send(event) => {
                        if delivered.is_err() {
                            // Consumer went away.
                            break;
                        }
                        sent += 1;
                    }
                }
            }
            debug!(sent, total, cancelled = cancel.is_cancelled(), "static event source closed");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use cinemesh_core::RatingEventType;

    use super::*;

    fn events(n: usize) -> Vec<RatingEvent> {
        (0..n)
            .map(|i| RatingEvent::put("m1", "movie", format!("u{i}"), 4))
            .collect()
    }

    #[tokio::test]
    async fn delivers_events_in_order_then_closes() {
        let ingester = StaticIngester::new(events(5)).with_capacity(2);
        let mut rx = ingester.ingest(CancellationToken::new()).await.unwrap();

        let mut users = Vec::new();
        while let Some(event) = rx.recv().await {
            users.push(event.user_id.to_string());
        }
        assert_eq!(users, vec!["u0", "u1", "u2", "u3", "u4"]);
    }

    #[tokio::test]
    async fn cancellation_closes_the_channel() {
        let ingester = StaticIngester::new(events(100)).with_capacity(1);
        let cancel = CancellationToken::new();
        let mut rx = ingester.ingest(cancel.clone()).await.unwrap();

        assert!(rx.recv().await.is_some());
        cancel.cancel();

        let mut remaining = 0;
        while rx.recv().await.is_some() {
            remaining += 1;
        }
        // At most the buffered event plus one in-flight send.
        assert!(remaining <= 2, "received {remaining} events after cancellation");
    }

    #[test]
    fn parses_json_lines_and_skips_blanks() {
        let input = r#"
{"recordId":"m1","recordType":"movie","userId":"u1","value":5}

{"recordId":"m2","recordType":"movie","userId":"u2","value":3,"eventType":"put"}
"#;
        let ingester = StaticIngester::from_json_lines(input).unwrap();
        assert_eq!(ingester.len(), 2);
        assert_eq!(ingester.events[0].event_type, RatingEventType::Put);
        assert_eq!(ingester.events[1].record_id.as_str(), "m2");
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = "{\"recordId\":\"m1\",\"recordType\":\"movie\",\"userId\":\"u1\",\"value\":5}\nnot json\n";
        let err = StaticIngester::from_json_lines(input).unwrap_err();
        assert!(matches!(err, IngestError::Decode { line: 2, .. }));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = StaticIngester::from_file("/nonexistent/cinemesh/events.jsonl")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
