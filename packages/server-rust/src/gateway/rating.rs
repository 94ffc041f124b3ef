//! Gateway to the rating service.

use std::sync::Arc;

use cinemesh_core::messages::{
    GetAggregatedRatingRequest, GetAggregatedRatingResponse, PutRatingRequest, PutRatingResponse,
};
use cinemesh_core::{operations, service_names, Rating, RecordId, RecordType};
use tokio_util::sync::CancellationToken;

use super::{GatewayClient, GatewayError};
use crate::discovery::Registry;
use crate::resilience::RetryPolicy;
use crate::rpc::transport::RemoteTransport;

/// Typed client of the rating service.
#[derive(Debug, Clone)]
pub struct RatingGateway {
    client: GatewayClient,
}

impl RatingGateway {
    #[must_use]
    pub fn new(registry: Registry, transport: Arc<dyn RemoteTransport>, retry: RetryPolicy) -> Self {
        Self {
            client: GatewayClient::new(service_names::RATING, registry, transport, retry),
        }
    }

    /// Fetches the mean rating of a record.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the record has no ratings; see
    /// [`GatewayError`] for the other categories.
    pub async fn get_aggregated_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        cancel: &CancellationToken,
    ) -> Result<f64, GatewayError> {
        let request = GetAggregatedRatingRequest {
            record_id: record_id.clone(),
            record_type: record_type.clone(),
        };
        let response: GetAggregatedRatingResponse = self
            .client
            .invoke(operations::GET_AGGREGATED_RATING, &request, cancel)
            .await?;
        Ok(response.rating_value)
    }

    /// Stores a rating through any live rating instance.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Fatal` with an `InvalidArgument` status for an
    /// out-of-range rating; see [`GatewayError`] for the other categories.
    pub async fn put_rating(
        &self,
        record_id: &RecordId,
        record_type: &RecordType,
        rating: Rating,
        cancel: &CancellationToken,
    ) -> Result<(), GatewayError> {
        let request = PutRatingRequest {
            record_id: record_id.clone(),
            record_type: record_type.clone(),
            rating,
        };
        let _: PutRatingResponse = self
            .client
            .invoke(operations::PUT_RATING, &request, cancel)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use cinemesh_core::encode;

    use super::*;
    use crate::config::RetryConfig;
    use crate::discovery::InMemoryDiscoveryStore;
    use crate::gateway::test_support::{ScriptedTransport, SharedScript};
    use crate::rpc::status::{RemoteError, StatusCode};

    fn movie() -> (RecordId, RecordType) {
        (RecordId::from("m1"), RecordType::movie())
    }

    fn mean(value: f64) -> Result<Bytes, RemoteError> {
        Ok(Bytes::from(
            encode(&GetAggregatedRatingResponse {
                rating_value: value,
            })
            .unwrap(),
        ))
    }

    fn retry_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }

    async fn registry_with_rating() -> Registry {
        let registry = Registry::new(Arc::new(InMemoryDiscoveryStore::default()));
        registry.register("rating-1", "rating", "rating-a").await.unwrap();
        registry
    }

    fn gateway(registry: Registry, transport: &Arc<ScriptedTransport>) -> RatingGateway {
        RatingGateway::new(
            registry,
            Arc::new(SharedScript(Arc::clone(transport))),
            RetryPolicy::from_config(&retry_config()).unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let transport = ScriptedTransport::new(vec![
            Err(RemoteError::unavailable("connection reset")),
            Err(RemoteError::unavailable("connection reset")),
            mean(4.0),
        ]);
        let gateway = gateway(registry_with_rating().await, &transport);
        let (id, kind) = movie();

        let start = tokio::time::Instant::now();
        let value = gateway
            .get_aggregated_rating(&id, &kind, &CancellationToken::new())
            .await
            .unwrap();

        assert!((value - 4.0).abs() < f64::EPSILON);
        assert_eq!(transport.calls(), 3);
        // 100ms and 200ms, each jittered by at most 25%.
        assert!(start.elapsed() >= Duration::from_millis(75 + 150));
        // One connection for the whole guarded call, released afterwards.
        assert_eq!(transport.connects.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(transport.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transient_failure_exhausts_retries() {
        let transport =
            ScriptedTransport::new(vec![Err(RemoteError::new(StatusCode::DeadlineExceeded, "slow"))]);
        let gateway = gateway(registry_with_rating().await, &transport);
        let (id, kind) = movie();

        let err = gateway
            .get_aggregated_rating(&id, &kind, &CancellationToken::new())
            .await
            .unwrap_err();
        match &err {
            GatewayError::ExhaustedRetries { attempts, last, .. } => {
                assert_eq!(*attempts, 3);
                assert_eq!(last.code, StatusCode::DeadlineExceeded);
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        assert!(err.is_transient());
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(RemoteError::invalid_argument("bad value"))]);
        let gateway = gateway(registry_with_rating().await, &transport);
        let (id, kind) = movie();

        let err = gateway
            .put_rating(&id, &kind, Rating::new("u1", 4).unwrap(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Fatal {
                error: RemoteError {
                    code: StatusCode::InvalidArgument,
                    ..
                },
                ..
            }
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn no_live_instance_is_unavailable_without_calls() {
        let transport = ScriptedTransport::new(vec![mean(4.0)]);
        let registry = Registry::new(Arc::new(InMemoryDiscoveryStore::default()));
        let gateway = gateway(registry, &transport);
        let (id, kind) = movie();

        let err = gateway
            .get_aggregated_rating(&id, &kind, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { .. }));
        assert_eq!(transport.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_is_prompt() {
        let transport = ScriptedTransport::new(vec![Err(RemoteError::unavailable("down"))]);
        let gateway = gateway(registry_with_rating().await, &transport);
        let (id, kind) = movie();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let start = tokio::time::Instant::now();
        let err = gateway
            .get_aggregated_rating(&id, &kind, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_millis(75));
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.open_connections(), 0);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_call_does_not_resolve() {
        let transport = ScriptedTransport::new(vec![mean(4.0)]);
        let gateway = gateway(registry_with_rating().await, &transport);
        let (id, kind) = movie();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gateway
            .get_aggregated_rating(&id, &kind, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
