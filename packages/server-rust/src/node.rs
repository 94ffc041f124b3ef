//! Lifecycle of one service instance.
//!
//! Start-up: bind the inbound stack, register in discovery, start the
//! heartbeat, then begin accepting calls. Shutdown runs in a fixed order:
//! deregister (best effort, bounded) -> stop admitting -> drain in-flight
//! calls (bounded) -> cancel and join background tasks.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::controller::{IngestionError, IngestionSummary, IngestionTask};
use crate::discovery::{generate_instance_id, HeartbeatStats, HeartbeatTask, Registry};
use crate::resilience::RateLimiter;
use crate::rpc::{build_rpc_stack, LoopbackTransport, RpcHandler};
use crate::shutdown::{HealthState, ShutdownController};

/// What happened during [`Node::shutdown`].
#[derive(Debug)]
pub struct ShutdownReport {
    /// `false` if deregistration failed or timed out.
    pub deregistered: bool,
    /// `false` if in-flight calls were still running when the grace period ended.
    pub drained: bool,
    pub heartbeat: HeartbeatStats,
    /// Outcome of the ingestion loop, if one was attached.
    pub ingestion: Option<Result<IngestionSummary, IngestionError>>,
}

/// A running service instance.
pub struct Node {
    config: NodeConfig,
    instance_id: String,
    registry: Registry,
    transport: Arc<LoopbackTransport>,
    shutdown: Arc<ShutdownController>,
    cancel: CancellationToken,
    heartbeat: HeartbeatTask,
    ingestion: Option<IngestionTask>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("service_name", &self.config.service_name)
            .field("instance_id", &self.instance_id)
            .field("address", &self.config.advertise_address)
            .field("health", &self.shutdown.health_state())
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Starts an instance serving `handler` at `config.advertise_address`.
    ///
    /// Background tasks are children of `parent`.
    ///
    /// # Errors
    ///
    /// Fails if the instance cannot be registered; nothing stays bound in
    /// that case.
    pub async fn start(
        config: NodeConfig,
        registry: Registry,
        transport: Arc<LoopbackTransport>,
        handler: Arc<dyn RpcHandler>,
        parent: &CancellationToken,
    ) -> anyhow::Result<Self> {
        let shutdown = Arc::new(ShutdownController::new());
        let limiter = Arc::new(
            RateLimiter::new(config.rate_limit).context("invalid rate limit configuration")?,
        );
        transport.bind(
            config.advertise_address.clone(),
            build_rpc_stack(handler, Arc::clone(&shutdown), limiter),
        );

        let instance_id = generate_instance_id(&config.service_name);
        if let Err(err) = registry
            .register(&instance_id, &config.service_name, &config.advertise_address)
            .await
        {
            transport.unbind(&config.advertise_address);
            return Err(err).with_context(|| {
                format!("failed to start {} instance", config.service_name)
            });
        }

        let cancel = parent.child_token();
        let heartbeat = HeartbeatTask::spawn(
            registry.clone(),
            instance_id.clone(),
            config.service_name.clone(),
            config.heartbeat,
            &cancel,
        );

        shutdown.set_ready();
        info!(
            service_name = %config.service_name,
            %instance_id,
            address = %config.advertise_address,
            "node ready"
        );

        Ok(Self {
            config,
            instance_id,
            registry,
            transport,
            shutdown,
            cancel,
            heartbeat,
            ingestion: None,
        })
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.config.advertise_address
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.shutdown.health_state()
    }

    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.shutdown.in_flight_count()
    }

    /// Token that background work owned by this node should be started with.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Hands an ingestion loop to the node so shutdown stops and joins it.
    pub fn attach_ingestion(&mut self, task: IngestionTask) {
        self.ingestion = Some(task);
    }

    /// Runs the shutdown sequence and consumes the node.
    pub async fn shutdown(self) -> ShutdownReport {
        let service_name = self.config.service_name.as_str();
        let instance_id = self.instance_id.as_str();
        let timeouts = self.config.shutdown;
        info!(service_name, instance_id, "shutting down");

        let deregistered = match tokio::time::timeout(
            timeouts.deregister_timeout,
            self.registry.deregister(instance_id, service_name),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(service_name, instance_id, error = %err, "deregistration failed");
                false
            }
            Err(_) => {
                warn!(service_name, instance_id, "deregistration timed out");
                false
            }
        };

        self.shutdown.trigger_shutdown();
        let drained = self.shutdown.wait_for_drain(timeouts.grace_period).await;
        if !drained {
            warn!(
                service_name,
                in_flight = self.shutdown.in_flight_count(),
                "grace period expired with calls still in flight"
            );
            self.shutdown.force_stop();
        }

        self.cancel.cancel();
        let heartbeat = self.heartbeat.join().await;
        let ingestion = match self.ingestion {
            Some(task) => Some(task.join().await),
            None => None,
        };

        self.transport.unbind(&self.config.advertise_address);
        info!(service_name, instance_id, drained, "node stopped");

        ShutdownReport {
            deregistered,
            drained,
            heartbeat,
            ingestion,
        }
    }
}
