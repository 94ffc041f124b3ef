//! Single-process cinemesh deployment.
//!
//! Starts a metadata instance, one or more rating instances and a movie
//! controller wired together through the in-process transport. With
//! `--movie` it prints the details of one movie and exits; otherwise it runs
//! until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cinemesh_core::{service_names, Metadata, MovieDetails};
use cinemesh_server::controller::{
    IngestionTask, MetadataController, MovieController, RatingController, RatingControllerConfig,
};
use cinemesh_server::discovery::{InMemoryDiscoveryStore, Registry};
use cinemesh_server::gateway::{MetadataGateway, RatingGateway};
use cinemesh_server::ingest::{RatingIngester, StaticIngester};
use cinemesh_server::logging::init_tracing;
use cinemesh_server::repository::{InMemoryMetadataRepository, InMemoryRatingRepository};
use cinemesh_server::resilience::RetryPolicy;
use cinemesh_server::rpc::{LoopbackTransport, MetadataRpcHandler, RatingRpcHandler};
use cinemesh_server::{
    HeartbeatConfig, LogFormat, Node, NodeConfig, RateLimitConfig, RetryConfig, ShutdownConfig,
    ShutdownReport,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "cinemesh-node", version, about = "Run the cinemesh movie services in one process")]
struct Args {
    /// JSON-lines file of rating events to ingest.
    #[arg(long, env = "CINEMESH_EVENTS")]
    events: Option<PathBuf>,

    /// JSON-lines file of movie metadata to serve.
    #[arg(long, env = "CINEMESH_CATALOG")]
    catalog: Option<PathBuf>,

    /// Print the details of this movie, then shut down.
    #[arg(long)]
    movie: Option<String>,

    /// Number of rating service instances.
    #[arg(long, default_value_t = 2)]
    rating_instances: usize,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, env = "CINEMESH_LOG_FORMAT")]
    log_format: LogFormat,

    /// Attempts per remote call, including the first.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, default_value_t = 100)]
    base_backoff_ms: u64,

    /// Sustained inbound calls per second per instance.
    #[arg(long, default_value_t = 100)]
    rate_per_second: u32,

    #[arg(long, default_value_t = 100)]
    burst: u32,

    #[arg(long, default_value_t = 1000)]
    heartbeat_ms: u64,

    #[arg(long, default_value_t = 10)]
    grace_period_secs: u64,
}

impl Args {
    fn node_config(&self, service_name: &str, address: String) -> NodeConfig {
        NodeConfig {
            service_name: service_name.to_string(),
            advertise_address: address,
            rate_limit: RateLimitConfig {
                rate_per_second: self.rate_per_second,
                burst: self.burst,
            },
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(self.heartbeat_ms),
            },
            shutdown: ShutdownConfig {
                grace_period: Duration::from_secs(self.grace_period_secs),
                ..ShutdownConfig::default()
            },
        }
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            ..RetryConfig::default()
        }
    }
}

async fn load_catalog(path: &Path) -> anyhow::Result<Vec<Metadata>> {
    let input = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid metadata on line {} of {}", index + 1, path.display()))
        })
        .collect()
}

/// Waits for the ingestion run to finish, then fetches one movie.
async fn query_movie(
    movies: &MovieController,
    movie_id: &str,
    ingestion: Option<IngestionTask>,
    cancel: &CancellationToken,
) -> anyhow::Result<MovieDetails> {
    if let Some(task) = ingestion {
        let summary = task.join().await.context("rating ingestion failed")?;
        info!(applied = summary.applied, "ingested rating events");
    }
    movies
        .get_details(movie_id, cancel)
        .await
        .with_context(|| format!("failed to fetch movie {movie_id}"))
}

/// Runs the shutdown sequence of every node, in order.
async fn shutdown_nodes(nodes: Vec<Node>) -> Vec<ShutdownReport> {
    let mut reports = Vec::with_capacity(nodes.len());
    for node in nodes {
        let report = node.shutdown().await;
        if let Some(Err(err)) = &report.ingestion {
            error!(error = %err, "ingestion ended with an error");
        }
        if !report.drained {
            warn!("instance stopped before draining");
        }
        reports.push(report);
    }
    reports
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let registry = Registry::new(Arc::new(InMemoryDiscoveryStore::default()));
    let transport = Arc::new(LoopbackTransport::new());
    let root = CancellationToken::new();

    let catalog = match &args.catalog {
        Some(path) => load_catalog(path).await?,
        None => Vec::new(),
    };
    let metadata_controller = Arc::new(MetadataController::new(Arc::new(
        InMemoryMetadataRepository::with_entries(catalog),
    )));
    let metadata_node = Node::start(
        args.node_config(service_names::METADATA, "metadata-1.local:8081".to_string()),
        registry.clone(),
        Arc::clone(&transport),
        Arc::new(MetadataRpcHandler::new(metadata_controller)),
        &root,
    )
    .await?;

    let ingester: Option<Arc<dyn RatingIngester>> = match &args.events {
        Some(path) => Some(Arc::new(StaticIngester::from_file(path).await?)),
        None => None,
    };

    // Every rating instance shares one store; only the first one consumes events.
    let ratings = Arc::new(InMemoryRatingRepository::new());
    let mut rating_nodes = Vec::with_capacity(args.rating_instances.max(1));
    let mut ingestion = None;
    for index in 0..args.rating_instances.max(1) {
        let config = RatingControllerConfig {
            ingester: if index == 0 { ingester.clone() } else { None },
        };
        let controller = Arc::new(RatingController::new(ratings.clone(), config));
        let node = Node::start(
            args.node_config(service_names::RATING, format!("rating-{}.local:8082", index + 1)),
            registry.clone(),
            Arc::clone(&transport),
            Arc::new(RatingRpcHandler::new(Arc::clone(&controller))),
            &root,
        )
        .await?;
        if index == 0 && ingester.is_some() {
            ingestion = Some(controller.start_ingestion(node.cancellation_token()).await?);
        }
        rating_nodes.push(node);
    }

    let retry = RetryPolicy::from_config(&args.retry_config())?;
    let movies = MovieController::new(
        Arc::new(MetadataGateway::new(registry.clone(), transport.clone(), retry.clone())),
        Arc::new(RatingGateway::new(registry.clone(), transport.clone(), retry)),
    );

    let outcome = if let Some(movie_id) = &args.movie {
        query_movie(&movies, movie_id, ingestion.take(), &root)
            .await
            .and_then(|details| Ok(serde_json::to_string_pretty(&details)?))
            .map(|rendered| println!("{rendered}"))
    } else {
        if let (Some(task), Some(node)) = (ingestion.take(), rating_nodes.first_mut()) {
            node.attach_ingestion(task);
        }
        info!("running; press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")
    };

    rating_nodes.push(metadata_node);
    shutdown_nodes(rating_nodes).await;
    root.cancel();

    outcome
}
