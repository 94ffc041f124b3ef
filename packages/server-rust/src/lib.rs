//! `cinemesh` Server: service discovery, resilient inter-service calls,
//! admission control and rating ingestion for the movie services.

pub mod config;
pub mod controller;
pub mod discovery;
pub mod gateway;
pub mod ingest;
pub mod logging;
pub mod node;
pub mod repository;
pub mod resilience;
pub mod rpc;
pub mod shutdown;

pub use config::{
    HeartbeatConfig, LogFormat, NodeConfig, RateLimitConfig, RetryConfig, ShutdownConfig,
};
pub use node::{Node, ShutdownReport};
