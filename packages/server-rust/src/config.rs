//! Configuration types for a cinemesh node.
//!
//! Every struct carries documented named fields and a `Default` impl with
//! production values. Bootstrap code (CLI flags, files) fills these in;
//! nothing here reads the environment.

use std::time::Duration;

/// Retry behaviour for guarded remote calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt. Later delays grow by `multiplier`.
    pub base_backoff: Duration,
    /// Exponential growth factor between consecutive delays. Must be >= 1.
    pub multiplier: f64,
    /// Fraction of uniform randomization applied to each delay (0.25 = +/-25%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// Token-bucket admission settings for inbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained refill rate in tokens per second.
    pub rate_per_second: u32,
    /// Bucket capacity; the largest burst admitted from a full bucket.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 100,
            burst: 100,
        }
    }
}

/// Liveness reporting towards the discovery store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between two health reports.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Bounds for the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Upper bound for the best-effort deregistration call.
    pub deregister_timeout: Duration,
    /// How long in-flight requests may run after admission stops.
    pub grace_period: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deregister_timeout: Duration::from_secs(2),
            grace_period: Duration::from_secs(10),
        }
    }
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Everything a single service instance needs to join the fleet.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Logical service name other services resolve (e.g., `"rating"`).
    pub service_name: String,
    /// Address advertised in the discovery store.
    pub advertise_address: String,
    pub rate_limit: RateLimitConfig,
    pub heartbeat: HeartbeatConfig,
    pub shutdown: ShutdownConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            advertise_address: "localhost:0".to_string(),
            rate_limit: RateLimitConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}
