//! Discovery store contract and a TTL-based in-memory implementation.
//!
//! The store owns the liveness policy: an instance is live from registration
//! until it is deregistered or until its last health report is older than the
//! TTL. Expired instances stay registered (a later heartbeat revives them) but
//! are never returned by `lookup`.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

/// Errors reported by a discovery store client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery store unreachable: {0}")]
    Unreachable(String),
    #[error("instance {instance_id} of service {service_name} is not registered")]
    UnknownInstance {
        instance_id: String,
        service_name: String,
    },
}

/// Client of a shared discovery store. Every operation is safe to call
/// concurrently; the store serializes internally.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Registers (or re-registers) an instance and marks it live.
    async fn register(
        &self,
        instance_id: &str,
        service_name: &str,
        address: &str,
    ) -> Result<(), DiscoveryError>;

    /// Refreshes the liveness of a registered instance.
    async fn heartbeat(&self, instance_id: &str, service_name: &str)
        -> Result<(), DiscoveryError>;

    /// Returns the addresses of all live instances of a service.
    async fn lookup(&self, service_name: &str) -> Result<Vec<String>, DiscoveryError>;

    /// Removes an instance. Removing an unknown instance is not an error.
    async fn deregister(&self, instance_id: &str, service_name: &str)
        -> Result<(), DiscoveryError>;
}

// ---------------------------------------------------------------------------
// ServiceInstance
// ---------------------------------------------------------------------------

/// One registered process of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub service_name: String,
    pub address: String,
    /// The instance stops being live at this instant unless refreshed.
    pub expires_at: Instant,
}

impl ServiceInstance {
    #[must_use]
    pub fn is_live_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

// ---------------------------------------------------------------------------
// InMemoryDiscoveryStore
// ---------------------------------------------------------------------------

/// Default time an instance stays live without a health report.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Discovery store kept in process memory, shared by every node of a
/// single-process deployment and by tests.
#[derive(Debug)]
pub struct InMemoryDiscoveryStore {
    ttl: Duration,
    /// Keyed by instance ID.
    instances: DashMap<String, ServiceInstance>,
}

impl InMemoryDiscoveryStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            instances: DashMap::new(),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a registered instance, live or not.
    #[must_use]
    pub fn instance(&self, instance_id: &str) -> Option<ServiceInstance> {
        self.instances.get(instance_id).map(|entry| entry.clone())
    }

    /// Addresses of the instances of `service_name` that are live at `now`,
    /// sorted for deterministic output.
    #[must_use]
    pub fn live_addresses_at(&self, service_name: &str, now: Instant) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| entry.service_name == service_name && entry.is_live_at(now))
            .map(|entry| entry.address.clone())
            .collect();
        addresses.sort();
        addresses
    }
}

impl Default for InMemoryDiscoveryStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl DiscoveryStore for InMemoryDiscoveryStore {
    async fn register(
        &self,
        instance_id: &str,
        service_name: &str,
        address: &str,
    ) -> Result<(), DiscoveryError> {
        self.instances.insert(
            instance_id.to_string(),
            ServiceInstance {
                instance_id: instance_id.to_string(),
                service_name: service_name.to_string(),
                address: address.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn heartbeat(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), DiscoveryError> {
        match self.instances.get_mut(instance_id) {
            Some(mut entry) if entry.service_name == service_name => {
                entry.expires_at = Instant::now() + self.ttl;
                Ok(())
            }
            _ => Err(DiscoveryError::UnknownInstance {
                instance_id: instance_id.to_string(),
                service_name: service_name.to_string(),
            }),
        }
    }

    async fn lookup(&self, service_name: &str) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.live_addresses_at(service_name, Instant::now()))
    }

    async fn deregister(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), DiscoveryError> {
        self.instances
            .remove_if(instance_id, |_, instance| instance.service_name == service_name);
        Ok(())
    }
}
