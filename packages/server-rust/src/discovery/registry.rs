//! Registry client: the discovery operations the rest of the service uses.
//!
//! Wraps a [`DiscoveryStore`] and turns its answers into the registry error
//! categories. An empty lookup is always reported as `NotFound`, so callers
//! never see an instance whose liveness has expired.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use super::store::{DiscoveryError, DiscoveryStore};

/// Errors surfaced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Registering with the store failed.
    #[error("failed to register {instance_id}: {source}")]
    Registration {
        instance_id: String,
        #[source]
        source: DiscoveryError,
    },
    /// No live instance of the service exists.
    #[error("no live instances of service {service_name}")]
    NotFound { service_name: String },
    /// Any other store failure (heartbeat, lookup, deregister).
    #[error(transparent)]
    Store(#[from] DiscoveryError),
}

impl RegistryError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// How to pick one address when several instances are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressSelector {
    /// Uniformly random choice; spreads load across instances.
    #[default]
    Random,
    /// The first address in lookup order.
    First,
}

impl AddressSelector {
    fn select(self, addresses: &[String]) -> Option<&String> {
        match self {
            Self::Random if !addresses.is_empty() => {
                addresses.get(rand::rng().random_range(0..addresses.len()))
            }
            Self::Random | Self::First => addresses.first(),
        }
    }
}

/// Generates a fresh, unique instance ID for `service_name`.
#[must_use]
pub fn generate_instance_id(service_name: &str) -> String {
    format!("{service_name}-{}", uuid::Uuid::new_v4())
}

/// Discovery operations over a shared store.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn DiscoveryStore>,
    selector: AddressSelector,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl Registry {
    #[must_use]
    pub fn new(store: Arc<dyn DiscoveryStore>) -> Self {
        Self::with_selector(store, AddressSelector::default())
    }

    #[must_use]
    pub fn with_selector(store: Arc<dyn DiscoveryStore>, selector: AddressSelector) -> Self {
        Self { store, selector }
    }

    /// Registers an instance. Idempotent for the same `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Registration` if the store rejects the call.
    pub async fn register(
        &self,
        instance_id: &str,
        service_name: &str,
        address: &str,
    ) -> Result<(), RegistryError> {
        self.store
            .register(instance_id, service_name, address)
            .await
            .map_err(|source| RegistryError::Registration {
                instance_id: instance_id.to_string(),
                source,
            })?;
        info!(instance_id, service_name, address, "registered service instance");
        Ok(())
    }

    /// Refreshes the liveness of a registered instance.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Store` if the store cannot be reached or does
    /// not know the instance.
    pub async fn report_healthy_state(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), RegistryError> {
        self.store.heartbeat(instance_id, service_name).await?;
        Ok(())
    }

    /// Returns the addresses of all live instances of `service_name`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if there are none, or
    /// `RegistryError::Store` if the lookup itself failed.
    pub async fn service_addresses(&self, service_name: &str) -> Result<Vec<String>, RegistryError> {
        let addresses = self.store.lookup(service_name).await?;
        if addresses.is_empty() {
            return Err(RegistryError::NotFound {
                service_name: service_name.to_string(),
            });
        }
        Ok(addresses)
    }

    /// Picks one live address of `service_name` using the configured selector.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::service_addresses`].
    pub async fn resolve(&self, service_name: &str) -> Result<String, RegistryError> {
        let addresses = self.service_addresses(service_name).await?;
        let address = self
            .selector
            .select(&addresses)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                service_name: service_name.to_string(),
            })?;
        debug!(service_name, %address, candidates = addresses.len(), "resolved service address");
        Ok(address)
    }

    /// Removes an instance from the store.
    ///
    /// Best-effort: callers log the error and carry on with shutdown.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Store` if the store could not be reached.
    pub async fn deregister(
        &self,
        instance_id: &str,
        service_name: &str,
    ) -> Result<(), RegistryError> {
        self.store.deregister(instance_id, service_name).await?;
        info!(instance_id, service_name, "deregistered service instance");
        Ok(())
    }
}
