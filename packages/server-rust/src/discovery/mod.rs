//! Service discovery: a store contract, the registry client built on it, and
//! the heartbeat task that keeps an instance live.

pub mod heartbeat;
pub mod registry;
pub mod store;

pub use heartbeat::{HeartbeatStats, HeartbeatTask};
pub use registry::{generate_instance_id, AddressSelector, Registry, RegistryError};
pub use store::{DiscoveryError, DiscoveryStore, InMemoryDiscoveryStore, ServiceInstance};
