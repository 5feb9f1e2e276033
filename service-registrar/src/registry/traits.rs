use crate::config::HealthPolicy;
use crate::service::{Service, ServiceId};
use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a registry backend.
///
/// None of these are fatal for the agent: they are logged where the
/// registration was attempted and the event loop carries on.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The request never got a response (connection refused, timeout, ...).
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("registry rejected {operation} of {id} (status {status}): {body}")]
    Rejected {
        operation: &'static str,
        id: ServiceId,
        status: u16,
        body: String,
    },

    /// Backend specific failure without an HTTP status.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// The abstraction over the service registry ("the Catalog").
/// Implement this for Consul, etcd, an in-memory fake, etc.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Registers `service` under `service.id()` with a TTL health check.
    /// Must be idempotent: registering an existing id refreshes its record.
    async fn register(&self, service: &Service, policy: &HealthPolicy)
        -> Result<(), RegistryError>;

    /// Marks the health check of `id` as passing for another TTL.
    async fn renew(&self, id: &ServiceId) -> Result<(), RegistryError>;

    /// Removes `id` from the registry.
    async fn deregister(&self, id: &ServiceId) -> Result<(), RegistryError>;
}
