//! # Service Registrar
//!
//! A supervisord event listener that mirrors the lifecycle of selected
//! processes into a service registry.
//!
//! ## Flow
//! 1. `agent::serve` reads notifications off the listener protocol and
//!    acknowledges each one immediately.
//! 2. The `dispatch` worker decides what each event means for the configured
//!    targets (`registry::TargetCatalog`).
//! 3. The `coordinator` registers or deregisters the service and keeps a
//!    heartbeat renewing its TTL check while it runs.

pub mod agent;
pub mod args;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod registry;
pub mod service;

pub use agent::Agent;
pub use config::{AgentConfig, ConfigError, HealthPolicy};
pub use coordinator::RegistrationCoordinator;
pub use registry::{ConsulRegistry, RegistryError, ServiceRegistry, TargetCatalog};
pub use service::{Service, ServiceId};
