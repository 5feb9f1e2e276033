pub mod catalog;
pub mod consul;
#[cfg(any(test, feature = "test-utils"))]
pub mod recording;
pub mod traits;

pub use catalog::TargetCatalog;
pub use consul::ConsulRegistry;
pub use traits::{RegistryError, ServiceRegistry};
