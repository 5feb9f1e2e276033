//! In-memory list of the services this agent is responsible for.
//!
//! It is PURE data: built once from configuration, never mutated, no I/O.
use crate::service::Service;
use supervisor_events::Event;

/// The configured target services, in command-line order.
#[derive(Debug, Default, Clone)]
pub struct TargetCatalog {
    targets: Vec<Service>,
}

impl TargetCatalog {
    pub fn new(targets: Vec<Service>) -> Self {
        Self { targets }
    }

    /// The first target whose qualified name matches the event's process.
    pub fn find(&self, event: &Event) -> Option<&Service> {
        self.targets.iter().find(|target| target.matches(event))
    }

    pub fn targets(&self) -> &[Service] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
