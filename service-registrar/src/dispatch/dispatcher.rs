use crate::coordinator::RegistrationCoordinator;
use crate::registry::{RegistryError, TargetCatalog};
use crate::service::{Service, ServiceId};
use log::{debug, info};
use std::sync::Arc;
use supervisor_events::{Event, EventKind, ProcessState};

/// What an event asks the coordinator to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Register(Service),
    Deregister(ServiceId),
}

impl Action {
    /// The identity the action applies to.
    pub fn id(&self) -> ServiceId {
        match self {
            Action::Register(service) => service.id(),
            Action::Deregister(id) => id.clone(),
        }
    }
}

/// Maps process lifecycle events of target services to registrations.
///
/// Use `Dispatcher::new(...)` and hand it to a [`DispatchWorker`](super::DispatchWorker);
/// the protocol loop never calls it directly.
pub struct Dispatcher {
    catalog: TargetCatalog,
    coordinator: Arc<RegistrationCoordinator>,
}

impl Dispatcher {
    pub fn new(catalog: TargetCatalog, coordinator: Arc<RegistrationCoordinator>) -> Self {
        Self {
            catalog,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<RegistrationCoordinator> {
        &self.coordinator
    }

    /// Decides what `event` means for the configured targets.
    ///
    /// - RUNNING registers: the process finished starting.
    /// - STOPPING / EXITED deregister, but *ONLY* when leaving RUNNING. A
    ///   process that dies while STARTING was never registered.
    /// - Everything else, and every non-target process, is ignored.
    pub fn decide(&self, event: &Event) -> Option<Action> {
        let service = self.catalog.find(event)?;

        match event.kind() {
            EventKind::ProcessRunning => Some(Action::Register(service.clone())),
            EventKind::ProcessStopping | EventKind::ProcessExited
                if event.from_state() == Some(&ProcessState::Running) =>
            {
                Some(Action::Deregister(service.id()))
            }
            _ => None,
        }
    }

    /// Applies the decision for `event`. Registry failures are returned to the
    /// caller, which only logs them.
    pub async fn handle(&self, event: &Event) -> Result<(), RegistryError> {
        match self.decide(event) {
            Some(action) => self.apply(&action).await,
            None => {
                debug!(
                    "Dispatcher: Ignored {} for '{}'",
                    event.kind(),
                    event.qualified_name()
                );
                Ok(())
            }
        }
    }

    pub async fn apply(&self, action: &Action) -> Result<(), RegistryError> {
        match action {
            Action::Register(service) => {
                info!("Dispatcher: register '{}'", service.id());
                self.coordinator.register(service).await
            }
            Action::Deregister(id) => {
                info!("Dispatcher: deregister '{}'", id);
                self.coordinator.deregister(id).await
            }
        }
    }
}
