//! Owns the "keep this registration alive" side of every target service.
//!
//! Each registered identity gets one heartbeat task renewing its TTL check.
//! The table of running heartbeats is private to [`RegistrationCoordinator`]
//! and only reachable through `register` / `deregister`, so every read and
//! write of it happens under the same lock.
//!
//! Operations on one identity never interleave: each holds that identity's
//! async lock from the registry call until its heartbeat is started or has
//! fully stopped.

use crate::config::HealthPolicy;
use crate::registry::{RegistryError, ServiceRegistry};
use crate::service::{Service, ServiceId};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// A running heartbeat: how to stop it, and how to know it has stopped.
struct Heartbeat {
    cancel: oneshot::Sender<()>,
    done: JoinHandle<()>,
}

impl Heartbeat {
    fn start(registry: Arc<dyn ServiceRegistry>, id: ServiceId, every: Duration) -> Self {
        let (cancel, mut cancelled) = oneshot::channel::<()>();

        let done = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    // Fires on an explicit stop and when the coordinator is dropped.
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {
                        if let Err(e) = registry.renew(&id).await {
                            warn!("Heartbeat: Failed to renew '{}': {}", id, e);
                        }
                    }
                }
            }
            debug!("Heartbeat: '{}' stopped", id);
        });

        Self { cancel, done }
    }

    /// Signals the task and waits until it has fully exited.
    async fn stop(self) {
        let _ = self.cancel.send(());
        if let Err(e) = self.done.await {
            error!("Heartbeat: Task ended abnormally: {}", e);
        }
    }
}

/// Registers services and keeps their health checks passing.
pub struct RegistrationCoordinator {
    registry: Arc<dyn ServiceRegistry>,
    policy: HealthPolicy,
    heartbeats: Mutex<HashMap<ServiceId, Heartbeat>>,
    serials: Mutex<HashMap<ServiceId, Arc<AsyncMutex<()>>>>,
}

impl RegistrationCoordinator {
    pub fn new(registry: Arc<dyn ServiceRegistry>, policy: HealthPolicy) -> Self {
        Self {
            registry,
            policy,
            heartbeats: Mutex::new(HashMap::new()),
            serials: Mutex::new(HashMap::new()),
        }
    }

    fn heartbeats(&self) -> MutexGuard<'_, HashMap<ServiceId, Heartbeat>> {
        self.heartbeats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The lock serializing operations on `id`.
    fn serial(&self, id: &ServiceId) -> Arc<AsyncMutex<()>> {
        self.serials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Registers `service` and starts its heartbeat.
    ///
    /// Registering an identity that already has a heartbeat refreshes the
    /// registry record and leaves the existing heartbeat alone. When the
    /// registry call fails nothing is started and nothing is recorded.
    pub async fn register(&self, service: &Service) -> Result<(), RegistryError> {
        let id = service.id();
        let serial = self.serial(&id);
        let _serial = serial.lock().await;
        self.registry.register(service, &self.policy).await?;

        let mut heartbeats = self.heartbeats();
        if heartbeats.contains_key(&id) {
            info!("Coordinator: '{}' re-registered, heartbeat already running", id);
            return Ok(());
        }

        let heartbeat = Heartbeat::start(
            self.registry.clone(),
            id.clone(),
            self.policy.renew_interval(),
        );
        heartbeats.insert(id.clone(), heartbeat);
        info!(
            "Coordinator: '{}' registered, renewing every {:?}",
            id,
            self.policy.renew_interval()
        );
        Ok(())
    }

    /// Deregisters `id` and stops its heartbeat.
    ///
    /// Unknown identities are a no-op. The heartbeat is stopped, and this only
    /// returns once it has exited, whether or not the registry call succeeded.
    /// A failed deregistration is reported to the caller; the registry drops
    /// the entry by itself once its check has been critical long enough.
    pub async fn deregister(&self, id: &ServiceId) -> Result<(), RegistryError> {
        let serial = self.serial(id);
        let _serial = serial.lock().await;
        let heartbeat = self.heartbeats().remove(id);
        let Some(heartbeat) = heartbeat else {
            debug!("Coordinator: '{}' is not registered, nothing to do", id);
            return Ok(());
        };

        let result = self.registry.deregister(id).await;
        heartbeat.stop().await;

        match &result {
            Ok(()) => info!("Coordinator: '{}' deregistered", id),
            Err(e) => warn!(
                "Coordinator: '{}' heartbeat stopped but deregistration failed: {}",
                id, e
            ),
        }
        result
    }

    /// Identities with a live heartbeat, sorted.
    pub fn registered(&self) -> Vec<ServiceId> {
        let mut ids: Vec<ServiceId> = self.heartbeats().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_registered(&self, id: &ServiceId) -> bool {
        self.heartbeats().contains_key(id)
    }
}
