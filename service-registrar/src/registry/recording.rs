//! A fake registry that records every call, for tests.
use crate::config::HealthPolicy;
use crate::registry::traits::{RegistryError, ServiceRegistry};
use crate::service::{Service, ServiceId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Register,
    Renew,
    Deregister,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCall {
    pub operation: Operation,
    pub id: ServiceId,
}

#[derive(Default)]
pub struct RecordingRegistry {
    calls: Mutex<Vec<RegistryCall>>,
    failing: Mutex<HashSet<Operation>>,
    register_delay: Duration,
    renew_delay: Duration,
    renewals_in_flight: AtomicUsize,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registration takes `delay` before it completes.
    pub fn with_register_delay(mut self, delay: Duration) -> Self {
        self.register_delay = delay;
        self
    }

    /// Every renewal takes `delay` before it completes.
    pub fn with_renew_delay(mut self, delay: Duration) -> Self {
        self.renew_delay = delay;
        self
    }

    /// Makes `operation` fail (still recorded) until switched back.
    pub fn set_failing(&self, operation: Operation, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(operation);
        } else {
            set.remove(&operation);
        }
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: Operation, id: &ServiceId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.operation == operation && &call.id == id)
            .count()
    }

    pub fn total(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn renewals_in_flight(&self) -> usize {
        self.renewals_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, operation: Operation, id: &ServiceId) -> Result<(), RegistryError> {
        self.calls.lock().unwrap().push(RegistryCall {
            operation,
            id: id.clone(),
        });
        if self.failing.lock().unwrap().contains(&operation) {
            return Err(RegistryError::Unavailable(format!(
                "{:?} of {} failed",
                operation, id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for RecordingRegistry {
    async fn register(
        &self,
        service: &Service,
        _policy: &HealthPolicy,
    ) -> Result<(), RegistryError> {
        if !self.register_delay.is_zero() {
            tokio::time::sleep(self.register_delay).await;
        }
        self.record(Operation::Register, &service.id())
    }

    async fn renew(&self, id: &ServiceId) -> Result<(), RegistryError> {
        self.renewals_in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.renew_delay.is_zero() {
            tokio::time::sleep(self.renew_delay).await;
        }
        let result = self.record(Operation::Renew, id);
        self.renewals_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn deregister(&self, id: &ServiceId) -> Result<(), RegistryError> {
        self.record(Operation::Deregister, id)
    }
}
