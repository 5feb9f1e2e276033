//! # Dispatch Queue
//!
//! Hands decoded events from the protocol loop to the registry side.
//!
//! ## Purpose
//! The protocol loop must acknowledge every notification without waiting on
//! the registry. It only pushes the event onto this queue and replies. A
//! [`DispatchWorker`] drains the queue, so a slow registry never stalls the
//! conversation with the supervisor.
//!
//! Actions for one identity run in submission order on that identity's lane;
//! different identities run concurrently.

use super::{Action, Dispatcher};
use crate::service::ServiceId;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use supervisor_events::Event;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

/// The worker side of the queue is gone.
#[derive(Debug, Error)]
#[error("dispatch worker has stopped, dropped {0} event")]
pub struct DispatchClosed(pub String);

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Event>,
}

impl DispatchQueue {
    /// Enqueues `event` without waiting.
    pub fn submit(&self, event: Event) -> Result<(), DispatchClosed> {
        self.sender
            .send(event)
            .map_err(|rejected| DispatchClosed(rejected.0.kind().to_string()))
    }
}

/// Consumer half: decides every queued event and applies the action on the
/// lane of its identity.
pub struct DispatchWorker {
    receiver: mpsc::UnboundedReceiver<Event>,
    dispatcher: Arc<Dispatcher>,
}

/// Creates a connected queue / worker pair.
pub fn channel(dispatcher: Arc<Dispatcher>) -> (DispatchQueue, DispatchWorker) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        DispatchQueue { sender },
        DispatchWorker {
            receiver,
            dispatcher,
        },
    )
}

impl DispatchWorker {
    /// Runs until every [`DispatchQueue`] is dropped, then waits for the
    /// actions still queued on the lanes.
    pub async fn run(mut self) {
        info!("Dispatch worker: Started");
        let mut lanes: HashMap<ServiceId, mpsc::UnboundedSender<Action>> = HashMap::new();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                received = self.receiver.recv() => match received {
                    Some(event) => self.route(&event, &mut lanes, &mut tasks),
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
            }
        }

        // Closing the lanes lets each one finish its backlog and exit.
        drop(lanes);
        debug!("Dispatch worker: Queue closed, {} lane(s) draining", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        info!("Dispatch worker: Stopped");
    }

    fn route(
        &self,
        event: &Event,
        lanes: &mut HashMap<ServiceId, mpsc::UnboundedSender<Action>>,
        tasks: &mut JoinSet<()>,
    ) {
        let Some(mut action) = self.dispatcher.decide(event) else {
            debug!(
                "Dispatch worker: Ignored {} for '{}'",
                event.kind(),
                event.qualified_name()
            );
            return;
        };
        let id = action.id();

        if let Some(lane) = lanes.get(&id) {
            match lane.send(action) {
                Ok(()) => return,
                // The lane task died (it panicked); open a fresh one.
                Err(rejected) => action = rejected.0,
            }
        }

        let (lane, actions) = mpsc::unbounded_channel();
        if lane.send(action).is_ok() {
            tasks.spawn(run_lane(self.dispatcher.clone(), id.clone(), actions));
            lanes.insert(id, lane);
        }
    }
}

/// Applies the actions of one identity, one at a time.
async fn run_lane(
    dispatcher: Arc<Dispatcher>,
    id: ServiceId,
    mut actions: mpsc::UnboundedReceiver<Action>,
) {
    debug!("Dispatch worker: Lane for '{}' opened", id);
    while let Some(action) = actions.recv().await {
        if let Err(e) = dispatcher.apply(&action).await {
            error!("Dispatch worker: {:?} failed: {}", action, e);
        }
    }
}

fn reap(joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!("Dispatch worker: Task panicked: {}", e),
        Err(e) => warn!("Dispatch worker: Task cancelled: {}", e),
    }
}
