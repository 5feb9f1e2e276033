use crate::config::HealthPolicy;
use crate::coordinator::RegistrationCoordinator;
use crate::dispatch::{self, DispatchQueue, Dispatcher};
use crate::registry::{ServiceRegistry, TargetCatalog};
use log::{debug, error, info, warn};
use std::sync::Arc;
use supervisor_events::{EventListener, ProtocolError};
use tokio::io::{AsyncBufRead, AsyncWrite};

/// The registrar as a whole: targets, coordinator and dispatch pipeline.
pub struct Agent {
    dispatcher: Arc<Dispatcher>,
}

impl Agent {
    pub fn new(
        targets: TargetCatalog,
        registry: Arc<dyn ServiceRegistry>,
        policy: HealthPolicy,
    ) -> Self {
        let coordinator = Arc::new(RegistrationCoordinator::new(registry, policy));
        Self {
            dispatcher: Arc::new(Dispatcher::new(targets, coordinator)),
        }
    }

    pub fn coordinator(&self) -> &Arc<RegistrationCoordinator> {
        self.dispatcher.coordinator()
    }

    /// Serves `listener` until the protocol fails, then lets the dispatches
    /// already queued finish.
    ///
    /// Always returns an error: the supervisor never ends the conversation
    /// cleanly, it just closes the pipe.
    pub async fn run<R, W>(&self, listener: &mut EventListener<R, W>) -> Result<(), ProtocolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (queue, worker) = dispatch::channel(self.dispatcher.clone());
        let worker = tokio::spawn(worker.run());

        let result = serve(listener, &queue).await;

        drop(queue);
        if let Err(e) = worker.await {
            error!("Agent: Dispatch worker ended abnormally: {}", e);
        }
        result
    }
}

/// The listener loop.
///
/// Every well-formed notification is queued and acknowledged with `OK`
/// before the next one is requested, whatever the registry later makes of
/// it. A malformed one is answered with `FAIL` when the stream still allows
/// a reply, and ends the loop either way.
pub async fn serve<R, W>(
    listener: &mut EventListener<R, W>,
    queue: &DispatchQueue,
) -> Result<(), ProtocolError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Agent: Listening for supervisor events...");
    loop {
        let notification = match listener.await_notification().await {
            Ok(notification) => notification,
            Err(e) => {
                if e.can_reply() {
                    if let Err(reply_err) = listener.fail().await {
                        warn!("Agent: Could not reject notification: {}", reply_err);
                    }
                }
                return Err(e);
            }
        };

        debug!(
            "Agent: serial {} {} for '{}'",
            notification.header().serial(),
            notification.event().kind(),
            notification.event().qualified_name()
        );
        if let Err(e) = queue.submit(notification.into_event()) {
            error!("Agent: {}", e);
        }
        listener.ok().await?;
    }
}
