use anyhow::Result;
use supervisor_events::{
    Ack, Event, EventKind, EventListener, NotificationEmitter, ProcessState, ProtocolError,
};
use tokio::io::{duplex, split, BufReader};

// Runs a listener against an emitter over an in-memory pipe:
// 1. the listener acknowledges every notification it can parse
// 2. the emitter observes READY before each send and one RESULT after it
// 3. decoded events are identical to the events emitted
#[tokio::test]
async fn test_handshake_over_duplex_pipe() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (agent, supervisor) = duplex(256);
    let (agent_rx, agent_tx) = split(agent);
    let (supervisor_rx, supervisor_tx) = split(supervisor);

    let listener_task = tokio::spawn(async move {
        let mut listener = EventListener::new(BufReader::new(agent_rx), agent_tx);
        let mut seen = Vec::new();
        loop {
            match listener.await_notification().await {
                Ok(notification) => {
                    seen.push(notification.into_event());
                    if let Err(e) = listener.ok().await {
                        return Err(e);
                    }
                }
                Err(ProtocolError::Closed) => return Ok::<_, ProtocolError>(seen),
                Err(e) => return Err(e),
            }
        }
    });

    let mut emitter = NotificationEmitter::new(BufReader::new(supervisor_rx), supervisor_tx);
    let events = vec![
        Event::new(EventKind::ProcessRunning, "web", "app")
            .with_from_state(ProcessState::Starting)
            .with_pid(123),
        Event::new(EventKind::ProcessStopping, "web", "app")
            .with_from_state(ProcessState::Running)
            .with_pid(123),
        Event::new(EventKind::ProcessExited, "worker", "batch")
            .with_from_state(ProcessState::Stopping),
    ];
    for event in &events {
        assert_eq!(emitter.notify(event).await?, Ack::Ok);
    }

    // One more READY is pending once the last RESULT was written.
    emitter.wait_ready().await?;
    drop(emitter);

    let seen = listener_task.await??;
    assert_eq!(seen, events);
    Ok(())
}

// A payload shorter than its declared length must stop the listener with a
// protocol error rather than blocking or misreading the next header.
#[tokio::test]
async fn test_short_payload_terminates_listener() -> Result<()> {
    let (agent, supervisor) = duplex(256);
    let (agent_rx, agent_tx) = split(agent);
    let (supervisor_rx, supervisor_tx) = split(supervisor);

    let listener_task = tokio::spawn(async move {
        let mut listener = EventListener::new(BufReader::new(agent_rx), agent_tx);
        listener.await_notification().await
    });

    let mut emitter = NotificationEmitter::new(BufReader::new(supervisor_rx), supervisor_tx);
    emitter.wait_ready().await?;
    emitter
        .send_raw("eventname:PROCESS_STATE_RUNNING len:64", b"processname:web")
        .await?;
    drop(emitter);

    let err = listener_task.await?.unwrap_err();
    assert!(
        matches!(
            err,
            ProtocolError::TruncatedPayload {
                expected: 64,
                received: 15
            }
        ),
        "unexpected error: {:?}",
        err
    );
    Ok(())
}
