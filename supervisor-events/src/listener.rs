use crate::error::ProtocolError;
use crate::messages::{Ack, READY_TOKEN};
use crate::model::{Event, Header};
use log::debug;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
    Stdout,
};

/// One decoded header + payload exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    header: Header,
    event: Event,
}

impl Notification {
    pub fn new(header: Header, event: Event) -> Self {
        Self { header, event }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn into_event(self) -> Event {
        self.event
    }
}

/// The listener end of the supervisord event-listener protocol.
///
/// The exchange is strictly synchronous: `await_notification` announces
/// `READY` and reads one notification, then the caller must `acknowledge` it
/// exactly once before asking for the next one.
///
/// See http://supervisord.org/events.html for the protocol.
pub struct EventListener<R, W> {
    reader: R,
    writer: W,
}

impl EventListener<BufReader<Stdin>, Stdout> {
    /// A listener bound to the process stdin/stdout, as supervisord spawns it.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> EventListener<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Announces readiness and blocks until the next notification is read.
    pub async fn await_notification(&mut self) -> Result<Notification, ProtocolError> {
        self.send(READY_TOKEN.as_bytes()).await?;

        let header = self.read_header().await?;
        let payload = self.read_payload(header.len()).await?;
        let event = Event::decode(header.event_name(), &payload)?;

        debug!(
            "Listener: serial {} ({}) {}",
            header.serial(),
            header.event_name(),
            event.qualified_name()
        );
        Ok(Notification::new(header, event))
    }

    /// Reports the outcome of the last notification.
    pub async fn acknowledge(&mut self, success: bool) -> Result<(), ProtocolError> {
        let token = Ack::from_success(success).encode();
        self.send(token.as_bytes()).await
    }

    pub async fn ok(&mut self) -> Result<(), ProtocolError> {
        self.acknowledge(true).await
    }

    pub async fn fail(&mut self) -> Result<(), ProtocolError> {
        self.acknowledge(false).await
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_header(&mut self) -> Result<Header, ProtocolError> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(ProtocolError::Closed);
        }
        if line.last() != Some(&b'\n') {
            return Err(ProtocolError::TruncatedHeader(
                String::from_utf8_lossy(&line).into_owned(),
            ));
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let line = std::str::from_utf8(&line).map_err(|_| ProtocolError::InvalidEncoding)?;
        Header::decode(line)
    }

    /// `len` comes off the wire, so the buffer only grows with the bytes
    /// actually received.
    async fn read_payload(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut payload = Vec::new();
        let received = (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)
            .await?;
        if received < len {
            return Err(ProtocolError::TruncatedPayload {
                expected: len,
                received,
            });
        }
        Ok(payload)
    }
}
