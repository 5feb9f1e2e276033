use crate::error::ProtocolError;
use crate::messages::{Ack, READY_TOKEN, RESULT_PREFIX};
use crate::model::{Event, Header};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The supervisor end of the event-listener protocol.
///
/// Drives an [`EventListener`](crate::EventListener) the way supervisord does:
/// wait for `READY`, push one notification, read back the framed result.
pub struct NotificationEmitter<R, W> {
    reader: R,
    writer: W,
    serial: u64,
}

impl<R, W> NotificationEmitter<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            serial: 0,
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Full exchange for one event.
    pub async fn notify(&mut self, event: &Event) -> Result<Ack, ProtocolError> {
        self.wait_ready().await?;
        self.send(event).await?;
        self.read_result().await
    }

    /// Blocks until the listener announces `READY`.
    pub async fn wait_ready(&mut self) -> Result<(), ProtocolError> {
        let line = self.read_line().await?;
        if line != READY_TOKEN {
            return Err(ProtocolError::UnexpectedReply(line));
        }
        Ok(())
    }

    /// Writes the header and payload for `event`; returns the header sent.
    pub async fn send(&mut self, event: &Event) -> Result<Header, ProtocolError> {
        self.serial += 1;
        let payload = event.encode();
        let header =
            Header::new(event.kind().name(), payload.len()).with_serial(self.serial, self.serial);

        self.send_raw(&header.encode(), payload.as_bytes()).await?;
        Ok(header)
    }

    /// Writes a header line and payload verbatim, without any validation.
    pub async fn send_raw(&mut self, header_line: &str, payload: &[u8]) -> Result<(), ProtocolError> {
        self.writer.write_all(header_line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.write_all(payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one `RESULT <n>\n<payload>` frame.
    pub async fn read_result(&mut self) -> Result<Ack, ProtocolError> {
        let line = self.read_line().await?;
        let len: usize = line
            .strip_prefix(RESULT_PREFIX)
            .and_then(|rest| rest.trim_end().parse().ok())
            .ok_or_else(|| ProtocolError::UnexpectedReply(line.clone()))?;

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
        let payload = String::from_utf8_lossy(&payload);
        Ack::parse(&payload).ok_or_else(|| ProtocolError::UnexpectedReply(payload.into_owned()))
    }

    async fn read_line(&mut self) -> Result<String, ProtocolError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(ProtocolError::Closed);
        }
        Ok(line)
    }
}
