use std::io;
use thiserror::Error;

/// Errors raised while speaking the event-listener protocol.
///
/// Every variant is fatal for the listener: the framing has no point at which
/// a reader could resynchronize, so the loop must stop.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Underlying I/O failure on the duplex stream.
    #[error("stream error: {0}")]
    Stream(#[from] io::Error),

    /// The supervisor closed the stream between two notifications.
    #[error("stream closed by supervisor")]
    Closed,

    /// The stream ended in the middle of a header line.
    #[error("truncated header line `{0}`")]
    TruncatedHeader(String),

    /// The stream ended before `len` payload bytes arrived.
    #[error("truncated payload: expected {expected} bytes, stream ended after {received}")]
    TruncatedPayload { expected: usize, received: usize },

    /// A token without the `key:value` separator.
    #[error("malformed token `{0}`")]
    MalformedToken(String),

    /// A numeric field that does not parse as a non-negative integer.
    #[error("invalid integer for `{key}`: `{value}`")]
    InvalidInteger { key: &'static str, value: String },

    /// A header without one of the keys the framing depends on.
    #[error("header is missing `{0}`")]
    MissingField(&'static str),

    /// Header line bytes are not UTF-8.
    #[error("header line is not valid UTF-8")]
    InvalidEncoding,

    /// A result frame that is not `RESULT <n>\n<OK|FAIL>`.
    #[error("unexpected reply `{0}`")]
    UnexpectedReply(String),
}

impl ProtocolError {
    /// Whether a `FAIL` result can still be written after this error.
    ///
    /// After an I/O failure or a closed stream there is nobody listening.
    pub fn can_reply(&self) -> bool {
        !matches!(
            self,
            ProtocolError::Stream(_)
                | ProtocolError::Closed
                | ProtocolError::TruncatedHeader(_)
                | ProtocolError::TruncatedPayload { .. }
        )
    }
}
