//! # Supervisor Events
//!
//! The supervisord event-listener protocol, seen from both ends of the pipe.
//!
//! ## Modules
//! - `model`: `Header` and `Event`, decoded from (and encoded to) `key:value` tokens.
//! - `messages`: The fixed protocol tokens (`READY`, `RESULT`) and the `Ack` outcome.
//! - `listener`: The listener side of the handshake (what an agent runs).
//! - `emitter`: The supervisor side of the handshake (used to drive a listener).
//! - `error`: `ProtocolError`, fatal for the listener loop.

pub mod emitter;
pub mod error;
pub mod listener;
pub mod messages;
pub mod model;

pub use emitter::NotificationEmitter;
pub use error::ProtocolError;
pub use listener::{EventListener, Notification};
pub use messages::Ack;
pub use model::{Event, EventKind, Header, ProcessState};
