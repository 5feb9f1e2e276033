pub mod dispatcher;
pub mod queue;

pub use dispatcher::{Action, Dispatcher};
pub use queue::{channel, DispatchClosed, DispatchQueue, DispatchWorker};
