//! `docket-queue`: dispatch messages and the work queue that carries them.

pub mod in_memory;
pub mod message;
pub mod queue;

pub use in_memory::InMemoryDispatchQueue;
pub use message::DispatchMessage;
pub use queue::{DispatchQueue, QueueError};
