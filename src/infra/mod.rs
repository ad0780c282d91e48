//! Infrastructure adapters for queue storage.

/// Waiting-queue backends.
pub mod queue;

pub use queue::InMemoryQueue;
