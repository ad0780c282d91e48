//! Queue backends.

/// In-memory priority-then-FIFO queue.
pub mod memory;

pub use memory::InMemoryQueue;
