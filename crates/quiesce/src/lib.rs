//! Quiesce - Hierarchical shutdown coordination for concurrent programs
//!
//! This crate provides a tree of closers: components register parent/child
//! teardown relationships, run teardown hooks in reverse registration
//! order, wait on asynchronous dependents before reaching their terminal
//! state, and collect every error raised along the way into one shared
//! aggregate. Closing is idempotent and deadlock-free, including two-way
//! trees closed concurrently from both ends.

mod cancel;
pub mod closer;
pub mod error;
mod hook;
pub mod signal;
pub mod waitgroup;

// Re-exports for convenience
pub use closer::{Closer, Relation};
pub use error::{BoxError, CloseError};
pub use signal::Signal;
pub use waitgroup::WaitGroup;
