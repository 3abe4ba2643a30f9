//! Core copy engine module
//!
//! Provides the dispatcher, directory traversal, symlink resolution and
//! the per-copy context shared by concurrent branches.

mod context;
mod engine;
mod symlink;
mod traversal;

pub use context::{AdmissionToken, CancelSignal, CopyCounters, TokenPool, TraversalContext};
pub use engine::{copy, CopyEngine, CopySummary, Entry};
pub use symlink::MAX_SYMLINK_HOPS;
