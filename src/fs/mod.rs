//! File system module
//!
//! Source filesystems, destination-side leaf operations, and metadata
//! and permission handling used by the copy engine.

pub mod memory;
pub mod metadata;
pub mod operations;
pub mod path;
pub mod permission;
pub mod source;

pub use memory::MemFs;
pub use operations::{copy_file, move_file, FileCopier, DEFAULT_BUFFER_SIZE};
pub use path::{absolutize, assure_home_dir, expand_home};
pub use permission::{Finalizer, PermissionControl};
pub use source::{DirEntry, EntryKind, EntryMeta, OsFs, SourceFs};
