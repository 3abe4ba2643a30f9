//! # treecopy - Recursive File Tree Copy
//!
//! treecopy copies a single file, a symbolic link, a special file, or an
//! entire directory tree from a source to a destination, with every
//! decision along the way open to caller policy.
//!
//! ## Features
//!
//! - **Symlink Policy**: Follow links (deep), recreate them (shallow), or skip them
//! - **Existing Directories**: Merge into, replace, or leave them untouched
//! - **Filtering and Renaming**: Per-entry skip predicate and destination rename hook
//! - **Bounded Concurrency**: Directory children fanned out on a work-stealing pool,
//!   with at most `workers` files open at once
//! - **Permissions**: Read-only source directories still receive their children
//! - **Metadata**: Optional owner and timestamp preservation
//! - **Special Files**: Named pipes and device nodes recreated on request
//! - **Pluggable Sources**: Copy out of an in-memory tree as easily as from disk
//!
//! ## Quick Start
//!
//! ```no_run
//! use treecopy::{copy, Options};
//!
//! copy("/source", "/destination", Options::new()).unwrap();
//! ```
//!
//! ## Advanced Usage
//!
//! ```no_run
//! use treecopy::config::{DirExistsAction, Options, SymlinkAction};
//! use treecopy::core::CopyEngine;
//!
//! let options = Options::new()
//!     .symlink_action(SymlinkAction::Deep)
//!     .dir_exists_action(DirExistsAction::Replace)
//!     .skip(|src, _, _| Ok(src.ends_with(".git")))
//!     .preserve_times(true)
//!     .workers(8);
//!
//! let summary = CopyEngine::new(options).execute("~/project", "/backup/project").unwrap();
//! summary.print_summary();
//! ```
//!
//! ## Copying Bundled Assets
//!
//! ```no_run
//! use treecopy::fs::MemFs;
//! use treecopy::{copy, Options};
//!
//! let assets = MemFs::new()
//!     .with_file("site/index.html", "<html></html>")
//!     .with_symlink("site/home.html", "index.html");
//!
//! copy("site", "/var/www/site", Options::new().source_fs(assets)).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;

// Re-export commonly used types
pub use config::{CopyConfig, DirExistsAction, Options, Policy, SymlinkAction};
pub use core::{copy, CopyEngine, CopySummary};
pub use error::{CopyError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use treecopy::prelude::*;
    //! ```

    pub use crate::config::{CopyConfig, DirExistsAction, Options, Policy, SymlinkAction};
    pub use crate::core::{copy, CopyEngine, CopySummary};
    pub use crate::error::{CopyError, IoResultExt, Result};
    pub use crate::fs::{copy_file, move_file, EntryKind, EntryMeta, MemFs, OsFs, PermissionControl, SourceFs};
}
