//! Destination permission handling
//!
//! Permission control runs in two phases. Before content is written it
//! creates destination directories with a writable intermediate mode, so a
//! read-only source directory does not block its own children. Once the
//! entry is complete the returned [`Finalizer`] applies the final bits.

use crate::error::{IoResultExt, Result};
use crate::fs::source::EntryMeta;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Mode used for directories while their contents are being copied
pub const WRITABLE_DIR_MODE: u32 = 0o755;

/// Deferred permission step for one destination entry
///
/// Receives the entry's outcome so far and records its own failure there
/// only if nothing failed earlier.
pub type Finalizer = Box<dyn FnOnce(&mut Result<()>) + Send>;

type PrepareFn = dyn Fn(&EntryMeta, &Path) -> Result<Finalizer> + Send + Sync;

/// Strategy deciding how destination entries get their permission bits
#[derive(Clone)]
pub struct PermissionControl {
    prepare: Arc<PrepareFn>,
}

impl fmt::Debug for PermissionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionControl").finish_non_exhaustive()
    }
}

impl Default for PermissionControl {
    fn default() -> Self {
        Self::preserve()
    }
}

impl PermissionControl {
    /// Build from a custom prepare function
    pub fn new<F>(prepare: F) -> Self
    where
        F: Fn(&EntryMeta, &Path) -> Result<Finalizer> + Send + Sync + 'static,
    {
        Self {
            prepare: Arc::new(prepare),
        }
    }

    /// Reproduce the source mode exactly
    pub fn preserve() -> Self {
        Self::add(0)
    }

    /// Reproduce the source mode OR'd with `bits` (at most 0o777 is meaningful)
    pub fn add(bits: u32) -> Self {
        Self::new(move |meta, dest| {
            if meta.is_dir() {
                create_dir_all(dest, WRITABLE_DIR_MODE)?;
            }
            let mode = meta.mode | bits;
            let dest = dest.to_path_buf();
            Ok(Box::new(move |outcome: &mut Result<()>| {
                record(outcome, set_mode(&dest, mode));
            }))
        })
    }

    /// Create directories with the source mode and never chmod afterwards
    pub fn do_nothing() -> Self {
        Self::new(|meta, dest| {
            if meta.is_dir() {
                create_dir_all(dest, meta.mode)?;
            }
            Ok(Box::new(|_: &mut Result<()>| {}))
        })
    }

    /// Run the first phase for `dest`, returning the deferred second phase
    pub fn prepare(&self, meta: &EntryMeta, dest: &Path) -> Result<Finalizer> {
        (self.prepare)(meta, dest)
    }
}

fn record(outcome: &mut Result<()>, result: Result<()>) {
    if let Err(e) = result {
        if outcome.is_ok() {
            *outcome = Err(e);
        }
    }
}

fn create_dir_all(path: &Path, mode: u32) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(path).with_path(path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).with_path(path)
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut permissions = std::fs::metadata(path).with_path(path)?.permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    std::fs::set_permissions(path, permissions).with_path(path)
}
