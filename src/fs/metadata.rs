//! Owner and timestamp preservation
//!
//! Same three calls on every platform; where a concept does not exist the
//! call is a no-op.

use crate::error::{IoResultExt, Result};
use crate::fs::source::EntryMeta;
use filetime::FileTime;
use std::path::Path;

/// Give `dest` the owner and group recorded in `meta`
///
/// Entries without ownership information (non-Unix platforms, in-memory
/// sources) are left alone.
#[cfg(unix)]
pub fn preserve_owner(dest: &Path, meta: &EntryMeta) -> Result<()> {
    use nix::unistd::{chown, Gid, Uid};

    if meta.uid.is_none() && meta.gid.is_none() {
        return Ok(());
    }
    chown(dest, meta.uid.map(Uid::from_raw), meta.gid.map(Gid::from_raw))
        .map_err(std::io::Error::from)
        .with_path(dest)
}

#[cfg(not(unix))]
pub fn preserve_owner(_dest: &Path, _meta: &EntryMeta) -> Result<()> {
    Ok(())
}

/// Give `dest` the access and modification times recorded in `meta`
pub fn preserve_times(dest: &Path, meta: &EntryMeta) -> Result<()> {
    let (atime, mtime) = file_times(meta);
    filetime::set_file_times(dest, atime, mtime).with_path(dest)
}

/// Give the symlink `dest` (not its target) the times recorded for the
/// source link
pub fn preserve_link_times(dest: &Path, meta: &EntryMeta) -> Result<()> {
    let (atime, mtime) = file_times(meta);
    filetime::set_symlink_file_times(dest, atime, mtime).with_path(dest)
}

fn file_times(meta: &EntryMeta) -> (FileTime, FileTime) {
    let mtime = meta
        .modified
        .map(FileTime::from_system_time)
        .unwrap_or_else(FileTime::now);
    let atime = meta.accessed.map(FileTime::from_system_time).unwrap_or(mtime);
    (atime, mtime)
}
