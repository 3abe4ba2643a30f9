//! Symbolic link handling

use crate::config::{Policy, SymlinkAction};
use crate::core::context::{CopyCounters, TraversalContext};
use crate::core::engine::{copy_next_or_skip, Entry};
use crate::error::{CopyError, Result};
use crate::fs::metadata::preserve_link_times;
use crate::fs::operations::{create_symlink, ensure_parent, remove_existing};
use crate::fs::source::SourceFs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Links followed in one chain before giving up
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Apply the symlink policy to the link described by `entry`
pub(crate) fn copy_symlink(entry: &Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    match policy.symlink_action(&entry.source) {
        SymlinkAction::Deep => copy_deep(entry, policy, ctx),
        SymlinkAction::Shallow => {
            if !copy_shallow(entry, policy.fs())? {
                return Ok(());
            }
            CopyCounters::add(&ctx.counters().symlinks, 1);
            if policy.preserve_times() {
                preserve_link_times(&entry.dest, &entry.meta)?;
            }
            Ok(())
        }
        SymlinkAction::Skip => {
            debug!("Skipping link {}", entry.source.display());
            CopyCounters::add(&ctx.counters().skipped, 1);
            Ok(())
        }
    }
}

/// Target of `link`, relative targets taken from the link's own directory
fn resolve_target(fs: &dyn SourceFs, link: &Path) -> Result<PathBuf> {
    let target = fs.read_link(link)?;
    if target.is_absolute() {
        return Ok(target);
    }
    Ok(match link.parent() {
        Some(parent) => parent.join(target),
        None => target,
    })
}

/// Copy whatever the link chain ends at into the link's destination
fn copy_deep(entry: &Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    let fs = policy.fs();
    let mut target = resolve_target(fs, &entry.source)?;
    let mut meta = fs.symlink_metadata(&target)?;

    let mut hops = 1;
    while meta.is_symlink() {
        if hops >= MAX_SYMLINK_HOPS {
            return Err(CopyError::symlink(
                &entry.source,
                format!("more than {} levels of symbolic links", MAX_SYMLINK_HOPS),
            ));
        }
        target = resolve_target(fs, &target)?;
        meta = fs.symlink_metadata(&target)?;
        hops += 1;
    }

    debug!("Following {} -> {}", entry.source.display(), target.display());
    copy_next_or_skip(Entry::new(target, entry.dest.clone(), meta), policy, ctx)
}

/// Recreate the link with its raw target; `false` if the link vanished
fn copy_shallow(entry: &Entry, fs: &dyn SourceFs) -> Result<bool> {
    let target = match fs.read_link(&entry.source) {
        Ok(target) => target,
        Err(e) if e.is_not_found() => {
            debug!("Link vanished: {}", entry.source.display());
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    ensure_parent(&entry.dest)?;
    remove_existing(&entry.dest)?;
    create_symlink(&target, &entry.dest)?;
    Ok(true)
}
