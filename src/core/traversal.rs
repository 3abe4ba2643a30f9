//! Directory traversal
//!
//! Copies one directory: applies the existing-directory policy, creates the
//! destination, walks the children either one after another or fanned out
//! on the worker pool, then restores ownership, times and permission bits.

use crate::config::{DirExistsAction, Policy};
use crate::core::context::{CopyCounters, TraversalContext};
use crate::core::engine::{copy_next_or_skip, Entry};
use crate::error::{CopyError, IoResultExt, Result};
use crate::fs::metadata::{preserve_owner, preserve_times};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Copy the directory described by `entry`
pub(crate) fn copy_dir(entry: &Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    if !apply_dir_exists_policy(entry, policy, ctx)? {
        return Ok(());
    }

    let finalize = policy.permission().prepare(&entry.meta, &entry.dest)?;
    let mut outcome = copy_contents(entry, policy, ctx);
    finalize(&mut outcome);
    outcome
}

/// Returns `false` when the existing destination must be left untouched
fn apply_dir_exists_policy(entry: &Entry, policy: &Policy, ctx: &TraversalContext) -> Result<bool> {
    match std::fs::metadata(&entry.dest) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(CopyError::io(&entry.dest, e)),
    }

    // The destination the caller named is always merged into
    if ctx.is_root_dest(&entry.dest) {
        return Ok(true);
    }

    match policy.dir_exists_action(&entry.source, &entry.dest) {
        Some(DirExistsAction::Replace) => {
            debug!("Replacing existing {}", entry.dest.display());
            remove_tree(&entry.dest)?;
            Ok(true)
        }
        Some(DirExistsAction::Untouchable) => {
            debug!("Leaving existing {} untouched", entry.dest.display());
            CopyCounters::add(&ctx.counters().skipped, 1);
            Ok(false)
        }
        Some(DirExistsAction::Merge) | None => Ok(true),
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(path).with_path(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path).with_path(path)
    } else {
        std::fs::remove_file(path).with_path(path)
    }
}

fn copy_contents(entry: &Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    let children = match policy.fs().read_dir(&entry.source) {
        Ok(children) => children,
        // Only the directory itself going missing is benign
        Err(e) if e.is_not_found() && e.path() == Some(&entry.source) => {
            debug!("Directory vanished: {}", entry.source.display());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let children: Vec<Entry> = children
        .into_iter()
        .map(|child| {
            Entry::new(
                entry.source.join(&child.name),
                entry.dest.join(&child.name),
                child.meta,
            )
        })
        .collect();

    if policy.should_copy_concurrent(&entry.source, &entry.dest)? {
        copy_concurrent(children, policy, ctx)?;
    } else {
        copy_sequential(children, policy, ctx)?;
    }
    CopyCounters::add(&ctx.counters().dirs, 1);

    if policy.preserve_owner() {
        preserve_owner(&entry.dest, &entry.meta)?;
    }
    if policy.preserve_times() {
        preserve_times(&entry.dest, &entry.meta)?;
    }
    Ok(())
}

/// Children in order; the first failure ends the directory
fn copy_sequential(children: Vec<Entry>, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    for child in children {
        ctx.cancel_signal().check()?;
        copy_next_or_skip(child, policy, ctx)?;
    }
    Ok(())
}

/// One task per child; the first failure cancels the whole copy
///
/// Returns once every spawned task has finished.
fn copy_concurrent(children: Vec<Entry>, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    let first_error: Mutex<Option<CopyError>> = Mutex::new(None);

    rayon::scope(|scope| {
        for child in children {
            let first_error = &first_error;
            scope.spawn(move |_| {
                let outcome = ctx
                    .cancel_signal()
                    .check()
                    .and_then(|_| copy_next_or_skip(child, policy, ctx));

                if let Err(e) = outcome {
                    if !e.is_cancelled() {
                        warn!("{}; cancelling remaining copies", e);
                    }
                    ctx.cancel();
                    record_first_error(first_error, e);
                }
            });
        }
    });

    let first_error = match first_error.into_inner() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Keep the first error, but let a real failure displace a cancellation
fn record_first_error(slot: &Mutex<Option<CopyError>>, error: CopyError) {
    let mut slot = match slot.lock() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    let replace = match slot.as_ref() {
        None => true,
        Some(existing) => existing.is_cancelled() && !error.is_cancelled(),
    };
    if replace {
        *slot = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::fs::source::{DirEntry, EntryMeta, OsFs, SourceFs};
    use std::io::Read;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Lists every directory as failing on a child that disappeared mid-listing
    #[derive(Debug)]
    struct VanishingChildFs {
        child: &'static str,
    }

    impl SourceFs for VanishingChildFs {
        fn symlink_metadata(&self, path: &Path) -> Result<EntryMeta> {
            OsFs.symlink_metadata(path)
        }

        fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
            Err(CopyError::io(
                path.join(self.child),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ))
        }

        fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
            OsFs.open(path)
        }

        fn read_link(&self, path: &Path) -> Result<PathBuf> {
            OsFs.read_link(path)
        }
    }

    #[test]
    fn test_record_first_error_prefers_real_failure() {
        let slot = Mutex::new(None);
        record_first_error(&slot, CopyError::Cancelled);
        record_first_error(&slot, CopyError::callback("disk full"));
        record_first_error(&slot, CopyError::callback("later"));
        record_first_error(&slot, CopyError::Cancelled);

        let kept = slot.into_inner().unwrap().unwrap();
        assert!(matches!(kept, CopyError::Callback(ref m) if m == "disk full"));
    }

    #[test]
    fn test_copy_dir_vanished_source_creates_empty_dest() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out");
        let policy = Options::new().resolve();
        let ctx = TraversalContext::new(&dest, 1);

        let entry = Entry::new(dir.path().join("gone"), &dest, EntryMeta::dir(0o755));
        copy_dir(&entry, &policy, &ctx).unwrap();
        assert!(dest.is_dir());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_replace_over_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/x"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("out/sub"), b"was a file").unwrap();

        let policy = Options::new()
            .dir_exists_action(DirExistsAction::Replace)
            .resolve();
        let ctx = TraversalContext::new(dir.path().join("out"), 1);
        let entry = Entry::new(dir.path().join("src"), dir.path().join("out/sub"), EntryMeta::dir(0o755));

        copy_dir(&entry, &policy, &ctx).unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/sub/x")).unwrap(), b"x");
    }

    #[test]
    fn test_cancelled_context_stops_sequential_walk() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/x"), b"x").unwrap();

        let dest = dir.path().join("out");
        let policy = Options::new().resolve();
        let ctx = TraversalContext::new(&dest, 1);
        ctx.cancel();

        let entry = Entry::new(dir.path().join("src"), &dest, EntryMeta::dir(0o755));
        let err = copy_dir(&entry, &policy, &ctx).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.join("x").exists());
    }

    #[test]
    fn test_missing_child_fails_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a"), b"a").unwrap();
        std::fs::write(dir.path().join("src/b"), b"b").unwrap();

        let dest = dir.path().join("out");
        let policy = Options::new()
            .source_fs(VanishingChildFs { child: "a" })
            .resolve();
        let ctx = TraversalContext::new(&dest, 1);

        let entry = Entry::new(dir.path().join("src"), &dest, EntryMeta::dir(0o755));
        let err = copy_dir(&entry, &policy, &ctx).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.path(), Some(&dir.path().join("src/a")));
    }

    #[test]
    fn test_cancelled_context_stops_concurrent_walk() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        for i in 0..8 {
            std::fs::write(dir.path().join(format!("src/file_{}", i)), b"data").unwrap();
        }

        let dest = dir.path().join("out");
        let policy = Options::new().workers(2).resolve();
        let ctx = TraversalContext::new(&dest, 2);
        ctx.cancel();

        let entry = Entry::new(dir.path().join("src"), &dest, EntryMeta::dir(0o755));
        let err = copy_dir(&entry, &policy, &ctx).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }
}
