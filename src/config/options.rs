//! Copy policy
//!
//! [`Options`] is what callers fill in; any field left unset falls back to
//! a documented default when it is resolved into a [`Policy`]. A policy is
//! resolved once per top-level copy and then only read, so every
//! concurrent branch of that copy sees the same snapshot.

use crate::error::Result;
use crate::fs::operations::FileCopier;
use crate::fs::permission::PermissionControl;
use crate::fs::source::{EntryMeta, OsFs, SourceFs};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do with a symbolic link in the source
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkAction {
    /// Copy the contents of whatever the link points at
    Deep,
    /// Recreate the link itself with the same raw target
    #[default]
    Shallow,
    /// Leave the link out of the destination
    Skip,
}

/// What to do when a destination directory already exists
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirExistsAction {
    /// Overlay source entries onto the existing directory
    #[default]
    Merge,
    /// Delete the existing directory first
    Replace,
    /// Leave the existing directory exactly as it is
    Untouchable,
}

/// Chooses a [`SymlinkAction`] for a source link
pub type SymlinkFn = Arc<dyn Fn(&Path) -> SymlinkAction + Send + Sync>;
/// Chooses a [`DirExistsAction`] for `(source, destination)`
pub type DirExistsFn = Arc<dyn Fn(&Path, &Path) -> DirExistsAction + Send + Sync>;
/// Sees every terminal outcome for `(source, destination)` and may replace it
pub type ErrorFn = Arc<dyn Fn(&Path, &Path, Result<()>) -> Result<()> + Send + Sync>;
/// Returns `true` to leave `(source, destination)` out of the copy
pub type SkipFn = Arc<dyn Fn(&Path, &Path, &EntryMeta) -> Result<bool> + Send + Sync>;
/// Computes the destination actually used for `(source, destination)`
pub type RenameFn = Arc<dyn Fn(&Path, &Path) -> Result<PathBuf> + Send + Sync>;
/// Decides whether a directory's children are copied concurrently
pub type PreferConcurrentFn = Arc<dyn Fn(&Path, &Path) -> Result<bool> + Send + Sync>;

/// Caller-supplied copy options
///
/// ```
/// use treecopy::config::{DirExistsAction, Options, SymlinkAction};
///
/// let options = Options::new()
///     .on_symlink(|_| SymlinkAction::Deep)
///     .on_dir_exists(|_, _| DirExistsAction::Replace)
///     .skip(|src, _, _| Ok(src.ends_with(".git")))
///     .preserve_times(true)
///     .workers(8);
/// ```
#[derive(Clone, Default)]
pub struct Options {
    /// Symlink policy (default: always [`SymlinkAction::Shallow`])
    pub on_symlink: Option<SymlinkFn>,
    /// Existing-directory policy (default: always [`DirExistsAction::Merge`])
    pub on_dir_exists: Option<DirExistsFn>,
    /// Outcome hook (default: pass outcomes through unchanged)
    pub on_error: Option<ErrorFn>,
    /// Skip predicate (default: never skip)
    pub skip: Option<SkipFn>,
    /// Destination rename hook (default: keep the destination)
    pub rename: Option<RenameFn>,
    /// Copy devices and sockets instead of ignoring them
    pub specials: bool,
    /// Permission strategy (default: [`PermissionControl::preserve`])
    pub permission_control: Option<PermissionControl>,
    /// fsync every copied file
    pub sync: bool,
    /// Preserve uid and gid
    pub preserve_owner: bool,
    /// Preserve access and modification times
    pub preserve_times: bool,
    /// Stream buffer size (0 or unset: built-in default)
    pub buffer_size: Option<usize>,
    /// Maximum number of concurrent file copies (0 or 1: sequential)
    pub workers: usize,
    /// Per-directory concurrency veto (default: always concurrent)
    pub prefer_concurrent: Option<PreferConcurrentFn>,
    /// Filesystem to read from (default: [`OsFs`])
    pub source_fs: Option<Arc<dyn SourceFs>>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("on_symlink", &self.on_symlink.is_some())
            .field("on_dir_exists", &self.on_dir_exists.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("skip", &self.skip.is_some())
            .field("rename", &self.rename.is_some())
            .field("specials", &self.specials)
            .field("permission_control", &self.permission_control)
            .field("sync", &self.sync)
            .field("preserve_owner", &self.preserve_owner)
            .field("preserve_times", &self.preserve_times)
            .field("buffer_size", &self.buffer_size)
            .field("workers", &self.workers)
            .field("prefer_concurrent", &self.prefer_concurrent.is_some())
            .field("source_fs", &self.source_fs)
            .finish()
    }
}

impl Options {
    /// Options with every field unset
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the symlink policy
    pub fn on_symlink<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path) -> SymlinkAction + Send + Sync + 'static,
    {
        self.on_symlink = Some(Arc::new(f));
        self
    }

    /// Use the same symlink action for every link
    pub fn symlink_action(self, action: SymlinkAction) -> Self {
        self.on_symlink(move |_| action)
    }

    /// Set the existing-directory policy
    pub fn on_dir_exists<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path, &Path) -> DirExistsAction + Send + Sync + 'static,
    {
        self.on_dir_exists = Some(Arc::new(f));
        self
    }

    /// Use the same existing-directory action everywhere
    pub fn dir_exists_action(self, action: DirExistsAction) -> Self {
        self.on_dir_exists(move |_, _| action)
    }

    /// Set the outcome hook
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path, &Path, Result<()>) -> Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Set the skip predicate
    pub fn skip<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path, &Path, &EntryMeta) -> Result<bool> + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(f));
        self
    }

    /// Set the destination rename hook
    pub fn rename<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path, &Path) -> Result<PathBuf> + Send + Sync + 'static,
    {
        self.rename = Some(Arc::new(f));
        self
    }

    /// Copy devices and sockets
    pub fn specials(mut self, specials: bool) -> Self {
        self.specials = specials;
        self
    }

    /// Set the permission strategy
    pub fn permission_control(mut self, control: PermissionControl) -> Self {
        self.permission_control = Some(control);
        self
    }

    /// fsync every copied file
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Preserve uid and gid
    pub fn preserve_owner(mut self, preserve: bool) -> Self {
        self.preserve_owner = preserve;
        self
    }

    /// Preserve access and modification times
    pub fn preserve_times(mut self, preserve: bool) -> Self {
        self.preserve_times = preserve;
        self
    }

    /// Set the stream buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set the number of concurrent file copies
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-directory concurrency veto
    pub fn prefer_concurrent<F>(mut self, f: F) -> Self
    where
        F: Fn(&Path, &Path) -> Result<bool> + Send + Sync + 'static,
    {
        self.prefer_concurrent = Some(Arc::new(f));
        self
    }

    /// Read from `fs` instead of the local filesystem
    pub fn source_fs(mut self, fs: impl SourceFs + 'static) -> Self {
        self.source_fs = Some(Arc::new(fs));
        self
    }

    /// Apply defaults for every unset field
    pub fn resolve(self) -> Policy {
        let on_symlink: SymlinkFn = match self.on_symlink {
            Some(f) => f,
            None => Arc::new(|_: &Path| SymlinkAction::default()),
        };
        Policy {
            on_symlink,
            on_dir_exists: self.on_dir_exists,
            on_error: self.on_error,
            skip: self.skip,
            rename: self.rename,
            specials: self.specials,
            permission: self.permission_control.unwrap_or_default(),
            copier: FileCopier::new(self.buffer_size.unwrap_or(0), self.sync),
            preserve_owner: self.preserve_owner,
            preserve_times: self.preserve_times,
            workers: self.workers.max(1),
            prefer_concurrent: self.prefer_concurrent,
            fs: self.source_fs.unwrap_or_else(|| Arc::new(OsFs)),
        }
    }
}

/// A fully resolved, read-only policy
#[derive(Clone)]
pub struct Policy {
    on_symlink: SymlinkFn,
    on_dir_exists: Option<DirExistsFn>,
    on_error: Option<ErrorFn>,
    skip: Option<SkipFn>,
    rename: Option<RenameFn>,
    specials: bool,
    permission: PermissionControl,
    copier: FileCopier,
    preserve_owner: bool,
    preserve_times: bool,
    workers: usize,
    prefer_concurrent: Option<PreferConcurrentFn>,
    fs: Arc<dyn SourceFs>,
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("specials", &self.specials)
            .field("buffer_size", &self.copier.buffer_size())
            .field("preserve_owner", &self.preserve_owner)
            .field("preserve_times", &self.preserve_times)
            .field("workers", &self.workers)
            .field("fs", &self.fs)
            .finish_non_exhaustive()
    }
}

impl Default for Policy {
    fn default() -> Self {
        Options::default().resolve()
    }
}

impl Policy {
    /// Symlink action for the link at `source`
    pub fn symlink_action(&self, source: &Path) -> SymlinkAction {
        (self.on_symlink)(source)
    }

    /// Existing-directory action, `None` when no policy was configured
    pub fn dir_exists_action(&self, source: &Path, dest: &Path) -> Option<DirExistsAction> {
        self.on_dir_exists.as_ref().map(|f| f(source, dest))
    }

    /// Pass a terminal outcome through the outcome hook
    pub fn handle_outcome(&self, source: &Path, dest: &Path, outcome: Result<()>) -> Result<()> {
        match &self.on_error {
            Some(hook) => hook(source, dest, outcome),
            None => outcome,
        }
    }

    /// Whether the entry should be left out
    pub fn should_skip(&self, source: &Path, dest: &Path, meta: &EntryMeta) -> Result<bool> {
        match &self.skip {
            Some(skip) => skip(source, dest, meta),
            None => Ok(false),
        }
    }

    /// Destination after applying the rename hook
    pub fn rename_destination(&self, source: &Path, dest: &Path) -> Result<PathBuf> {
        match &self.rename {
            Some(rename) => rename(source, dest),
            None => Ok(dest.to_path_buf()),
        }
    }

    /// Whether the children of this directory should be copied concurrently
    pub fn should_copy_concurrent(&self, source: &Path, dest: &Path) -> Result<bool> {
        if self.workers <= 1 {
            return Ok(false);
        }
        match &self.prefer_concurrent {
            Some(prefer) => prefer(source, dest),
            None => Ok(true),
        }
    }

    /// Whether devices and sockets are copied
    pub fn specials(&self) -> bool {
        self.specials
    }

    /// Permission strategy
    pub fn permission(&self) -> &PermissionControl {
        &self.permission
    }

    /// Stream copier configured with the buffer size and sync flag
    pub fn copier(&self) -> &FileCopier {
        &self.copier
    }

    /// Preserve uid and gid
    pub fn preserve_owner(&self) -> bool {
        self.preserve_owner
    }

    /// Preserve access and modification times
    pub fn preserve_times(&self) -> bool {
        self.preserve_times
    }

    /// Concurrent file copy limit; 1 means sequential
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Filesystem the source is read from
    pub fn fs(&self) -> &dyn SourceFs {
        self.fs.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopyError;
    use crate::fs::operations::DEFAULT_BUFFER_SIZE;

    #[test]
    fn test_defaults() {
        let policy = Options::new().resolve();
        let (src, dst) = (Path::new("/src"), Path::new("/dst"));

        assert_eq!(policy.symlink_action(src), SymlinkAction::Shallow);
        assert_eq!(policy.dir_exists_action(src, dst), None);
        assert!(!policy.should_skip(src, dst, &EntryMeta::file(1, 0o644)).unwrap());
        assert_eq!(policy.rename_destination(src, dst).unwrap(), dst);
        assert!(!policy.specials());
        assert!(!policy.preserve_owner());
        assert!(!policy.preserve_times());
        assert_eq!(policy.copier().buffer_size(), DEFAULT_BUFFER_SIZE);
        assert_eq!(policy.workers(), 1);
        assert!(!policy.should_copy_concurrent(src, dst).unwrap());
    }

    #[test]
    fn test_outcome_passes_through_by_default() {
        let policy = Policy::default();
        let err = policy
            .handle_outcome(Path::new("a"), Path::new("b"), Err(CopyError::Cancelled))
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(policy
            .handle_outcome(Path::new("a"), Path::new("b"), Ok(()))
            .is_ok());
    }

    #[test]
    fn test_error_hook_can_suppress() {
        let policy = Options::new().on_error(|_, _, _| Ok(())).resolve();
        assert!(policy
            .handle_outcome(Path::new("a"), Path::new("b"), Err(CopyError::callback("x")))
            .is_ok());
    }

    #[test]
    fn test_concurrency_defaults_on_with_workers() {
        let policy = Options::new().workers(4).resolve();
        assert!(policy
            .should_copy_concurrent(Path::new("a"), Path::new("b"))
            .unwrap());

        let vetoed = Options::new()
            .workers(4)
            .prefer_concurrent(|src, _| Ok(!src.ends_with("small")))
            .resolve();
        assert!(!vetoed
            .should_copy_concurrent(Path::new("/x/small"), Path::new("b"))
            .unwrap());
        assert!(vetoed
            .should_copy_concurrent(Path::new("/x/large"), Path::new("b"))
            .unwrap());
    }

    #[test]
    fn test_fixed_actions() {
        let policy = Options::new()
            .symlink_action(SymlinkAction::Deep)
            .dir_exists_action(DirExistsAction::Untouchable)
            .workers(0)
            .resolve();
        assert_eq!(policy.symlink_action(Path::new("l")), SymlinkAction::Deep);
        assert_eq!(
            policy.dir_exists_action(Path::new("a"), Path::new("b")),
            Some(DirExistsAction::Untouchable)
        );
        assert_eq!(policy.workers(), 1);
    }
}
