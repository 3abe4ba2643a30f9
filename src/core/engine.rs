//! Copy engine entry point and dispatcher
//!
//! Every recursive step, whether it comes from directory traversal or from
//! following a symlink, re-enters through [`dispatch`], which picks exactly
//! one strategy for the entry and routes its outcome through the policy's
//! outcome hook.

use crate::config::{Options, Policy};
use crate::core::context::{CopyCounters, TraversalContext};
use crate::core::{symlink, traversal};
use crate::error::{CopyError, Result};
use crate::fs::metadata::{preserve_owner, preserve_times};
use crate::fs::operations::{create_device, create_fifo, ensure_parent};
use crate::fs::path::assure_home_dir;
use crate::fs::source::{EntryKind, EntryMeta};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One source entry on its way to a destination
///
/// `meta` is always the metadata captured when the entry was found; it is
/// never re-read, since the entry may have changed or vanished since.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub dest: PathBuf,
    /// Source metadata
    pub meta: EntryMeta,
}

impl Entry {
    /// Create an entry descriptor
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>, meta: EntryMeta) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            meta,
        }
    }
}

/// Totals for one completed copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopySummary {
    /// Regular files written
    pub files_copied: u64,
    /// Bytes written to regular files
    pub bytes_copied: u64,
    /// Directories completed
    pub dirs_copied: u64,
    /// Symlinks recreated
    pub symlinks_created: u64,
    /// Pipes and devices recreated
    pub specials_created: u64,
    /// Entries left out by policy
    pub skipped: u64,
    /// Wall-clock duration
    pub duration: Duration,
}

impl CopySummary {
    fn from_counters(counters: &CopyCounters, duration: Duration) -> Self {
        Self {
            files_copied: counters.files.load(Ordering::Relaxed),
            bytes_copied: counters.bytes.load(Ordering::Relaxed),
            dirs_copied: counters.dirs.load(Ordering::Relaxed),
            symlinks_created: counters.symlinks.load(Ordering::Relaxed),
            specials_created: counters.specials.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            duration,
        }
    }

    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Copy Summary ===");
        println!("Files copied:    {}", self.files_copied);
        println!("Bytes copied:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!("Directories:     {}", self.dirs_copied);
        println!("Symlinks:        {}", self.symlinks_created);
        if self.specials_created > 0 {
            println!("Special files:   {}", self.specials_created);
        }
        println!("Skipped:         {}", self.skipped);
        println!("Duration:        {:.2?}", self.duration);
        println!("Throughput:      {}/s", humansize::format_size(self.throughput() as u64, humansize::BINARY));
    }
}

/// Copy engine bound to one resolved policy
///
/// The engine may run any number of copies; each call to
/// [`execute`](Self::execute) gets its own cancellation signal and token pool.
#[derive(Debug, Clone)]
pub struct CopyEngine {
    policy: Policy,
}

impl CopyEngine {
    /// Create an engine, resolving `options` once
    pub fn new(options: Options) -> Self {
        Self::from_policy(options.resolve())
    }

    /// Create an engine from an already resolved policy
    pub fn from_policy(policy: Policy) -> Self {
        Self { policy }
    }

    /// The resolved policy
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Copy `source` (of any type) to `dest`
    ///
    /// Returns the first unrecovered error, or whatever the outcome hook
    /// substituted for it.
    pub fn execute(&self, source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<CopySummary> {
        let start_time = Instant::now();
        let policy = &self.policy;

        let source = policy.fs().normalize_root(source.as_ref());
        let dest = assure_home_dir(dest.as_ref());
        let ctx = TraversalContext::new(&dest, policy.workers());

        info!(
            "Copying {} -> {} (workers: {})",
            source.display(),
            dest.display(),
            policy.workers()
        );

        let meta = match policy.fs().symlink_metadata(&source) {
            Ok(meta) => meta,
            Err(e) => {
                policy.handle_outcome(&source, &dest, Err(e))?;
                return Ok(CopySummary::from_counters(ctx.counters(), start_time.elapsed()));
            }
        };
        let entry = Entry::new(source, dest, meta);

        if policy.workers() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(policy.workers())
                .thread_name(|i| format!("treecopy-worker-{}", i))
                .build()
                .map_err(|e| CopyError::ThreadPoolError(e.to_string()))?;
            pool.install(|| dispatch(entry, policy, &ctx))?;
        } else {
            dispatch(entry, policy, &ctx)?;
        }

        let summary = CopySummary::from_counters(ctx.counters(), start_time.elapsed());
        info!(
            "Copied {} files ({} bytes) in {:.2?}",
            summary.files_copied, summary.bytes_copied, summary.duration
        );
        Ok(summary)
    }
}

/// Copy `source` to `dest`, whatever kind of entry `source` is
///
/// ```no_run
/// use treecopy::{copy, Options};
///
/// copy("~/project", "/backup/project", Options::new().workers(8)).unwrap();
/// ```
pub fn copy(source: impl AsRef<Path>, dest: impl AsRef<Path>, options: Options) -> Result<()> {
    CopyEngine::new(options).execute(source, dest).map(|_| ())
}

/// Offer a child entry to the skip predicate, then dispatch it
///
/// Errors raised by the predicate itself bypass the outcome hook.
pub(crate) fn copy_next_or_skip(entry: Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    if policy.should_skip(&entry.source, &entry.dest, &entry.meta)? {
        debug!("Skipping {}", entry.source.display());
        CopyCounters::add(&ctx.counters().skipped, 1);
        return Ok(());
    }
    dispatch(entry, policy, ctx)
}

/// Run exactly one copy strategy for `entry`
pub(crate) fn dispatch(entry: Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    let Entry { source, dest, meta } = entry;

    if meta.kind.is_special() && !policy.specials() {
        debug!("Ignoring {} {}", meta.kind, source.display());
        CopyCounters::add(&ctx.counters().skipped, 1);
        return policy.handle_outcome(&source, &dest, Ok(()));
    }

    let dest = match policy.rename_destination(&source, &dest) {
        Ok(renamed) => renamed,
        Err(e) => return policy.handle_outcome(&source, &dest, Err(e)),
    };

    let entry = Entry { source, dest, meta };
    debug!(
        "{} {} -> {}",
        entry.meta.kind,
        entry.source.display(),
        entry.dest.display()
    );

    // Symlinks first: a link to a directory must never be walked as one
    let outcome = match entry.meta.kind {
        EntryKind::Symlink => symlink::copy_symlink(&entry, policy, ctx),
        EntryKind::Fifo => copy_fifo(&entry, ctx),
        EntryKind::Dir => traversal::copy_dir(&entry, policy, ctx),
        EntryKind::BlockDevice | EntryKind::CharDevice => copy_device(&entry, ctx),
        EntryKind::Socket => Err(CopyError::UnsupportedFileType {
            path: entry.source.clone(),
            file_type: entry.meta.kind.to_string(),
        }),
        EntryKind::File => copy_regular_file(&entry, policy, ctx),
    };

    policy.handle_outcome(&entry.source, &entry.dest, outcome)
}

/// Copy one regular file, holding an admission token while it is open
fn copy_regular_file(entry: &Entry, policy: &Policy, ctx: &TraversalContext) -> Result<()> {
    let _token = ctx.admit()?;

    let reader = match policy.fs().open(&entry.source) {
        Ok(reader) => reader,
        Err(e) if e.is_not_found() => {
            debug!("Source vanished: {}", entry.source.display());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    ensure_parent(&entry.dest)?;
    let finalize = policy.permission().prepare(&entry.meta, &entry.dest)?;

    let mut outcome = policy
        .copier()
        .write_from(reader, &entry.source, &entry.dest)
        .map(|bytes| {
            let counters = ctx.counters();
            CopyCounters::add(&counters.files, 1);
            CopyCounters::add(&counters.bytes, bytes);
        });
    finalize(&mut outcome);
    outcome?;

    if policy.preserve_owner() {
        preserve_owner(&entry.dest, &entry.meta)?;
    }
    if policy.preserve_times() {
        preserve_times(&entry.dest, &entry.meta)?;
    }
    Ok(())
}

fn copy_fifo(entry: &Entry, ctx: &TraversalContext) -> Result<()> {
    create_fifo(&entry.dest, entry.meta.mode)?;
    CopyCounters::add(&ctx.counters().specials, 1);
    Ok(())
}

fn copy_device(entry: &Entry, ctx: &TraversalContext) -> Result<()> {
    create_device(&entry.dest, entry.meta.kind, entry.meta.mode, entry.meta.rdev)?;
    CopyCounters::add(&ctx.counters().specials, 1);
    Ok(())
}
