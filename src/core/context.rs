//! Per-copy traversal state
//!
//! One [`TraversalContext`] exists per top-level copy and is threaded by
//! reference through every recursive step. It owns the only state shared
//! between concurrent branches: the cancellation signal, the admission
//! token pool, and the summary counters.

use crate::error::{CopyError, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Cancellation shared by all branches of one copy
///
/// Cancelling drops the only sender of a zero-capacity channel, which wakes
/// every thread blocked in [`TokenPool::acquire`] at once.
#[derive(Debug)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    fired: Receiver<()>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// Create an untriggered signal
    pub fn new() -> Self {
        let (trigger, fired) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            fired,
        }
    }

    /// Trigger the signal; later calls are no-ops
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.trigger.lock() {
            Ok(mut trigger) => drop(trigger.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }

    /// Check if the signal has been triggered
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the signal has been triggered
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CopyError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn fired(&self) -> &Receiver<()> {
        &self.fired
    }
}

/// Counting pool of admission tokens bounding concurrent file copies
#[derive(Debug)]
pub struct TokenPool {
    release: Sender<()>,
    admit: Receiver<()>,
    capacity: usize,
}

impl TokenPool {
    /// Create a pool holding `capacity` tokens (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (release, admit) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel has room for exactly `capacity` tokens
            let _ = release.send(());
        }
        Self {
            release,
            admit,
            capacity,
        }
    }

    /// Total number of tokens
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens not currently held
    pub fn available(&self) -> usize {
        self.admit.len()
    }

    /// Block until a token is free or `cancel` fires
    pub fn acquire<'a>(&'a self, cancel: &CancelSignal) -> Result<AdmissionToken<'a>> {
        cancel.check()?;

        let token = crossbeam::channel::select! {
            recv(self.admit) -> token => token
                .map(|_| AdmissionToken { pool: self })
                .map_err(|_| CopyError::Cancelled),
            recv(cancel.fired()) -> _ => Err(CopyError::Cancelled),
        }?;

        // select! picks randomly when both are ready; a token won after
        // cancellation is handed straight back on drop
        cancel.check()?;
        tracing::trace!("admission token acquired ({} left)", self.available());
        Ok(token)
    }
}

/// One held admission token; returned to its pool on drop
#[derive(Debug)]
pub struct AdmissionToken<'a> {
    pool: &'a TokenPool,
}

impl Drop for AdmissionToken<'_> {
    fn drop(&mut self) {
        // The pool outlives every token, so the channel is never disconnected
        let _ = self.pool.release.send(());
        tracing::trace!("admission token released");
    }
}

/// Counters behind [`CopySummary`](crate::core::CopySummary)
#[derive(Debug, Default)]
pub struct CopyCounters {
    /// Regular files written
    pub files: AtomicU64,
    /// Bytes written to regular files
    pub bytes: AtomicU64,
    /// Directories completed
    pub dirs: AtomicU64,
    /// Symlinks recreated
    pub symlinks: AtomicU64,
    /// Pipes and devices recreated
    pub specials: AtomicU64,
    /// Entries left out by the skip predicate, symlink policy or specials policy
    pub skipped: AtomicU64,
}

impl CopyCounters {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// State of one top-level copy
#[derive(Debug)]
pub struct TraversalContext {
    cancel: CancelSignal,
    tokens: Option<TokenPool>,
    root_dest: PathBuf,
    counters: CopyCounters,
}

impl TraversalContext {
    /// Create the context for a copy into `root_dest`
    ///
    /// A token pool is only created when more than one worker is allowed.
    pub fn new(root_dest: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            cancel: CancelSignal::new(),
            tokens: (workers > 1).then(|| TokenPool::new(workers)),
            root_dest: root_dest.into(),
            counters: CopyCounters::default(),
        }
    }

    /// Cancellation signal of this copy
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Trigger cancellation for every branch of this copy
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check if this copy has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Take an admission token if this copy runs concurrently
    pub fn admit(&self) -> Result<Option<AdmissionToken<'_>>> {
        match &self.tokens {
            Some(pool) => pool.acquire(&self.cancel).map(Some),
            None => Ok(None),
        }
    }

    /// Token pool, if any
    pub fn tokens(&self) -> Option<&TokenPool> {
        self.tokens.as_ref()
    }

    /// Whether `dest` is the destination the caller asked for
    pub fn is_root_dest(&self, dest: &Path) -> bool {
        self.root_dest == dest
    }

    /// Summary counters
    pub fn counters(&self) -> &CopyCounters {
        &self.counters
    }
}
