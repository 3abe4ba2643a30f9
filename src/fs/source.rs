//! Read-only source filesystem abstraction
//!
//! The copy engine never touches the source through `std::fs` directly.
//! Everything it reads goes through a [`SourceFs`], which lets a tree be
//! materialized from somewhere other than the local disk (see
//! [`MemFs`](crate::fs::MemFs)). Destinations are always the real filesystem.

use crate::error::{CopyError, IoResultExt, Result};
use crate::fs::path::assure_home_dir;
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Type of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Dir,
    /// Symbolic link (never followed when statting)
    Symlink,
    /// Named pipe
    Fifo,
    /// Block device
    BlockDevice,
    /// Character device
    CharDevice,
    /// Unix domain socket
    Socket,
}

impl EntryKind {
    /// Devices and sockets: entries only copied when specials are enabled
    pub fn is_special(&self) -> bool {
        matches!(self, Self::BlockDevice | Self::CharDevice | Self::Socket)
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "directory",
            Self::Symlink => "symlink",
            Self::Fifo => "named pipe",
            Self::BlockDevice => "block device",
            Self::CharDevice => "character device",
            Self::Socket => "socket",
        }
    }

    fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            return Self::Symlink;
        }
        if file_type.is_dir() {
            return Self::Dir;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_fifo() {
                return Self::Fifo;
            }
            if file_type.is_block_device() {
                return Self::BlockDevice;
            }
            if file_type.is_char_device() {
                return Self::CharDevice;
            }
            if file_type.is_socket() {
                return Self::Socket;
            }
        }

        Self::File
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata of a source entry, captured once and never re-read
///
/// Recursive steps receive this alongside the source path so the engine
/// does not stat an entry a second time between enumeration and copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Entry type
    pub kind: EntryKind,
    /// Permission bits (including setuid/setgid/sticky)
    pub mode: u32,
    /// Size in bytes
    pub size: u64,
    /// Owning user, where the platform has one
    pub uid: Option<u32>,
    /// Owning group, where the platform has one
    pub gid: Option<u32>,
    /// Device number for block and character devices
    pub rdev: u64,
    /// Last access time
    pub accessed: Option<SystemTime>,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Last status change time
    pub changed: Option<SystemTime>,
}

impl EntryMeta {
    /// Build from `std::fs::Metadata` obtained without following links
    pub fn from_std(metadata: &std::fs::Metadata) -> Self {
        let kind = EntryKind::from_file_type(metadata.file_type());

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self {
                kind,
                mode: metadata.mode() & 0o7777,
                size: metadata.len(),
                uid: Some(metadata.uid()),
                gid: Some(metadata.gid()),
                rdev: metadata.rdev(),
                accessed: metadata.accessed().ok(),
                modified: metadata.modified().ok(),
                changed: unix_time(metadata.ctime(), metadata.ctime_nsec()),
            }
        }

        #[cfg(not(unix))]
        {
            let mode = match (kind, metadata.permissions().readonly()) {
                (EntryKind::Dir, true) => 0o555,
                (EntryKind::Dir, false) => 0o755,
                (_, true) => 0o444,
                (_, false) => 0o644,
            };
            Self {
                kind,
                mode,
                size: metadata.len(),
                uid: None,
                gid: None,
                rdev: 0,
                accessed: metadata.accessed().ok(),
                modified: metadata.modified().ok(),
                changed: None,
            }
        }
    }

    /// Synthetic metadata for a regular file
    pub fn file(size: u64, mode: u32) -> Self {
        Self::synthetic(EntryKind::File, size, mode)
    }

    /// Synthetic metadata for a directory
    pub fn dir(mode: u32) -> Self {
        Self::synthetic(EntryKind::Dir, 0, mode)
    }

    /// Synthetic metadata for a symbolic link
    pub fn symlink(target_len: u64) -> Self {
        Self::synthetic(EntryKind::Symlink, target_len, 0o777)
    }

    fn synthetic(kind: EntryKind, size: u64, mode: u32) -> Self {
        let now = SystemTime::now();
        Self {
            kind,
            mode,
            size,
            uid: None,
            gid: None,
            rdev: 0,
            accessed: Some(now),
            modified: Some(now),
            changed: Some(now),
        }
    }

    /// Is this a directory?
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Is this a symlink?
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

#[cfg(unix)]
fn unix_time(secs: i64, nsecs: i64) -> Option<SystemTime> {
    let secs = u64::try_from(secs).ok()?;
    let nsecs = u32::try_from(nsecs).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::new(secs, nsecs))
}

/// One child of an enumerated directory
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// File name within the parent
    pub name: OsString,
    /// Metadata captured during enumeration
    pub meta: EntryMeta,
}

/// A read-only filesystem the engine copies from
pub trait SourceFs: Send + Sync + fmt::Debug {
    /// Stat an entry without following a trailing symlink
    fn symlink_metadata(&self, path: &Path) -> Result<EntryMeta>;

    /// List the immediate children of a directory, sorted by name
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Open a regular file for reading
    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>>;

    /// Read the raw target of a symbolic link
    fn read_link(&self, path: &Path) -> Result<PathBuf>;

    /// Normalize the top-level source path before the copy starts
    fn normalize_root(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// The local operating-system filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl SourceFs for OsFs {
    fn symlink_metadata(&self, path: &Path) -> Result<EntryMeta> {
        let metadata = std::fs::symlink_metadata(path).with_path(path)?;
        Ok(EntryMeta::from_std(&metadata))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut children = Vec::new();
        for entry in std::fs::read_dir(path).with_path(path)? {
            let entry = entry.with_path(path)?;
            // DirEntry::metadata does not traverse symlinks
            children.push((entry.file_name(), entry.metadata()));
        }
        collect_children(path, children)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = std::fs::File::open(path).with_path(path)?;
        Ok(Box::new(file))
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        std::fs::read_link(path).with_path(path)
    }

    fn normalize_root(&self, path: &Path) -> PathBuf {
        assure_home_dir(path)
    }
}

/// Build the sorted child list of `dir` from names and their stat results
///
/// A child deleted between listing and stat is left out; any other stat
/// failure fails the whole listing.
fn collect_children(
    dir: &Path,
    children: impl IntoIterator<Item = (OsString, std::io::Result<std::fs::Metadata>)>,
) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for (name, metadata) in children {
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Entry vanished during listing: {}", dir.join(&name).display());
                continue;
            }
            Err(e) => return Err(CopyError::io(dir.join(&name), e)),
        };
        entries.push(DirEntry {
            meta: EntryMeta::from_std(&metadata),
            name,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_os_fs_read_dir_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            File::create(dir.path().join(name))
                .unwrap()
                .write_all(name.as_bytes())
                .unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let entries = OsFs.read_dir(dir.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.name.to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "sub"]);
        assert_eq!(entries[0].meta.kind, EntryKind::File);
        assert_eq!(entries[0].meta.size, 5);
        assert!(entries[3].meta.is_dir());
    }

    #[test]
    fn test_os_fs_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = OsFs.symlink_metadata(&dir.path().join("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_vanished_child_is_left_out() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("b")).unwrap();
        let kept = std::fs::symlink_metadata(dir.path().join("b")).unwrap();
        let gone = std::io::Error::from(std::io::ErrorKind::NotFound);

        let entries = collect_children(
            dir.path(),
            vec![(OsString::from("b"), Ok(kept)), (OsString::from("a"), Err(gone))],
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, OsString::from("b"));
    }

    #[test]
    fn test_child_stat_failure_fails_listing() {
        let dir = TempDir::new().unwrap();
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);

        let err = collect_children(dir.path(), vec![(OsString::from("a"), Err(denied))]).unwrap_err();
        assert!(err.is_permission_error());
        assert_eq!(err.path(), Some(&dir.path().join("a")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_not_followed() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::os::unix::fs::symlink("target", dir.path().join("link")).unwrap();

        let meta = OsFs.symlink_metadata(&dir.path().join("link")).unwrap();
        assert_eq!(meta.kind, EntryKind::Symlink);
        assert_eq!(
            OsFs.read_link(&dir.path().join("link")).unwrap(),
            PathBuf::from("target")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_and_times_captured() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.txt");
        File::create(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let meta = OsFs.symlink_metadata(&path).unwrap();
        assert_eq!(meta.mode, 0o640);
        assert!(meta.modified.is_some());
        assert!(meta.changed.is_some());
        assert!(meta.uid.is_some());
    }

    #[test]
    fn test_special_kinds() {
        assert!(EntryKind::CharDevice.is_special());
        assert!(EntryKind::Socket.is_special());
        assert!(!EntryKind::Fifo.is_special());
        assert!(!EntryKind::Symlink.is_special());
    }
}
