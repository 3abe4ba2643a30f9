//! Leaf filesystem operations
//!
//! Buffered stream copies between an open source and a freshly created
//! destination, plus creation of the non-regular entry types.

use crate::error::{CopyError, IoResultExt, Result};
use crate::fs::source::EntryKind;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Buffer size used when the caller does not set one
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Buffered copier writing one destination file at a time
#[derive(Debug, Clone, Copy)]
pub struct FileCopier {
    buffer_size: usize,
    sync: bool,
}

impl Default for FileCopier {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, false)
    }
}

impl FileCopier {
    /// Create a copier; a zero buffer size selects [`DEFAULT_BUFFER_SIZE`]
    pub fn new(buffer_size: usize, sync: bool) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        Self { buffer_size, sync }
    }

    /// Buffer size in bytes
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Create (or truncate) `dest` and fill it from `reader`
    ///
    /// `source` is only used to attribute read errors. Returns the number
    /// of bytes written.
    pub fn write_from<R: Read>(&self, reader: R, source: &Path, dest: &Path) -> Result<u64> {
        let dst_file = File::create(dest).with_path(dest)?;

        let mut reader = BufReader::with_capacity(self.buffer_size, reader);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dst_file);
        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes_copied = 0u64;

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::io(source, e)),
            };

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| CopyError::io(dest, e))?;

            bytes_copied += bytes_read as u64;
        }

        let dst_file = writer
            .into_inner()
            .map_err(|e| CopyError::io(dest, e.into_error()))?;

        if self.sync {
            dst_file.sync_all().with_path(dest)?;
        }

        Ok(bytes_copied)
    }
}

/// Make sure the parent directory of `path` exists
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).with_path(parent)
        }
        _ => Ok(()),
    }
}

/// Create a named pipe at `dest` with the given mode
#[cfg(unix)]
pub fn create_fifo(dest: &Path, mode: u32) -> Result<()> {
    use nix::sys::stat::Mode;

    ensure_parent(dest)?;
    nix::unistd::mkfifo(dest, Mode::from_bits_truncate(mode as nix::libc::mode_t))
        .map_err(std::io::Error::from)
        .with_path(dest)
}

/// Named pipes cannot be created on this platform
#[cfg(not(unix))]
pub fn create_fifo(dest: &Path, _mode: u32) -> Result<()> {
    Err(CopyError::UnsupportedOperation(format!(
        "named pipes are not supported: {}",
        dest.display()
    )))
}

/// Recreate a block or character device node at `dest`
#[cfg(unix)]
pub fn create_device(dest: &Path, kind: EntryKind, mode: u32, rdev: u64) -> Result<()> {
    use nix::sys::stat::{mknod, Mode, SFlag};

    let flag = match kind {
        EntryKind::BlockDevice => SFlag::S_IFBLK,
        EntryKind::CharDevice => SFlag::S_IFCHR,
        other => {
            return Err(CopyError::UnsupportedFileType {
                path: dest.to_path_buf(),
                file_type: other.to_string(),
            })
        }
    };

    ensure_parent(dest)?;
    mknod(
        dest,
        flag,
        Mode::from_bits_truncate(mode as nix::libc::mode_t),
        rdev as nix::libc::dev_t,
    )
    .map_err(std::io::Error::from)
    .with_path(dest)
}

#[cfg(not(unix))]
pub fn create_device(dest: &Path, kind: EntryKind, _mode: u32, _rdev: u64) -> Result<()> {
    Err(CopyError::UnsupportedFileType {
        path: dest.to_path_buf(),
        file_type: kind.to_string(),
    })
}

/// Create a symbolic link at `link` whose raw target is `target`
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| CopyError::symlink(link, e.to_string()))
}

#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    let result = if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    };
    result.map_err(|e| CopyError::symlink(link, e.to_string()))
}

#[cfg(not(any(unix, windows)))]
pub fn create_symlink(_target: &Path, link: &Path) -> Result<()> {
    Err(CopyError::symlink(link, "symbolic links are not supported on this platform"))
}

/// Remove whatever non-directory entry (or empty directory) sits at `path`
pub fn remove_existing(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir(path).with_path(path),
        Ok(_) => std::fs::remove_file(path).with_path(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CopyError::io(path, e)),
    }
}

/// Copy a single regular file and flush it to disk
///
/// Unlike the recursive copy, a missing source is an error here.
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    let src_file = File::open(source).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CopyError::NotFound(source.to_path_buf()),
        _ => CopyError::io(source, e),
    })?;
    FileCopier::new(DEFAULT_BUFFER_SIZE, true).write_from(src_file, source, dest)
}

/// Move a single regular file by copying it and removing the source
///
/// Works across filesystems; directories are not supported.
pub fn move_file(source: &Path, dest: &Path) -> Result<u64> {
    let bytes = copy_file(source, dest)?;
    std::fs::remove_file(source).with_path(source)?;
    Ok(bytes)
}
