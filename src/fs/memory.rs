//! In-memory read-only source filesystem
//!
//! Useful for materializing bundled assets onto disk with the same policy
//! machinery as a disk-to-disk copy.

use crate::error::{CopyError, Result};
use crate::fs::source::{DirEntry, EntryMeta, SourceFs};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum MemNode {
    File { data: Arc<[u8]>, meta: EntryMeta },
    Dir { meta: EntryMeta },
    Symlink { target: PathBuf, meta: EntryMeta },
}

impl MemNode {
    fn meta(&self) -> &EntryMeta {
        match self {
            Self::File { meta, .. } | Self::Dir { meta } | Self::Symlink { meta, .. } => meta,
        }
    }
}

/// An immutable tree of files, directories and symlinks held in memory
///
/// Paths are relative to the tree root; a leading `/` or `./` is ignored.
/// Parent directories are created implicitly.
///
/// ```
/// use treecopy::fs::MemFs;
///
/// let fs = MemFs::new()
///     .with_file("a.txt", "hi")
///     .with_file("sub/b.txt", "yo")
///     .with_symlink("link", "a.txt");
/// ```
#[derive(Debug, Clone)]
pub struct MemFs {
    nodes: BTreeMap<PathBuf, MemNode>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create an empty tree containing only the root directory
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathBuf::new(),
            MemNode::Dir {
                meta: EntryMeta::dir(0o755),
            },
        );
        Self { nodes }
    }

    /// Add a regular file with mode 0644
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.with_file_mode(path, contents, 0o644)
    }

    /// Add a regular file with explicit permission bits
    pub fn with_file_mode(
        mut self,
        path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
        mode: u32,
    ) -> Self {
        let key = normalize(path.as_ref());
        self.ensure_parents(&key);
        let data: Arc<[u8]> = Arc::from(contents.as_ref());
        let meta = EntryMeta::file(data.len() as u64, mode);
        self.nodes.insert(key, MemNode::File { data, meta });
        self
    }

    /// Add a directory with mode 0755
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        let key = normalize(path.as_ref());
        self.ensure_parents(&key);
        self.nodes.entry(key).or_insert(MemNode::Dir {
            meta: EntryMeta::dir(0o755),
        });
        self
    }

    /// Add a symbolic link whose raw target is `target`
    pub fn with_symlink(mut self, path: impl AsRef<Path>, target: impl Into<PathBuf>) -> Self {
        let key = normalize(path.as_ref());
        self.ensure_parents(&key);
        let target = target.into();
        let meta = EntryMeta::symlink(target.as_os_str().len() as u64);
        self.nodes.insert(key, MemNode::Symlink { target, meta });
        self
    }

    fn ensure_parents(&mut self, key: &Path) {
        let mut parent = key.parent();
        while let Some(dir) = parent {
            self.nodes.entry(dir.to_path_buf()).or_insert(MemNode::Dir {
                meta: EntryMeta::dir(0o755),
            });
            parent = dir.parent();
        }
    }

    fn node(&self, path: &Path) -> Result<&MemNode> {
        self.nodes
            .get(&normalize(path))
            .ok_or_else(|| CopyError::NotFound(path.to_path_buf()))
    }
}

impl SourceFs for MemFs {
    fn symlink_metadata(&self, path: &Path) -> Result<EntryMeta> {
        Ok(self.node(path)?.meta().clone())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let key = normalize(path);
        match self.node(path)? {
            MemNode::Dir { .. } => {}
            _ => {
                return Err(CopyError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
                ))
            }
        }

        // BTreeMap iteration keeps children sorted by name
        let entries = self
            .nodes
            .iter()
            .filter(|(child, _)| !child.as_os_str().is_empty() && child.parent() == Some(key.as_path()))
            .filter_map(|(child, node)| {
                child.file_name().map(|name| DirEntry {
                    name: OsString::from(name),
                    meta: node.meta().clone(),
                })
            })
            .collect();
        Ok(entries)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        match self.node(path)? {
            MemNode::File { data, .. } => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            other => Err(CopyError::UnsupportedFileType {
                path: path.to_path_buf(),
                file_type: other.meta().kind.to_string(),
            }),
        }
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        match self.node(path)? {
            MemNode::Symlink { target, .. } => Ok(target.clone()),
            _ => Err(CopyError::symlink(path, "not a symbolic link")),
        }
    }
}

/// Reduce a path to its normal components, resolving `.` and `..` lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}
