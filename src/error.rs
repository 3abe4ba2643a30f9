//! Error types for treecopy
//!
//! A single error enum covers every failure the copy engine can surface,
//! from raw I/O to cancellation of a concurrent traversal.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for treecopy operations
#[derive(Error, Debug)]
pub enum CopyError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path the failing operation was applied to
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A sibling branch of the same copy failed and the traversal was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Symbolic link error
    #[error("Symbolic link error at '{path}': {message}")]
    SymlinkError {
        /// Link whose target could not be read or recreated
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Unsupported file type
    #[error("Unsupported file type at '{path}': {file_type}")]
    UnsupportedFileType {
        /// Entry of the unsupported kind
        path: PathBuf,
        /// Kind of the entry, such as "socket"
        file_type: String,
    },

    /// Unsupported operation on this platform or source filesystem
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The rename hook refused to produce a destination
    #[error("Rename failed for '{path}': {message}")]
    Rename {
        /// Source entry passed to the hook
        path: PathBuf,
        /// Reason given by the hook
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Error raised by a caller-supplied policy hook
    #[error("{0}")]
    Callback(String),
}

impl CopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a free-form error from inside a policy hook
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Create a symlink error
    pub fn symlink(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SymlinkError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if the error means the entry does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if this error is the result of a cancelled traversal rather
    /// than a failure of the entry itself
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is a permission issue
    pub fn is_permission_error(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::SymlinkError { path, .. }
            | Self::UnsupportedFileType { path, .. }
            | Self::Rename { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for treecopy operations
pub type Result<T> = std::result::Result<T, CopyError>;

impl From<std::io::Error> for CopyError {
    fn from(err: std::io::Error) -> Self {
        CopyError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for CopyError {
    fn from(err: serde_json::Error) -> Self {
        CopyError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| CopyError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CopyError::io("/test/path", io_err);
        assert_eq!(err.path(), Some(&PathBuf::from("/test/path")));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(CopyError::Cancelled.is_cancelled());
        assert!(!CopyError::Cancelled.is_not_found());
        assert!(!CopyError::callback("boom").is_cancelled());
    }

    #[test]
    fn test_permission_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let res: std::io::Result<()> = Err(io_err);
        let err = res.with_path("/locked").unwrap_err();
        assert!(err.is_permission_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_struct_variants_carry_path() {
        let link = CopyError::symlink("/src/link", "dangling");
        assert_eq!(link.path(), Some(&PathBuf::from("/src/link")));
        assert!(link.to_string().contains("dangling"));

        let socket = CopyError::UnsupportedFileType {
            path: PathBuf::from("/src/sock"),
            file_type: "socket".to_string(),
        };
        assert_eq!(socket.path(), Some(&PathBuf::from("/src/sock")));
        assert!(socket.to_string().contains("socket"));

        let rename = CopyError::Rename {
            path: PathBuf::from("/src/a"),
            message: "refused".to_string(),
        };
        assert_eq!(rename.path(), Some(&PathBuf::from("/src/a")));
    }
}
