//! Configuration settings for treecopy
//!
//! Defines the CLI arguments, the JSON config file format, and how both
//! turn into copy [`Options`].

use crate::config::options::{DirExistsAction, Options, SymlinkAction};
use crate::error::{CopyError, Result};
use crate::fs::path::assure_home_dir;
use crate::fs::permission::PermissionControl;
use clap::Parser;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// treecopy - Recursive copy of files, directories, symlinks and special files
#[derive(Parser, Debug, Clone)]
#[command(name = "treecopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Recursively copy a file or directory tree with configurable policies")]
#[command(long_about = r#"
treecopy copies a single file, a symlink, or a whole directory tree.

Features:
  - Concurrent copying bounded by a worker count
  - Symlinks followed, recreated, or skipped
  - Existing directories merged, replaced, or left untouched
  - Named pipes and device nodes recreated on request
  - Permission bits, ownership and timestamps preserved

Examples:
  treecopy /source /destination                    # Basic copy
  treecopy /src /dst --workers 16                  # Concurrent copy
  treecopy ~/project /backup --archive --exclude '.git'
  treecopy /src /dst --symlinks deep --on-dir-exists replace
"#)]
pub struct CliArgs {
    /// Source path
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination path
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Maximum concurrent file copies (0 = number of CPUs, 1 = sequential)
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Buffer size for file copies (e.g., 1M, 64K)
    #[arg(short = 'b', long, value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// How to copy symbolic links
    #[arg(long, value_enum, value_name = "ACTION")]
    pub symlinks: Option<SymlinkAction>,

    /// What to do when a destination directory already exists
    #[arg(long, value_enum, value_name = "ACTION")]
    pub on_dir_exists: Option<DirExistsAction>,

    /// Recreate named pipes and device nodes
    #[arg(long)]
    pub specials: bool,

    /// fsync every copied file
    #[arg(long)]
    pub sync: bool,

    /// Preserve file owner and group
    #[arg(long)]
    pub preserve_owner: bool,

    /// Preserve access and modification times
    #[arg(long)]
    pub preserve_times: bool,

    /// Archive mode: same as --preserve-owner --preserve-times --specials
    #[arg(short = 'a', long)]
    pub archive: bool,

    /// Permission bits OR'd into every copied entry (octal, e.g. 644)
    #[arg(long, value_name = "OCTAL")]
    pub add_permission: Option<String>,

    /// Exclude entries matching glob, relative to SOURCE (can be repeated)
    #[arg(short = 'e', long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// JSON config file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log failed entries and keep copying the rest
    #[arg(long)]
    pub continue_on_error: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

/// Declarative copy configuration, loadable from a JSON file
///
/// ```
/// use treecopy::config::{CopyConfig, SymlinkAction};
///
/// let config: CopyConfig = serde_json::from_str(r#"{"symlinks": "deep", "workers": 4}"#).unwrap();
/// assert_eq!(config.symlinks, SymlinkAction::Deep);
/// assert!(!config.preserve_times);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Symlink action for every link
    pub symlinks: SymlinkAction,
    /// Existing-directory action everywhere below the destination
    pub on_dir_exists: DirExistsAction,
    /// Recreate pipes and devices
    pub specials: bool,
    /// fsync every copied file
    pub sync: bool,
    /// Preserve uid and gid
    pub preserve_owner: bool,
    /// Preserve access and modification times
    pub preserve_times: bool,
    /// Buffer size in bytes
    pub buffer_size: usize,
    /// Worker count (0 = number of CPUs)
    pub workers: usize,
    /// Extra permission bits
    pub add_permission: u32,
    /// Exclude globs, relative to the source root
    pub exclude_patterns: Vec<String>,
    /// Log and suppress per-entry failures
    pub continue_on_error: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            symlinks: SymlinkAction::Shallow,
            on_dir_exists: DirExistsAction::Merge,
            specials: false,
            sync: false,
            preserve_owner: false,
            preserve_times: false,
            buffer_size: 1024 * 1024, // 1MB
            workers: 0,               // Auto-detect
            add_permission: 0,
            exclude_patterns: Vec::new(),
            continue_on_error: false,
        }
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}

/// Parse octal permission bits such as `644`, `0644` or `0o644`
pub fn parse_mode(mode: &str) -> std::result::Result<u32, String> {
    let digits = mode.trim().trim_start_matches("0o");
    let bits = u32::from_str_radix(digits, 8).map_err(|_| format!("Invalid octal mode: {}", mode))?;
    if bits > 0o7777 {
        return Err(format!("Mode out of range: {}", mode));
    }
    Ok(bits)
}

/// Compile exclude globs into one matcher
pub fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| CopyError::config(format!("Invalid exclude pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| CopyError::config(format!("Invalid exclude patterns: {}", e)))
}

impl CopyConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CopyError::io(path, e))?;
        serde_json::from_str(&contents)
            .map_err(|e| CopyError::config(format!("{}: {}", path.display(), e)))
    }

    /// Create config from CLI arguments, layered over `--config` if given
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(workers) = args.workers {
            config.workers = workers;
        }
        if let Some(size) = &args.buffer_size {
            config.buffer_size = parse_size(size)
                .map_err(|e| CopyError::config(format!("Invalid buffer size: {}", e)))?
                as usize;
        }
        if let Some(action) = args.symlinks {
            config.symlinks = action;
        }
        if let Some(action) = args.on_dir_exists {
            config.on_dir_exists = action;
        }
        if let Some(mode) = &args.add_permission {
            config.add_permission = parse_mode(mode)
                .map_err(|e| CopyError::config(format!("Invalid --add-permission: {}", e)))?;
        }

        config.specials |= args.specials || args.archive;
        config.sync |= args.sync;
        config.preserve_owner |= args.preserve_owner || args.archive;
        config.preserve_times |= args.preserve_times || args.archive;
        config.continue_on_error |= args.continue_on_error;
        config.exclude_patterns.extend(args.exclude.iter().cloned());

        Ok(config)
    }

    /// Worker count with 0 resolved to the number of CPUs
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Build copy options for a copy rooted at `source_root`
    pub fn to_options(&self, source_root: &Path) -> Result<Options> {
        let mut options = Options::new()
            .symlink_action(self.symlinks)
            .dir_exists_action(self.on_dir_exists)
            .specials(self.specials)
            .sync(self.sync)
            .preserve_owner(self.preserve_owner)
            .preserve_times(self.preserve_times)
            .buffer_size(self.buffer_size)
            .workers(self.effective_workers())
            .permission_control(PermissionControl::add(self.add_permission));

        if !self.exclude_patterns.is_empty() {
            let excludes = build_exclude_set(&self.exclude_patterns)?;
            let root = assure_home_dir(source_root);
            options = options.skip(move |src, _, _| {
                let relative = src.strip_prefix(&root).unwrap_or(src);
                Ok(excludes.is_match(relative))
            });
        }

        if self.continue_on_error {
            options = options.on_error(|src, _, outcome| match outcome {
                Err(e) if !e.is_cancelled() => {
                    warn!("Failed to copy {}: {}", src.display(), e);
                    Ok(())
                }
                other => other,
            });
        }

        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["treecopy", "/src", "/dst"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0o200").unwrap(), 0o200);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert!(parse_mode("9").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let config = CopyConfig::from_cli(&args(&[])).unwrap();
        assert_eq!(config, CopyConfig::default());
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_cli_flags() {
        let config = CopyConfig::from_cli(&args(&[
            "--workers",
            "3",
            "--buffer-size",
            "64K",
            "--symlinks",
            "deep",
            "--on-dir-exists",
            "untouchable",
            "--archive",
            "--add-permission",
            "200",
            "--exclude",
            "*.tmp",
            "-e",
            ".git",
        ]))
        .unwrap();

        assert_eq!(config.workers, 3);
        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.symlinks, SymlinkAction::Deep);
        assert_eq!(config.on_dir_exists, DirExistsAction::Untouchable);
        assert!(config.specials && config.preserve_owner && config.preserve_times);
        assert_eq!(config.add_permission, 0o200);
        assert_eq!(config.exclude_patterns, vec!["*.tmp", ".git"]);
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("treecopy.json");
        std::fs::write(
            &path,
            r#"{"workers": 8, "sync": true, "exclude_patterns": ["build"], "on_dir_exists": "replace"}"#,
        )
        .unwrap();

        let path_arg = path.to_string_lossy().to_string();
        let config = CopyConfig::from_cli(&args(&["--config", &path_arg, "--workers", "2", "-e", "*.o"])).unwrap();
        assert_eq!(config.workers, 2);
        assert!(config.sync);
        assert_eq!(config.on_dir_exists, DirExistsAction::Replace);
        assert_eq!(config.exclude_patterns, vec!["build", "*.o"]);
    }

    #[test]
    fn test_bad_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(CopyConfig::load(&path), Err(CopyError::ConfigError(_))));
        assert!(CopyConfig::load(&dir.path().join("missing.json"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let config = CopyConfig {
            exclude_patterns: vec!["a[".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.to_options(Path::new("/src")),
            Err(CopyError::ConfigError(_))
        ));
    }

    #[test]
    fn test_exclude_matches_relative_paths() {
        let config = CopyConfig {
            exclude_patterns: vec!["*.tmp".to_string(), "target".to_string()],
            workers: 1,
            ..Default::default()
        };
        let policy = config.to_options(Path::new("/src")).unwrap().resolve();
        let meta = crate::fs::EntryMeta::file(0, 0o644);
        let skip = |p: &str| policy.should_skip(Path::new(p), Path::new("/dst"), &meta).unwrap();

        assert!(skip("/src/a.tmp"));
        assert!(skip("/src/deep/b.tmp"));
        assert!(skip("/src/target"));
        assert!(!skip("/src/sub/target"));
        assert!(!skip("/src/main.rs"));
    }

    #[test]
    fn test_continue_on_error_keeps_cancellation() {
        let config = CopyConfig {
            continue_on_error: true,
            ..Default::default()
        };
        let policy = config.to_options(Path::new("/src")).unwrap().resolve();
        let (src, dst) = (Path::new("/src/a"), Path::new("/dst/a"));

        assert!(policy
            .handle_outcome(src, dst, Err(CopyError::callback("boom")))
            .is_ok());
        assert!(policy
            .handle_outcome(src, dst, Err(CopyError::Cancelled))
            .unwrap_err()
            .is_cancelled());
    }
}
