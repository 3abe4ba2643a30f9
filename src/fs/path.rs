//! Top-level path normalization
//!
//! Applied once to the source and destination before a copy starts.

use std::path::{Path, PathBuf};

/// Expand a leading home-directory reference and make the path absolute
///
/// Falls back to the expanded (possibly relative) path if the current
/// directory cannot be determined.
pub fn assure_home_dir(path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    absolutize(&expanded).unwrap_or(expanded)
}

/// Replace a leading `~/`, `$HOME/` or `${HOME}/` (`%USERPROFILE%` on
/// Windows) with the current user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match dirs::home_dir() {
        Some(home) => expand_home_with(path, &home),
        None => path.to_path_buf(),
    }
}

fn expand_home_with(path: &Path, home: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if home.as_os_str().is_empty() {
        return path.to_path_buf();
    }

    match home_prefix(raw) {
        Some(prefix) => {
            let rest = raw[prefix.len()..].trim_start_matches(['/', '\\']);
            home.join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(windows)]
fn home_prefix(raw: &str) -> Option<&'static str> {
    const PREFIX: &str = "%userprofile%";
    raw.get(..PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(PREFIX))
        .map(|_| PREFIX)
}

#[cfg(not(windows))]
fn home_prefix(raw: &str) -> Option<&'static str> {
    ["~/", "$HOME/", "${HOME}/"]
        .into_iter()
        .find(|prefix| raw.starts_with(prefix))
        .map(|prefix| &prefix[..prefix.len() - 1])
}

/// Resolve a path against the current working directory
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    std::path::absolute(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_expand_home_prefixes() {
        let home = Path::new("/home/tester");
        for raw in ["~/data", "$HOME/data", "${HOME}/data"] {
            assert_eq!(
                expand_home_with(Path::new(raw), home),
                PathBuf::from("/home/tester/data"),
                "prefix {raw}"
            );
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn test_expand_home_leaves_other_paths() {
        let home = Path::new("/home/tester");
        assert_eq!(
            expand_home_with(Path::new("/srv/~/data"), home),
            PathBuf::from("/srv/~/data")
        );
        assert_eq!(expand_home_with(Path::new("~data"), home), PathBuf::from("~data"));
        assert_eq!(expand_home_with(Path::new("~/x"), Path::new("")), PathBuf::from("~/x"));
    }

    #[test]
    fn test_assure_home_dir_is_absolute() {
        let resolved = assure_home_dir(Path::new("relative/dir"));
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("relative/dir"));
    }
}
