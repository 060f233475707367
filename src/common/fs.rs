use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Error unless the file already exists.
pub(crate) fn require_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("File does not exist: {}", path.display());
    }
    if !path.is_file() {
        bail!("Path exists but is not a file: {}", path.display());
    }
    Ok(())
}

/// Error unless the directory already exists.
pub(crate) fn require_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Directory does not exist: {}", path.display());
    }
    if !path.is_dir() {
        bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Resolve `path` against `base` unless it is already absolute.
pub(crate) fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

/// Read a whole text file, naming the path on failure.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/data/config");
        assert_eq!(resolve_relative(base, Path::new("shp/county.shp")), PathBuf::from("/data/config/shp/county.shp"));
        assert_eq!(resolve_relative(base, Path::new("/abs/county.shp")), PathBuf::from("/abs/county.shp"));
    }

    #[test]
    fn missing_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(require_dir_exists(dir.path()).is_ok());
        assert!(require_file_exists(dir.path()).is_err());
        assert!(require_file_exists(&dir.path().join("nope.shp")).is_err());
    }
}
