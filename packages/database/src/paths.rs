#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the project `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the SQLite store.
#[must_use]
pub fn db_path() -> PathBuf {
    data_dir().join("distressed.db")
}

/// Returns the `data/downloads/` cache directory for bulk files.
#[must_use]
pub fn downloads_dir() -> PathBuf {
    data_dir().join("downloads")
}

/// Returns the path of the scoring config file.
#[must_use]
pub fn scoring_config_path() -> PathBuf {
    project_root().join("config").join("scoring.toml")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
