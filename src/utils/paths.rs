//! Cross-Platform Path Utilities
//!
//! Resolves the settings file location and relative paths inside the
//! watched folder.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// File name of the persisted settings, stored directly in the home directory
pub const CONFIG_FILE_NAME: &str = ".file-sync-homelab-config.json";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the config file path (~/.file-sync-homelab-config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(CONFIG_FILE_NAME))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Path of `path` relative to `root`, for display.
///
/// Falls back to the final path component when `path` is not under `root`.
pub fn display_relative(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().to_string(),
        Ok(_) => ".".to_string(),
        Err(_) => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string()),
    }
}
