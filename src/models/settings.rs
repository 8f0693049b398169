//! Settings Models
//!
//! The persisted configuration record and the validated sync target built from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Configuration record stored in ~/.file-sync-homelab-config.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Local folder to watch and mirror
    #[serde(default)]
    pub local_folder: String,
    /// SSH destination, e.g. "user@homelab"
    #[serde(default)]
    pub ssh_connection: String,
    /// Absolute path of the mirror root on the remote host
    #[serde(default)]
    pub remote_path: String,
    /// Exclude patterns, in the order they are passed to rsync
    #[serde(default)]
    pub ignore_list: Vec<String>,
    /// How long a front-end keeps its activity log, in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_retention_minutes: Option<u32>,
}

impl SyncSettings {
    /// Create settings from the four required fields
    pub fn new(
        local_folder: impl Into<String>,
        ssh_connection: impl Into<String>,
        remote_path: impl Into<String>,
        ignore_list: Vec<String>,
    ) -> Self {
        Self {
            local_folder: local_folder.into(),
            ssh_connection: ssh_connection.into(),
            remote_path: remote_path.into(),
            ignore_list,
            log_retention_minutes: None,
        }
    }

    /// Whether every required field is filled in
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate the required fields
    pub fn validate(&self) -> AppResult<()> {
        if self.local_folder.trim().is_empty() {
            return Err(AppError::config("local folder is empty"));
        }
        if self.ssh_connection.trim().is_empty() {
            return Err(AppError::config("connection string is empty"));
        }
        if self.remote_path.trim().is_empty() {
            return Err(AppError::config("remote path is empty"));
        }
        Ok(())
    }
}

/// Split free-form ignore list text (one pattern per line) into patterns.
///
/// Lines are trimmed and blank lines dropped.
pub fn parse_ignore_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Destination description for one transfer.
///
/// Built from validated settings and never mutated afterwards; a settings
/// update produces a fresh value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Remote connection string
    pub connection: String,
    /// Remote root path, without a trailing slash
    pub remote_root: String,
    /// Local root path
    pub local_root: PathBuf,
    /// Non-empty exclude patterns, in order
    pub ignore_patterns: Vec<String>,
}

impl SyncTarget {
    /// Build a target, failing fast on missing fields
    pub fn from_settings(settings: &SyncSettings) -> AppResult<Self> {
        settings.validate()?;

        let remote = settings.remote_path.trim();
        let trimmed = remote.trim_end_matches('/');
        let remote_root = if trimmed.is_empty() { "/" } else { trimmed };

        Ok(Self {
            connection: settings.ssh_connection.trim().to_string(),
            remote_root: remote_root.to_string(),
            local_root: PathBuf::from(settings.local_folder.trim()),
            ignore_patterns: settings
                .ignore_list
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    /// rsync destination, `<connection>:<remote_root>/`
    pub fn destination(&self) -> String {
        if self.remote_root == "/" {
            format!("{}:/", self.connection)
        } else {
            format!("{}:{}/", self.connection, self.remote_root)
        }
    }

    /// Local source with a trailing separator so rsync copies the contents
    pub fn source(&self) -> String {
        let local = self.local_root.to_string_lossy();
        if local.ends_with('/') {
            local.to_string()
        } else {
            format!("{}/", local)
        }
    }

    /// Whether `path` lies inside the local root
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.local_root)
    }
}
