//! JSON Configuration Management
//!
//! Handles reading and writing the sync settings file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::models::settings::SyncSettings;
use crate::utils::error::AppResult;
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for the persisted sync settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    settings: SyncSettings,
}

impl ConfigService {
    /// Open the settings file in the home directory
    pub fn new() -> AppResult<Self> {
        Self::open(config_path()?)
    }

    /// Open a settings file at an explicit location.
    ///
    /// A missing file yields empty settings; nothing is written until `save`.
    pub fn open(config_path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = config_path.into();
        let settings = Self::load_from_file(&config_path)?;
        Ok(Self {
            config_path,
            settings,
        })
    }

    /// Load settings from a file, returning defaults when it does not exist
    pub fn load_from_file(path: &Path) -> AppResult<SyncSettings> {
        if !path.exists() {
            return Ok(SyncSettings::default());
        }
        let content = fs::read_to_string(path)?;
        let settings: SyncSettings = serde_json::from_str(&content)?;
        info!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Save settings to a file with pretty formatting, readable only by the owner
    pub fn save_to_file(path: &Path, settings: &SyncSettings) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(settings)?;
        write_private(path, content.as_bytes())?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Get the current settings
    pub fn get_settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Replace the settings and persist them
    pub fn update_settings(&mut self, settings: SyncSettings) -> AppResult<SyncSettings> {
        Self::save_to_file(&self.config_path, &settings)?;
        self.settings = settings;
        Ok(self.settings.clone())
    }

    /// Reload settings from disk
    pub fn reload(&mut self) -> AppResult<SyncSettings> {
        self.settings = Self::load_from_file(&self.config_path)?;
        Ok(self.settings.clone())
    }

    /// Location of the settings file
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(unix)]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(path, data)
}
