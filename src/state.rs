//! Application State
//!
//! Owns the persisted settings, the live sync target, and the single live
//! watch session. Every front-end operation goes through here.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::models::settings::{SyncSettings, SyncTarget};
use crate::services::sync::{
    shared_target, CoordinatorHandle, EventSink, ExclusiveTransfer, PathFilter,
    RecursiveWatcher, SharedTarget, StatusReporter, SyncCoordinator, Transfer,
    WatchSession, DEFAULT_DEBOUNCE_MS,
};
use crate::storage::ConfigService;
use crate::utils::error::{AppError, AppResult};

/// A running watch session and the coordinator consuming its events
struct ActiveSession {
    watch: WatchSession,
    coordinator: CoordinatorHandle,
    target: SharedTarget,
}

/// Application state shared by every front-end command
pub struct AppState {
    /// Persisted settings
    config: RwLock<ConfigService>,
    /// All transfers pass through one exclusive gate
    transfer: Arc<dyn Transfer>,
    /// Where status events go
    sink: Arc<dyn EventSink>,
    /// At most one live session
    session: Mutex<Option<ActiveSession>>,
    debounce: Duration,
}

impl AppState {
    /// Create state around an opened config, a transfer backend, and an event sink
    pub fn new(config: ConfigService, transfer: Arc<dyn Transfer>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config: RwLock::new(config),
            transfer: Arc::new(ExclusiveTransfer::new(transfer)),
            sink,
            session: Mutex::new(None),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    /// Set the debounce window used by sessions started afterwards
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Current settings, as last loaded or saved
    pub async fn get_settings(&self) -> SyncSettings {
        self.config.read().await.get_settings().clone()
    }

    /// Re-read the settings file and hand the result to a live session
    pub async fn load_settings(&self) -> AppResult<SyncSettings> {
        let settings = self.config.write().await.reload()?;
        if let Ok(target) = SyncTarget::from_settings(&settings) {
            self.install_target(target).await?;
        }
        Ok(settings)
    }

    /// Check that the remote host is reachable and the remote path exists
    pub async fn test_connection(&self, connection: &str, remote_path: &str) -> AppResult<()> {
        self.transfer.test_connection(connection, remote_path).await
    }

    /// Validate, optionally verify connectivity, persist, and install new settings.
    ///
    /// A live session keeps running with the new target; if the local folder
    /// changed it is restarted on the new folder.
    pub async fn save_settings(
        &self,
        settings: SyncSettings,
        verify_connection: bool,
    ) -> AppResult<SyncSettings> {
        let target = SyncTarget::from_settings(&settings)?;
        if verify_connection {
            self.test_connection(&settings.ssh_connection, &settings.remote_path)
                .await?;
        }

        let saved = self.config.write().await.update_settings(settings)?;
        self.install_target(target).await?;
        Ok(saved)
    }

    /// Swap the live session's target, restarting it if the local folder moved
    async fn install_target(&self, target: SyncTarget) -> AppResult<()> {
        let restart = {
            let session = self.session.lock().await;
            match session.as_ref() {
                Some(active) => {
                    let mut live = active.target.write().await;
                    if live.local_root == target.local_root {
                        *live = Arc::new(target);
                        false
                    } else {
                        true
                    }
                }
                None => false,
            }
        };

        if restart {
            info!("Local folder changed, restarting watch session");
            self.start_watching().await?;
        }
        Ok(())
    }

    /// Start watching the configured local folder.
    ///
    /// Any previous session is torn down first; its in-flight transfer, if
    /// any, still runs to completion.
    pub async fn start_watching(&self) -> AppResult<PathBuf> {
        let target = SyncTarget::from_settings(&self.get_settings().await)?;
        let mut session = self.session.lock().await;

        if let Some(previous) = session.take() {
            Self::teardown(previous).await;
        }

        let (watch, events) = RecursiveWatcher::start(&target.local_root)?;
        let root = watch.root().to_path_buf();
        let reporter = StatusReporter::new(self.sink.clone(), &root);
        let filter = PathFilter::new(&target.ignore_patterns);
        let target = shared_target(target);

        let coordinator = SyncCoordinator::new(self.transfer.clone(), reporter, target.clone())
            .with_debounce(self.debounce)
            .with_filter(filter)
            .spawn(events);

        *session = Some(ActiveSession {
            watch,
            coordinator,
            target,
        });

        Ok(root)
    }

    /// Start watching at launch when the saved settings are complete
    pub async fn start_if_configured(&self) -> AppResult<Option<PathBuf>> {
        if !self.get_settings().await.is_complete() {
            info!("Settings incomplete, not watching");
            return Ok(None);
        }
        self.start_watching().await.map(Some)
    }

    /// Stop the live session, if any.
    ///
    /// Returns the coordinator handle so callers can wait for an in-flight
    /// transfer to be reported.
    pub async fn stop_watching(&self) -> Option<CoordinatorHandle> {
        let previous = self.session.lock().await.take()?;
        Some(Self::teardown(previous).await)
    }

    async fn teardown(session: ActiveSession) -> CoordinatorHandle {
        let ActiveSession {
            watch, coordinator, ..
        } = session;

        let mut watch = watch;
        // joining the event pump blocks briefly
        if let Err(e) = tokio::task::spawn_blocking(move || watch.stop()).await {
            tracing::warn!("Failed to stop watch session cleanly: {}", e);
        }
        coordinator
    }

    /// Whether a watch session is live
    pub async fn is_watching(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Root of the live session
    pub async fn watched_root(&self) -> Option<PathBuf> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.watch.root().to_path_buf())
    }

    /// Directories registered by the live session
    pub async fn watched_dirs(&self) -> Vec<PathBuf> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.watch.watched_dirs())
            .unwrap_or_default()
    }

    /// Mirror the whole folder now, returning rsync's output
    pub async fn sync_entire_folder(&self) -> AppResult<String> {
        let target = SyncTarget::from_settings(&self.get_settings().await)?;
        let outcome = self.transfer.mirror(&target).await;
        if outcome.success {
            info!("Full sync completed with deletions");
            Ok(outcome.diagnostic)
        } else {
            Err(AppError::transfer(outcome.diagnostic))
        }
    }

    /// Copy one file or directory under the local folder, without deletions
    pub async fn sync_file(&self, path: &Path) -> AppResult<String> {
        let target = SyncTarget::from_settings(&self.get_settings().await)?;

        let relative = if path.is_absolute() {
            if !target.contains(path) {
                return Err(AppError::validation(format!(
                    "{} is not inside {}",
                    path.display(),
                    target.local_root.display()
                )));
            }
            path.strip_prefix(&target.local_root).unwrap_or(path)
        } else {
            path
        };
        let relative = confine_relative(relative)?;
        let relative = relative.as_path();
        if relative.as_os_str().is_empty() {
            return Err(AppError::validation("path must name an entry inside the local folder"));
        }

        if !target.local_root.join(relative).exists() {
            return Err(AppError::not_found(format!(
                "{} does not exist under {}",
                relative.display(),
                target.local_root.display()
            )));
        }

        if PathFilter::new(&target.ignore_patterns).is_excluded(relative) {
            info!(path = %relative.display(), "Skipping ignored path");
            return Ok(format!("skipped {} (matches ignore list)", relative.display()));
        }

        let outcome = self.transfer.mirror_one(&target, relative).await;
        if outcome.success {
            info!(path = %relative.display(), "Synced");
            Ok(outcome.diagnostic)
        } else {
            Err(AppError::transfer(outcome.diagnostic))
        }
    }
}

/// Rebuild a relative path from its plain components.
///
/// `.` segments are dropped; `..`, roots and prefixes would leave the local
/// folder and are rejected.
fn confine_relative(relative: &Path) -> AppResult<PathBuf> {
    let mut confined = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => confined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::validation(format!(
                    "{} escapes the local folder",
                    relative.display()
                )));
            }
        }
    }
    Ok(confined)
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("debounce", &self.debounce)
            .finish()
    }
}
