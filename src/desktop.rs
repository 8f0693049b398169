//! Desktop Shell Bindings
//!
//! Tauri event sink and command handlers for a desktop front-end.
//! Compiled only with the `desktop` feature.

use std::path::PathBuf;
use tauri::{AppHandle, Emitter, Runtime, State};
use tracing::warn;

use crate::models::response::{CommandResponse, WatchStatus};
use crate::models::settings::SyncSettings;
use crate::services::sync::{EventSink, OutboundEvent};
use crate::state::AppState;

/// Publishes outbound events to every window of a Tauri app
pub struct TauriSink<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriSink<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> EventSink for TauriSink<R> {
    fn emit(&self, event: &OutboundEvent) {
        let result = match event {
            OutboundEvent::FileChange(payload) => self.app.emit(event.channel(), payload.clone()),
            OutboundEvent::SyncStatus(payload) => self.app.emit(event.channel(), payload.clone()),
        };
        if let Err(e) = result {
            warn!("Failed to emit {} event: {}", event.channel(), e);
        }
    }
}

/// Start watching the configured folder
#[tauri::command]
pub async fn start_watching(
    state: State<'_, AppState>,
) -> Result<CommandResponse<String>, String> {
    Ok(state
        .start_watching()
        .await
        .map(|root| root.to_string_lossy().to_string())
        .into())
}

/// Stop watching; an in-flight transfer still reports its outcome
#[tauri::command]
pub async fn stop_watching(state: State<'_, AppState>) -> Result<CommandResponse<bool>, String> {
    Ok(CommandResponse::ok(state.stop_watching().await.is_some()))
}

/// Current watcher status
#[tauri::command]
pub async fn get_watch_status(
    state: State<'_, AppState>,
) -> Result<CommandResponse<WatchStatus>, String> {
    let root = state.watched_root().await;
    Ok(CommandResponse::ok(WatchStatus {
        watching: root.is_some(),
        root: root.map(|r| r.to_string_lossy().to_string()),
        watched_dirs: state.watched_dirs().await.len(),
    }))
}

/// Load settings from disk
#[tauri::command]
pub async fn load_settings(
    state: State<'_, AppState>,
) -> Result<CommandResponse<SyncSettings>, String> {
    Ok(state.load_settings().await.into())
}

/// Verify connectivity, then persist settings
#[tauri::command]
pub async fn save_settings(
    state: State<'_, AppState>,
    settings: SyncSettings,
) -> Result<CommandResponse<SyncSettings>, String> {
    Ok(state.save_settings(settings, true).await.into())
}

/// Check the remote host and path without saving anything
#[tauri::command]
pub async fn test_connection(
    state: State<'_, AppState>,
    ssh_connection: String,
    remote_path: String,
) -> Result<CommandResponse<bool>, String> {
    Ok(state
        .test_connection(&ssh_connection, &remote_path)
        .await
        .map(|_| true)
        .into())
}

/// Mirror the whole folder now
#[tauri::command]
pub async fn sync_entire_folder(
    state: State<'_, AppState>,
) -> Result<CommandResponse<String>, String> {
    Ok(state.sync_entire_folder().await.into())
}

/// Copy one path under the local folder
#[tauri::command]
pub async fn sync_file(
    state: State<'_, AppState>,
    path: String,
) -> Result<CommandResponse<String>, String> {
    Ok(state.sync_file(&PathBuf::from(path)).await.into())
}
