//! Application State Tests
//!
//! Session lifecycle through AppState with a transfer that only counts calls.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use file_sync_homelab::models::change::TransferOutcome;
use file_sync_homelab::services::sync::{BroadcastSink, OutboundEvent, Transfer};
use file_sync_homelab::storage::ConfigService;
use file_sync_homelab::{AppError, AppResult, AppState, SyncSettings, SyncTarget};

#[derive(Default)]
struct CountingTransfer {
    mirrors: AtomicUsize,
    last_excludes: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl Transfer for CountingTransfer {
    async fn mirror(&self, target: &SyncTarget) -> TransferOutcome {
        self.mirrors.fetch_add(1, Ordering::SeqCst);
        *self.last_excludes.lock().unwrap() = target.ignore_patterns.clone();
        TransferOutcome::succeeded("")
    }

    async fn mirror_one(&self, _target: &SyncTarget, _relative_path: &Path) -> TransferOutcome {
        TransferOutcome::succeeded("")
    }

    async fn test_connection(&self, _connection: &str, _remote_path: &str) -> AppResult<()> {
        Ok(())
    }
}

fn app(dir: &TempDir, transfer: Arc<CountingTransfer>, sink: Arc<BroadcastSink>) -> AppState {
    let config = ConfigService::open(dir.path().join("config.json")).unwrap();
    AppState::new(config, transfer, sink).with_debounce(Duration::from_millis(100))
}

fn settings(local: &Path, ignore: &[&str]) -> SyncSettings {
    SyncSettings::new(
        local.to_string_lossy(),
        "me@homelab",
        "/srv/w",
        ignore.iter().map(|s| s.to_string()).collect(),
    )
}

#[tokio::test]
async fn test_incomplete_settings_fail_before_any_watch() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir, Arc::default(), Arc::new(BroadcastSink::new(16)));

    let mut incomplete = settings(dir.path(), &[]);
    incomplete.remote_path.clear();
    let err = app.save_settings(incomplete, true).await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    let err = app.start_watching().await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert!(!app.is_watching().await);
}

#[tokio::test]
async fn test_missing_local_folder_fails_to_start() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir, Arc::default(), Arc::new(BroadcastSink::new(16)));
    app.save_settings(settings(&dir.path().join("absent"), &[]), false)
        .await
        .unwrap();

    let err = app.start_watching().await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert!(!app.is_watching().await);
}

#[tokio::test]
async fn test_change_triggers_one_mirror_with_current_target() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("w");
    fs::create_dir_all(&local).unwrap();

    let transfer = Arc::new(CountingTransfer::default());
    let sink = Arc::new(BroadcastSink::new(256));
    let mut events = sink.subscribe();
    let app = app(&dir, transfer.clone(), sink.clone());
    app.save_settings(settings(&local, &["*.tmp"]), false)
        .await
        .unwrap();
    let root = app.start_watching().await.unwrap();

    // a settings update while watching the same folder swaps the target in place
    app.save_settings(settings(&local, &["*.tmp", "*.bak"]), false)
        .await
        .unwrap();
    assert_eq!(app.watched_root().await, Some(root.clone()));

    fs::write(root.join("a.txt"), "hello").unwrap();

    let status = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(OutboundEvent::SyncStatus(status)) = events.recv().await {
                return status;
            }
        }
    })
    .await
    .expect("no syncStatus event");
    assert!(status.success);

    sleep(Duration::from_millis(300)).await;
    let handle = app.stop_watching().await.unwrap();
    handle.finished().await;

    assert_eq!(transfer.mirrors.load(Ordering::SeqCst), 1);
    assert_eq!(*transfer.last_excludes.lock().unwrap(), vec!["*.tmp", "*.bak"]);
}

#[tokio::test]
async fn test_changing_local_folder_restarts_session() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(second.join("sub")).unwrap();

    let app = app(&dir, Arc::default(), Arc::new(BroadcastSink::new(16)));
    app.save_settings(settings(&first, &[]), false).await.unwrap();
    let first_root = app.start_watching().await.unwrap();

    app.save_settings(settings(&second, &[]), false).await.unwrap();
    let second_root = app.watched_root().await.unwrap();
    assert_ne!(first_root, second_root);
    assert!(app
        .watched_dirs()
        .await
        .contains(&second_root.join("sub")));
    assert!(!app.watched_dirs().await.contains(&first_root));

    app.stop_watching().await.unwrap().finished().await;
}
