//! End-to-End Tests
//!
//! Watches a real folder and runs RsyncTransfer against shell scripts that
//! stand in for rsync and ssh, recording the arguments they receive.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use file_sync_homelab::services::sync::{
    BroadcastSink, OutboundEvent, RsyncTransfer, SyncStatusPayload,
};
use file_sync_homelab::storage::ConfigService;
use file_sync_homelab::{AppError, AppState, SyncSettings};

// ============================================================================
// Helper Functions
// ============================================================================

/// Write an executable shell script
fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A stand-in rsync that appends its arguments, one per line, then a separator
fn fake_rsync(dir: &Path, log: &Path, exit_code: i32) -> PathBuf {
    let script = dir.join("rsync");
    write_script(
        &script,
        &format!(
            "printf '%s\\n' \"$@\" >> '{log}'\necho '---' >> '{log}'\n\
             if [ {code} -ne 0 ]; then echo 'rsync: connection unexpectedly closed' >&2; fi\n\
             exit {code}",
            log = log.display(),
            code = exit_code
        ),
    );
    script
}

/// A stand-in ssh that runs the remote command locally
fn fake_ssh(dir: &Path) -> PathBuf {
    let script = dir.join("ssh");
    write_script(&script, "shift\nsh -c \"$1\"");
    script
}

struct Fixture {
    _dir: TempDir,
    local: PathBuf,
    remote: PathBuf,
    log: PathBuf,
    app: AppState,
    events: broadcast::Receiver<OutboundEvent>,
}

fn fixture(exit_code: i32) -> Fixture {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("w");
    let remote = dir.path().join("remote");
    let bin = dir.path().join("bin");
    fs::create_dir_all(&local).unwrap();
    fs::create_dir_all(&remote).unwrap();
    fs::create_dir_all(&bin).unwrap();

    let log = dir.path().join("rsync.log");
    let transfer = RsyncTransfer::with_programs(fake_rsync(&bin, &log, exit_code), fake_ssh(&bin));
    let sink = Arc::new(BroadcastSink::new(1024));
    let events = sink.subscribe();
    let config = ConfigService::open(dir.path().join("config.json")).unwrap();
    let app = AppState::new(config, Arc::new(transfer), sink)
        .with_debounce(Duration::from_millis(300));

    Fixture {
        _dir: dir,
        local,
        remote,
        log,
        app,
        events,
    }
}

fn settings(fixture: &Fixture, ignore: &[&str]) -> SyncSettings {
    SyncSettings::new(
        fixture.local.to_string_lossy(),
        "me@homelab",
        fixture.remote.to_string_lossy(),
        ignore.iter().map(|s| s.to_string()).collect(),
    )
}

/// Recorded invocations, one argument list per run
fn invocations(log: &Path) -> Vec<Vec<String>> {
    let text = fs::read_to_string(log).unwrap_or_default();
    text.split("---\n")
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| chunk.lines().map(str::to_string).collect())
        .collect()
}

async fn next_status(events: &mut broadcast::Receiver<OutboundEvent>) -> SyncStatusPayload {
    timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(OutboundEvent::SyncStatus(status)) = events.recv().await {
                return status;
            }
        }
    })
    .await
    .expect("no syncStatus event")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_quick_changes_produce_one_mirror_with_excludes() {
    let mut fx = fixture(0);
    fx.app
        .save_settings(settings(&fx, &["*.tmp"]), true)
        .await
        .unwrap();
    let root = fx.app.start_watching().await.unwrap();

    fs::write(root.join("a.txt"), "hello").unwrap();
    fs::write(root.join("b.tmp"), "scratch").unwrap();

    let status = next_status(&mut fx.events).await;
    assert!(status.success);
    assert!(status.error.is_none());

    // nothing else was pending
    sleep(Duration::from_millis(800)).await;
    fx.app.stop_watching().await.unwrap().finished().await;

    let runs = invocations(&fx.log);
    assert_eq!(runs.len(), 1, "expected one rsync run, got {:?}", runs);
    let args = &runs[0];
    assert_eq!(&args[..3], &["-avz", "--delete", "--ignore-errors"]);
    let exclude = args.iter().position(|a| a == "--exclude").unwrap();
    assert_eq!(args[exclude + 1], "*.tmp");
    assert_eq!(
        args.last().unwrap(),
        &format!("me@homelab:{}/", fx.remote.display())
    );
    assert_eq!(
        args[args.len() - 2],
        format!("{}/", fx.local.display())
    );
}

#[tokio::test]
async fn test_failed_mirror_reports_diagnostic() {
    let mut fx = fixture(23);
    fx.app
        .save_settings(settings(&fx, &[]), false)
        .await
        .unwrap();
    let root = fx.app.start_watching().await.unwrap();

    fs::write(root.join("a.txt"), "hello").unwrap();

    let status = next_status(&mut fx.events).await;
    assert!(!status.success);
    let error = status.error.unwrap();
    assert!(error.contains("23"));
    assert!(error.contains("connection unexpectedly closed"));

    fx.app.stop_watching().await.unwrap().finished().await;
}

#[tokio::test]
async fn test_connection_check_gates_settings() {
    let fx = fixture(0);

    fx.app.save_settings(settings(&fx, &[]), true).await.unwrap();

    let mut missing = settings(&fx, &[]);
    missing.remote_path = fx.remote.join("absent").to_string_lossy().to_string();
    let err = fx.app.save_settings(missing, true).await.unwrap_err();
    assert!(matches!(err, AppError::Connectivity(_)));

    // the earlier settings are still in place
    assert_eq!(
        fx.app.get_settings().await.remote_path,
        fx.remote.to_string_lossy()
    );
}

#[tokio::test]
async fn test_manual_sync_commands() {
    let fx = fixture(0);
    fx.app
        .save_settings(settings(&fx, &["*.log"]), false)
        .await
        .unwrap();
    fs::create_dir_all(fx.local.join("docs")).unwrap();
    fs::write(fx.local.join("docs/a.txt"), "x").unwrap();
    fs::write(fx.local.join("debug.log"), "x").unwrap();

    fx.app.sync_entire_folder().await.unwrap();
    fx.app
        .sync_file(&fx.local.join("docs/a.txt"))
        .await
        .unwrap();
    let skipped = fx.app.sync_file(&fx.local.join("debug.log")).await.unwrap();
    assert!(skipped.contains("skipped"));

    let runs = invocations(&fx.log);
    assert_eq!(runs.len(), 2);
    assert!(runs[0].contains(&"--delete".to_string()));
    assert_eq!(
        runs[1],
        vec![
            "-avz".to_string(),
            "--relative".to_string(),
            "./docs/a.txt".to_string(),
            format!("me@homelab:{}/", fx.remote.display()),
        ]
    );
}
