//! Transfer Executor
//!
//! Runs rsync over SSH to mirror the local folder onto the remote host, and
//! ssh to check that the remote folder exists before settings are accepted.
//!
//! - `mirror`: full tree, `--delete`, excludes from the ignore list,
//!   `--ignore-errors` so one unreadable file does not abort the run
//! - `mirror_one`: a single relative path with `--relative`, never deletes
//! - `test_connection`: `test -d` on the remote path
//!
//! Transfers are not time-limited here; rsync and ssh apply their own timeouts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::change::TransferOutcome;
use crate::models::settings::SyncTarget;
use crate::utils::error::{AppError, AppResult};

/// Flags shared by every rsync invocation: archive, verbose, compress
const BASE_FLAGS: [&str; 1] = ["-avz"];

/// Executes transfers against a remote endpoint.
///
/// Implementations block the calling task until the external process exits;
/// callers that must stay responsive run them on a separate task.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Make the remote tree exactly match the local tree
    async fn mirror(&self, target: &SyncTarget) -> TransferOutcome;

    /// Copy one path (relative to the local root) without deleting anything
    async fn mirror_one(&self, target: &SyncTarget, relative_path: &Path) -> TransferOutcome;

    /// Verify the remote endpoint is reachable and the remote path is a directory
    async fn test_connection(&self, connection: &str, remote_path: &str) -> AppResult<()>;
}

/// rsync/ssh backed transfer
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    rsync_program: PathBuf,
    ssh_program: PathBuf,
}

impl Default for RsyncTransfer {
    fn default() -> Self {
        Self {
            rsync_program: PathBuf::from("rsync"),
            ssh_program: PathBuf::from("ssh"),
        }
    }
}

impl RsyncTransfer {
    /// Use `rsync` and `ssh` from PATH
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit program locations
    pub fn with_programs(rsync_program: impl Into<PathBuf>, ssh_program: impl Into<PathBuf>) -> Self {
        Self {
            rsync_program: rsync_program.into(),
            ssh_program: ssh_program.into(),
        }
    }

    /// Arguments for a full mirror of `target`
    pub fn mirror_args(target: &SyncTarget) -> Vec<String> {
        let mut args: Vec<String> = BASE_FLAGS.iter().map(|f| f.to_string()).collect();
        args.push("--delete".to_string());
        args.push("--ignore-errors".to_string());

        for pattern in &target.ignore_patterns {
            if !pattern.is_empty() {
                args.push("--exclude".to_string());
                args.push(pattern.clone());
            }
        }

        args.push(target.source());
        args.push(target.destination());
        args
    }

    /// Arguments for copying a single relative path.
    ///
    /// The path is written as `./<path>` so a name starting with `-` is never
    /// read as an option; `--relative` drops the `./` on the remote side.
    pub fn mirror_one_args(target: &SyncTarget, relative_path: &Path) -> Vec<String> {
        let mut args: Vec<String> = BASE_FLAGS.iter().map(|f| f.to_string()).collect();
        args.push("--relative".to_string());
        args.push(format!("./{}", relative_path.to_string_lossy()));
        args.push(target.destination());
        args
    }

    /// Remote shell command that prints `exists` when `remote_path` is a directory
    pub fn remote_test_command(remote_path: &str) -> String {
        format!(
            "test -d {} && echo 'exists' || echo 'not found'",
            shell_quote(remote_path)
        )
    }

    async fn run_rsync(&self, cwd: &Path, args: Vec<String>) -> TransferOutcome {
        let start = Instant::now();
        debug!(program = %self.rsync_program.display(), ?args, "Starting rsync");

        let output = Command::new(&self.rsync_program)
            .args(&args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                let message = AppError::transfer(format!(
                    "failed to start {}: {}",
                    self.rsync_program.display(),
                    e
                ));
                warn!(error = %message, "rsync could not be started");
                return TransferOutcome::failed(message.to_string());
            }
        };

        let combined = combine_output(&output.stdout, &output.stderr);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if output.status.success() {
            info!(elapsed_ms, "rsync completed");
            TransferOutcome::succeeded(combined)
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(exit_code = code, elapsed_ms, output = %combined.trim(), "rsync failed");
            TransferOutcome::failed(format!(
                "rsync exited with status {}: {}",
                code,
                combined.trim()
            ))
        }
    }
}

#[async_trait]
impl Transfer for RsyncTransfer {
    async fn mirror(&self, target: &SyncTarget) -> TransferOutcome {
        let args = Self::mirror_args(target);
        self.run_rsync(&target.local_root, args).await
    }

    async fn mirror_one(&self, target: &SyncTarget, relative_path: &Path) -> TransferOutcome {
        let args = Self::mirror_one_args(target, relative_path);
        self.run_rsync(&target.local_root, args).await
    }

    async fn test_connection(&self, connection: &str, remote_path: &str) -> AppResult<()> {
        if connection.trim().is_empty() {
            return Err(AppError::config("connection string is empty"));
        }
        if remote_path.trim().is_empty() {
            return Err(AppError::config("remote path is empty"));
        }

        let output = Command::new(&self.ssh_program)
            .arg(connection.trim())
            .arg(Self::remote_test_command(remote_path.trim()))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                AppError::connectivity(format!(
                    "failed to start {}: {}",
                    self.ssh_program.display(),
                    e
                ))
            })?;

        let combined = combine_output(&output.stdout, &output.stderr);
        if !output.status.success() {
            return Err(AppError::connectivity(format!(
                "SSH connection failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                combined.trim()
            )));
        }

        if String::from_utf8_lossy(&output.stdout).trim() != "exists" {
            return Err(AppError::connectivity(format!(
                "remote path does not exist: {}",
                remote_path
            )));
        }

        info!(connection, remote_path, "Connection verified");
        Ok(())
    }
}

/// Serializes every transfer that goes through it.
///
/// Watch-triggered and manually requested transfers share one instance so two
/// mirrors never run against the same remote at once.
pub struct ExclusiveTransfer {
    inner: Arc<dyn Transfer>,
    gate: Mutex<()>,
}

impl ExclusiveTransfer {
    pub fn new(inner: Arc<dyn Transfer>) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Transfer for ExclusiveTransfer {
    async fn mirror(&self, target: &SyncTarget) -> TransferOutcome {
        let _guard = self.gate.lock().await;
        self.inner.mirror(target).await
    }

    async fn mirror_one(&self, target: &SyncTarget, relative_path: &Path) -> TransferOutcome {
        let _guard = self.gate.lock().await;
        self.inner.mirror_one(target, relative_path).await
    }

    async fn test_connection(&self, connection: &str, remote_path: &str) -> AppResult<()> {
        self.inner.test_connection(connection, remote_path).await
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).to_string();
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    combined
}

/// Single-quote a string for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}
