//! Status Reporter
//!
//! Defines the outbound event payloads and publishes them to whatever
//! notification channel the front-end listens on. Publication is
//! fire-and-forget: failures are logged and never block the caller.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use super::watcher::WatchError;
use crate::models::change::{ChangeEvent, SyncRun};
use crate::utils::error::AppResult;
use crate::utils::paths::display_relative;

/// Event channel names understood by the front-end
pub mod channels {
    /// Raw change notifications and watcher errors
    pub const FILE_CHANGE: &str = "fileChange";
    /// Outcome of a mirror run
    pub const SYNC_STATUS: &str = "syncStatus";
}

/// Operation name used for watcher errors on the fileChange channel
pub const ERROR_OPERATION: &str = "ERROR";

/// fileChange payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangePayload {
    /// Human-readable log line
    pub message: String,
    /// Operation name (CREATE, WRITE, ..., or ERROR)
    pub operation: String,
    /// Absolute path of the changed entry, empty for errors
    pub path: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl FileChangePayload {
    /// Build the payload for a change observed under `root`
    pub fn from_change(event: &ChangeEvent, root: &std::path::Path) -> Self {
        let message = format!(
            "[{}] {} - {}",
            event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            event.op,
            display_relative(root, &event.path)
        );
        Self {
            message,
            operation: event.op.to_string(),
            path: event.path.to_string_lossy().to_string(),
            timestamp: event.timestamp.timestamp(),
        }
    }

    /// Build the payload for a watcher error
    pub fn from_error(error: &WatchError) -> Self {
        Self {
            message: format!("[ERROR] {}", error.message),
            operation: ERROR_OPERATION.to_string(),
            path: String::new(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// syncStatus payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusPayload {
    /// Path of the change that triggered the run
    pub path: String,
    pub success: bool,
    /// Diagnostic output, present only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operation of the triggering change
    pub operation: String,
    /// Unix seconds at completion
    pub timestamp: i64,
}

impl SyncStatusPayload {
    pub fn from_run(run: &SyncRun) -> Self {
        Self {
            path: run.trigger.path.to_string_lossy().to_string(),
            success: run.outcome.success,
            error: (!run.outcome.success).then(|| run.outcome.diagnostic.clone()),
            operation: run.trigger.op.to_string(),
            timestamp: run.finished_at.timestamp(),
        }
    }
}

/// An event on its way to the front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum OutboundEvent {
    #[serde(rename = "fileChange")]
    FileChange(FileChangePayload),
    #[serde(rename = "syncStatus")]
    SyncStatus(SyncStatusPayload),
}

impl OutboundEvent {
    /// Channel this event is published on
    pub fn channel(&self) -> &'static str {
        match self {
            OutboundEvent::FileChange(_) => channels::FILE_CHANGE,
            OutboundEvent::SyncStatus(_) => channels::SYNC_STATUS,
        }
    }
}

/// Destination for outbound events.
///
/// `emit` must not block on the consumer.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &OutboundEvent);
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Slow subscribers lag and lose events instead of slowing the watcher.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<OutboundEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &OutboundEvent) {
        // no subscribers is not an error
        let _ = self.tx.send(event.clone());
    }
}

/// Writes each event as one JSON line, for front-ends that read our stdout.
///
/// Lines are handed to a dedicated writer thread, so a reader that stops
/// draining the pipe never stalls the caller of `emit`.
pub struct JsonLinesSink<W: Write + Send + 'static> {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<thread::JoinHandle<W>>>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(mut writer: W) -> AppResult<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = thread::Builder::new()
            .name("json-events".to_string())
            .spawn(move || {
                while let Some(line) = rx.blocking_recv() {
                    if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                        warn!("Failed to write event line: {}", e);
                    }
                }
                writer
            })?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Stop accepting events, wait for queued lines to be written, and
    /// return the writer. Later calls return `None`.
    pub fn close(&self) -> Option<W> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let handle = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        match handle.join() {
            Ok(writer) => Some(writer),
            Err(_) => {
                warn!("JSON event writer panicked");
                None
            }
        }
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> AppResult<Self> {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: &OutboundEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.channel(), e);
                return;
            }
        };
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(tx) if tx.send(line).is_ok() => {}
            _ => warn!("Dropped {} event, writer is closed", event.channel()),
        }
    }
}

/// Reports events through the log only
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &OutboundEvent) {
        match event {
            OutboundEvent::FileChange(change) if change.operation == ERROR_OPERATION => {
                warn!("{}", change.message)
            }
            OutboundEvent::FileChange(change) => info!("{}", change.message),
            OutboundEvent::SyncStatus(status) if status.success => {
                info!(path = %status.path, operation = %status.operation, "Sync completed")
            }
            OutboundEvent::SyncStatus(status) => warn!(
                path = %status.path,
                operation = %status.operation,
                error = status.error.as_deref().unwrap_or(""),
                "Sync failed"
            ),
        }
    }
}

/// Typed publisher for one watch root
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn EventSink>,
    root: PathBuf,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn EventSink>, root: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            root: root.into(),
        }
    }

    /// Publish a raw change notification
    pub fn emit_change(&self, event: &ChangeEvent) {
        let payload = FileChangePayload::from_change(event, &self.root);
        self.sink.emit(&OutboundEvent::FileChange(payload));
    }

    /// Publish the outcome of a completed run
    pub fn emit_sync_outcome(&self, run: &SyncRun) {
        self.sink
            .emit(&OutboundEvent::SyncStatus(SyncStatusPayload::from_run(run)));
    }

    /// Publish a watcher error
    pub fn emit_watch_error(&self, error: &WatchError) {
        self.sink
            .emit(&OutboundEvent::FileChange(FileChangePayload::from_error(error)));
    }
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("root", &self.root)
            .finish()
    }
}
