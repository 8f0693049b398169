//! Change and Sync Run Models
//!
//! Filesystem change notifications and the record of one mirroring run.

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of filesystem operation carried by a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    /// File or directory was created (or moved into the tree)
    Create,
    /// File contents were written
    Write,
    /// File or directory was removed
    Remove,
    /// File or directory was renamed away from this path
    Rename,
    /// Permissions or other metadata changed
    Chmod,
}

impl ChangeOp {
    /// Upper-case name used in outbound events
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Create => "CREATE",
            ChangeOp::Write => "WRITE",
            ChangeOp::Remove => "REMOVE",
            ChangeOp::Rename => "RENAME",
            ChangeOp::Chmod => "CHMOD",
        }
    }

    /// Map a notify event kind.
    ///
    /// Returns `None` for pure access notifications, which never describe a change.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeOp::Create),
            EventKind::Remove(_) => Some(ChangeOp::Remove),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeOp::Chmod),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeOp::Create),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeOp::Rename),
            EventKind::Modify(_) => Some(ChangeOp::Write),
            EventKind::Access(_) => None,
            EventKind::Any | EventKind::Other => Some(ChangeOp::Write),
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filesystem notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed entry
    pub path: PathBuf,
    /// Operation kind
    pub op: ChangeOp,
    /// When the watcher observed the change
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create a change event stamped with the current time
    pub fn new(path: impl Into<PathBuf>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
            timestamp: Utc::now(),
        }
    }

    /// The trigger this event would record if it causes a sync
    pub fn trigger(&self) -> Trigger {
        Trigger {
            path: self.path.clone(),
            op: self.op,
        }
    }
}

/// The path and operation that caused a sync run to be (re)triggered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub path: PathBuf,
    pub op: ChangeOp,
}

/// Result of one external transfer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    /// Combined process output, or the reason the process could not run
    pub diagnostic: String,
}

impl TransferOutcome {
    pub fn succeeded(diagnostic: impl Into<String>) -> Self {
        Self {
            success: true,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            success: false,
            diagnostic: if diagnostic.trim().is_empty() {
                "transfer failed without output".to_string()
            } else {
                diagnostic
            },
        }
    }
}

/// One execution of the mirroring transfer
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub trigger: Trigger,
    pub outcome: TransferOutcome,
}

impl SyncRun {
    pub fn success(&self) -> bool {
        self.outcome.success
    }
}
