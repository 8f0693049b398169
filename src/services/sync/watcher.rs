//! Recursive Watcher
//!
//! Builds a recursive watch out of single-directory `notify` registrations.
//! Every directory under the root gets its own non-recursive watch; a create
//! (or move-in) of a directory registers it and everything already inside it
//! before the next raw event is processed.
//!
//! Race window: entries created inside a new directory before its watch is
//! registered produce no notification of their own. The registration walk
//! reports every entry it finds under the new directory as a synthetic
//! `CREATE`, so they are never silently missed.

use notify::event::{Flag, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::models::change::{ChangeEvent, ChangeOp};
use crate::utils::error::{AppError, AppResult};

/// How often the event pump checks whether its session was stopped
const PUMP_POLL_INTERVAL_MS: u64 = 100;

/// Asynchronous error reported by the notification source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchError {
    pub message: String,
    pub path: Option<PathBuf>,
}

impl WatchError {
    /// Create from a notify error
    pub fn from_notify_error(error: &notify::Error) -> Self {
        Self {
            message: error.to_string(),
            path: error.paths.first().cloned(),
        }
    }
}

/// Item on a watch session's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Change(ChangeEvent),
    Error(WatchError),
}

/// Registers watches on single directories.
pub trait DirectoryWatcher: Send {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl DirectoryWatcher for RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }

    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.unwatch(dir)
    }
}

/// The set of watched directories for one root, kept current as raw
/// notifications arrive.
pub struct WatchRegistry<W: DirectoryWatcher> {
    watcher: W,
    root: PathBuf,
    watched: BTreeSet<PathBuf>,
    /// Bumped whenever `watched` changes
    generation: u64,
}

impl<W: DirectoryWatcher> WatchRegistry<W> {
    pub fn new(watcher: W, root: impl Into<PathBuf>) -> Self {
        Self {
            watcher,
            root: root.into(),
            watched: BTreeSet::new(),
            generation: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register `dir` and every directory below it.
    ///
    /// Returns the entries found below `dir` when `dir` was not watched
    /// before, so the caller can report them. Walk and registration failures
    /// are logged per directory and skipped.
    pub fn register_tree(&mut self, dir: &Path) -> Vec<PathBuf> {
        if self.watched.contains(dir) {
            return Vec::new();
        }

        let mut discovered = Vec::new();
        let walker = ignore::WalkBuilder::new(dir)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %dir.display(), error = %e, "Failed to walk directory");
                    continue;
                }
            };

            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                self.register_dir(entry.path());
            }
            if entry.depth() > 0 {
                discovered.push(entry.path().to_path_buf());
            }
        }

        discovered
    }

    fn register_dir(&mut self, dir: &Path) {
        if self.watched.contains(dir) {
            return;
        }
        match self.watcher.watch_dir(dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "Watching directory");
                self.watched.insert(dir.to_path_buf());
                self.generation += 1;
            }
            Err(e) => {
                let error = AppError::from(e);
                warn!(path = %dir.display(), error = %error, "Failed to watch directory");
            }
        }
    }

    /// Drop the watches for `path` and everything below it
    pub fn forget_tree(&mut self, path: &Path) {
        let gone: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|dir| dir.starts_with(path))
            .cloned()
            .collect();

        for dir in gone {
            // the kernel usually dropped it already
            let _ = self.watcher.unwatch_dir(&dir);
            self.watched.remove(&dir);
            self.generation += 1;
            debug!(path = %dir.display(), "Stopped watching directory");
        }
    }

    /// Translate one raw notification into stream events, updating the
    /// registered set first.
    pub fn handle(&mut self, raw: notify::Result<Event>) -> Vec<WatchEvent> {
        let event = match raw {
            Ok(event) => event,
            Err(error) => {
                warn!(error = %error, "Watcher error");
                return vec![WatchEvent::Error(WatchError::from_notify_error(&error))];
            }
        };

        let mut out = Vec::new();

        if matches!(event.flag(), Some(Flag::Rescan)) {
            // events were dropped; re-walk and report the root as changed
            warn!(root = %self.root.display(), "Watcher requested a rescan");
            let root = self.root.clone();
            self.watched.clear();
            self.generation += 1;
            self.register_tree(&root);
            out.push(WatchEvent::Change(ChangeEvent::new(root, ChangeOp::Write)));
            return out;
        }

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
                self.apply(ChangeEvent::new(event.paths[0].clone(), ChangeOp::Rename), &mut out);
                self.apply(ChangeEvent::new(event.paths[1].clone(), ChangeOp::Create), &mut out);
            }
            kind => {
                let Some(op) = ChangeOp::from_event_kind(&kind) else {
                    return out;
                };
                for path in event.paths {
                    self.apply(ChangeEvent::new(path, op), &mut out);
                }
            }
        }

        out
    }

    fn apply(&mut self, event: ChangeEvent, out: &mut Vec<WatchEvent>) {
        let path = event.path.clone();
        let op = event.op;
        out.push(WatchEvent::Change(event));

        match op {
            ChangeOp::Create => {
                let is_dir = std::fs::symlink_metadata(&path)
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    for child in self.register_tree(&path) {
                        out.push(WatchEvent::Change(ChangeEvent::new(child, ChangeOp::Create)));
                    }
                }
            }
            ChangeOp::Remove | ChangeOp::Rename => self.forget_tree(&path),
            ChangeOp::Write | ChangeOp::Chmod => {}
        }
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.watched.iter().cloned().collect()
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

type SharedRegistry = Arc<Mutex<Option<WatchRegistry<RecommendedWatcher>>>>;

/// Copy of the watched set, published by the pump after each change so
/// status queries never touch the registry lock.
type WatchedSnapshot = Arc<watch::Sender<BTreeSet<PathBuf>>>;

/// Starts watch sessions
pub struct RecursiveWatcher;

impl RecursiveWatcher {
    /// Watch `root` and everything below it.
    ///
    /// The returned stream yields events until the session is stopped or
    /// dropped, then ends.
    pub fn start(root: &Path) -> AppResult<(WatchSession, mpsc::UnboundedReceiver<WatchEvent>)> {
        let root = root.canonicalize().map_err(|e| {
            AppError::config(format!("local folder {} is not accessible: {}", root.display(), e))
        })?;
        if !root.is_dir() {
            return Err(AppError::config(format!(
                "local folder {} is not a directory",
                root.display()
            )));
        }

        let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Result<Event>>();
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;

        let mut registry = WatchRegistry::new(watcher, root.clone());
        registry.register_tree(&root);
        if !registry.is_watching(&root) {
            return Err(AppError::watch_registration(format!(
                "failed to watch folder {}",
                root.display()
            )));
        }
        let watched = registry.watched_count();
        let generation = registry.generation();
        let (snapshot, _) = watch::channel(registry.watched.clone());
        let snapshot: WatchedSnapshot = Arc::new(snapshot);

        let registry: SharedRegistry = Arc::new(Mutex::new(Some(registry)));
        let (tx, rx) = mpsc::unbounded_channel();

        let pump = thread::Builder::new()
            .name("watch-pump".to_string())
            .spawn({
                let registry = registry.clone();
                let snapshot = snapshot.clone();
                move || pump_events(raw_rx, registry, snapshot, generation, tx)
            })?;

        info!(root = %root.display(), directories = watched, "Started watching");

        Ok((
            WatchSession {
                root,
                registry,
                snapshot,
                pump: Some(pump),
            },
            rx,
        ))
    }
}

fn pump_events(
    raw_rx: std_mpsc::Receiver<notify::Result<Event>>,
    registry: SharedRegistry,
    snapshot: WatchedSnapshot,
    mut published: u64,
    tx: mpsc::UnboundedSender<WatchEvent>,
) {
    let poll = Duration::from_millis(PUMP_POLL_INTERVAL_MS);
    loop {
        let raw = match raw_rx.recv_timeout(poll) {
            Ok(raw) => Some(raw),
            Err(std_mpsc::RecvTimeoutError::Timeout) => None,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let events = {
            let mut guard = registry.lock().unwrap_or_else(|e| e.into_inner());
            let Some(registry) = guard.as_mut() else {
                break;
            };
            let Some(raw) = raw else {
                continue;
            };
            let events = registry.handle(raw);
            if registry.generation() != published {
                published = registry.generation();
                snapshot.send_replace(registry.watched.clone());
            }
            events
        };

        for event in events {
            if tx.send(event).is_err() {
                debug!("Watch stream receiver dropped");
                return;
            }
        }
    }
    debug!("Watch event pump stopped");
}

/// The live set of watch registrations for one root.
///
/// Stopping (or dropping) the session releases every watch and ends its
/// event stream.
pub struct WatchSession {
    root: PathBuf,
    registry: SharedRegistry,
    snapshot: WatchedSnapshot,
    pump: Option<thread::JoinHandle<()>>,
}

impl WatchSession {
    /// Canonical root being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.pump.is_some()
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.snapshot.borrow().contains(dir)
    }

    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.snapshot.borrow().iter().cloned().collect()
    }

    /// Release every watch and wait for the event stream to close
    pub fn stop(&mut self) {
        let registry = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.snapshot.send_replace(BTreeSet::new());

        if let Some(registry) = registry {
            let count = registry.watched_count();
            drop(registry);
            info!(root = %self.root.display(), directories = count, "Stopped watching");
        }

        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                warn!("Watch event pump panicked");
            }
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish()
    }
}
