//! Sync Coordinator
//!
//! Turns the watcher's event stream into mirror runs. One task owns all
//! coordinator state; transfers run on their own tasks and report back over
//! a channel, so the event loop never waits on rsync.
//!
//! States:
//! - `Idle`: nothing pending
//! - `Settling`: an eligible change arrived, waiting for the debounce window
//!   to pass without further changes
//! - `Running`: one transfer in flight
//! - `RunningWithPending`: changes arrived during the transfer; exactly one
//!   more transfer starts as soon as it finishes
//!
//! At most one transfer is in flight at any time.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::StatusReporter;
use super::filter::PathFilter;
use super::transfer::Transfer;
use super::watcher::WatchEvent;
use crate::models::change::{SyncRun, Trigger};
use crate::models::settings::SyncTarget;

/// Default quiet period before a burst of changes starts a transfer
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;

/// The single live sync target, swapped whole on settings updates.
///
/// Transfers clone the inner `Arc` when they start, so an update never
/// changes a target while a transfer is reading it.
pub type SharedTarget = Arc<RwLock<Arc<SyncTarget>>>;

/// Create a shared target holder
pub fn shared_target(target: SyncTarget) -> SharedTarget {
    Arc::new(RwLock::new(Arc::new(target)))
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Settling,
    Running,
    RunningWithPending,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        matches!(self, SyncState::Running | SyncState::RunningWithPending)
    }
}

/// Pure transition logic, driven by the coordinator task.
///
/// Each method returns the trigger of a transfer that must start now, if any.
#[derive(Debug)]
pub struct SyncStateMachine {
    state: SyncState,
    latest: Option<Trigger>,
    debounce: Duration,
    settle_until: Option<Instant>,
}

impl SyncStateMachine {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: SyncState::Idle,
            latest: None,
            debounce,
            settle_until: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// When the current settle window ends
    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_until
    }

    /// An eligible change arrived
    pub fn on_change(&mut self, trigger: Trigger, now: Instant) -> Option<Trigger> {
        self.latest = Some(trigger);
        match self.state {
            SyncState::Idle if self.debounce.is_zero() => {
                self.state = SyncState::Running;
                self.latest.take()
            }
            SyncState::Idle | SyncState::Settling => {
                self.state = SyncState::Settling;
                self.settle_until = Some(now + self.debounce);
                None
            }
            SyncState::Running | SyncState::RunningWithPending => {
                self.state = SyncState::RunningWithPending;
                None
            }
        }
    }

    /// The settle window elapsed
    pub fn on_settled(&mut self) -> Option<Trigger> {
        if self.state != SyncState::Settling {
            return None;
        }
        self.settle_until = None;
        self.state = SyncState::Running;
        self.latest.take()
    }

    /// The in-flight transfer finished
    pub fn on_transfer_finished(&mut self) -> Option<Trigger> {
        match self.state {
            SyncState::RunningWithPending => {
                self.state = SyncState::Running;
                self.latest.take()
            }
            SyncState::Running => {
                self.state = SyncState::Idle;
                None
            }
            SyncState::Idle | SyncState::Settling => None,
        }
    }

    /// The event stream ended; drop anything not yet started
    pub fn on_stopped(&mut self) {
        self.latest = None;
        self.settle_until = None;
        self.state = match self.state {
            SyncState::Running | SyncState::RunningWithPending => SyncState::Running,
            SyncState::Idle | SyncState::Settling => SyncState::Idle,
        };
    }
}

/// Counters returned when the coordinator task exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub events: u64,
    pub ignored: u64,
    pub transfers: u64,
    pub failures: u64,
}

/// Debounced, serialized driver of mirror runs
pub struct SyncCoordinator {
    transfer: Arc<dyn Transfer>,
    reporter: StatusReporter,
    target: SharedTarget,
    filter: PathFilter,
    debounce: Duration,
}

impl SyncCoordinator {
    pub fn new(
        transfer: Arc<dyn Transfer>,
        reporter: StatusReporter,
        target: SharedTarget,
    ) -> Self {
        Self {
            transfer,
            reporter,
            target,
            filter: PathFilter::default(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    /// Set the debounce window (zero starts a transfer on the first change)
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Consume `events` on a new task until the stream ends and any
    /// in-flight transfer has finished.
    pub fn spawn(self, events: mpsc::UnboundedReceiver<WatchEvent>) -> CoordinatorHandle {
        let (state_tx, state_rx) = watch::channel(SyncState::Idle);
        let join = tokio::spawn(self.run(events, state_tx));
        CoordinatorHandle {
            state: state_rx,
            join,
        }
    }

    async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        state_tx: watch::Sender<SyncState>,
    ) -> CoordinatorStats {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<SyncRun>();
        let mut machine = SyncStateMachine::new(self.debounce);
        let mut stats = CoordinatorStats::default();
        let mut events_open = true;

        loop {
            if !events_open && !machine.state().is_running() {
                break;
            }

            let deadline = machine.settle_deadline();
            let start = tokio::select! {
                Some(run) = done_rx.recv() => {
                    stats.transfers += 1;
                    if !run.success() {
                        stats.failures += 1;
                    }
                    self.reporter.emit_sync_outcome(&run);
                    machine.on_transfer_finished()
                }
                event = events.recv(), if events_open => match event {
                    Some(WatchEvent::Change(change)) => {
                        stats.events += 1;
                        self.reporter.emit_change(&change);
                        if self.filter.should_sync(&change) {
                            machine.on_change(change.trigger(), Instant::now())
                        } else {
                            stats.ignored += 1;
                            debug!(path = %change.path.display(), op = %change.op, "Change not eligible for sync");
                            None
                        }
                    }
                    Some(WatchEvent::Error(error)) => {
                        self.reporter.emit_watch_error(&error);
                        None
                    }
                    None => {
                        debug!("Watch stream closed");
                        events_open = false;
                        machine.on_stopped();
                        None
                    }
                },
                _ = sleep_until(deadline), if deadline.is_some() => machine.on_settled(),
            };

            if let Some(trigger) = start {
                self.start_transfer(trigger, done_tx.clone()).await;
            }
            state_tx.send_replace(machine.state());
        }

        state_tx.send_replace(SyncState::Idle);
        info!(
            events = stats.events,
            transfers = stats.transfers,
            failures = stats.failures,
            "Sync coordinator stopped"
        );
        stats
    }

    async fn start_transfer(&self, trigger: Trigger, done_tx: mpsc::UnboundedSender<SyncRun>) {
        let target = self.target.read().await.clone();
        let transfer = self.transfer.clone();

        info!(path = %trigger.path.display(), op = %trigger.op, "Starting mirror");
        tokio::spawn(async move {
            let started_at = Utc::now();
            let outcome = transfer.mirror(&target).await;
            if !outcome.success {
                warn!(
                    path = %trigger.path.display(),
                    op = %trigger.op,
                    diagnostic = %outcome.diagnostic.trim(),
                    "Failed to sync folder"
                );
            }
            let run = SyncRun {
                started_at,
                finished_at: Utc::now(),
                trigger,
                outcome,
            };
            // the coordinator holds a sender, so this only fails during runtime shutdown
            let _ = done_tx.send(run);
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Handle to a running coordinator task
pub struct CoordinatorHandle {
    state: watch::Receiver<SyncState>,
    join: JoinHandle<CoordinatorStats>,
}

impl CoordinatorHandle {
    /// Current coordinator state
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Wait until the coordinator is idle (or has exited)
    pub async fn wait_idle(&self) {
        let mut rx = self.state.clone();
        // an error means the task exited, which is idle too
        let _ = rx.wait_for(|s| *s == SyncState::Idle).await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to exit; it does so once the event stream has ended
    /// and the last transfer has been reported.
    pub async fn finished(self) -> CoordinatorStats {
        match self.join.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Sync coordinator task failed: {}", e);
                CoordinatorStats::default()
            }
        }
    }
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("state", &self.state())
            .finish()
    }
}
