//! Services
//!
//! Business logic services for the application.

pub mod sync;

pub use sync::{RecursiveWatcher, RsyncTransfer, StatusReporter, SyncCoordinator, WatchSession};
