//! File Sync Homelab
//!
//! Watches a local folder tree and mirrors it to a remote host over SSH with
//! rsync whenever something changes. It includes:
//! - A recursive watcher built from per-directory watches
//! - A debounced coordinator that never runs two mirrors at once
//! - Status events for a front-end (JSON lines, broadcast, or Tauri)
//! - Persisted settings in the user's home directory

pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use models::response::{CommandResponse, WatchStatus};
pub use models::settings::{parse_ignore_list, SyncSettings, SyncTarget};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
