//! File System Sync Service
//!
//! Keeps a remote folder mirrored from a local one.
//!
//! Data flow:
//! - `watcher`: recursive watch built from per-directory registrations
//! - `filter`: drops permission-only changes
//! - `coordinator`: debounces bursts, one mirror in flight at a time
//! - `transfer`: rsync over SSH, plus the connectivity check
//! - `events`: publishes raw changes and sync outcomes to the front-end

mod coordinator;
mod events;
mod filter;
mod transfer;
mod watcher;

pub use coordinator::*;
pub use events::*;
pub use filter::*;
pub use transfer::*;
pub use watcher::*;
