//! Data Models
//!
//! Settings, change events, sync run records, and command responses.

pub mod change;
pub mod response;
pub mod settings;

pub use change::*;
pub use response::*;
pub use settings::*;
