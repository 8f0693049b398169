//! Storage Layer
//!
//! Handles settings persistence (JSON config file).

pub mod config;

pub use config::*;
