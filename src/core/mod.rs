//! Core types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod config;

pub use types::*;
pub use error::{EngineError, Error};
pub use config::SyncConfig;
