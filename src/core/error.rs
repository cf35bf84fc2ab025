//! Error types for voxel/mesh synchronization

use thiserror::Error;

use crate::engine::EngineVersion;

/// A failed call across the engine boundary.
///
/// Carries the name of the call, the engine's numeric error code and the
/// engine's last error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine call `{call}` failed with code {code}: {message}")]
pub struct EngineError {
    pub call: &'static str,
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(call: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self {
            call,
            code,
            message: message.into(),
        }
    }
}

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// The voxel engine could not be reached at all.
    #[error("voxel engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The voxel engine answered but speaks a different version.
    #[error("wrong voxel engine version: expected {expected}, found {found}")]
    EngineVersion {
        expected: EngineVersion,
        found: EngineVersion,
    },

    #[error(transparent)]
    EngineCall(#[from] EngineError),

    /// The local mirror no longer matches its own bookkeeping.
    #[error("mirror invariant violated: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that can never clear up by retrying.
    pub fn is_environment(&self) -> bool {
        matches!(self, Error::EngineUnavailable(_) | Error::EngineVersion { .. })
    }
}
