//! Core type aliases and re-exports

pub use glam::{IVec3, Vec4};

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Monotonic per-node mesh timestamp reported by the engine.
pub type MeshVersion = u32;

/// Host-side placement marker (rendering layer) propagated to mesh fragments.
pub type ContextMarker = u32;
