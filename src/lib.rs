//! voxsync - keeps renderable meshes in step with an external voxel engine
//!
//! The engine owns the voxel data and builds meshes for an octree of nodes.
//! This crate mirrors that tree on the host side, pulling a bounded number
//! of changed meshes per tick.

pub mod core;
pub mod voxel;
pub mod engine;
pub mod sync;

pub use crate::core::{Error, Result, SyncConfig};
pub use crate::engine::{MemoryEngine, VoxelEngine};
pub use crate::sync::{SyncEvent, SyncState, Volume, VolumeRegistry};
