//! Boundary to the authoritative voxel engine.
//!
//! The engine owns the voxel data, its octree and the meshes extracted from
//! it. This crate only reads from it through opaque handles. Every call can
//! fail with an [`EngineError`]; callers propagate those as
//! [`Error::EngineCall`](crate::core::Error::EngineCall).

pub mod memory;

use std::fmt;

use crate::core::{EngineError, Error, IVec3, MeshVersion, Result};

pub use memory::MemoryEngine;

/// Engine version this crate is written against.
pub const REQUIRED_ENGINE_VERSION: EngineVersion = EngineVersion::new(1, 0, 0);

/// Opaque handle to a volume owned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeHandle(pub u32);

/// Opaque handle to an octree node owned by the engine.
///
/// Only valid while the engine still reports the node; never keep one across
/// a flush without re-querying the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u32);

/// Semantic version of the engine library.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Position of a child inside its parent (one bit per axis).
///
/// Index layout: bit 0 = X, bit 1 = Y, bit 2 = Z, so iterating indices 0..8
/// walks X fastest and Z slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildCoord(u8);

impl ChildCoord {
    /// All eight children in traversal order.
    pub const ALL: [ChildCoord; 8] = [
        ChildCoord(0),
        ChildCoord(1),
        ChildCoord(2),
        ChildCoord(3),
        ChildCoord(4),
        ChildCoord(5),
        ChildCoord(6),
        ChildCoord(7),
    ];

    /// Create from per-axis offsets, each 0 or 1.
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        debug_assert!(x < 2 && y < 2 && z < 2);
        Self(((x & 1) | ((y & 1) << 1) | ((z & 1) << 2)) as u8)
    }

    /// Create from a 3-bit index.
    pub fn from_index(index: u8) -> Option<Self> {
        (index < 8).then_some(Self(index))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn x(self) -> u32 {
        (self.0 & 1) as u32
    }

    pub fn y(self) -> u32 {
        ((self.0 >> 1) & 1) as u32
    }

    pub fn z(self) -> u32 {
        ((self.0 >> 2) & 1) as u32
    }
}

/// Query interface of the authoritative voxel engine.
///
/// All calls are read-only with respect to voxel content.
/// [`update_volume`](VoxelEngine::update_volume) only asks the engine to
/// bring its own meshes up to date.
pub trait VoxelEngine {
    /// Vertex format of the meshes this engine extracts.
    type Vertex: Clone;

    fn version(&self) -> std::result::Result<EngineVersion, EngineError>;

    fn update_volume(&self, volume: VolumeHandle) -> std::result::Result<(), EngineError>;

    /// Root node of the volume's octree, if the engine has built one.
    fn root_node(
        &self,
        volume: VolumeHandle,
    ) -> std::result::Result<Option<NodeHandle>, EngineError>;

    fn has_child(
        &self,
        node: NodeHandle,
        coord: ChildCoord,
    ) -> std::result::Result<bool, EngineError>;

    fn child(
        &self,
        node: NodeHandle,
        coord: ChildCoord,
    ) -> std::result::Result<NodeHandle, EngineError>;

    fn has_mesh(&self, node: NodeHandle) -> std::result::Result<bool, EngineError>;

    /// Timestamp of the node's last mesh change.
    fn last_updated(&self, node: NodeHandle) -> std::result::Result<MeshVersion, EngineError>;

    /// Origin of the node's region in voxel space.
    fn position(&self, node: NodeHandle) -> std::result::Result<IVec3, EngineError>;

    fn vertices(&self, node: NodeHandle) -> std::result::Result<Vec<Self::Vertex>, EngineError>;

    fn indices(&self, node: NodeHandle) -> std::result::Result<Vec<u32>, EngineError>;
}

/// Check that the engine is reachable and of the required version.
pub fn validate<E: VoxelEngine + ?Sized>(engine: &E) -> Result<()> {
    let found = engine
        .version()
        .map_err(|e| Error::EngineUnavailable(e.to_string()))?;

    if found != REQUIRED_ENGINE_VERSION {
        return Err(Error::EngineVersion {
            expected: REQUIRED_ENGINE_VERSION,
            found,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_coord_index() {
        assert_eq!(ChildCoord::new(0, 0, 0).index(), 0);
        assert_eq!(ChildCoord::new(1, 0, 0).index(), 1);
        assert_eq!(ChildCoord::new(0, 1, 0).index(), 2);
        assert_eq!(ChildCoord::new(0, 0, 1).index(), 4);
        assert_eq!(ChildCoord::new(1, 1, 1).index(), 7);

        for (i, coord) in ChildCoord::ALL.iter().enumerate() {
            assert_eq!(coord.index(), i);
            assert_eq!(ChildCoord::new(coord.x(), coord.y(), coord.z()), *coord);
        }

        assert!(ChildCoord::from_index(8).is_none());
        assert_eq!(ChildCoord::from_index(5), Some(ChildCoord::new(1, 0, 1)));
    }

    #[test]
    fn test_validate_accepts_required_version() {
        let engine = MemoryEngine::new();
        assert!(validate(&engine).is_ok());
    }

    #[test]
    fn test_validate_rejects_other_version() {
        let engine = MemoryEngine::with_version(EngineVersion::new(1, 1, 0));
        match validate(&engine) {
            Err(Error::EngineVersion { expected, found }) => {
                assert_eq!(expected, REQUIRED_ENGINE_VERSION);
                assert_eq!(found, EngineVersion::new(1, 1, 0));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_reports_unavailable_engine() {
        let mut engine = MemoryEngine::new();
        engine.fail_call(memory::calls::VERSION, 7, "library not loaded");
        let err = validate(&engine).unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable(_)));
        assert!(err.is_environment());
    }
}
