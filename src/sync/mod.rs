//! Mesh synchronization
//!
//! Mirrors the engine's octree of mesh nodes, refreshing at most a fixed
//! number of meshes per tick and reporting when the mirror has caught up.

pub mod state;
pub mod mirror;
pub mod reconcile;
pub mod volume;
pub mod registry;

pub use state::{MeshSyncState, SyncEvent, SyncListeners, SyncState};
pub use mirror::{MeshFragment, MirrorId, MirrorNode, MirrorTree, NodeMesh, Removal};
pub use reconcile::{reconcile, ReconcileOptions, ReconcileStats};
pub use volume::{TickReport, Volume};
pub use registry::{TickSummary, VolumeId, VolumeRegistry};
