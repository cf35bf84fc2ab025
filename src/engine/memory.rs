//! In-process voxel engine.
//!
//! Keeps an explicit octree of nodes with optional meshes and a global clock
//! that stamps every mesh change. Used by the simulator binary, benchmarks
//! and tests. Any call can be made to fail on demand.

use std::cell::Cell;
use std::collections::HashMap;

use super::{
    ChildCoord, EngineVersion, NodeHandle, REQUIRED_ENGINE_VERSION, VolumeHandle, VoxelEngine,
};
use crate::core::{EngineError, IVec3, MeshVersion};
use crate::voxel::{ColoredCubesVertex, QuantizedColor};

/// Call names, as reported in [`EngineError::call`].
pub mod calls {
    pub const VERSION: &str = "version";
    pub const UPDATE_VOLUME: &str = "update_volume";
    pub const ROOT_NODE: &str = "root_node";
    pub const HAS_CHILD: &str = "has_child";
    pub const CHILD: &str = "child";
    pub const HAS_MESH: &str = "has_mesh";
    pub const LAST_UPDATED: &str = "last_updated";
    pub const POSITION: &str = "position";
    pub const VERTICES: &str = "vertices";
    pub const INDICES: &str = "indices";
}

/// Error codes returned by this engine.
pub mod codes {
    pub const INVALID_HANDLE: i32 = 1;
    pub const NO_SUCH_CHILD: i32 = 2;
    pub const OCCUPIED: i32 = 3;
}

struct EngineNode<V> {
    position: IVec3,
    children: [Option<NodeHandle>; 8],
    mesh: Option<(Vec<V>, Vec<u32>)>,
    last_updated: MeshVersion,
}

/// Engine implementation backed by hash maps.
pub struct MemoryEngine<V = ColoredCubesVertex> {
    version: EngineVersion,
    volumes: HashMap<VolumeHandle, Option<NodeHandle>>,
    nodes: HashMap<NodeHandle, EngineNode<V>>,
    next_volume: u32,
    next_node: u32,
    /// Stamps mesh changes; never goes backwards
    clock: MeshVersion,
    failures: HashMap<&'static str, EngineError>,
    calls: Cell<usize>,
    updates: Cell<usize>,
}

impl MemoryEngine<ColoredCubesVertex> {
    /// Create an engine of the required version producing colored cubes.
    pub fn new() -> Self {
        Self::empty(REQUIRED_ENGINE_VERSION)
    }

    /// Create an engine reporting an arbitrary version.
    pub fn with_version(version: EngineVersion) -> Self {
        Self::empty(version)
    }
}

impl Default for MemoryEngine<ColoredCubesVertex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> MemoryEngine<V> {
    /// Create an empty engine for any vertex format.
    pub fn empty(version: EngineVersion) -> Self {
        Self {
            version,
            volumes: HashMap::new(),
            nodes: HashMap::new(),
            next_volume: 1,
            next_node: 1,
            clock: 0,
            failures: HashMap::new(),
            calls: Cell::new(0),
            updates: Cell::new(0),
        }
    }

    // --- Volume and tree construction ---

    /// Create a volume without a root node.
    pub fn create_volume(&mut self) -> VolumeHandle {
        let handle = VolumeHandle(self.next_volume);
        self.next_volume += 1;
        self.volumes.insert(handle, None);
        handle
    }

    /// Create a detached node without a mesh.
    pub fn add_node(&mut self, position: IVec3) -> NodeHandle {
        let handle = NodeHandle(self.next_node);
        self.next_node += 1;
        let last_updated = self.advance_clock();
        self.nodes.insert(
            handle,
            EngineNode {
                position,
                children: [None; 8],
                mesh: None,
                last_updated,
            },
        );
        handle
    }

    /// Make `node` the volume's root, freeing any previous tree.
    pub fn set_root(&mut self, volume: VolumeHandle, node: NodeHandle) -> Result<(), EngineError> {
        self.require_node("set_root", node)?;
        let previous = self.volume_entry("set_root", volume)?.replace(node);
        if let Some(previous) = previous.filter(|p| *p != node) {
            self.free_subtree(previous);
        }
        Ok(())
    }

    /// Remove the volume's root and free the whole tree.
    pub fn clear_root(&mut self, volume: VolumeHandle) -> Result<(), EngineError> {
        if let Some(root) = self.volume_entry("clear_root", volume)?.take() {
            self.free_subtree(root);
        }
        Ok(())
    }

    /// Attach `child` under `parent`.
    pub fn attach_child(
        &mut self,
        parent: NodeHandle,
        coord: ChildCoord,
        child: NodeHandle,
    ) -> Result<(), EngineError> {
        self.require_node("attach_child", child)?;
        let slot = &mut self.node_mut("attach_child", parent)?.children[coord.index()];
        if slot.is_some() {
            return Err(EngineError::new(
                "attach_child",
                codes::OCCUPIED,
                format!("{coord:?} of {parent:?} already has a child"),
            ));
        }
        *slot = Some(child);
        Ok(())
    }

    /// Detach and free the subtree below `parent` at `coord`.
    pub fn detach_child(
        &mut self,
        parent: NodeHandle,
        coord: ChildCoord,
    ) -> Result<Option<NodeHandle>, EngineError> {
        let removed = self.node_mut("detach_child", parent)?.children[coord.index()].take();
        if let Some(child) = removed {
            self.free_subtree(child);
        }
        Ok(removed)
    }

    /// Replace a node's mesh and stamp it with a new version.
    pub fn set_mesh(
        &mut self,
        node: NodeHandle,
        vertices: Vec<V>,
        indices: Vec<u32>,
    ) -> Result<(), EngineError> {
        let now = self.advance_clock();
        let entry = self.node_mut("set_mesh", node)?;
        entry.mesh = Some((vertices, indices));
        entry.last_updated = now;
        Ok(())
    }

    /// Drop a node's mesh (region became empty) and stamp a new version.
    pub fn clear_mesh(&mut self, node: NodeHandle) -> Result<(), EngineError> {
        let now = self.advance_clock();
        let entry = self.node_mut("clear_mesh", node)?;
        entry.mesh = None;
        entry.last_updated = now;
        Ok(())
    }

    /// Stamp a new version without changing the mesh.
    pub fn touch(&mut self, node: NodeHandle) -> Result<(), EngineError> {
        let now = self.advance_clock();
        self.node_mut("touch", node)?.last_updated = now;
        Ok(())
    }

    /// Build a complete octree of the given depth under the volume.
    ///
    /// Depth 0 is a single root. Every node receives the mesh produced by
    /// `mesh` for its position. Returns all handles in depth-first order,
    /// children in [`ChildCoord::ALL`] order.
    pub fn build_octree<F>(
        &mut self,
        volume: VolumeHandle,
        depth: u32,
        node_size: i32,
        mut mesh: F,
    ) -> Result<Vec<NodeHandle>, EngineError>
    where
        F: FnMut(IVec3) -> (Vec<V>, Vec<u32>),
    {
        let root_size = node_size << depth;
        let mut order = Vec::new();
        let root = self.build_subtree(IVec3::ZERO, root_size, depth, &mut mesh, &mut order)?;
        self.set_root(volume, root)?;
        Ok(order)
    }

    fn build_subtree<F>(
        &mut self,
        position: IVec3,
        size: i32,
        depth: u32,
        mesh: &mut F,
        order: &mut Vec<NodeHandle>,
    ) -> Result<NodeHandle, EngineError>
    where
        F: FnMut(IVec3) -> (Vec<V>, Vec<u32>),
    {
        let node = self.add_node(position);
        let (vertices, indices) = mesh(position);
        self.set_mesh(node, vertices, indices)?;
        order.push(node);

        if depth > 0 {
            let half = size / 2;
            for coord in ChildCoord::ALL {
                let offset =
                    IVec3::new(coord.x() as i32, coord.y() as i32, coord.z() as i32) * half;
                let child = self.build_subtree(position + offset, half, depth - 1, mesh, order)?;
                self.attach_child(node, coord, child)?;
            }
        }

        Ok(node)
    }

    // --- Fault injection ---

    /// Make every call named `call` fail until cleared.
    pub fn fail_call(&mut self, call: &'static str, code: i32, message: impl Into<String>) {
        self.failures.insert(call, EngineError::new(call, code, message));
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    // --- Diagnostics ---

    /// Number of live nodes across all volumes and detached nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Number of boundary calls served (including failed ones).
    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    /// Number of `update_volume` calls served.
    pub fn update_count(&self) -> usize {
        self.updates.get()
    }

    /// Current clock value (the last stamp handed out).
    pub fn clock(&self) -> MeshVersion {
        self.clock
    }

    // --- Internals ---

    fn advance_clock(&mut self) -> MeshVersion {
        self.clock += 1;
        self.clock
    }

    fn begin_call(&self, call: &'static str) -> Result<(), EngineError> {
        self.calls.set(self.calls.get() + 1);
        match self.failures.get(call) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn node(&self, call: &'static str, node: NodeHandle) -> Result<&EngineNode<V>, EngineError> {
        self.nodes.get(&node).ok_or_else(|| invalid_node(call, node))
    }

    fn node_mut(
        &mut self,
        call: &'static str,
        node: NodeHandle,
    ) -> Result<&mut EngineNode<V>, EngineError> {
        self.nodes.get_mut(&node).ok_or_else(|| invalid_node(call, node))
    }

    fn require_node(&self, call: &'static str, node: NodeHandle) -> Result<(), EngineError> {
        self.node(call, node).map(|_| ())
    }

    fn volume_entry(
        &mut self,
        call: &'static str,
        volume: VolumeHandle,
    ) -> Result<&mut Option<NodeHandle>, EngineError> {
        self.volumes.get_mut(&volume).ok_or_else(|| {
            EngineError::new(call, codes::INVALID_HANDLE, format!("no volume {volume:?}"))
        })
    }

    fn free_subtree(&mut self, root: NodeHandle) {
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if let Some(node) = self.nodes.remove(&handle) {
                stack.extend(node.children.into_iter().flatten());
            }
        }
    }
}

impl<V: Clone> VoxelEngine for MemoryEngine<V> {
    type Vertex = V;

    fn version(&self) -> Result<EngineVersion, EngineError> {
        self.begin_call(calls::VERSION)?;
        Ok(self.version)
    }

    fn update_volume(&self, volume: VolumeHandle) -> Result<(), EngineError> {
        self.begin_call(calls::UPDATE_VOLUME)?;
        if !self.volumes.contains_key(&volume) {
            return Err(EngineError::new(
                calls::UPDATE_VOLUME,
                codes::INVALID_HANDLE,
                format!("no volume {volume:?}"),
            ));
        }
        self.updates.set(self.updates.get() + 1);
        Ok(())
    }

    fn root_node(&self, volume: VolumeHandle) -> Result<Option<NodeHandle>, EngineError> {
        self.begin_call(calls::ROOT_NODE)?;
        self.volumes.get(&volume).copied().ok_or_else(|| {
            EngineError::new(
                calls::ROOT_NODE,
                codes::INVALID_HANDLE,
                format!("no volume {volume:?}"),
            )
        })
    }

    fn has_child(&self, node: NodeHandle, coord: ChildCoord) -> Result<bool, EngineError> {
        self.begin_call(calls::HAS_CHILD)?;
        Ok(self.node(calls::HAS_CHILD, node)?.children[coord.index()].is_some())
    }

    fn child(&self, node: NodeHandle, coord: ChildCoord) -> Result<NodeHandle, EngineError> {
        self.begin_call(calls::CHILD)?;
        self.node(calls::CHILD, node)?.children[coord.index()].ok_or_else(|| {
            EngineError::new(
                calls::CHILD,
                codes::NO_SUCH_CHILD,
                format!("{node:?} has no child at {coord:?}"),
            )
        })
    }

    fn has_mesh(&self, node: NodeHandle) -> Result<bool, EngineError> {
        self.begin_call(calls::HAS_MESH)?;
        Ok(self.node(calls::HAS_MESH, node)?.mesh.is_some())
    }

    fn last_updated(&self, node: NodeHandle) -> Result<MeshVersion, EngineError> {
        self.begin_call(calls::LAST_UPDATED)?;
        Ok(self.node(calls::LAST_UPDATED, node)?.last_updated)
    }

    fn position(&self, node: NodeHandle) -> Result<IVec3, EngineError> {
        self.begin_call(calls::POSITION)?;
        Ok(self.node(calls::POSITION, node)?.position)
    }

    fn vertices(&self, node: NodeHandle) -> Result<Vec<V>, EngineError> {
        self.begin_call(calls::VERTICES)?;
        Ok(self
            .node(calls::VERTICES, node)?
            .mesh
            .as_ref()
            .map(|(vertices, _)| vertices.clone())
            .unwrap_or_default())
    }

    fn indices(&self, node: NodeHandle) -> Result<Vec<u32>, EngineError> {
        self.begin_call(calls::INDICES)?;
        Ok(self
            .node(calls::INDICES, node)?
            .mesh
            .as_ref()
            .map(|(_, indices)| indices.clone())
            .unwrap_or_default())
    }
}

fn invalid_node(call: &'static str, node: NodeHandle) -> EngineError {
    EngineError::new(call, codes::INVALID_HANDLE, format!("no node {node:?}"))
}

/// Axis-aligned cube of the given edge length, 8 vertices and 12 triangles.
pub fn cube_mesh(size: f32, color: QuantizedColor) -> (Vec<ColoredCubesVertex>, Vec<u32>) {
    let vertices = (0..8u32)
        .map(|i| {
            let corner = [
                (i & 1) as f32 * size,
                ((i >> 1) & 1) as f32 * size,
                ((i >> 2) & 1) as f32 * size,
            ];
            ColoredCubesVertex::new(corner, color)
        })
        .collect();

    // Corner index = x | y << 1 | z << 2
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -Z
        4, 5, 6, 5, 7, 6, // +Z
        0, 1, 4, 1, 5, 4, // -Y
        2, 6, 3, 3, 6, 7, // +Y
        0, 4, 2, 2, 4, 6, // -X
        1, 3, 5, 3, 7, 5, // +X
    ];

    (vertices, indices)
}
