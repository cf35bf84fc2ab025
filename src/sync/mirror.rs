//! Local mirror of the engine's octree.
//!
//! Nodes live in an arena and are addressed by generational [`MirrorId`]s, so
//! a stale id is detected instead of silently aliasing a reused slot. Each
//! node remembers the engine handle it mirrors, the mesh version it last
//! pulled and, if the region has geometry, the pulled mesh fragment.

use crate::core::{ContextMarker, Error, IVec3, MeshVersion, Result};
use crate::engine::{ChildCoord, NodeHandle};

/// Arena address of a mirror node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MirrorId {
    index: u32,
    generation: u32,
}

/// Geometry pulled from the engine for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshFragment<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
    /// Placement marker the fragment is rendered with
    pub layer: ContextMarker,
}

impl<V> MeshFragment<V> {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Mesh state of a mirror node.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeMesh<V> {
    /// Region has no geometry (or none pulled yet)
    Empty,
    Fragment(MeshFragment<V>),
}

impl<V> NodeMesh<V> {
    pub fn fragment(&self) -> Option<&MeshFragment<V>> {
        match self {
            NodeMesh::Fragment(fragment) => Some(fragment),
            NodeMesh::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NodeMesh::Empty)
    }
}

/// One mirrored region of the engine's octree.
#[derive(Debug)]
pub struct MirrorNode<V> {
    handle: NodeHandle,
    position: IVec3,
    parent: Option<MirrorId>,
    children: [Option<MirrorId>; 8],
    /// Engine version of the mesh we hold; `None` until first pulled
    synced_version: Option<MeshVersion>,
    mesh: NodeMesh<V>,
}

impl<V> MirrorNode<V> {
    fn new(handle: NodeHandle, position: IVec3, parent: Option<MirrorId>) -> Self {
        Self {
            handle,
            position,
            parent,
            children: [None; 8],
            synced_version: None,
            mesh: NodeMesh::Empty,
        }
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    pub fn position(&self) -> IVec3 {
        self.position
    }

    pub fn parent(&self) -> Option<MirrorId> {
        self.parent
    }

    pub fn child(&self, coord: ChildCoord) -> Option<MirrorId> {
        self.children[coord.index()]
    }

    /// Existing children in [`ChildCoord::ALL`] order.
    pub fn children(&self) -> impl Iterator<Item = (ChildCoord, MirrorId)> + '_ {
        ChildCoord::ALL
            .into_iter()
            .filter_map(|coord| self.children[coord.index()].map(|id| (coord, id)))
    }

    pub fn synced_version(&self) -> Option<MeshVersion> {
        self.synced_version
    }

    /// True if the held mesh matches the engine's `last_updated`.
    pub fn is_current(&self, last_updated: MeshVersion) -> bool {
        self.synced_version == Some(last_updated)
    }

    pub fn mesh(&self) -> &NodeMesh<V> {
        &self.mesh
    }

    pub fn has_mesh(&self) -> bool {
        !self.mesh.is_empty()
    }

    /// Replace the mesh and record the version it came from.
    ///
    /// Returns true if a previously held fragment was released.
    pub fn apply_mesh(&mut self, mesh: NodeMesh<V>, version: MeshVersion) -> bool {
        let released = std::mem::replace(&mut self.mesh, mesh);
        self.synced_version = Some(version);
        !released.is_empty()
    }
}

/// Counts from tearing down part of the tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Removal {
    pub nodes: usize,
    pub fragments: usize,
}

impl std::ops::AddAssign for Removal {
    fn add_assign(&mut self, other: Self) {
        self.nodes += other.nodes;
        self.fragments += other.fragments;
    }
}

struct Slot<V> {
    generation: u32,
    node: Option<MirrorNode<V>>,
}

/// Arena-backed mirror tree.
pub struct MirrorTree<V> {
    slots: Vec<Slot<V>>,
    free: Vec<u32>,
    root: Option<MirrorId>,
    len: usize,
}

impl<V> MirrorTree<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn root(&self) -> Option<MirrorId> {
        self.root
    }

    /// Handle the root node mirrors, if there is a root.
    pub fn root_handle(&self) -> Option<NodeHandle> {
        self.root.and_then(|id| self.get(id)).map(|node| node.handle)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: MirrorId) -> Option<&MirrorNode<V>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: MirrorId) -> Option<&mut MirrorNode<V>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Like [`get`](Self::get), but a dead id is an invariant violation.
    pub fn node(&self, id: MirrorId) -> Result<&MirrorNode<V>> {
        self.get(id)
            .ok_or_else(|| Error::Invariant(format!("dangling mirror id {id:?}")))
    }

    pub fn node_mut(&mut self, id: MirrorId) -> Result<&mut MirrorNode<V>> {
        self.get_mut(id)
            .ok_or_else(|| Error::Invariant(format!("dangling mirror id {id:?}")))
    }

    /// Materialize the root. Any existing tree is destroyed first.
    pub fn create_root(&mut self, handle: NodeHandle, position: IVec3) -> (MirrorId, Removal) {
        let removed = self.clear();
        let id = self.insert(MirrorNode::new(handle, position, None));
        self.root = Some(id);
        (id, removed)
    }

    /// Materialize a child. The slot must be vacant.
    pub fn create_child(
        &mut self,
        parent: MirrorId,
        coord: ChildCoord,
        handle: NodeHandle,
        position: IVec3,
    ) -> Result<MirrorId> {
        if let Some(existing) = self.node(parent)?.child(coord) {
            return Err(Error::Invariant(format!(
                "{parent:?} already has child {existing:?} at {coord:?}"
            )));
        }

        let id = self.insert(MirrorNode::new(handle, position, Some(parent)));
        self.node_mut(parent)?.children[coord.index()] = Some(id);
        Ok(id)
    }

    /// Destroy a node and all its descendants, unlinking it from its parent.
    pub fn remove_subtree(&mut self, id: MirrorId) -> Result<Removal> {
        let parent = self.node(id)?.parent;
        match parent {
            Some(parent) => {
                let parent = self.node_mut(parent)?;
                for slot in parent.children.iter_mut() {
                    if *slot == Some(id) {
                        *slot = None;
                    }
                }
            }
            None => {
                if self.root == Some(id) {
                    self.root = None;
                }
            }
        }

        let mut removal = Removal::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.take(current)?;
            stack.extend(node.children.into_iter().flatten());
            removal.nodes += 1;
            if node.has_mesh() {
                removal.fragments += 1;
            }
        }
        Ok(removal)
    }

    /// Destroy the whole tree.
    pub fn clear(&mut self) -> Removal {
        let removal = Removal {
            nodes: self.len,
            fragments: self.fragment_count(),
        };
        for slot in &mut self.slots {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.root = None;
        self.len = 0;
        removal
    }

    /// Set the placement marker of every fragment. Returns how many changed.
    pub fn set_layer(&mut self, layer: ContextMarker) -> usize {
        let mut changed = 0;
        for node in self.slots.iter_mut().filter_map(|slot| slot.node.as_mut()) {
            if let NodeMesh::Fragment(fragment) = &mut node.mesh {
                if fragment.layer != layer {
                    fragment.layer = layer;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Number of nodes currently holding a mesh fragment.
    pub fn fragment_count(&self) -> usize {
        self.nodes().filter(|node| node.has_mesh()).count()
    }

    /// All live nodes, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &MirrorNode<V>> + '_ {
        self.slots.iter().filter_map(|slot| slot.node.as_ref())
    }

    /// Ids in depth-first pre-order, children in [`ChildCoord::ALL`] order.
    pub fn depth_first(&self) -> Vec<MirrorId> {
        let mut order = Vec::with_capacity(self.len);
        let mut stack: Vec<MirrorId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                order.push(id);
                stack.extend(node.children.iter().rev().flatten());
            }
        }
        order
    }

    /// Find the node mirroring `handle`.
    pub fn find(&self, handle: NodeHandle) -> Option<MirrorId> {
        self.depth_first()
            .into_iter()
            .find(|id| self.get(*id).is_some_and(|node| node.handle == handle))
    }

    /// Point a child slot of `parent` at an id that no longer resolves.
    #[cfg(test)]
    pub(crate) fn dangle_child(&mut self, parent: MirrorId, coord: ChildCoord) {
        if let Some(child) = self
            .get_mut(parent)
            .and_then(|node| node.children[coord.index()].as_mut())
        {
            child.generation = child.generation.wrapping_add(1);
        }
    }

    fn insert(&mut self, node: MirrorNode<V>) -> MirrorId {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                MirrorId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                MirrorId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    fn take(&mut self, id: MirrorId) -> Result<MirrorNode<V>> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or_else(|| Error::Invariant(format!("dangling mirror id {id:?}")))?;
        let node = slot
            .node
            .take()
            .ok_or_else(|| Error::Invariant(format!("dangling mirror id {id:?}")))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Ok(node)
    }
}

impl<V> Default for MirrorTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for MirrorTree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorTree")
            .field("root", &self.root)
            .field("nodes", &self.len)
            .field("fragments", &self.fragment_count())
            .finish()
    }
}
