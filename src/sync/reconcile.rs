//! Budgeted reconciliation of the mirror tree against the engine.
//!
//! One pass walks the whole mirror depth-first (children in
//! [`ChildCoord::ALL`] order). For every node it:
//!
//! 1. compares the engine's `last_updated` with the version it holds and, if
//!    budget remains, pulls the new mesh (or drops the old one when the
//!    region became empty). Each such refresh costs one unit of budget; stale
//!    nodes past the budget are counted as deferred and picked up next pass.
//! 2. matches its children against the engine: new children are
//!    materialized, vanished ones are destroyed with their subtree. This part
//!    ignores the budget so topology never lags behind.
//!
//! Any engine failure aborts the pass. Nodes already refreshed keep their new
//! mesh; everything else is retried on the next pass.

use crate::core::{ContextMarker, Result};
use crate::engine::{ChildCoord, NodeHandle, VoxelEngine};

use super::mirror::{MeshFragment, MirrorId, MirrorTree, NodeMesh};

/// Settings for one reconciliation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Maximum mesh refreshes in this pass
    pub budget: usize,
    /// Placement marker given to newly pulled fragments
    pub layer: ContextMarker,
}

impl ReconcileOptions {
    pub fn with_budget(budget: usize) -> Self {
        Self { budget, layer: 0 }
    }
}

/// What a pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Mesh refreshes performed (budget consumed)
    pub refreshed: usize,
    /// Stale nodes left for a later pass
    pub deferred: usize,
    /// Mirror nodes materialized
    pub created: usize,
    /// Mirror nodes destroyed
    pub destroyed: usize,
    /// Mesh fragments dropped (emptied regions and destroyed nodes)
    pub fragments_released: usize,
    /// Nodes visited
    pub visited: usize,
}

impl std::ops::AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.refreshed += other.refreshed;
        self.deferred += other.deferred;
        self.created += other.created;
        self.destroyed += other.destroyed;
        self.fragments_released += other.fragments_released;
        self.visited += other.visited;
    }
}

/// Run one budgeted pass over `tree`.
pub fn reconcile<E: VoxelEngine>(
    tree: &mut MirrorTree<E::Vertex>,
    engine: &E,
    options: &ReconcileOptions,
) -> Result<ReconcileStats> {
    let mut pass = Pass {
        tree,
        engine,
        options,
        stats: ReconcileStats::default(),
    };

    let mut stack: Vec<MirrorId> = pass.tree.root().into_iter().collect();
    while let Some(id) = stack.pop() {
        let handle = pass.tree.node(id)?.handle();
        pass.stats.visited += 1;

        pass.refresh_mesh(id, handle)?;
        pass.sync_children(id, handle)?;

        let children: Vec<MirrorId> =
            pass.tree.node(id)?.children().map(|(_, child)| child).collect();
        stack.extend(children.into_iter().rev());
    }

    log::trace!(
        "Reconciled {} nodes: {} refreshed, {} deferred, {} created, {} destroyed",
        pass.stats.visited,
        pass.stats.refreshed,
        pass.stats.deferred,
        pass.stats.created,
        pass.stats.destroyed
    );

    Ok(pass.stats)
}

struct Pass<'a, E: VoxelEngine> {
    tree: &'a mut MirrorTree<E::Vertex>,
    engine: &'a E,
    options: &'a ReconcileOptions,
    stats: ReconcileStats,
}

impl<E: VoxelEngine> Pass<'_, E> {
    fn refresh_mesh(&mut self, id: MirrorId, handle: NodeHandle) -> Result<()> {
        let last_updated = self.engine.last_updated(handle)?;
        if self.tree.node(id)?.is_current(last_updated) {
            return Ok(());
        }

        if self.stats.refreshed >= self.options.budget {
            self.stats.deferred += 1;
            return Ok(());
        }

        let mesh = if self.engine.has_mesh(handle)? {
            NodeMesh::Fragment(MeshFragment {
                vertices: self.engine.vertices(handle)?,
                indices: self.engine.indices(handle)?,
                layer: self.options.layer,
            })
        } else {
            NodeMesh::Empty
        };

        let emptied = mesh.is_empty();
        let released = self.tree.node_mut(id)?.apply_mesh(mesh, last_updated);
        if released && emptied {
            self.stats.fragments_released += 1;
        }
        self.stats.refreshed += 1;
        Ok(())
    }

    fn sync_children(&mut self, id: MirrorId, handle: NodeHandle) -> Result<()> {
        for coord in ChildCoord::ALL {
            let present = self.engine.has_child(handle, coord)?;
            let existing = self.tree.node(id)?.child(coord);

            match (present, existing) {
                (false, None) => {}
                (false, Some(child)) => self.destroy(child)?,
                (true, None) => self.materialize(id, coord, handle)?,
                (true, Some(child)) => {
                    // Same slot, different node: the old handle is dead
                    let current = self.engine.child(handle, coord)?;
                    if self.tree.node(child)?.handle() != current {
                        self.destroy(child)?;
                        self.materialize(id, coord, handle)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn materialize(
        &mut self,
        parent: MirrorId,
        coord: ChildCoord,
        parent_handle: NodeHandle,
    ) -> Result<()> {
        let handle = self.engine.child(parent_handle, coord)?;
        let position = self.engine.position(handle)?;
        self.tree.create_child(parent, coord, handle, position)?;
        self.stats.created += 1;
        Ok(())
    }

    fn destroy(&mut self, id: MirrorId) -> Result<()> {
        let removal = self.tree.remove_subtree(id)?;
        self.stats.destroyed += removal.nodes;
        self.stats.fragments_released += removal.fragments;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, IVec3};
    use crate::engine::memory::{calls, cube_mesh};
    use crate::engine::MemoryEngine;
    use crate::voxel::{ColoredCubesVertex, QuantizedColor};

    fn unit_mesh(_: IVec3) -> (Vec<ColoredCubesVertex>, Vec<u32>) {
        cube_mesh(1.0, QuantizedColor::WHITE)
    }

    /// Engine with a full octree and a mirror holding only its root.
    fn setup(depth: u32) -> (MemoryEngine, MirrorTree<ColoredCubesVertex>, Vec<NodeHandle>) {
        let mut engine = MemoryEngine::new();
        let volume = engine.create_volume();
        let nodes = engine.build_octree(volume, depth, 8, unit_mesh).unwrap();
        let mut tree = MirrorTree::new();
        tree.create_root(nodes[0], IVec3::ZERO);
        (engine, tree, nodes)
    }

    fn run(
        tree: &mut MirrorTree<ColoredCubesVertex>,
        engine: &MemoryEngine,
        budget: usize,
    ) -> ReconcileStats {
        reconcile(tree, engine, &ReconcileOptions::with_budget(budget)).unwrap()
    }

    #[test]
    fn test_empty_tree_is_noop() {
        let engine = MemoryEngine::new();
        let mut tree = MirrorTree::new();
        assert_eq!(run(&mut tree, &engine, 4), ReconcileStats::default());
        assert_eq!(engine.call_count(), 0);
    }

    #[test]
    fn test_structure_discovered_regardless_of_budget() {
        let (engine, mut tree, _) = setup(2);

        let stats = run(&mut tree, &engine, 1);
        assert_eq!(stats.refreshed, 1);
        assert_eq!(stats.created, 72);
        assert_eq!(stats.deferred, 72);
        assert_eq!(stats.visited, 73);
        assert_eq!(tree.len(), 73);
    }

    #[test]
    fn test_budget_respected_until_converged() {
        let (engine, mut tree, _) = setup(1);
        // 9 stale nodes, budget 4: 4, 4, 1, 0
        let refreshed: Vec<usize> = (0..4).map(|_| run(&mut tree, &engine, 4).refreshed).collect();
        assert_eq!(refreshed, vec![4, 4, 1, 0]);
        assert_eq!(tree.fragment_count(), 9);
    }

    #[test]
    fn test_refresh_order_is_depth_first() {
        let (engine, mut tree, nodes) = setup(2);
        run(&mut tree, &engine, 3);

        // Root, first child, first grandchild
        for handle in &nodes[..3] {
            let id = tree.find(*handle).unwrap();
            assert!(tree.get(id).unwrap().has_mesh(), "{handle:?} not refreshed");
        }
        let id = tree.find(nodes[3]).unwrap();
        assert!(!tree.get(id).unwrap().has_mesh());
    }

    #[test]
    fn test_zero_budget_only_discovers() {
        let (engine, mut tree, _) = setup(1);
        let stats = run(&mut tree, &engine, 0);
        assert_eq!(stats.refreshed, 0);
        assert_eq!(stats.deferred, 9);
        assert_eq!(stats.created, 8);
        assert_eq!(tree.fragment_count(), 0);
    }

    #[test]
    fn test_edit_triggers_refresh() {
        let (mut engine, mut tree, nodes) = setup(1);
        run(&mut tree, &engine, 100);
        assert_eq!(run(&mut tree, &engine, 100).refreshed, 0);

        engine.touch(nodes[4]).unwrap();
        engine.touch(nodes[7]).unwrap();
        let stats = run(&mut tree, &engine, 100);
        assert_eq!(stats.refreshed, 2);
        assert_eq!(stats.created, 0);
    }

    #[test]
    fn test_emptied_region_releases_fragment() {
        let (mut engine, mut tree, nodes) = setup(1);
        run(&mut tree, &engine, 100);

        engine.clear_mesh(nodes[2]).unwrap();
        let stats = run(&mut tree, &engine, 100);
        assert_eq!(stats.refreshed, 1);
        assert_eq!(stats.fragments_released, 1);

        let id = tree.find(nodes[2]).unwrap();
        let node = tree.get(id).unwrap();
        assert!(!node.has_mesh());
        assert_eq!(node.synced_version(), Some(engine.last_updated(nodes[2]).unwrap()));
        assert_eq!(run(&mut tree, &engine, 100).refreshed, 0);
    }

    #[test]
    fn test_vanished_child_destroyed_with_exhausted_budget() {
        let (mut engine, mut tree, nodes) = setup(2);
        run(&mut tree, &engine, 1000);
        assert_eq!(tree.len(), 73);

        // Make everything stale so the budget runs out at the root
        for handle in &nodes {
            engine.touch(*handle).unwrap();
        }
        engine.detach_child(nodes[0], ChildCoord::ALL[7]).unwrap();

        let stats = run(&mut tree, &engine, 1);
        assert_eq!(stats.refreshed, 1);
        assert_eq!(stats.destroyed, 9);
        assert_eq!(stats.fragments_released, 9);
        assert_eq!(tree.len(), 64);
        assert_eq!(tree.get(tree.root().unwrap()).unwrap().child(ChildCoord::ALL[7]), None);
    }

    #[test]
    fn test_new_child_materialized_once() {
        let (mut engine, mut tree, nodes) = setup(0);
        run(&mut tree, &engine, 10);

        let child = engine.add_node(IVec3::new(4, 0, 0));
        engine.attach_child(nodes[0], ChildCoord::new(1, 0, 0), child).unwrap();

        let stats = run(&mut tree, &engine, 10);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.refreshed, 1);
        assert_eq!(run(&mut tree, &engine, 10).created, 0);

        let id = tree.find(child).unwrap();
        assert_eq!(tree.get(id).unwrap().position(), IVec3::new(4, 0, 0));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_replaced_child_handle_rebuilt() {
        let (mut engine, mut tree, nodes) = setup(1);
        run(&mut tree, &engine, 100);

        let coord = ChildCoord::ALL[5];
        engine.detach_child(nodes[0], coord).unwrap();
        let replacement = engine.add_node(IVec3::ONE);
        engine.attach_child(nodes[0], coord, replacement).unwrap();

        let stats = run(&mut tree, &engine, 100);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.created, 1);
        assert!(tree.find(nodes[6]).is_none());
        assert!(tree.find(replacement).is_some());
    }

    #[test]
    fn test_engine_failure_aborts_pass_but_keeps_progress() {
        let (mut engine, mut tree, _) = setup(1);
        run(&mut tree, &engine, 2);
        assert_eq!(tree.fragment_count(), 2);

        engine.fail_call(calls::VERTICES, 9, "mesh extraction failed");
        let err = reconcile(&mut tree, &engine, &ReconcileOptions::with_budget(4)).unwrap_err();
        match err {
            Error::EngineCall(e) => {
                assert_eq!(e.call, calls::VERTICES);
                assert_eq!(e.code, 9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tree.fragment_count(), 2);

        engine.clear_failures();
        assert_eq!(run(&mut tree, &engine, 100).refreshed, 7);
    }

    #[test]
    fn test_layer_applied_to_new_fragments() {
        let (engine, mut tree, _) = setup(0);
        let options = ReconcileOptions {
            layer: 12,
            ..ReconcileOptions::with_budget(1)
        };
        reconcile(&mut tree, &engine, &options).unwrap();
        let root = tree.get(tree.root().unwrap()).unwrap();
        assert_eq!(root.mesh().fragment().unwrap().layer, 12);
        assert_eq!(root.mesh().fragment().unwrap().triangle_count(), 12);
    }
}
