//! Volume - keeps a mirror tree in step with one engine volume.
//!
//! The host calls [`Volume::tick`] once per frame. Each tick runs strictly in
//! this order:
//!
//! 1. a pending flush tears down the whole mirror;
//! 2. a changed placement marker is pushed to every held fragment;
//! 3. the engine is asked to update its meshes and report the root node;
//! 4. one budgeted reconciliation pass runs from the root;
//! 5. the sync state is updated from what the pass did.

use crate::core::{ContextMarker, Error, Result, SyncConfig};
use crate::engine::{self, VolumeHandle, VoxelEngine};

use super::mirror::{MirrorTree, Removal};
use super::reconcile::{reconcile, ReconcileOptions, ReconcileStats};
use super::state::{MeshSyncState, SyncEvent, SyncListeners, SyncState};

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The mirror was flushed at the start of the tick
    pub flushed: bool,
    /// A new placement marker was propagated
    pub layer_changed: bool,
    /// The engine reported a root node
    pub root_present: bool,
    /// The mirror was rebuilt after an internal inconsistency
    pub recovered: bool,
    pub stats: ReconcileStats,
    /// State transition caused by this tick
    pub event: Option<SyncEvent>,
}

impl TickReport {
    /// Budget units consumed.
    pub fn refreshed(&self) -> usize {
        self.stats.refreshed
    }
}

/// Mesh representation of one engine volume.
pub struct Volume<V> {
    data: Option<VolumeHandle>,
    config: SyncConfig,
    mirror: MirrorTree<V>,
    state: MeshSyncState,
    listeners: SyncListeners,
    flush_requested: bool,
    /// Marker set by the host
    layer: ContextMarker,
    /// Marker last pushed to the fragments
    previous_layer: Option<ContextMarker>,
}

impl<V> Volume<V> {
    /// Create a volume bound to `data`, after checking the engine.
    pub fn new<E>(engine: &E, data: Option<VolumeHandle>, config: SyncConfig) -> Result<Self>
    where
        E: VoxelEngine<Vertex = V>,
    {
        engine::validate(engine)?;
        let layer = config.layer;
        Ok(Self {
            data,
            config,
            mirror: MirrorTree::new(),
            state: MeshSyncState::new(),
            listeners: SyncListeners::new(),
            flush_requested: false,
            layer,
            previous_layer: None,
        })
    }

    // --- Data binding ---

    pub fn data(&self) -> Option<VolumeHandle> {
        self.data
    }

    /// Bind to engine data. Rebinding to other data drops the old mirror.
    pub fn attach(&mut self, data: VolumeHandle) {
        if self.data != Some(data) {
            self.detach();
            self.data = Some(data);
        }
    }

    /// Unbind from engine data, destroying the mirror immediately.
    pub fn detach(&mut self) -> Option<VolumeHandle> {
        self.release_mirror();
        self.update_state(false);
        self.data.take()
    }

    // --- Settings ---

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Maximum mesh refreshes per tick.
    pub fn budget(&self) -> usize {
        self.config.max_nodes_per_sync
    }

    pub fn set_budget(&mut self, max_nodes_per_sync: usize) {
        self.config.max_nodes_per_sync = max_nodes_per_sync;
    }

    pub fn layer(&self) -> ContextMarker {
        self.layer
    }

    /// Move the volume to another placement; applied on the next tick.
    pub fn set_layer(&mut self, layer: ContextMarker) {
        self.layer = layer;
    }

    // --- Sync state ---

    pub fn sync_state(&self) -> SyncState {
        self.state.state()
    }

    pub fn is_synchronized(&self) -> bool {
        self.state.is_synchronized()
    }

    /// Register a callback for sync complete/lost transitions.
    pub fn on_sync_event(&mut self, listener: impl FnMut(SyncEvent) + 'static) {
        self.listeners.add(listener);
    }

    pub fn mirror(&self) -> &MirrorTree<V> {
        &self.mirror
    }

    // --- Teardown ---

    /// Ask for the mirror to be rebuilt from scratch at the start of the next
    /// tick. Idempotent.
    pub fn request_flush(&mut self) {
        self.flush_requested = true;
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_requested
    }

    /// Destroy the mirror now. The volume is unsynchronized until a later
    /// tick rebuilds it.
    pub fn flush_now(&mut self) -> Removal {
        let removed = self.release_mirror();
        self.update_state(false);
        removed
    }

    /// Tear everything down synchronously and consume the volume.
    pub fn destroy(mut self) -> Removal {
        let removed = self.release_mirror();
        self.update_state(false);
        log::debug!("Destroyed volume {:?}", self.data);
        removed
    }

    fn release_mirror(&mut self) -> Removal {
        let removed = self.mirror.clear();
        if removed.nodes > 0 {
            log::debug!(
                "Released mirror: {} nodes, {} fragments",
                removed.nodes,
                removed.fragments
            );
        }
        removed
    }

    // --- Per-tick entry point ---

    /// Synchronize once. Engine failures are returned after marking the
    /// volume unsynchronized; mirror inconsistencies are repaired in place.
    pub fn tick<E>(&mut self, engine: &E) -> Result<TickReport>
    where
        E: VoxelEngine<Vertex = V>,
    {
        let mut report = TickReport::default();

        if self.flush_requested {
            self.release_mirror();
            self.flush_requested = false;
            report.flushed = true;
        }

        if self.previous_layer != Some(self.layer) {
            self.mirror.set_layer(self.layer);
            self.previous_layer = Some(self.layer);
            report.layer_changed = true;
        }

        let synchronized = match self.synchronize(engine, &mut report) {
            Ok(()) => {
                report.root_present
                    && !report.flushed
                    && report.stats.refreshed == 0
                    && report.stats.deferred == 0
            }
            Err(Error::Invariant(reason)) => {
                log::warn!("Mirror inconsistent ({}), rebuilding from scratch", reason);
                self.release_mirror();
                report.recovered = true;
                false
            }
            Err(err) => {
                self.update_state(false);
                return Err(err);
            }
        };

        report.event = self.update_state(synchronized);
        Ok(report)
    }

    fn synchronize<E>(&mut self, engine: &E, report: &mut TickReport) -> Result<()>
    where
        E: VoxelEngine<Vertex = V>,
    {
        let Some(data) = self.data else {
            return Ok(());
        };

        engine.update_volume(data)?;

        let Some(root) = engine.root_node(data)? else {
            return Ok(());
        };
        report.root_present = true;

        if self.mirror.root_handle() != Some(root) {
            let position = engine.position(root)?;
            let (_, removed) = self.mirror.create_root(root, position);
            if removed.nodes > 0 {
                log::debug!(
                    "Root changed to {:?}, discarded {} mirror nodes",
                    root,
                    removed.nodes
                );
            } else {
                log::debug!("Materialized mirror root {:?}", root);
            }
            report.stats.created += 1;
            report.stats.destroyed += removed.nodes;
            report.stats.fragments_released += removed.fragments;
        }

        let options = ReconcileOptions {
            budget: self.config.max_nodes_per_sync,
            layer: self.layer,
        };
        report.stats += reconcile(&mut self.mirror, engine, &options)?;
        Ok(())
    }

    fn update_state(&mut self, synchronized: bool) -> Option<SyncEvent> {
        let event = self.state.set(synchronized);
        if let Some(event) = event {
            self.listeners.notify(event);
        }
        event
    }
}

impl<V> std::fmt::Debug for Volume<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("data", &self.data)
            .field("config", &self.config)
            .field("mirror", &self.mirror)
            .field("state", &self.state.state())
            .field("flush_requested", &self.flush_requested)
            .field("layer", &self.layer)
            .finish()
    }
}
