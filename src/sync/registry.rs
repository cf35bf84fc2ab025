//! Volume registry - ticks every live volume once per frame.
//!
//! Volumes are ticked in insertion order. A failing volume is logged and
//! skipped so one bad volume never stops the others from synchronizing.

use crate::core::{Error, Result, SyncConfig};
use crate::engine::{VolumeHandle, VoxelEngine};

use super::mirror::Removal;
use super::volume::Volume;

/// Stable identifier for a registered volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub u32);

/// Aggregate result of ticking every volume.
#[derive(Debug, Default)]
pub struct TickSummary {
    /// Volumes ticked, including failed ones
    pub ticked: usize,
    /// Mesh refreshes across all volumes
    pub refreshed: usize,
    /// Volumes synchronized after the tick
    pub synchronized: usize,
    pub failures: Vec<(VolumeId, Error)>,
}

impl TickSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns every live volume.
pub struct VolumeRegistry<V> {
    volumes: Vec<(VolumeId, Volume<V>)>,
    next_id: u32,
}

impl<V> VolumeRegistry<V> {
    pub fn new() -> Self {
        Self {
            volumes: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a volume. Its mirror is flushed before the first tick.
    pub fn insert(&mut self, mut volume: Volume<V>) -> VolumeId {
        let id = VolumeId(self.next_id);
        self.next_id += 1;
        volume.request_flush();
        log::debug!("Registered volume {:?} for data {:?}", id, volume.data());
        self.volumes.push((id, volume));
        id
    }

    /// Validate the engine, create a volume and register it.
    pub fn create<E>(
        &mut self,
        engine: &E,
        data: Option<VolumeHandle>,
        config: SyncConfig,
    ) -> Result<VolumeId>
    where
        E: VoxelEngine<Vertex = V>,
    {
        let volume = Volume::new(engine, data, config)?;
        Ok(self.insert(volume))
    }

    /// Unregister a volume and hand it back to the caller.
    pub fn remove(&mut self, id: VolumeId) -> Option<Volume<V>> {
        let index = self.volumes.iter().position(|(vid, _)| *vid == id)?;
        Some(self.volumes.remove(index).1)
    }

    /// Unregister and tear down a volume.
    pub fn destroy(&mut self, id: VolumeId) -> Option<Removal> {
        self.remove(id).map(Volume::destroy)
    }

    pub fn get(&self, id: VolumeId) -> Option<&Volume<V>> {
        self.volumes
            .iter()
            .find(|(vid, _)| *vid == id)
            .map(|(_, volume)| volume)
    }

    pub fn get_mut(&mut self, id: VolumeId) -> Option<&mut Volume<V>> {
        self.volumes
            .iter_mut()
            .find(|(vid, _)| *vid == id)
            .map(|(_, volume)| volume)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Volumes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VolumeId, &Volume<V>)> + '_ {
        self.volumes.iter().map(|(id, volume)| (*id, volume))
    }

    /// True when every registered volume reports synchronized.
    pub fn all_synchronized(&self) -> bool {
        self.volumes.iter().all(|(_, volume)| volume.is_synchronized())
    }

    /// Tick every volume once, in insertion order.
    pub fn tick_all<E>(&mut self, engine: &E) -> TickSummary
    where
        E: VoxelEngine<Vertex = V>,
    {
        let mut summary = TickSummary::default();

        for (id, volume) in &mut self.volumes {
            summary.ticked += 1;
            match volume.tick(engine) {
                Ok(report) => summary.refreshed += report.refreshed(),
                Err(err) => {
                    log::error!("Volume {:?} failed to synchronize: {}", id, err);
                    summary.failures.push((*id, err));
                }
            }
            if volume.is_synchronized() {
                summary.synchronized += 1;
            }
        }

        summary
    }
}

impl<V> Default for VolumeRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for VolumeRegistry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeRegistry")
            .field("volumes", &self.volumes.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
