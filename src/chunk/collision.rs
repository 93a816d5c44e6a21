//! Collision build stage.
//!
//! Chunks inside the collision radius carry `NEEDS_COLLISION`. Each tick the
//! stage first releases the colliders of chunks that lost the flag, then
//! builds static trimesh colliders for the nearest flagged chunks that
//! already have a mesh.

use bevy::log::{error, warn};

use super::backend::TerrainBackend;
use super::mesh::expand_positions;
use super::select::NearestSelector;
use super::stats::StageOutcome;
use super::store::{ChunkId, ChunkStore, TagFilter};
use super::{ChunkCoord, ChunkError, ChunkTags};

#[derive(Debug)]
pub struct CollisionBuildStage {
    max_per_frame: usize,
    selector: NearestSelector<ChunkId>,
}

impl CollisionBuildStage {
    #[must_use]
    pub fn new(max_per_frame: usize) -> Self {
        Self {
            max_per_frame,
            selector: NearestSelector::new(max_per_frame),
        }
    }

    pub fn set_budget(&mut self, max_per_frame: usize) {
        self.max_per_frame = max_per_frame;
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.max_per_frame
    }

    /// Release colliders no longer wanted, then build new ones.
    ///
    /// # Return
    /// Build counters and the number of colliders released.
    pub fn run<B: TerrainBackend>(
        &mut self,
        store: &mut ChunkStore<B::Mesh, B::Collider>,
        center: ChunkCoord,
        backend: &mut B,
    ) -> (StageOutcome, usize) {
        let released = release_unwanted(store, backend);
        let mut outcome = StageOutcome::default();

        self.selector.reset(self.max_per_frame);
        let filter = TagFilter::all(ChunkTags::NEEDS_COLLISION | ChunkTags::COMPLETE)
            .without(ChunkTags::PENDING_REMOVAL | ChunkTags::COLLISION_FAILED);
        for record in store.query(filter) {
            if record.mesh.is_some() && record.collider.is_none() {
                self.selector.offer(record.id, record.coord.distance(center));
            }
        }
        let picked: Vec<ChunkId> = self.selector.drain().map(|(id, _)| id).collect();
        outcome.selected = picked.len();

        for id in picked {
            let Some(record) = store.get(id) else {
                outcome.skipped += 1;
                continue;
            };
            if record.collider.is_some() || record.has(ChunkTags::PENDING_REMOVAL) {
                outcome.skipped += 1;
                continue;
            }
            let coord = record.coord;
            let built = match record.terrain() {
                None => Err(ChunkError::MissingTerrain(coord)),
                Some(data) => expand_positions(coord, data)
                    .map_err(|e| ChunkError::Collision(e.to_string()))
                    .and_then(|triangles| {
                        backend
                            .create_collider(coord, &triangles)
                            .map_err(ChunkError::from)
                    }),
            };
            match built {
                Ok(collider) => {
                    store.attach_collider(id, collider);
                    outcome.advanced += 1;
                }
                Err(e) => {
                    error!("collision build failed for chunk {coord}: {e}");
                    store.insert_tags(id, ChunkTags::COLLISION_FAILED);
                    outcome.failed += 1;
                }
            }
        }
        (outcome, released)
    }
}

/// Release every collider whose chunk no longer carries `NEEDS_COLLISION`.
/// Chunks pending removal are left to the removal stage.
fn release_unwanted<B: TerrainBackend>(store: &mut ChunkStore<B::Mesh, B::Collider>, backend: &mut B) -> usize {
    let filter = TagFilter::default().without(ChunkTags::NEEDS_COLLISION | ChunkTags::PENDING_REMOVAL);
    let stale: Vec<ChunkId> = store
        .query(filter)
        .filter(|r| r.collider.is_some())
        .map(|r| r.id)
        .collect();

    for &id in &stale {
        if let Some(record) = store.get(id)
            && let Some(collider) = record.collider()
            && let Err(e) = backend.destroy_collider(collider)
        {
            warn!("failed to release collider of chunk {}: {e}", record.coord);
        }
        store.detach_collider(id);
    }
    stale.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::backend::recording::RecordingBackend;
    use crate::chunk::{CELLS_PER_CHUNK, TERRAIN_BYTES};

    fn meshed_chunk(store: &mut ChunkStore<u32, u32>, backend: &mut RecordingBackend, coord: ChunkCoord, tags: ChunkTags) -> ChunkId {
        let id = store.spawn(coord, 0, ChunkTags::COMPLETE | tags);
        store.set_terrain(id, vec![0u8; TERRAIN_BYTES].into_boxed_slice());
        let geometry = crate::chunk::mesh::ChunkGeometry::default();
        let mesh = backend.create_mesh(coord, &geometry).expect("mesh");
        store.attach_mesh(id, mesh);
        store.flush();
        id
    }

    #[test]
    fn builds_colliders_for_flagged_meshed_chunks() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let wanted = meshed_chunk(&mut store, &mut backend, ChunkCoord::new(0, 0), ChunkTags::NEEDS_COLLISION);
        let unwanted = meshed_chunk(&mut store, &mut backend, ChunkCoord::new(3, 0), ChunkTags::empty());

        let (outcome, released) = CollisionBuildStage::new(2).run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        store.flush();
        assert_eq!(outcome.advanced, 1);
        assert_eq!(released, 0);
        assert!(store.get(wanted).and_then(|r| r.collider()).is_some());
        assert!(store.get(unwanted).and_then(|r| r.collider()).is_none());
        assert_eq!(backend.colliders_created, 1);
    }

    #[test]
    fn collider_triangles_cover_every_tile() {
        let positions = expand_positions(ChunkCoord::new(0, 0), &vec![0u8; TERRAIN_BYTES]).expect("valid");
        assert_eq!(positions.len(), CELLS_PER_CHUNK * 6);
        assert_eq!(positions.len() % 3, 0);
    }

    #[test]
    fn chunks_without_mesh_wait() {
        let mut store = ChunkStore::<u32, u32>::new();
        let id = store.spawn(ChunkCoord::new(0, 0), 0, ChunkTags::DATA_READY | ChunkTags::NEEDS_COLLISION);
        store.flush();
        let mut backend = RecordingBackend::default();
        let (outcome, _) = CollisionBuildStage::new(2).run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        assert_eq!(outcome.selected, 0);
        assert!(store.get(id).is_some());
    }

    #[test]
    fn losing_the_flag_releases_the_collider_once() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let id = meshed_chunk(&mut store, &mut backend, ChunkCoord::new(0, 0), ChunkTags::NEEDS_COLLISION);
        let mut stage = CollisionBuildStage::new(2);
        stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        store.flush();

        store.remove_tags(id, ChunkTags::NEEDS_COLLISION);
        store.flush();
        let (_, released) = stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        store.flush();
        assert_eq!(released, 1);
        let (_, released_again) = stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        assert_eq!(released_again, 0);
        assert_eq!(backend.colliders_destroyed, 1);
        assert!(backend.live_colliders.is_empty());
        assert!(store.get(id).and_then(|r| r.collider()).is_none());
    }

    #[test]
    fn pending_removal_colliders_are_left_for_removal() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let id = meshed_chunk(&mut store, &mut backend, ChunkCoord::new(0, 0), ChunkTags::NEEDS_COLLISION);
        let mut stage = CollisionBuildStage::new(2);
        stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        store.flush();
        store.swap_tags(id, ChunkTags::NEEDS_COLLISION, ChunkTags::PENDING_REMOVAL);
        store.flush();
        let (_, released) = stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        assert_eq!(released, 0);
        assert_eq!(backend.colliders_destroyed, 0);
    }

    #[test]
    fn failed_build_is_not_retried() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let id = meshed_chunk(&mut store, &mut backend, ChunkCoord::new(0, 0), ChunkTags::NEEDS_COLLISION);
        backend.fail_colliders = true;
        let mut stage = CollisionBuildStage::new(2);
        let (first, _) = stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        store.flush();
        assert_eq!(first.failed, 1);
        let record = store.get(id).expect("record");
        assert!(record.has(ChunkTags::COLLISION_FAILED));
        assert_eq!(record.stage(), Some(ChunkTags::COMPLETE));

        backend.fail_colliders = false;
        let (second, _) = stage.run(&mut store, ChunkCoord::new(0, 0), &mut backend);
        assert_eq!(second.selected, 0);
    }
}
