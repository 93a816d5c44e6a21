//! Removal stage: release the handles of chunks that left the visible
//! square and delete their records, a bounded number per tick.

use bevy::log::warn;

use super::backend::TerrainBackend;
use super::stats::{MeshGenerationStats, StageOutcome};
use super::store::{ChunkId, ChunkStore, TagFilter};
use super::ChunkTags;

#[derive(Debug)]
pub struct RemovalStage {
    max_per_frame: usize,
}

impl RemovalStage {
    #[must_use]
    pub fn new(max_per_frame: usize) -> Self {
        Self { max_per_frame }
    }

    pub fn set_budget(&mut self, max_per_frame: usize) {
        self.max_per_frame = max_per_frame;
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.max_per_frame
    }

    /// Release and despawn up to `budget()` chunks tagged `PENDING_REMOVAL`,
    /// oldest first. A failed release is logged and the record is deleted
    /// anyway, so a broken handle cannot pin a chunk in the store.
    pub fn run<B: TerrainBackend>(
        &mut self,
        store: &mut ChunkStore<B::Mesh, B::Collider>,
        backend: &mut B,
        stats: &mut MeshGenerationStats,
    ) -> StageOutcome {
        let mut outcome = StageOutcome::default();
        let picked: Vec<ChunkId> = store
            .query(TagFilter::all(ChunkTags::PENDING_REMOVAL))
            .take(self.max_per_frame)
            .map(|r| r.id)
            .collect();
        outcome.selected = picked.len();

        for id in picked {
            let Some(record) = store.get(id) else {
                outcome.skipped += 1;
                continue;
            };
            let coord = record.coord;
            let mut clean = true;
            if let Some(mesh) = record.mesh()
                && let Err(e) = backend.destroy_mesh(mesh)
            {
                warn!("failed to release mesh of chunk {coord}: {e}");
                clean = false;
            }
            if let Some(collider) = record.collider()
                && let Err(e) = backend.destroy_collider(collider)
            {
                warn!("failed to release collider of chunk {coord}: {e}");
                clean = false;
            }
            stats.remove_chunk(coord);
            store.despawn(id);
            if clean {
                outcome.advanced += 1;
            } else {
                outcome.failed += 1;
            }
        }
        outcome
    }
}

/// Release the handles held by `records` (shutdown path).
///
/// # Return
/// The number of handles released successfully.
pub fn release_all<B: TerrainBackend>(
    records: &[super::ChunkRecord<B::Mesh, B::Collider>],
    backend: &mut B,
) -> usize {
    let mut released = 0;
    for record in records {
        if let Some(mesh) = record.mesh() {
            match backend.destroy_mesh(mesh) {
                Ok(()) => released += 1,
                Err(e) => warn!("failed to release mesh of chunk {}: {e}", record.coord),
            }
        }
        if let Some(collider) = record.collider() {
            match backend.destroy_collider(collider) {
                Ok(()) => released += 1,
                Err(e) => warn!("failed to release collider of chunk {}: {e}", record.coord),
            }
        }
    }
    released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::backend::recording::RecordingBackend;
    use crate::chunk::mesh::ChunkGeometry;
    use crate::chunk::ChunkCoord;

    fn doomed(store: &mut ChunkStore<u32, u32>, backend: &mut RecordingBackend, x: i32, collider: bool) -> ChunkId {
        let coord = ChunkCoord::new(x, 0);
        let id = store.spawn(coord, 0, ChunkTags::COMPLETE | ChunkTags::PENDING_REMOVAL);
        let mesh = backend.create_mesh(coord, &ChunkGeometry::default()).expect("mesh");
        store.attach_mesh(id, mesh);
        if collider {
            let c = backend.create_collider(coord, &[]).expect("collider");
            store.attach_collider(id, c);
        }
        store.flush();
        id
    }

    #[test]
    fn releases_handles_and_deletes_records() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let mut stats = MeshGenerationStats::default();
        let id = doomed(&mut store, &mut backend, 0, true);
        stats.update_chunk(ChunkCoord::new(0, 0), 12);

        let outcome = RemovalStage::new(8).run(&mut store, &mut backend, &mut stats);
        store.flush();
        assert_eq!(outcome.advanced, 1);
        assert!(store.get(id).is_none());
        assert!(backend.live_meshes.is_empty());
        assert!(backend.live_colliders.is_empty());
        assert_eq!(stats.total_triangles, 0);
    }

    #[test]
    fn budget_limits_removals_per_run() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let mut stats = MeshGenerationStats::default();
        for x in 0..5 {
            doomed(&mut store, &mut backend, x, false);
        }
        let mut stage = RemovalStage::new(2);
        stage.run(&mut store, &mut backend, &mut stats);
        store.flush();
        assert_eq!(store.len(), 3);
        assert_eq!(backend.meshes_destroyed, 2);
        for _ in 0..2 {
            stage.run(&mut store, &mut backend, &mut stats);
            store.flush();
        }
        assert!(store.is_empty());
        assert_eq!(backend.meshes_destroyed, 5);
    }

    #[test]
    fn failed_release_still_deletes_record() {
        let mut store = ChunkStore::new();
        let mut backend = RecordingBackend::default();
        let mut stats = MeshGenerationStats::default();
        let id = doomed(&mut store, &mut backend, 0, false);
        // Release the mesh behind the store's back so the stage's release fails.
        let mesh = *store.get(id).and_then(|r| r.mesh()).expect("mesh");
        backend.destroy_mesh(&mesh).expect("first release");

        let outcome = RemovalStage::new(8).run(&mut store, &mut backend, &mut stats);
        store.flush();
        assert_eq!(outcome.failed, 1);
        assert!(store.get(id).is_none());
    }
}
