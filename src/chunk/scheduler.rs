//! Tick orchestration.
//!
//! `TerrainScheduler` owns the chunk store, the visibility tracker and the
//! four pipeline stages. One call to [`TerrainScheduler::tick`] runs
//! visibility, removal, data generation, mesh build and collision build in
//! that order and then flushes the store's command buffer, so every stage in
//! a tick sees the store as it was at the start of the tick (plus nothing).

use bevy::log::debug;
use bevy::math::Vec3;

use super::backend::TerrainBackend;
use super::budget::{AdaptiveBudget, BudgetConfig};
use super::collision::CollisionBuildStage;
use super::generation::DataGenerationStage;
use super::mesh::MeshBuildStage;
use super::removal::{release_all, RemovalStage};
use super::stats::{MeshGenerationStats, TickReport};
use super::store::{ChunkStore, TagFilter};
use super::visibility::{VisibilityConfig, VisibilityTracker};
use super::{ChunkCoord, ChunkTags};
use crate::settings::Settings;
use crate::terrain::HeightSampler;

/// Radii and per-tick limits for the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub render_distance: i32,
    pub collision_distance: i32,
    pub viewer_epsilon: f32,
    pub max_create: usize,
    pub max_data_gen: usize,
    /// Upper bound for the adaptive mesh budget.
    pub max_mesh: usize,
    pub max_collision: usize,
    pub max_removal: usize,
    pub budget: BudgetConfig,
}

impl SchedulerConfig {
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn from_settings(settings: &Settings) -> Self {
        let streaming = &settings.streaming;
        let perf = &settings.performance;
        Self {
            render_distance: streaming.render_distance.min(i32::MAX as u32) as i32,
            collision_distance: streaming.collision_distance.min(i32::MAX as u32) as i32,
            viewer_epsilon: streaming.viewer_epsilon,
            max_create: perf.max_create_per_frame,
            max_data_gen: perf.max_data_gen_per_frame,
            max_mesh: perf.max_mesh_build_per_frame,
            max_collision: perf.max_collision_build_per_frame,
            max_removal: perf.max_removal_per_frame,
            budget: BudgetConfig::from_settings(perf),
        }
    }

    fn visibility(&self) -> VisibilityConfig {
        VisibilityConfig {
            render_distance: self.render_distance,
            collision_distance: self.collision_distance,
            max_create_per_frame: self.max_create,
            viewer_epsilon: self.viewer_epsilon,
        }
    }

    fn budget(&self) -> BudgetConfig {
        BudgetConfig {
            max_budget: self.max_mesh,
            ..self.budget
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Streams chunk records around a viewer, generic over the backend's
/// mesh handle `M` and collider handle `C`.
#[derive(Debug)]
pub struct TerrainScheduler<M, C> {
    config: SchedulerConfig,
    store: ChunkStore<M, C>,
    visibility: VisibilityTracker,
    generation: DataGenerationStage,
    mesh: MeshBuildStage,
    collision: CollisionBuildStage,
    removal: RemovalStage,
    budget: AdaptiveBudget,
    stats: MeshGenerationStats,
    ticks: u64,
}

impl<M, C> TerrainScheduler<M, C> {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let budget = AdaptiveBudget::new(config.budget());
        Self {
            store: ChunkStore::new(),
            visibility: VisibilityTracker::new(config.visibility()),
            generation: DataGenerationStage::new(config.max_data_gen),
            mesh: MeshBuildStage::new(budget.budget()),
            collision: CollisionBuildStage::new(config.max_collision),
            removal: RemovalStage::new(config.max_removal),
            budget,
            stats: MeshGenerationStats::default(),
            ticks: 0,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Apply new radii and limits. Takes effect on the next tick; a changed
    /// render distance rebuilds the visible set.
    pub fn apply_config(&mut self, config: SchedulerConfig) {
        self.visibility.reconfigure(config.visibility());
        self.generation.set_budget(config.max_data_gen);
        self.collision.set_budget(config.max_collision);
        self.removal.set_budget(config.max_removal);
        self.budget.reconfigure(config.budget());
        self.mesh.set_budget(self.budget.budget());
        self.config = config;
    }

    #[must_use]
    pub fn store(&self) -> &ChunkStore<M, C> {
        &self.store
    }

    #[must_use]
    pub fn visibility(&self) -> &VisibilityTracker {
        &self.visibility
    }

    #[must_use]
    pub fn stats(&self) -> &MeshGenerationStats {
        &self.stats
    }

    #[must_use]
    pub fn mesh_budget(&self) -> usize {
        self.budget.budget()
    }

    #[must_use]
    pub fn smoothed_frame_ms(&self) -> f32 {
        self.budget.smoothed_ms()
    }

    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Number of live records carrying all of `tags` (and not pending removal).
    #[must_use]
    pub fn count_live(&self, tags: ChunkTags) -> usize {
        self.store
            .count(TagFilter::all(tags).without(ChunkTags::PENDING_REMOVAL))
    }

    /// Ask for the chunk at `coord` to be meshed again.
    ///
    /// # Return
    /// `false` when no live record with terrain data exists there, or when
    /// the record is `ERRORED` (failed chunks are never retried).
    pub fn request_remesh(&mut self, coord: ChunkCoord) -> bool {
        let Some(record) = self.store.get_at(coord) else {
            return false;
        };
        if record.has(ChunkTags::PENDING_REMOVAL)
            || record.has(ChunkTags::ERRORED)
            || record.terrain().is_none()
        {
            return false;
        }
        let id = record.id();
        self.store.insert_tags(id, ChunkTags::NEEDS_MESH_UPDATE);
        self.store.flush();
        true
    }

    /// Run one pass of the pipeline.
    ///
    /// # Arguments
    /// * `viewer` - World position the visible square is centred on.
    /// * `dt_secs` - Duration of the last frame, fed to the mesh budget.
    /// * `backend` - Render and physics backend owning mesh and collider handles.
    /// * `sampler` - Height source for data generation.
    pub fn tick<B, S>(&mut self, viewer: Vec3, dt_secs: f32, backend: &mut B, sampler: &S) -> TickReport
    where
        B: TerrainBackend<Mesh = M, Collider = C>,
        S: HeightSampler + ?Sized,
    {
        self.ticks += 1;
        if let Some(budget) = self.budget.observe(dt_secs) {
            debug!(
                "mesh budget -> {budget} (smoothed frame {:.1} ms)",
                self.budget.smoothed_ms()
            );
        }
        self.mesh.set_budget(self.budget.budget());

        let mut report = TickReport {
            tick: self.ticks,
            mesh_budget: self.budget.budget(),
            ..TickReport::default()
        };

        report.visibility = self.visibility.update(viewer, &mut self.store);
        let center = self.visibility.center();

        report.removal = self.removal.run(&mut self.store, backend, &mut self.stats);

        let (generation, lossy) = self.generation.run(&mut self.store, center, sampler);
        report.generation = generation;
        report.lossy_tiles = lossy;

        report.mesh = self
            .mesh
            .run(&mut self.store, center, backend, &mut self.stats);

        let (collision, released) = self.collision.run(&mut self.store, center, backend);
        report.collision = collision;
        report.colliders_released = released;

        report.flush = self.store.flush();
        report
    }

    /// Release every handle held by the store and forget all records.
    ///
    /// # Return
    /// The number of handles released successfully.
    pub fn shutdown<B>(&mut self, backend: &mut B) -> usize
    where
        B: TerrainBackend<Mesh = M, Collider = C>,
    {
        let records = self.store.drain();
        let released = release_all(&records, backend);
        self.visibility.reset();
        self.stats = MeshGenerationStats::default();
        released
    }
}
