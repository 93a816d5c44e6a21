//! Bevy integration for the terrain scheduler.
//!
//! `TerrainStreamingPlugin` owns a `TerrainScheduler` as a resource and ticks
//! it once per frame from the position of the entity tagged `TerrainViewer`.
//! Meshes become `PbrBundle` entities sharing one `StandardMaterial`;
//! colliders become fixed rapier bodies with a trimesh collider. Both are
//! positioned at the chunk's world origin and despawned when the scheduler
//! releases their handle.
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use bevy_rapier3d::prelude::{Collider, RigidBody};

use super::backend::{BackendError, TerrainBackend};
use super::mesh::ChunkGeometry;
use super::scheduler::{SchedulerConfig, TerrainScheduler};
use super::stats::{StageOutcome, TickReport};
use super::{ChunkCoord, ChunkTags};
use crate::settings::{GenerationSettings, Settings};
use crate::terrain::NoiseHeightSampler;

/// Marker for the entity whose position the terrain streams around.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct TerrainViewer;

/// Tags render and collision entities with the chunk they belong to.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntity {
    pub chunk_x: i32,
    pub chunk_z: i32,
}

impl From<ChunkCoord> for ChunkEntity {
    fn from(coord: ChunkCoord) -> Self {
        Self { chunk_x: coord.x, chunk_z: coord.z }
    }
}

/// Render handle for one chunk: the mesh entity and its mesh asset.
#[derive(Debug, Clone)]
pub struct ChunkMeshHandle {
    pub entity: Entity,
    pub mesh: Handle<Mesh>,
}

/// Physics handle for one chunk: the fixed body carrying its collider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkColliderHandle {
    pub entity: Entity,
}

pub type BevyTerrainScheduler = TerrainScheduler<ChunkMeshHandle, ChunkColliderHandle>;

/// The running scheduler and the height source it generates from.
#[derive(Resource)]
pub struct TerrainStreaming {
    pub scheduler: BevyTerrainScheduler,
    pub sampler: NoiseHeightSampler,
}

impl TerrainStreaming {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scheduler: TerrainScheduler::new(SchedulerConfig::from_settings(settings)),
            sampler: NoiseHeightSampler::new(&settings.generation),
        }
    }
}

/// Shared material for every chunk mesh entity.
#[derive(Resource)]
pub struct TerrainMaterial(pub Handle<StandardMaterial>);

/// Lightweight diagnostics for streaming to allow periodic logging without
/// spamming logs every frame.
#[derive(Resource, Default)]
pub struct MeshStreamingDiagnostics {
    pub last_log_seconds: f64,
    /// Mesh stage totals since the last log line.
    pub meshes: StageOutcome,
    /// Per-chunk failures across all stages since the last log line.
    pub failures: usize,
}

impl MeshStreamingDiagnostics {
    pub fn record(&mut self, report: &TickReport) {
        self.meshes.merge(report.mesh);
        self.failures += report.failures();
    }

    /// Totals for the interval just ended; counters restart from zero.
    pub fn take_interval(&mut self) -> (StageOutcome, usize) {
        (std::mem::take(&mut self.meshes), std::mem::take(&mut self.failures))
    }
}

/// `TerrainBackend` over Bevy commands and mesh assets.
///
/// Entity spawns and despawns go through `Commands` and are applied after
/// the streaming system returns.
pub struct BevyTerrainBackend<'a, 'w, 's> {
    commands: &'a mut Commands<'w, 's>,
    meshes: &'a mut Assets<Mesh>,
    material: Handle<StandardMaterial>,
}

impl<'a, 'w, 's> BevyTerrainBackend<'a, 'w, 's> {
    pub fn new(
        commands: &'a mut Commands<'w, 's>,
        meshes: &'a mut Assets<Mesh>,
        material: Handle<StandardMaterial>,
    ) -> Self {
        Self { commands, meshes, material }
    }
}

impl TerrainBackend for BevyTerrainBackend<'_, '_, '_> {
    type Mesh = ChunkMeshHandle;
    type Collider = ChunkColliderHandle;

    fn create_mesh(&mut self, coord: ChunkCoord, geometry: &ChunkGeometry) -> Result<ChunkMeshHandle, BackendError> {
        let mesh = self.meshes.add(geometry.to_bevy_mesh());
        let entity = self
            .commands
            .spawn((
                PbrBundle {
                    mesh: mesh.clone(),
                    material: self.material.clone(),
                    transform: Transform::from_translation(coord.world_origin()),
                    ..default()
                },
                ChunkEntity::from(coord),
            ))
            .id();
        Ok(ChunkMeshHandle { entity, mesh })
    }

    fn update_mesh(&mut self, mesh: &ChunkMeshHandle, coord: ChunkCoord, geometry: &ChunkGeometry) -> Result<(), BackendError> {
        let Some(existing) = self.meshes.get_mut(&mesh.mesh) else {
            return Err(BackendError::new(format!("mesh asset for chunk {coord} is gone")));
        };
        *existing = geometry.to_bevy_mesh();
        Ok(())
    }

    fn destroy_mesh(&mut self, mesh: &ChunkMeshHandle) -> Result<(), BackendError> {
        self.meshes.remove(&mesh.mesh);
        let Some(mut entity) = self.commands.get_entity(mesh.entity) else {
            return Err(BackendError::new(format!("mesh entity {:?} does not exist", mesh.entity)));
        };
        entity.despawn();
        Ok(())
    }

    fn create_collider(&mut self, coord: ChunkCoord, triangles: &[Vec3]) -> Result<ChunkColliderHandle, BackendError> {
        if triangles.is_empty() || triangles.len() % 3 != 0 {
            return Err(BackendError::new(format!(
                "chunk {coord}: {} collision vertices do not form triangles",
                triangles.len()
            )));
        }
        let Ok(count) = u32::try_from(triangles.len()) else {
            return Err(BackendError::new(format!("chunk {coord}: too many collision vertices")));
        };
        let indices: Vec<[u32; 3]> = (0..count).step_by(3).map(|i| [i, i + 1, i + 2]).collect();
        let collider = Collider::trimesh(triangles.to_vec(), indices);
        let entity = self
            .commands
            .spawn((
                RigidBody::Fixed,
                collider,
                TransformBundle::from_transform(Transform::from_translation(coord.world_origin())),
                ChunkEntity::from(coord),
            ))
            .id();
        Ok(ChunkColliderHandle { entity })
    }

    fn destroy_collider(&mut self, collider: &ChunkColliderHandle) -> Result<(), BackendError> {
        let Some(mut entity) = self.commands.get_entity(collider.entity) else {
            return Err(BackendError::new(format!("collider entity {:?} does not exist", collider.entity)));
        };
        entity.despawn();
        Ok(())
    }
}

/// Plugin wiring the scheduler into the app.
///
/// Uses the `Settings` resource if one was inserted before the plugin,
/// defaults otherwise.
pub struct TerrainStreamingPlugin;

impl Plugin for TerrainStreamingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Settings>()
            .init_resource::<MeshStreamingDiagnostics>()
            .add_systems(Startup, setup_terrain_streaming)
            .add_systems(Update, (sync_streaming_settings, stream_terrain).chain())
            .add_systems(Last, release_terrain_on_exit);
    }
}

/// Create the scheduler, sampler and shared material from the current settings.
pub fn setup_terrain_streaming(
    mut commands: Commands,
    settings: Res<Settings>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.42, 0.55, 0.32),
        perceptual_roughness: 0.95,
        ..default()
    });
    commands.insert_resource(TerrainMaterial(material));
    commands.insert_resource(TerrainStreaming::from_settings(&settings));
    info!(
        "terrain streaming ready: render distance {}, collision distance {}",
        settings.streaming.render_distance, settings.streaming.collision_distance
    );
}

/// Push changed `Settings` into the running scheduler.
///
/// Radii and budgets apply from the next tick. A changed generation section
/// rebuilds the sampler; chunks already generated keep their terrain.
///
/// # Arguments
/// - `settings`: The current settings resource.
/// - `streaming`: The running scheduler and sampler.
/// - `last`: A local cache of the last applied values to avoid redundant updates.
#[allow(clippy::needless_pass_by_value)]
pub fn sync_streaming_settings(
    settings: Res<Settings>,
    streaming: Option<ResMut<TerrainStreaming>>,
    mut last: Local<Option<(SchedulerConfig, GenerationSettings)>>,
) {
    let Some(mut streaming) = streaming else { return; };
    let config = SchedulerConfig::from_settings(&settings);
    let Some((last_config, last_generation)) = last.as_ref() else {
        *last = Some((config, settings.generation.clone()));
        return;
    };

    if *last_config != config {
        info!(
            "applying streaming settings: render distance {}, collision distance {}",
            config.render_distance, config.collision_distance
        );
        streaming.scheduler.apply_config(config);
    }
    if *last_generation != settings.generation {
        info!("terrain generation settings changed; new chunks use the updated sampler");
        streaming.sampler = NoiseHeightSampler::new(&settings.generation);
    }
    *last = Some((config, settings.generation.clone()));
}

#[derive(SystemParam)]
pub struct StreamTerrainCtx<'w, 's> {
    pub viewer: Query<'w, 's, &'static GlobalTransform, With<TerrainViewer>>,
    pub commands: Commands<'w, 's>,
    pub meshes: ResMut<'w, Assets<Mesh>>,
    pub streaming: Option<ResMut<'w, TerrainStreaming>>,
    pub material: Option<Res<'w, TerrainMaterial>>,
    pub time: Res<'w, Time>,
    pub diag: ResMut<'w, MeshStreamingDiagnostics>,
}

/// Tick the scheduler once for this frame.
///
/// Does nothing until the scheduler exists and exactly one `TerrainViewer`
/// is present.
pub fn stream_terrain(mut ctx: StreamTerrainCtx<'_, '_>) {
    let Ok(viewer) = ctx.viewer.get_single() else { return; };
    let Some(streaming) = ctx.streaming.as_mut() else { return; };
    let material = ctx.material.as_ref().map(|m| m.0.clone()).unwrap_or_default();

    let position = viewer.translation();
    let dt = ctx.time.delta_seconds();
    let TerrainStreaming { scheduler, sampler } = &mut **streaming;
    let mut backend = BevyTerrainBackend::new(&mut ctx.commands, &mut ctx.meshes, material);
    let report = scheduler.tick(position, dt, &mut backend, sampler);

    if report.visibility.marked_for_removal > 0 || report.flush.dropped > 0 {
        debug!(
            "tick {}: {} chunks leaving view, {} commands dropped",
            report.tick, report.visibility.marked_for_removal, report.flush.dropped
        );
    }

    ctx.diag.record(&report);

    // Periodic lightweight diagnostics.
    let now = ctx.time.elapsed_seconds_f64();
    if now - ctx.diag.last_log_seconds > 1.0 {
        ctx.diag.last_log_seconds = now;
        let (meshes, failures) = ctx.diag.take_interval();
        let store = scheduler.store();
        info!(
            "StreamingDiag: records={} pending={} data_ready={} complete={} errored={} removing={} queued={} meshes={} failures={} mesh_budget={} frame_ms={:.1} triangles={}",
            store.len(),
            scheduler.count_live(ChunkTags::PENDING),
            scheduler.count_live(ChunkTags::DATA_READY),
            scheduler.count_live(ChunkTags::COMPLETE),
            scheduler.count_live(ChunkTags::ERRORED),
            store.count(super::TagFilter::all(ChunkTags::PENDING_REMOVAL)),
            scheduler.visibility().queued(),
            meshes,
            failures,
            scheduler.mesh_budget(),
            scheduler.smoothed_frame_ms(),
            scheduler.stats().total_triangles,
        );
    }
}

/// Release every chunk's mesh and collider when the app is exiting.
#[allow(clippy::needless_pass_by_value)]
pub fn release_terrain_on_exit(
    mut exit: EventReader<AppExit>,
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    streaming: Option<ResMut<TerrainStreaming>>,
) {
    if exit.read().next().is_none() {
        return;
    }
    let Some(mut streaming) = streaming else { return; };
    let mut backend = BevyTerrainBackend::new(&mut commands, &mut meshes, Handle::default());
    let released = streaming.scheduler.shutdown(&mut backend);
    info!("terrain shutdown: released {released} chunk handles");
}
