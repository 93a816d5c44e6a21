//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use bevy::math::Vec3;
use tilefield::chunk::mesh::ChunkGeometry;
use tilefield::chunk::{BackendError, ChunkCoord, SchedulerConfig, TerrainBackend, CHUNK_SIZE_I32};

/// Backend that counts, per handle, how often it was released.
#[derive(Debug, Default)]
pub struct TrackingBackend {
    next: u32,
    pub mesh_releases: HashMap<u32, usize>,
    pub collider_releases: HashMap<u32, usize>,
    pub mesh_owner: HashMap<u32, ChunkCoord>,
    pub collider_owner: HashMap<u32, ChunkCoord>,
    pub mesh_updates: usize,
    /// Chunks whose mesh creation is refused.
    pub refuse_meshes_at: Vec<ChunkCoord>,
}

impl TrackingBackend {
    fn handle(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub fn live_meshes(&self) -> usize {
        self.mesh_releases.values().filter(|n| **n == 0).count()
    }

    pub fn live_colliders(&self) -> usize {
        self.collider_releases.values().filter(|n| **n == 0).count()
    }

    pub fn max_release_count(&self) -> usize {
        self.mesh_releases
            .values()
            .chain(self.collider_releases.values())
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl TerrainBackend for TrackingBackend {
    type Mesh = u32;
    type Collider = u32;

    fn create_mesh(&mut self, coord: ChunkCoord, _geometry: &ChunkGeometry) -> Result<u32, BackendError> {
        if self.refuse_meshes_at.contains(&coord) {
            return Err(BackendError::new(format!("refused mesh for {coord}")));
        }
        let h = self.handle();
        self.mesh_releases.insert(h, 0);
        self.mesh_owner.insert(h, coord);
        Ok(h)
    }

    fn update_mesh(&mut self, mesh: &u32, _coord: ChunkCoord, _geometry: &ChunkGeometry) -> Result<(), BackendError> {
        match self.mesh_releases.get(mesh) {
            Some(0) => {
                self.mesh_updates += 1;
                Ok(())
            }
            _ => Err(BackendError::new("stale mesh")),
        }
    }

    fn destroy_mesh(&mut self, mesh: &u32) -> Result<(), BackendError> {
        let count = self.mesh_releases.entry(*mesh).or_insert(0);
        *count += 1;
        if *count == 1 { Ok(()) } else { Err(BackendError::new("mesh released twice")) }
    }

    fn create_collider(&mut self, coord: ChunkCoord, triangles: &[Vec3]) -> Result<u32, BackendError> {
        if triangles.is_empty() || triangles.len() % 3 != 0 {
            return Err(BackendError::new("bad triangle list"));
        }
        let h = self.handle();
        self.collider_releases.insert(h, 0);
        self.collider_owner.insert(h, coord);
        Ok(h)
    }

    fn destroy_collider(&mut self, collider: &u32) -> Result<(), BackendError> {
        let count = self.collider_releases.entry(*collider).or_insert(0);
        *count += 1;
        if *count == 1 { Ok(()) } else { Err(BackendError::new("collider released twice")) }
    }
}

pub fn flat(_x: i32, _z: i32) -> f32 {
    8.0
}

/// Gentle diagonal ramp that produces a mix of slope tiles.
#[allow(clippy::cast_precision_loss)]
pub fn ramp(x: i32, z: i32) -> f32 {
    ((x + z).rem_euclid(64) / 8) as f32
}

#[allow(clippy::cast_precision_loss)]
pub fn chunk_center(x: i32, z: i32) -> Vec3 {
    let size = CHUNK_SIZE_I32 as f32;
    Vec3::new(x as f32 * size + size / 2.0, 10.0, z as f32 * size + size / 2.0)
}

pub fn config(render_distance: i32, collision_distance: i32, budget: usize) -> SchedulerConfig {
    let mut config = SchedulerConfig {
        render_distance,
        collision_distance,
        max_create: budget,
        max_data_gen: budget,
        max_mesh: budget,
        max_collision: budget,
        max_removal: budget,
        ..SchedulerConfig::default()
    };
    config.budget.enabled = false;
    config
}
