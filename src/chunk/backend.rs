//! Seam between the chunk pipeline and whatever renders and simulates it.
//!
//! The pipeline never touches GPU buffers or physics bodies directly. It
//! hands geometry to a `TerrainBackend` and keeps the opaque handles the
//! backend returns on the chunk record; the same handles come back when the
//! chunk's mesh or collider has to be updated or released.

use std::fmt;

use bevy::math::Vec3;

use super::mesh::ChunkGeometry;
use super::ChunkCoord;

/// A backend request that could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    reason: String,
}

impl BackendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for BackendError {}

/// Render and physics operations the pipeline needs.
///
/// Geometry and collision triangles are in chunk-local space; the backend
/// places them at `coord.world_origin()`. Each handle returned by a `create_*`
/// call is released exactly once through the matching `destroy_*` call.
pub trait TerrainBackend {
    type Mesh;
    type Collider;

    /// Upload a new mesh for `coord`.
    ///
    /// # Errors
    /// Returns `BackendError` when the mesh cannot be created.
    fn create_mesh(&mut self, coord: ChunkCoord, geometry: &ChunkGeometry) -> Result<Self::Mesh, BackendError>;

    /// Replace the contents of an existing mesh in place.
    ///
    /// # Errors
    /// Returns `BackendError` when the handle is stale or the upload fails.
    fn update_mesh(&mut self, mesh: &Self::Mesh, coord: ChunkCoord, geometry: &ChunkGeometry) -> Result<(), BackendError>;

    /// Release a mesh.
    ///
    /// # Errors
    /// Returns `BackendError` when the handle is unknown to the backend.
    fn destroy_mesh(&mut self, mesh: &Self::Mesh) -> Result<(), BackendError>;

    /// Build a static collider from a triangle list (three vertices per triangle).
    ///
    /// # Errors
    /// Returns `BackendError` when the collider cannot be created.
    fn create_collider(&mut self, coord: ChunkCoord, triangles: &[Vec3]) -> Result<Self::Collider, BackendError>;

    /// Release a collider.
    ///
    /// # Errors
    /// Returns `BackendError` when the handle is unknown to the backend.
    fn destroy_collider(&mut self, collider: &Self::Collider) -> Result<(), BackendError>;
}

#[cfg(test)]
pub(crate) mod recording {
    //! In-memory backend that hands out numeric handles and remembers every call.

    use std::collections::HashSet;

    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        next: u32,
        pub live_meshes: HashSet<u32>,
        pub live_colliders: HashSet<u32>,
        pub meshes_created: usize,
        pub meshes_updated: usize,
        pub meshes_destroyed: usize,
        pub colliders_created: usize,
        pub colliders_destroyed: usize,
        pub fail_meshes: bool,
        pub fail_colliders: bool,
    }

    impl RecordingBackend {
        fn handle(&mut self) -> u32 {
            self.next += 1;
            self.next
        }
    }

    impl TerrainBackend for RecordingBackend {
        type Mesh = u32;
        type Collider = u32;

        fn create_mesh(&mut self, _coord: ChunkCoord, _geometry: &ChunkGeometry) -> Result<u32, BackendError> {
            if self.fail_meshes {
                return Err(BackendError::new("mesh upload refused"));
            }
            let h = self.handle();
            self.live_meshes.insert(h);
            self.meshes_created += 1;
            Ok(h)
        }

        fn update_mesh(&mut self, mesh: &u32, _coord: ChunkCoord, _geometry: &ChunkGeometry) -> Result<(), BackendError> {
            if !self.live_meshes.contains(mesh) {
                return Err(BackendError::new("stale mesh handle"));
            }
            self.meshes_updated += 1;
            Ok(())
        }

        fn destroy_mesh(&mut self, mesh: &u32) -> Result<(), BackendError> {
            if !self.live_meshes.remove(mesh) {
                return Err(BackendError::new("mesh released twice"));
            }
            self.meshes_destroyed += 1;
            Ok(())
        }

        fn create_collider(&mut self, _coord: ChunkCoord, triangles: &[Vec3]) -> Result<u32, BackendError> {
            if self.fail_colliders || triangles.len() % 3 != 0 {
                return Err(BackendError::new("collider refused"));
            }
            let h = self.handle();
            self.live_colliders.insert(h);
            self.colliders_created += 1;
            Ok(h)
        }

        fn destroy_collider(&mut self, collider: &u32) -> Result<(), BackendError> {
            if !self.live_colliders.remove(collider) {
                return Err(BackendError::new("collider released twice"));
            }
            self.colliders_destroyed += 1;
            Ok(())
        }
    }
}
