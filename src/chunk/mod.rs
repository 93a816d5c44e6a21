//! Chunk records and the streaming pipeline built around them.
//!
//! A chunk is a `CHUNK_SIZE x CHUNK_SIZE` square of tiles addressed by an
//! integer `ChunkCoord`. Chunk state lives in a `ChunkStore` as a record with
//! a set of `ChunkTags`; the pipeline stages (`generation`, `mesh`,
//! `collision`, `removal`) query records by tag, do a bounded amount of work
//! per tick and record their structural changes in the store's command buffer.
//! `TerrainScheduler` drives the stages in a fixed order once per tick and
//! `streaming` hooks the scheduler into a Bevy app.
//!
//! # Example
//! ```
//! use tilefield::chunk::ChunkCoord;
//! use bevy::math::Vec3;
//!
//! assert_eq!(ChunkCoord::from_world(Vec3::new(-0.5, 0.0, 40.0)), ChunkCoord::new(-1, 1));
//! ```

use std::fmt;

use bevy::math::Vec3;
use bitflags::bitflags;

pub mod backend;
pub mod budget;
pub mod collision;
pub mod generation;
pub mod lod;
pub mod mesh;
pub mod removal;
pub mod scheduler;
pub mod select;
pub mod stats;
pub mod store;
pub mod streaming;
pub mod visibility;

pub use backend::{BackendError, TerrainBackend};
pub use lod::compute_lod_from_dist;
pub use scheduler::{SchedulerConfig, TerrainScheduler};
pub use stats::{MeshGenerationStats, StageOutcome, TickReport};
pub use store::{ChunkId, ChunkStore, TagFilter};
pub use streaming::{ChunkEntity, TerrainStreamingPlugin, TerrainViewer};
pub use visibility::{VisibilityConfig, VisibilityReport, VisibilityTracker, VisibilityUpdate};

/// Tiles along one edge of a chunk.
pub const CHUNK_SIZE: usize = 32;

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CHUNK_SIZE_I32: i32 = CHUNK_SIZE as i32;

pub const CELLS_PER_CHUNK: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Terrain data is two bytes per cell: base height then tile type.
pub const TERRAIN_BYTES: usize = CELLS_PER_CHUNK * 2;

/// Highest storable base height (one byte).
pub const MAX_HEIGHT: i32 = 255;

/// Largest chunk coordinate `from_world` produces on either axis. Keeps world
/// origins and visibility rings well inside `i32`.
pub const MAX_CHUNK_COORD: i32 = 1 << 24;

/// Integer chunk address on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world position (`floor(pos / CHUNK_SIZE)` per axis),
    /// clamped to `±MAX_CHUNK_COORD`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_world(pos: Vec3) -> Self {
        let size = CHUNK_SIZE as f32;
        let axis = |v: f32| ((v / size).floor() as i32).clamp(-MAX_CHUNK_COORD, MAX_CHUNK_COORD);
        Self {
            x: axis(pos.x),
            z: axis(pos.z),
        }
    }

    /// Chebyshev (square-ring) distance in chunk units, saturating at `i32::MAX`.
    #[must_use]
    pub fn distance(self, other: ChunkCoord) -> i32 {
        let d = self.x.abs_diff(other.x).max(self.z.abs_diff(other.z));
        i32::try_from(d).unwrap_or(i32::MAX)
    }

    /// World-space position of the chunk's north-west corner at height 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn world_origin(self) -> Vec3 {
        Vec3::new(
            self.x.saturating_mul(CHUNK_SIZE_I32) as f32,
            0.0,
            self.z.saturating_mul(CHUNK_SIZE_I32) as f32,
        )
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

bitflags! {
    /// Lifecycle tags carried by a chunk record.
    ///
    /// A live record carries exactly one stage tag (`PENDING`, `DATA_READY`,
    /// `COMPLETE` or `ERRORED`). The remaining bits are independent flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChunkTags: u16 {
        const PENDING = 1 << 0;
        const DATA_READY = 1 << 1;
        const COMPLETE = 1 << 2;
        const ERRORED = 1 << 3;
        const NEEDS_MESH_UPDATE = 1 << 4;
        const NEEDS_COLLISION = 1 << 5;
        const PENDING_REMOVAL = 1 << 6;
        /// Collider construction failed; not retried for this record.
        const COLLISION_FAILED = 1 << 7;

        const STAGES = Self::PENDING.bits()
            | Self::DATA_READY.bits()
            | Self::COMPLETE.bits()
            | Self::ERRORED.bits();
    }
}

/// Failure of a single chunk inside a pipeline stage.
///
/// Stage errors are local to the chunk: the stage tags the record and keeps
/// going with the rest of its batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkError {
    /// Height sampling or classification failed.
    Generation(String),
    /// Terrain bytes could not be expanded into geometry.
    Mesh(String),
    /// Terrain bytes could not be turned into collision triangles.
    Collision(String),
    /// The render or physics backend rejected a request.
    Backend(BackendError),
    /// A stage needed terrain data the record does not have.
    MissingTerrain(ChunkCoord),
    /// Terrain bytes are the wrong length or hold an unknown tile byte.
    CorruptTerrain { coord: ChunkCoord, reason: String },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Generation(msg) => write!(f, "terrain generation failed: {msg}"),
            ChunkError::Mesh(msg) => write!(f, "mesh build failed: {msg}"),
            ChunkError::Collision(msg) => write!(f, "collision build failed: {msg}"),
            ChunkError::Backend(e) => write!(f, "backend error: {e}"),
            ChunkError::MissingTerrain(coord) => write!(f, "chunk {coord} has no terrain data"),
            ChunkError::CorruptTerrain { coord, reason } => {
                write!(f, "chunk {coord} has corrupt terrain data: {reason}")
            }
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for ChunkError {
    fn from(e: BackendError) -> Self {
        ChunkError::Backend(e)
    }
}

/// One chunk's state in the store.
///
/// `M` and `C` are the backend's mesh and collider handle types. A record
/// only holds a mesh handle once the mesh stage has succeeded for it and a
/// collider handle only while collision is wanted.
#[derive(Debug)]
pub struct ChunkRecord<M, C> {
    pub(crate) id: ChunkId,
    pub(crate) coord: ChunkCoord,
    pub(crate) lod: u8,
    pub(crate) tags: ChunkTags,
    pub(crate) terrain: Option<Box<[u8]>>,
    pub(crate) mesh: Option<M>,
    pub(crate) collider: Option<C>,
}

impl<M, C> ChunkRecord<M, C> {
    pub(crate) fn new(id: ChunkId, coord: ChunkCoord, lod: u8, tags: ChunkTags) -> Self {
        Self {
            id,
            coord,
            lod,
            tags,
            terrain: None,
            mesh: None,
            collider: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ChunkId {
        self.id
    }

    #[must_use]
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Detail level assigned at creation (0 = full detail).
    #[must_use]
    pub fn lod(&self) -> u8 {
        self.lod
    }

    #[must_use]
    pub fn tags(&self) -> ChunkTags {
        self.tags
    }

    #[must_use]
    pub fn has(&self, tags: ChunkTags) -> bool {
        self.tags.contains(tags)
    }

    /// The current stage tag, if the record carries exactly one.
    #[must_use]
    pub fn stage(&self) -> Option<ChunkTags> {
        let stage = self.tags & ChunkTags::STAGES;
        (stage.bits().count_ones() == 1).then_some(stage)
    }

    /// Packed terrain bytes (`[base_height, tile_type]` per cell, row-major).
    #[must_use]
    pub fn terrain(&self) -> Option<&[u8]> {
        self.terrain.as_deref()
    }

    #[must_use]
    pub fn mesh(&self) -> Option<&M> {
        self.mesh.as_ref()
    }

    #[must_use]
    pub fn collider(&self) -> Option<&C> {
        self.collider.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_positions_floor_into_chunks() {
        assert_eq!(ChunkCoord::from_world(Vec3::ZERO), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_world(Vec3::new(31.9, 7.0, 0.0)), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_world(Vec3::new(32.0, 0.0, 0.0)), ChunkCoord::new(1, 0));
        assert_eq!(ChunkCoord::from_world(Vec3::new(-0.1, 0.0, -32.0)), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_world(Vec3::new(-32.1, 0.0, 0.0)), ChunkCoord::new(-2, 0));
    }

    #[test]
    fn distance_is_chebyshev() {
        let c = ChunkCoord::new(0, 0);
        assert_eq!(c.distance(ChunkCoord::new(3, -1)), 3);
        assert_eq!(c.distance(ChunkCoord::new(-2, 2)), 2);
        assert_eq!(c.distance(c), 0);
        let far = ChunkCoord::new(i32::MIN, 0);
        assert_eq!(far.distance(ChunkCoord::new(i32::MAX, 0)), i32::MAX);
    }

    #[test]
    fn far_world_positions_are_clamped() {
        let far = ChunkCoord::from_world(Vec3::new(1.0e30, 0.0, -1.0e30));
        assert_eq!(far, ChunkCoord::new(MAX_CHUNK_COORD, -MAX_CHUNK_COORD));
        let origin = far.world_origin();
        assert!(origin.x > 0.0 && origin.z < 0.0);
    }

    #[test]
    fn stage_requires_exactly_one_stage_tag() {
        let id = ChunkId::from_raw(1);
        let mut record: ChunkRecord<(), ()> =
            ChunkRecord::new(id, ChunkCoord::new(0, 0), 0, ChunkTags::PENDING | ChunkTags::NEEDS_COLLISION);
        assert_eq!(record.stage(), Some(ChunkTags::PENDING));
        record.tags.insert(ChunkTags::COMPLETE);
        assert_eq!(record.stage(), None);
    }
}
