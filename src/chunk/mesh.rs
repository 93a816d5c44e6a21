//! Chunk mesh building.
//!
//! Terrain bytes are expanded tile by tile: each cell contributes the six
//! vertices of its tile shape, lifted by the cell's base height and offset to
//! the cell's position inside the chunk. Normals are then smoothed across
//! coincident vertices so neighbouring tiles shade continuously. The build
//! stage hands the geometry to the backend, updating an existing mesh in
//! place when the chunk already has one.

use std::collections::HashMap;

use bevy::log::error;
use bevy::math::Vec3;
use bevy::prelude::Mesh;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use bevy::render::render_asset::RenderAssetUsages;

use super::backend::TerrainBackend;
use super::select::NearestSelector;
use super::stats::{MeshGenerationStats, StageOutcome};
use super::store::{ChunkId, ChunkStore, TagFilter};
use super::{ChunkCoord, ChunkError, ChunkTags, CELLS_PER_CHUNK, CHUNK_SIZE, TERRAIN_BYTES};
use crate::tile::{tile_geometry, TileType};

/// Vertices emitted per tile (two triangles, not shared).
pub const VERTICES_PER_TILE: usize = 6;

/// Chunk-local triangle list with one normal per vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
}

impl ChunkGeometry {
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Convert into a Bevy triangle-list mesh.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bevy_mesh(&self) -> Mesh {
        let indices: Vec<u32> = (0..self.positions.len() as u32).collect();
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, self.positions.clone());
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, self.normals.clone());
        mesh.insert_indices(Indices::U32(indices));
        mesh
    }
}

fn cell_tile(coord: ChunkCoord, data: &[u8], cell: usize) -> Result<(f32, TileType), ChunkError> {
    let base = f32::from(data[cell * 2]);
    let byte = data[cell * 2 + 1];
    let tile = TileType::from_byte(byte).ok_or_else(|| ChunkError::CorruptTerrain {
        coord,
        reason: format!("unknown tile byte {byte} in cell {cell}"),
    })?;
    Ok((base, tile))
}

fn check_len(coord: ChunkCoord, data: &[u8]) -> Result<(), ChunkError> {
    if data.len() == TERRAIN_BYTES {
        Ok(())
    } else {
        Err(ChunkError::CorruptTerrain {
            coord,
            reason: format!("expected {TERRAIN_BYTES} bytes, found {}", data.len()),
        })
    }
}

/// Raw per-tile triangle positions for a chunk, without normals.
///
/// # Errors
/// `ChunkError::CorruptTerrain` on a wrong length or unknown tile byte.
#[allow(clippy::cast_precision_loss)]
pub fn expand_positions(coord: ChunkCoord, data: &[u8]) -> Result<Vec<Vec3>, ChunkError> {
    check_len(coord, data)?;
    let mut positions = Vec::with_capacity(CELLS_PER_CHUNK * VERTICES_PER_TILE);
    for cell in 0..CELLS_PER_CHUNK {
        let (base, tile) = cell_tile(coord, data, cell)?;
        let offset = Vec3::new((cell % CHUNK_SIZE) as f32, base, (cell / CHUNK_SIZE) as f32);
        positions.extend(tile_geometry(tile).vertices.iter().map(|v| *v + offset));
    }
    Ok(positions)
}

/// Expand terrain bytes into renderable geometry with smoothed normals.
///
/// # Errors
/// `ChunkError::CorruptTerrain` on a wrong length or unknown tile byte.
#[allow(clippy::cast_precision_loss)]
pub fn expand_terrain(coord: ChunkCoord, data: &[u8]) -> Result<ChunkGeometry, ChunkError> {
    check_len(coord, data)?;
    let mut positions = Vec::with_capacity(CELLS_PER_CHUNK * VERTICES_PER_TILE);
    let mut normals = Vec::with_capacity(CELLS_PER_CHUNK * VERTICES_PER_TILE);
    for cell in 0..CELLS_PER_CHUNK {
        let (base, tile) = cell_tile(coord, data, cell)?;
        let offset = Vec3::new((cell % CHUNK_SIZE) as f32, base, (cell / CHUNK_SIZE) as f32);
        let geom = tile_geometry(tile);
        positions.extend(geom.vertices.iter().map(|v| *v + offset));
        normals.extend_from_slice(&geom.normals);
    }
    smooth_normals(&positions, &mut normals);
    Ok(ChunkGeometry {
        positions: positions.iter().map(|p| p.to_array()).collect(),
        normals: normals.iter().map(|n| n.to_array()).collect(),
    })
}

/// Replace each normal with the normalized sum of the normals of every
/// vertex sharing its position. Positions are on an integer lattice, so
/// rounding them is an exact key.
#[allow(clippy::cast_possible_truncation)]
pub fn smooth_normals(positions: &[Vec3], normals: &mut [Vec3]) {
    let key = |p: Vec3| [p.x.round() as i32, p.y.round() as i32, p.z.round() as i32];
    let mut sums: HashMap<[i32; 3], Vec3> = HashMap::with_capacity(positions.len() / 2);
    for (p, n) in positions.iter().zip(normals.iter()) {
        *sums.entry(key(*p)).or_insert(Vec3::ZERO) += *n;
    }
    for (p, n) in positions.iter().zip(normals.iter_mut()) {
        if let Some(sum) = sums.get(&key(*p)) {
            *n = sum.try_normalize().unwrap_or(Vec3::Y);
        }
    }
}

#[derive(Debug)]
pub struct MeshBuildStage {
    max_per_frame: usize,
    selector: NearestSelector<ChunkId>,
}

impl MeshBuildStage {
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

    /// Build or rebuild meshes for up to `budget()` chunks flagged
    /// `NEEDS_MESH_UPDATE`, nearest first.
    pub fn run<B: TerrainBackend>(
        &mut self,
        store: &mut ChunkStore<B::Mesh, B::Collider>,
        center: ChunkCoord,
        backend: &mut B,
        stats: &mut MeshGenerationStats,
    ) -> StageOutcome {
        let mut outcome = StageOutcome::default();

        self.selector.reset(self.max_per_frame);
        let filter = TagFilter::all(ChunkTags::NEEDS_MESH_UPDATE).without(ChunkTags::PENDING_REMOVAL);
        for record in store.query(filter) {
            self.selector.offer(record.id, record.coord.distance(center));
        }
        let picked: Vec<ChunkId> = self.selector.drain().map(|(id, _)| id).collect();
        outcome.selected = picked.len();

        for id in picked {
            let Some(record) = store.get(id) else {
                outcome.skipped += 1;
                continue;
            };
            if record.has(ChunkTags::PENDING_REMOVAL) || !record.has(ChunkTags::NEEDS_MESH_UPDATE) {
                outcome.skipped += 1;
                continue;
            }
            let coord = record.coord;
            let had_mesh = record.mesh.is_some();

            let built = match record.terrain() {
                None => Err(ChunkError::MissingTerrain(coord)),
                Some(data) => expand_terrain(coord, data).and_then(|geometry| {
                    let tris = geometry.triangle_count();
                    match record.mesh() {
                        Some(handle) => backend.update_mesh(handle, coord, &geometry).map(|()| (None, tris)),
                        None => backend.create_mesh(coord, &geometry).map(|h| (Some(h), tris)),
                    }
                    .map_err(ChunkError::from)
                }),
            };

            match built {
                Ok((new_handle, tris)) => {
                    if let Some(handle) = new_handle {
                        store.attach_mesh(id, handle);
                    }
                    stats.update_chunk(coord, tris);
                    store.swap_tags(
                        id,
                        ChunkTags::DATA_READY | ChunkTags::NEEDS_MESH_UPDATE,
                        ChunkTags::COMPLETE,
                    );
                    outcome.advanced += 1;
                }
                Err(e) if had_mesh => {
                    error!("mesh rebuild failed for chunk {coord}, keeping previous mesh: {e}");
                    store.remove_tags(id, ChunkTags::NEEDS_MESH_UPDATE);
                    outcome.failed += 1;
                }
                Err(e) => {
                    error!("mesh build failed for chunk {coord}: {e}");
                    store.swap_tags(
                        id,
                        ChunkTags::DATA_READY | ChunkTags::NEEDS_MESH_UPDATE,
                        ChunkTags::ERRORED,
                    );
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
