//! Terrain data generation stage.
//!
//! Picks the `PENDING` chunks nearest the viewer, samples a padded
//! heightfield for each, classifies every cell and packs the result into the
//! record's terrain bytes. Success moves the record to `DATA_READY` and asks
//! for a mesh; failure tags it `ERRORED`.

use bevy::log::{debug, error};

use super::select::NearestSelector;
use super::stats::StageOutcome;
use super::store::{ChunkId, ChunkStore, TagFilter};
use super::{ChunkCoord, ChunkError, ChunkTags, CELLS_PER_CHUNK, CHUNK_SIZE, MAX_HEIGHT, TERRAIN_BYTES};
use crate::terrain::{fill_heightfield, HeightSampler, PADDED_SIZE};
use crate::tile::{classify_batch, TileType};

/// Reusable buffers for generating one chunk at a time.
#[derive(Debug, Default)]
pub struct GenerationScratch {
    heights: Vec<i32>,
    cells: Vec<(TileType, i32)>,
}

/// Terrain bytes for one chunk plus the number of cells the classifier could
/// not represent.
#[derive(Debug)]
pub struct GeneratedTerrain {
    pub data: Box<[u8]>,
    pub lossy_tiles: usize,
}

/// Generate the packed terrain bytes for `coord`.
///
/// Cell `i` (row-major, `i = z * CHUNK_SIZE + x`) is stored as
/// `[base_height, tile_type]` at bytes `2i` and `2i + 1`.
///
/// # Errors
/// `ChunkError::Generation` when sampling or classification fails.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_chunk_data<S: HeightSampler + ?Sized>(
    coord: ChunkCoord,
    sampler: &S,
    scratch: &mut GenerationScratch,
) -> Result<GeneratedTerrain, ChunkError> {
    fill_heightfield(sampler, coord, &mut scratch.heights)?;
    scratch.cells.clear();
    scratch.cells.resize(CELLS_PER_CHUNK, (TileType::Flat, 0));
    let lossy_tiles = classify_batch(&scratch.heights, PADDED_SIZE, CHUNK_SIZE, &mut scratch.cells)?;

    let mut data = vec![0u8; TERRAIN_BYTES];
    for (cell, (tile, base)) in data.chunks_exact_mut(2).zip(&scratch.cells) {
        cell[0] = (*base).clamp(0, MAX_HEIGHT) as u8;
        cell[1] = *tile as u8;
    }
    Ok(GeneratedTerrain {
        data: data.into_boxed_slice(),
        lossy_tiles,
    })
}

#[derive(Debug)]
pub struct DataGenerationStage {
    max_per_frame: usize,
    selector: NearestSelector<(ChunkId, ChunkCoord)>,
    scratch: GenerationScratch,
}

impl DataGenerationStage {
    #[must_use]
    pub fn new(max_per_frame: usize) -> Self {
        Self {
            max_per_frame,
            selector: NearestSelector::new(max_per_frame),
            scratch: GenerationScratch::default(),
        }
    }

    pub fn set_budget(&mut self, max_per_frame: usize) {
        self.max_per_frame = max_per_frame;
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.max_per_frame
    }

    /// Run one tick of data generation.
    ///
    /// # Return
    /// Stage counters and the number of lossy cells generated.
    pub fn run<M, C, S: HeightSampler + ?Sized>(
        &mut self,
        store: &mut ChunkStore<M, C>,
        center: ChunkCoord,
        sampler: &S,
    ) -> (StageOutcome, usize) {
        let mut outcome = StageOutcome::default();
        let mut lossy = 0;

        self.selector.reset(self.max_per_frame);
        let filter = TagFilter::all(ChunkTags::PENDING).without(ChunkTags::PENDING_REMOVAL);
        for record in store.query(filter) {
            self.selector.offer((record.id, record.coord), record.coord.distance(center));
        }
        let picked: Vec<(ChunkId, ChunkCoord)> = self.selector.drain().map(|(item, _)| item).collect();
        outcome.selected = picked.len();

        for (id, coord) in picked {
            match generate_chunk_data(coord, sampler, &mut self.scratch) {
                Ok(terrain) => {
                    if terrain.lossy_tiles > 0 {
                        debug!("chunk {coord}: {} cells exceed the tile mask range", terrain.lossy_tiles);
                    }
                    lossy += terrain.lossy_tiles;
                    store.set_terrain(id, terrain.data);
                    store.swap_tags(id, ChunkTags::PENDING, ChunkTags::DATA_READY | ChunkTags::NEEDS_MESH_UPDATE);
                    outcome.advanced += 1;
                }
                Err(e) => {
                    error!("data generation failed for chunk {coord}: {e}");
                    store.swap_tags(id, ChunkTags::PENDING, ChunkTags::ERRORED);
                    outcome.failed += 1;
                }
            }
        }
        (outcome, lossy)
    }
}
