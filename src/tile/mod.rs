//! Tile classification for heightfield terrain.
//!
//! Every grid cell is described by its four corner heights. The lowest corner
//! becomes the cell's base height and the relative height of each corner is
//! folded into an 8-bit mask (`nw<<6 | ne<<4 | se<<2 | sw`, two bits per
//! corner). The mask indexes a fixed 256-entry table of tile shapes; masks
//! without an entry resolve to `TileType::Flat`.
//!
//! Only corner deltas of 0, 1 and 2 are represented by the table. Larger
//! deltas spill over their two bits and end up on an unrelated (usually flat)
//! entry; `exceeds_mask_range` reports those cells so callers can track them.
//!
//! # Example
//! ```
//! use tilefield::tile::{classify, TileType};
//! let (tile, base) = classify(5, 5, 4, 4);
//! assert_eq!(tile, TileType::SlopeN);
//! assert_eq!(base, 4);
//! ```

pub mod geometry;

pub use geometry::{tile_geometry, TileGeometry};

use crate::chunk::ChunkError;

/// Shape of a single terrain tile, stored as one byte in chunk terrain data.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileType {
    #[default]
    Flat = 0,
    SlopeN,
    SlopeE,
    SlopeS,
    SlopeW,
    CornerNw,
    CornerNe,
    CornerSw,
    CornerSe,
    CornerNwInverted,
    CornerNeInverted,
    CornerSwInverted,
    CornerSeInverted,
    SaddleNesw,
    SaddleNwse,
    SteepNw,
    SteepNe,
    SteepSw,
    SteepSe,
}

pub const TILE_TYPE_COUNT: usize = 19;

impl TileType {
    pub const ALL: [TileType; TILE_TYPE_COUNT] = [
        TileType::Flat,
        TileType::SlopeN,
        TileType::SlopeE,
        TileType::SlopeS,
        TileType::SlopeW,
        TileType::CornerNw,
        TileType::CornerNe,
        TileType::CornerSw,
        TileType::CornerSe,
        TileType::CornerNwInverted,
        TileType::CornerNeInverted,
        TileType::CornerSwInverted,
        TileType::CornerSeInverted,
        TileType::SaddleNesw,
        TileType::SaddleNwse,
        TileType::SteepNw,
        TileType::SteepNe,
        TileType::SteepSw,
        TileType::SteepSe,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decode a tile byte read back from chunk terrain data.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }
}

impl TryFrom<u8> for TileType {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte).ok_or(byte)
    }
}

const fn build_mask_table() -> [TileType; 256] {
    let mut table = [TileType::Flat; 256];
    table[0b01_01_00_00] = TileType::SlopeN;
    table[0b00_01_01_00] = TileType::SlopeE;
    table[0b00_00_01_01] = TileType::SlopeS;
    table[0b01_00_00_01] = TileType::SlopeW;
    table[0b00_01_00_00] = TileType::CornerNe;
    table[0b01_00_00_00] = TileType::CornerNw;
    table[0b00_00_01_00] = TileType::CornerSe;
    table[0b00_00_00_01] = TileType::CornerSw;
    table[0b01_01_01_00] = TileType::CornerNwInverted;
    table[0b01_01_00_01] = TileType::CornerNeInverted;
    table[0b01_00_01_01] = TileType::CornerSwInverted;
    table[0b00_01_01_01] = TileType::CornerSeInverted;
    table[0b01_00_01_00] = TileType::SaddleNwse;
    table[0b00_01_00_01] = TileType::SaddleNesw;
    table[0b10_01_00_01] = TileType::SteepNw;
    table[0b01_10_01_00] = TileType::SteepNe;
    table[0b01_00_01_10] = TileType::SteepSw;
    table[0b00_01_10_01] = TileType::SteepSe;
    table
}

/// Mask -> tile lookup. Built at compile time, never mutated.
pub static MASK_TABLE: [TileType; 256] = build_mask_table();

/// Fold the four corner deltas over `base` into the lookup mask.
///
/// Deltas are expected in `0..=2`; anything larger bleeds into the
/// neighbouring corner's bits and is truncated to the low byte.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn corner_mask(nw: i32, ne: i32, sw: i32, se: i32, base: i32) -> u8 {
    let d = |h: i32| (h - base) as u32;
    let mask = (d(nw) << 6) | (d(ne) << 4) | (d(se) << 2) | d(sw);
    (mask & 0xFF) as u8
}

/// Classify a cell from its corner heights.
///
/// # Return
/// `(tile, base_height)` where `base_height` is always the minimum corner.
#[must_use]
pub fn classify(nw: i32, ne: i32, sw: i32, se: i32) -> (TileType, i32) {
    let base = nw.min(ne).min(sw).min(se);
    let mask = corner_mask(nw, ne, sw, se, base);
    (MASK_TABLE[usize::from(mask)], base)
}

/// True when some corner sits 3 or more units above the base, i.e. the
/// mask table cannot represent the cell faithfully.
#[must_use]
pub fn exceeds_mask_range(nw: i32, ne: i32, sw: i32, se: i32) -> bool {
    let base = nw.min(ne).min(sw).min(se);
    let top = nw.max(ne).max(sw).max(se);
    top - base > 2
}

/// Classify a `size x size` block of cells from a row-major heightmap that is
/// `width` samples wide.
///
/// Each output cell reads a 2x2 window (`x..=x+1`, `z..=z+1`). When the window
/// runs off the right or bottom edge of the heightmap the missing corners are
/// clamped to the north-west sample, so a heightmap exactly `size` wide still
/// classifies (its last column and row come out flat).
///
/// # Return
/// The number of cells whose corner deltas exceeded the mask range.
///
/// # Errors
/// `ChunkError::Generation` when the heightmap is too small for the requested
/// block or `out` cannot hold `size * size` cells.
pub fn classify_batch(
    heights: &[i32],
    width: usize,
    size: usize,
    out: &mut [(TileType, i32)],
) -> Result<usize, ChunkError> {
    if width == 0 || heights.len() % width != 0 {
        return Err(ChunkError::Generation(format!(
            "heightmap of {} samples is not a multiple of width {width}",
            heights.len()
        )));
    }
    let rows = heights.len() / width;
    if width < size || rows < size {
        return Err(ChunkError::Generation(format!(
            "heightmap {width}x{rows} cannot cover a {size}x{size} block"
        )));
    }
    if out.len() < size * size {
        return Err(ChunkError::Generation(format!(
            "output holds {} cells, {} needed",
            out.len(),
            size * size
        )));
    }

    let mut lossy = 0;
    for z in 0..size {
        for x in 0..size {
            let nw_idx = z * width + x;
            let has_east = x + 1 < width;
            let has_south = z + 1 < rows;

            let nw = heights[nw_idx];
            let ne = if has_east { heights[nw_idx + 1] } else { nw };
            let sw = if has_south { heights[nw_idx + width] } else { nw };
            let se = if has_east && has_south { heights[nw_idx + width + 1] } else { nw };

            if exceeds_mask_range(nw, ne, sw, se) {
                lossy += 1;
            }
            out[z * size + x] = classify(nw, ne, sw, se);
        }
    }
    Ok(lossy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_height_is_minimum_corner() {
        for &(nw, ne, sw, se) in &[(3, 4, 5, 6), (9, 2, 7, 7), (1, 1, 1, 0), (-2, 0, 1, -1)] {
            let (_, base) = classify(nw, ne, sw, se);
            assert_eq!(base, nw.min(ne).min(sw).min(se));
        }
    }

    #[test]
    fn classify_is_pure() {
        let a = classify(4, 5, 4, 5);
        let b = classify(4, 5, 4, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn single_step_shapes_match_table() {
        assert_eq!(classify(0, 0, 0, 0), (TileType::Flat, 0));
        assert_eq!(classify(1, 1, 0, 0).0, TileType::SlopeN);
        assert_eq!(classify(0, 1, 0, 1).0, TileType::SlopeE);
        assert_eq!(classify(0, 0, 1, 1).0, TileType::SlopeS);
        assert_eq!(classify(1, 0, 1, 0).0, TileType::SlopeW);
        assert_eq!(classify(0, 1, 0, 0).0, TileType::CornerNe);
        assert_eq!(classify(1, 0, 0, 0).0, TileType::CornerNw);
        assert_eq!(classify(0, 0, 0, 1).0, TileType::CornerSe);
        assert_eq!(classify(0, 0, 1, 0).0, TileType::CornerSw);
        assert_eq!(classify(1, 0, 0, 1).0, TileType::SaddleNwse);
        assert_eq!(classify(0, 1, 1, 0).0, TileType::SaddleNesw);
    }

    #[test]
    fn steep_shapes_use_two_step_corner() {
        // nw=2 ne=1 se=0 sw=1
        assert_eq!(classify(2, 1, 1, 0), (TileType::SteepNw, 0));
        assert_eq!(classify(11, 12, 10, 11), (TileType::SteepNe, 10));
    }

    #[test]
    fn raised_north_edge_by_two_is_unmapped() {
        let (tile, base) = classify(2, 2, 0, 0);
        assert_eq!(corner_mask(2, 2, 0, 0, 0), 0b10_10_00_00);
        assert_eq!(base, 0);
        assert_eq!(MASK_TABLE[0b10_10_00_00], TileType::Flat);
        assert_eq!(tile, TileType::Flat);
    }

    #[test]
    fn table_has_exactly_eighteen_shaped_entries() {
        let shaped = MASK_TABLE.iter().filter(|t| **t != TileType::Flat).count();
        assert_eq!(shaped, 18);
    }

    #[test]
    fn deltas_of_three_fall_back_to_flat_and_are_flagged() {
        // A delta of 3 sets both bits of its slot; no table entry uses 0b11.
        let (tile, base) = classify(3, 0, 0, 0);
        assert_eq!(base, 0);
        assert_eq!(tile, TileType::Flat);
        assert!(exceeds_mask_range(3, 0, 0, 0));
        assert!(!exceeds_mask_range(2, 1, 0, 1));
    }

    #[test]
    fn delta_of_four_aliases_into_neighbour_bits() {
        // sw=4 shifts into the se slot: 4 == 0b01_00 -> looks like CornerSe.
        assert_eq!(corner_mask(0, 0, 4, 0, 0), 0b00_00_01_00);
        assert_eq!(classify(0, 0, 4, 0).0, TileType::CornerSe);
        assert!(exceeds_mask_range(0, 0, 4, 0));
    }

    #[test]
    fn tile_bytes_round_trip_through_try_from() {
        for tile in TileType::ALL {
            assert_eq!(TileType::try_from(tile as u8), Ok(tile));
        }
        assert_eq!(TileType::try_from(19), Err(19));
    }

    #[test]
    fn batch_matches_single_cell_classification() {
        // 3x3 padded heightmap producing a 2x2 block
        let heights = [
            1, 1, 2, //
            0, 0, 1, //
            0, 0, 0,
        ];
        let mut out = [(TileType::Flat, 0); 4];
        let lossy = classify_batch(&heights, 3, 2, &mut out).expect("valid batch");
        assert_eq!(lossy, 0);
        assert_eq!(out[0], classify(1, 1, 0, 0));
        assert_eq!(out[1], classify(1, 2, 0, 1));
        assert_eq!(out[2], classify(0, 0, 0, 0));
        assert_eq!(out[3], classify(0, 1, 0, 0));
    }

    #[test]
    fn batch_clamps_missing_corners_to_north_west() {
        // Unpadded 2x2 heightmap: right column and bottom row have no neighbours.
        let heights = [
            0, 1, //
            1, 5,
        ];
        let mut out = [(TileType::Flat, 0); 4];
        classify_batch(&heights, 2, 2, &mut out).expect("valid batch");
        // east edge: ne/se clamp to nw, sw is real
        assert_eq!(out[1], classify(1, 1, 5, 1));
        // south edge: sw/se clamp to nw, ne is real
        assert_eq!(out[2], classify(1, 5, 1, 1));
        // corner: everything clamps
        assert_eq!(out[3], (TileType::Flat, 5));
    }

    #[test]
    fn batch_rejects_undersized_input() {
        let heights = [0; 6];
        let mut out = [(TileType::Flat, 0); 9];
        assert!(classify_batch(&heights, 4, 3, &mut out).is_err());
        assert!(classify_batch(&heights, 3, 3, &mut out).is_err());
        let mut small = [(TileType::Flat, 0); 1];
        assert!(classify_batch(&heights, 3, 2, &mut small).is_err());
    }
}
