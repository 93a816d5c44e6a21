//! Chunk level-of-detail selection.
//!
//! A chunk's LOD is fixed when its record is created, from its Chebyshev
//! distance to the viewer's chunk. The mesh stage currently builds every LOD
//! at full tile resolution; the level is carried on the record so renderers
//! and diagnostics can group chunks by detail.

/// Number of LOD levels (0 = full detail).
pub const MAX_LODS: usize = 4;

/// Threshold distances (in chunk units). For a given `dist`, the first
/// threshold `d` with `dist <= d` selects the LOD index; anything farther gets
/// the coarsest level.
pub const LOD_DISTANCES: [i32; MAX_LODS - 1] = [2, 4, 6];

/// Compute the LOD index for a chunk at `dist` chunks from the viewer.
///
/// # Examples
/// ```rust
/// use tilefield::chunk::lod::compute_lod_from_dist;
/// assert_eq!(compute_lod_from_dist(0), 0);
/// assert_eq!(compute_lod_from_dist(3), 1);
/// assert_eq!(compute_lod_from_dist(6), 2);
/// assert_eq!(compute_lod_from_dist(100), 3);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn compute_lod_from_dist(dist: i32) -> u8 {
    LOD_DISTANCES
        .iter()
        .position(|&d| dist <= d)
        .unwrap_or(MAX_LODS - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(compute_lod_from_dist(2), 0);
        assert_eq!(compute_lod_from_dist(3), 1);
        assert_eq!(compute_lod_from_dist(4), 1);
        assert_eq!(compute_lod_from_dist(5), 2);
        assert_eq!(compute_lod_from_dist(7), 3);
    }
}
