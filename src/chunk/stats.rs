//! Per-tick pipeline reports and mesh statistics.
//!
//! `MeshGenerationStats` tracks per-chunk triangle counts and a running
//! total for the diagnostics line. `TickReport` summarizes what one
//! scheduler tick did, stage by stage.
//!
//! # Example:
//! ```
//! use tilefield::chunk::{ChunkCoord, MeshGenerationStats};
//! let mut stats = MeshGenerationStats::default();
//! stats.update_chunk(ChunkCoord::new(0, 0), 100);
//! assert_eq!(stats.total_triangles, 100);
//! ```

use std::collections::HashMap;
use std::fmt;

use super::store::FlushReport;
use super::visibility::VisibilityReport;
use super::ChunkCoord;

/// Tracks mesh triangle counts.
///
/// `per_chunk_triangles` holds the most recent triangle count for each chunk
/// with a mesh; `total_triangles` is the sum across all of them.
#[derive(Debug, Default, Clone)]
pub struct MeshGenerationStats {
    pub per_chunk_triangles: HashMap<ChunkCoord, usize>,
    pub total_triangles: usize,
}

impl MeshGenerationStats {
    /// Record the triangle count of a chunk's latest mesh and adjust the total.
    pub fn update_chunk(&mut self, coord: ChunkCoord, tri_count: usize) {
        let prev = self.per_chunk_triangles.insert(coord, tri_count).unwrap_or(0);
        self.total_triangles = self.total_triangles + tri_count - prev;
    }

    /// Forget a chunk (when it is removed) and adjust the total.
    pub fn remove_chunk(&mut self, coord: ChunkCoord) {
        if let Some(prev) = self.per_chunk_triangles.remove(&coord) {
            self.total_triangles = self.total_triangles.saturating_sub(prev);
        }
    }

    /// The `n` chunks with the most triangles, descending. Ties are ordered
    /// by coordinate so the result is stable.
    #[must_use]
    pub fn top_chunks(&self, n: usize) -> Vec<(ChunkCoord, usize)> {
        let mut entries: Vec<(ChunkCoord, usize)> =
            self.per_chunk_triangles.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

/// Per-stage counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Chunks selected this tick.
    pub selected: usize,
    /// Chunks that moved forward (or were released, for removal).
    pub advanced: usize,
    /// Chunks that hit an error and were tagged accordingly.
    pub failed: usize,
    /// Selected chunks whose preconditions no longer held.
    pub skipped: usize,
}

impl StageOutcome {
    pub fn merge(&mut self, other: StageOutcome) {
        self.selected += other.selected;
        self.advanced += other.advanced;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.advanced, self.selected)?;
        if self.failed > 0 {
            write!(f, " ({} failed)", self.failed)?;
        }
        Ok(())
    }
}

/// What a single scheduler tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub visibility: VisibilityReport,
    pub removal: StageOutcome,
    pub generation: StageOutcome,
    pub mesh: StageOutcome,
    pub collision: StageOutcome,
    /// Colliders released because their chunk left the collision radius.
    pub colliders_released: usize,
    /// Generated cells whose corner deltas exceeded the classifier's range.
    pub lossy_tiles: usize,
    /// Mesh budget in effect for this tick.
    pub mesh_budget: usize,
    pub flush: FlushReport,
}

impl TickReport {
    /// Total per-chunk failures across all stages.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.removal.failed + self.generation.failed + self.mesh.failed + self.collision.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_follow_updates_and_removals() {
        let mut stats = MeshGenerationStats::default();
        stats.update_chunk(ChunkCoord::new(0, 0), 10);
        stats.update_chunk(ChunkCoord::new(1, 0), 30);
        stats.update_chunk(ChunkCoord::new(0, 0), 20);
        assert_eq!(stats.total_triangles, 50);
        stats.remove_chunk(ChunkCoord::new(1, 0));
        stats.remove_chunk(ChunkCoord::new(9, 9));
        assert_eq!(stats.total_triangles, 20);
    }

    #[test]
    fn top_chunks_sorted_descending() {
        let mut stats = MeshGenerationStats::default();
        stats.update_chunk(ChunkCoord::new(0, 0), 5);
        stats.update_chunk(ChunkCoord::new(1, 0), 50);
        stats.update_chunk(ChunkCoord::new(2, 0), 20);
        let top = stats.top_chunks(2);
        assert_eq!(top, vec![(ChunkCoord::new(1, 0), 50), (ChunkCoord::new(2, 0), 20)]);
    }

    #[test]
    fn outcome_display_mentions_failures_only_when_present() {
        let ok = StageOutcome { selected: 4, advanced: 4, ..Default::default() };
        assert_eq!(ok.to_string(), "4/4");
        let bad = StageOutcome { selected: 4, advanced: 3, failed: 1, skipped: 0 };
        assert_eq!(bad.to_string(), "3/4 (1 failed)");
    }
}
