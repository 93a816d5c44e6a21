//! Visibility tracking around the viewer.
//!
//! The visible set is the square of chunks within `render_distance`
//! (Chebyshev) of the viewer's chunk. When the viewer steps into an adjacent
//! chunk (including diagonally) only the entering and leaving edge strips
//! are touched; any larger jump, and the first update, rebuilds the square
//! ring by ring from the centre outwards, so the creation queue is ordered
//! nearest first.
//!
//! The tracker also owns the coordinate -> record map of chunks it has
//! asked the store to create, the creation queue, and the per-tick
//! collision-radius re-evaluation.

use std::collections::{HashMap, HashSet, VecDeque};

use bevy::math::Vec3;

use super::lod::compute_lod_from_dist;
use super::store::{ChunkId, ChunkStore};
use super::{ChunkCoord, ChunkTags};

/// Upper bound for both radii; larger configured values are clamped.
pub const MAX_RENDER_DISTANCE: i32 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityConfig {
    pub render_distance: i32,
    pub collision_distance: i32,
    pub max_create_per_frame: usize,
    /// Viewer movement (world units) under which an update is skipped.
    pub viewer_epsilon: f32,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            render_distance: 5,
            collision_distance: 1,
            max_create_per_frame: 4,
            viewer_epsilon: 1.0,
        }
    }
}

/// How the visible set was brought up to date this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityUpdate {
    /// The viewer did not move far enough to matter.
    #[default]
    Unchanged,
    /// The viewer moved but stayed in the same chunk.
    Moved,
    /// One-chunk step; edge strips added and removed.
    Shifted,
    /// Full rebuild of the square.
    Recomputed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibilityReport {
    pub update: VisibilityUpdate,
    pub center: ChunkCoord,
    pub visible: usize,
    pub created: usize,
    /// Queued coordinates kept back because an old record still occupies them.
    pub deferred: usize,
    pub marked_for_removal: usize,
    pub collision_enabled: usize,
    pub collision_disabled: usize,
}

#[derive(Debug, Default)]
pub struct VisibilityTracker {
    config: VisibilityConfig,
    visible: HashSet<ChunkCoord>,
    active: HashMap<ChunkCoord, ChunkId>,
    create_queue: VecDeque<ChunkCoord>,
    center: ChunkCoord,
    last_position: Vec3,
    initialized: bool,
    force_recompute: bool,
}

/// Coordinates at Chebyshev distance exactly `r` from `center`: the top and
/// bottom rows in full, then the left and right columns without corners.
pub fn ring(center: ChunkCoord, r: i32) -> impl Iterator<Item = ChunkCoord> {
    let (min_x, max_x) = (center.x - r, center.x + r);
    let (min_z, max_z) = (center.z - r, center.z + r);
    let rows = (min_x..=max_x).flat_map(move |x| {
        let top = ChunkCoord::new(x, min_z);
        let bottom = (r > 0).then_some(ChunkCoord::new(x, max_z));
        std::iter::once(top).chain(bottom)
    });
    let cols = ((min_z + 1)..max_z).flat_map(move |z| [ChunkCoord::new(min_x, z), ChunkCoord::new(max_x, z)]);
    rows.chain(cols)
}

impl VisibilityTracker {
    #[must_use]
    pub fn new(config: VisibilityConfig) -> Self {
        Self {
            config: sanitize(config),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// Apply new radii and limits. A changed render distance rebuilds the
    /// visible set on the next update.
    pub fn reconfigure(&mut self, config: VisibilityConfig) {
        let config = sanitize(config);
        if config.render_distance != self.config.render_distance {
            self.force_recompute = true;
        }
        self.config = config;
    }

    #[must_use]
    pub fn center(&self) -> ChunkCoord {
        self.center
    }

    #[must_use]
    pub fn visible(&self) -> &HashSet<ChunkCoord> {
        &self.visible
    }

    #[must_use]
    pub fn is_visible(&self, coord: ChunkCoord) -> bool {
        self.visible.contains(&coord)
    }

    /// Chunks created through this tracker and not yet released.
    #[must_use]
    pub fn active(&self) -> &HashMap<ChunkCoord, ChunkId> {
        &self.active
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.create_queue.len()
    }

    /// Forget everything; the next update starts from scratch.
    pub fn reset(&mut self) {
        self.visible.clear();
        self.active.clear();
        self.create_queue.clear();
        self.initialized = false;
        self.force_recompute = false;
    }

    /// Bring the visible set up to date for `viewer`, queue and create
    /// records for newly visible chunks, flag chunks that left the square
    /// for removal, and re-evaluate collision flags.
    pub fn update<M, C>(&mut self, viewer: Vec3, store: &mut ChunkStore<M, C>) -> VisibilityReport {
        let mut report = VisibilityReport::default();
        let center = ChunkCoord::from_world(viewer);
        let eps = self.config.viewer_epsilon;
        let moved = !self.initialized
            || self.force_recompute
            || center != self.center
            || self.last_position.distance_squared(viewer) > eps * eps;

        if moved {
            self.last_position = viewer;
            let (dx, dz) = (center.x - self.center.x, center.z - self.center.z);
            let step = dx.abs() <= 1 && dz.abs() <= 1 && (dx, dz) != (0, 0);

            report.update = if !self.initialized || self.force_recompute {
                self.recompute(center, store, &mut report);
                VisibilityUpdate::Recomputed
            } else if center == self.center {
                VisibilityUpdate::Moved
            } else if step && !self.visible.is_empty() {
                self.shift(self.center, center, store, &mut report);
                VisibilityUpdate::Shifted
            } else {
                self.recompute(center, store, &mut report);
                VisibilityUpdate::Recomputed
            };
            self.center = center;
            self.initialized = true;
            self.force_recompute = false;
        }

        self.create_queued(store, &mut report);
        self.update_collision_flags(store, &mut report);

        report.center = self.center;
        report.visible = self.visible.len();
        report
    }

    fn recompute<M, C>(&mut self, center: ChunkCoord, store: &mut ChunkStore<M, C>, report: &mut VisibilityReport) {
        self.visible.clear();
        self.create_queue.clear();
        for r in 0..=self.config.render_distance {
            for coord in ring(center, r) {
                self.add_visible(coord);
            }
        }
        let leaving: Vec<ChunkCoord> = self
            .active
            .keys()
            .filter(|c| !self.visible.contains(c))
            .copied()
            .collect();
        for coord in leaving {
            self.mark_for_removal(coord, store, report);
        }
    }

    fn shift<M, C>(&mut self, old: ChunkCoord, new: ChunkCoord, store: &mut ChunkStore<M, C>, report: &mut VisibilityReport) {
        let r = self.config.render_distance;
        let (dx, dz) = (new.x - old.x, new.z - old.z);
        let mut leaving = Vec::new();

        if dx != 0 {
            let entering_x = new.x + dx.signum() * r;
            let leaving_x = old.x - dx.signum() * r;
            for z in (new.z - r)..=(new.z + r) {
                self.add_visible(ChunkCoord::new(entering_x, z));
            }
            for z in (old.z - r)..=(old.z + r) {
                let coord = ChunkCoord::new(leaving_x, z);
                if self.visible.remove(&coord) {
                    leaving.push(coord);
                }
            }
        }
        if dz != 0 {
            let entering_z = new.z + dz.signum() * r;
            let leaving_z = old.z - dz.signum() * r;
            for x in (new.x - r)..=(new.x + r) {
                self.add_visible(ChunkCoord::new(x, entering_z));
            }
            for x in (old.x - r)..=(old.x + r) {
                let coord = ChunkCoord::new(x, leaving_z);
                if self.visible.remove(&coord) {
                    leaving.push(coord);
                }
            }
        }

        for coord in leaving {
            self.mark_for_removal(coord, store, report);
        }
    }

    fn add_visible(&mut self, coord: ChunkCoord) {
        if self.visible.insert(coord) && !self.active.contains_key(&coord) {
            self.create_queue.push_back(coord);
        }
    }

    fn mark_for_removal<M, C>(&mut self, coord: ChunkCoord, store: &mut ChunkStore<M, C>, report: &mut VisibilityReport) {
        if let Some(id) = self.active.remove(&coord) {
            store.insert_tags(id, ChunkTags::PENDING_REMOVAL);
            report.marked_for_removal += 1;
        }
    }

    fn create_queued<M, C>(&mut self, store: &mut ChunkStore<M, C>, report: &mut VisibilityReport) {
        let mut deferred = Vec::new();
        while report.created < self.config.max_create_per_frame {
            let Some(coord) = self.create_queue.pop_front() else {
                break;
            };
            if !self.visible.contains(&coord) || self.active.contains_key(&coord) {
                continue;
            }
            if store.id_at(coord).is_some() {
                // The previous record for this coordinate is still being removed.
                deferred.push(coord);
                continue;
            }
            let dist = coord.distance(self.center);
            let mut tags = ChunkTags::PENDING;
            if dist <= self.config.collision_distance {
                tags |= ChunkTags::NEEDS_COLLISION;
            }
            let id = store.spawn(coord, compute_lod_from_dist(dist), tags);
            self.active.insert(coord, id);
            report.created += 1;
        }
        report.deferred = deferred.len();
        for coord in deferred.into_iter().rev() {
            self.create_queue.push_front(coord);
        }
    }

    fn update_collision_flags<M, C>(&self, store: &mut ChunkStore<M, C>, report: &mut VisibilityReport) {
        let mut enable = Vec::new();
        let mut disable = Vec::new();
        for (&coord, &id) in &self.active {
            let Some(record) = store.get(id) else {
                continue;
            };
            let wanted = coord.distance(self.center) <= self.config.collision_distance;
            let has = record.has(ChunkTags::NEEDS_COLLISION);
            if wanted && !has {
                enable.push(id);
            } else if !wanted && has {
                disable.push(id);
            }
        }
        report.collision_enabled = enable.len();
        report.collision_disabled = disable.len();
        for id in enable {
            store.insert_tags(id, ChunkTags::NEEDS_COLLISION);
        }
        for id in disable {
            store.remove_tags(id, ChunkTags::NEEDS_COLLISION);
        }
    }
}

fn sanitize(mut config: VisibilityConfig) -> VisibilityConfig {
    config.render_distance = config.render_distance.clamp(0, MAX_RENDER_DISTANCE);
    config.collision_distance = config.collision_distance.clamp(0, MAX_RENDER_DISTANCE);
    if !config.viewer_epsilon.is_finite() || config.viewer_epsilon < 0.0 {
        config.viewer_epsilon = 0.0;
    }
    config
}
