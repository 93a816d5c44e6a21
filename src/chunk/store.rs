//! Chunk record storage with a deferred command buffer.
//!
//! Stages read the store through tag queries while they run. Every change
//! they want to make (spawning a record, moving tags, attaching terrain or
//! handles, despawning) is queued with `ChunkStore`'s command methods and
//! only becomes visible after `flush`, which the scheduler calls once at the
//! end of a tick. A query in progress therefore never observes a half-applied
//! change.
//!
//! Records are kept in id order, so every query walks chunks in creation order.

use std::collections::{BTreeMap, HashMap};

use bevy::log::warn;

use super::{ChunkCoord, ChunkRecord, ChunkTags};

/// Stable record identity, unique for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u64);

impl ChunkId {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Tag predicate for store queries: every `all` bit set, no `none` bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagFilter {
    pub all: ChunkTags,
    pub none: ChunkTags,
}

impl TagFilter {
    #[must_use]
    pub const fn all(tags: ChunkTags) -> Self {
        Self {
            all: tags,
            none: ChunkTags::empty(),
        }
    }

    #[must_use]
    pub const fn without(mut self, tags: ChunkTags) -> Self {
        self.none = self.none.union(tags);
        self
    }

    #[must_use]
    pub fn matches(&self, tags: ChunkTags) -> bool {
        tags.contains(self.all) && !tags.intersects(self.none)
    }
}

#[derive(Debug)]
enum Command<M, C> {
    Spawn { id: ChunkId, coord: ChunkCoord, lod: u8, tags: ChunkTags },
    Tags { id: ChunkId, insert: ChunkTags, remove: ChunkTags },
    SetTerrain { id: ChunkId, data: Box<[u8]> },
    AttachMesh { id: ChunkId, mesh: M },
    AttachCollider { id: ChunkId, collider: C },
    DetachCollider { id: ChunkId },
    Despawn { id: ChunkId },
}

/// Counts of what a `flush` applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub applied: usize,
    pub spawned: usize,
    pub despawned: usize,
    /// Commands whose target record no longer existed.
    pub dropped: usize,
}

#[derive(Debug)]
pub struct ChunkStore<M, C> {
    records: BTreeMap<ChunkId, ChunkRecord<M, C>>,
    by_coord: HashMap<ChunkCoord, ChunkId>,
    commands: Vec<Command<M, C>>,
    next_id: u64,
}

impl<M, C> Default for ChunkStore<M, C> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            by_coord: HashMap::new(),
            commands: Vec::new(),
            next_id: 1,
        }
    }
}

impl<M, C> ChunkStore<M, C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ChunkId) -> Option<&ChunkRecord<M, C>> {
        self.records.get(&id)
    }

    /// Id of the record currently stored at `coord`, if any.
    #[must_use]
    pub fn id_at(&self, coord: ChunkCoord) -> Option<ChunkId> {
        self.by_coord.get(&coord).copied()
    }

    #[must_use]
    pub fn get_at(&self, coord: ChunkCoord) -> Option<&ChunkRecord<M, C>> {
        self.id_at(coord).and_then(|id| self.records.get(&id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord<M, C>> + '_ {
        self.records.values()
    }

    /// Lazily iterate the records matching `filter`, in creation order.
    pub fn query(&self, filter: TagFilter) -> impl Iterator<Item = &ChunkRecord<M, C>> + '_ {
        self.records.values().filter(move |r| filter.matches(r.tags))
    }

    /// Number of records matching `filter`.
    #[must_use]
    pub fn count(&self, filter: TagFilter) -> usize {
        self.query(filter).count()
    }

    /// Queue a new record. The id is reserved immediately so later commands
    /// in the same tick can target it.
    pub fn spawn(&mut self, coord: ChunkCoord, lod: u8, tags: ChunkTags) -> ChunkId {
        let id = ChunkId(self.next_id);
        self.next_id += 1;
        self.commands.push(Command::Spawn { id, coord, lod, tags });
        id
    }

    pub fn insert_tags(&mut self, id: ChunkId, tags: ChunkTags) {
        self.swap_tags(id, ChunkTags::empty(), tags);
    }

    pub fn remove_tags(&mut self, id: ChunkId, tags: ChunkTags) {
        self.swap_tags(id, tags, ChunkTags::empty());
    }

    /// Queue `remove` then `insert` as one tag update.
    pub fn swap_tags(&mut self, id: ChunkId, remove: ChunkTags, insert: ChunkTags) {
        self.commands.push(Command::Tags { id, insert, remove });
    }

    pub fn set_terrain(&mut self, id: ChunkId, data: Box<[u8]>) {
        self.commands.push(Command::SetTerrain { id, data });
    }

    pub fn attach_mesh(&mut self, id: ChunkId, mesh: M) {
        self.commands.push(Command::AttachMesh { id, mesh });
    }

    pub fn attach_collider(&mut self, id: ChunkId, collider: C) {
        self.commands.push(Command::AttachCollider { id, collider });
    }

    /// Queue dropping the record's collider handle. The caller releases the
    /// backend resource itself.
    pub fn detach_collider(&mut self, id: ChunkId) {
        self.commands.push(Command::DetachCollider { id });
    }

    pub fn despawn(&mut self, id: ChunkId) {
        self.commands.push(Command::Despawn { id });
    }

    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Apply every queued command in the order it was recorded.
    pub fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        let commands = std::mem::take(&mut self.commands);
        for command in commands {
            match command {
                Command::Spawn { id, coord, lod, tags } => {
                    if let Some(existing) = self.by_coord.get(&coord) {
                        warn!("chunk {coord} already stored as {existing:?}, dropping spawn of {id:?}");
                        report.dropped += 1;
                        continue;
                    }
                    self.by_coord.insert(coord, id);
                    self.records.insert(id, ChunkRecord::new(id, coord, lod, tags));
                    report.spawned += 1;
                }
                Command::Despawn { id } => {
                    let Some(record) = self.records.remove(&id) else {
                        report.dropped += 1;
                        continue;
                    };
                    if self.by_coord.get(&record.coord) == Some(&id) {
                        self.by_coord.remove(&record.coord);
                    }
                    report.despawned += 1;
                }
                Command::Tags { id, insert, remove } => {
                    let Some(record) = self.records.get_mut(&id) else {
                        report.dropped += 1;
                        continue;
                    };
                    record.tags.remove(remove);
                    record.tags.insert(insert);
                }
                Command::SetTerrain { id, data } => {
                    let Some(record) = self.records.get_mut(&id) else {
                        report.dropped += 1;
                        continue;
                    };
                    record.terrain = Some(data);
                }
                Command::AttachMesh { id, mesh } => {
                    let Some(record) = self.records.get_mut(&id) else {
                        report.dropped += 1;
                        continue;
                    };
                    record.mesh = Some(mesh);
                }
                Command::AttachCollider { id, collider } => {
                    let Some(record) = self.records.get_mut(&id) else {
                        report.dropped += 1;
                        continue;
                    };
                    record.collider = Some(collider);
                }
                Command::DetachCollider { id } => {
                    let Some(record) = self.records.get_mut(&id) else {
                        report.dropped += 1;
                        continue;
                    };
                    record.collider = None;
                }
            }
            report.applied += 1;
        }
        report
    }

    /// Flush, then remove and return every record. Used on shutdown so the
    /// caller can release any handles the records still hold.
    pub fn drain(&mut self) -> Vec<ChunkRecord<M, C>> {
        self.flush();
        self.by_coord.clear();
        std::mem::take(&mut self.records).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Store = ChunkStore<u32, u32>;

    #[test]
    fn commands_are_invisible_until_flush() {
        let mut store = Store::new();
        let id = store.spawn(ChunkCoord::new(1, 2), 0, ChunkTags::PENDING);
        assert!(store.get(id).is_none());
        assert_eq!(store.pending_commands(), 1);

        let report = store.flush();
        assert_eq!(report.spawned, 1);
        let record = store.get(id).expect("spawned");
        assert_eq!(record.coord(), ChunkCoord::new(1, 2));
        assert!(record.has(ChunkTags::PENDING));
        assert_eq!(store.id_at(ChunkCoord::new(1, 2)), Some(id));
    }

    #[test]
    fn commands_on_same_tick_spawn_apply_in_order() {
        let mut store = Store::new();
        let id = store.spawn(ChunkCoord::new(0, 0), 0, ChunkTags::PENDING);
        store.swap_tags(id, ChunkTags::PENDING, ChunkTags::DATA_READY);
        store.set_terrain(id, vec![0; 4].into_boxed_slice());
        store.flush();
        let record = store.get(id).expect("spawned");
        assert_eq!(record.tags(), ChunkTags::DATA_READY);
        assert_eq!(record.terrain().map(<[u8]>::len), Some(4));
    }

    #[test]
    fn query_filters_by_tags_in_creation_order() {
        let mut store = Store::new();
        let a = store.spawn(ChunkCoord::new(0, 0), 0, ChunkTags::PENDING);
        let b = store.spawn(ChunkCoord::new(1, 0), 0, ChunkTags::PENDING | ChunkTags::PENDING_REMOVAL);
        let c = store.spawn(ChunkCoord::new(2, 0), 0, ChunkTags::COMPLETE);
        let d = store.spawn(ChunkCoord::new(3, 0), 0, ChunkTags::PENDING);
        store.flush();

        let pending: Vec<_> = store
            .query(TagFilter::all(ChunkTags::PENDING).without(ChunkTags::PENDING_REMOVAL))
            .map(ChunkRecord::id)
            .collect();
        assert_eq!(pending, vec![a, d]);
        assert_eq!(store.count(TagFilter::all(ChunkTags::PENDING_REMOVAL)), 1);
        assert!(store.get(b).is_some() && store.get(c).is_some());
    }

    #[test]
    fn second_spawn_at_same_coord_is_dropped() {
        let mut store = Store::new();
        let first = store.spawn(ChunkCoord::new(5, 5), 0, ChunkTags::PENDING);
        let second = store.spawn(ChunkCoord::new(5, 5), 0, ChunkTags::PENDING);
        let report = store.flush();
        assert_eq!(report.spawned, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.id_at(ChunkCoord::new(5, 5)), Some(first));
        assert!(store.get(second).is_none());
    }

    #[test]
    fn despawn_frees_the_coordinate() {
        let mut store = Store::new();
        let id = store.spawn(ChunkCoord::new(-3, 4), 0, ChunkTags::PENDING);
        store.flush();
        store.despawn(id);
        store.insert_tags(id, ChunkTags::COMPLETE);
        let report = store.flush();
        assert_eq!(report.despawned, 1);
        assert_eq!(report.dropped, 1);
        assert!(store.is_empty());
        assert_eq!(store.id_at(ChunkCoord::new(-3, 4)), None);
    }

    #[test]
    fn handles_attach_and_detach() {
        let mut store = Store::new();
        let id = store.spawn(ChunkCoord::new(0, 0), 0, ChunkTags::COMPLETE);
        store.attach_mesh(id, 7);
        store.attach_collider(id, 9);
        store.flush();
        assert_eq!(store.get(id).and_then(ChunkRecord::mesh), Some(&7));
        assert_eq!(store.get(id).and_then(ChunkRecord::collider), Some(&9));

        store.detach_collider(id);
        store.flush();
        assert_eq!(store.get(id).and_then(ChunkRecord::collider), None);
    }

    #[test]
    fn drain_applies_pending_commands_first() {
        let mut store = Store::new();
        let id = store.spawn(ChunkCoord::new(0, 0), 0, ChunkTags::COMPLETE);
        store.attach_mesh(id, 1);
        let drained = store.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].mesh(), Some(&1));
        assert!(store.is_empty());
        assert_eq!(store.pending_commands(), 0);
    }
}
