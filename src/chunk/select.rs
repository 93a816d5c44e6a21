//! Bounded nearest-K selection.
//!
//! Stages feed every candidate through a `NearestSelector` and keep the `k`
//! closest to the viewer without sorting the whole candidate set. The buffer
//! stays sorted ascending by distance; an item that ties with buffered items
//! lands after them, so earlier candidates win ties.

use super::ChunkCoord;

#[derive(Debug, Clone)]
pub struct NearestSelector<T> {
    items: Vec<(T, i32)>,
    capacity: usize,
}

impl<T> Default for NearestSelector<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            capacity: 0,
        }
    }
}

impl<T> NearestSelector<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Empty the buffer and set a new capacity, keeping the allocation.
    pub fn reset(&mut self, capacity: usize) {
        self.items.clear();
        self.capacity = capacity;
    }

    /// Offer a candidate.
    ///
    /// When the buffer is full the candidate is dropped unless it is strictly
    /// closer than the current worst entry, which it then evicts.
    pub fn offer(&mut self, item: T, distance: i32) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            match self.items.last() {
                Some(&(_, worst)) if distance >= worst => return,
                _ => {
                    self.items.pop();
                }
            }
        }
        let at = self.items.partition_point(|&(_, d)| d <= distance);
        self.items.insert(at, (item, distance));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn as_slice(&self) -> &[(T, i32)] {
        &self.items
    }

    /// Move the selection out, nearest first.
    pub fn drain(&mut self) -> impl Iterator<Item = (T, i32)> + '_ {
        self.items.drain(..)
    }
}

/// Pick the `k` candidates nearest to `center` (Chebyshev distance).
///
/// # Return
/// `(item, distance)` pairs ordered nearest first; ties keep input order.
pub fn select_nearest<T, I>(candidates: I, center: ChunkCoord, k: usize) -> Vec<(T, i32)>
where
    I: IntoIterator<Item = (T, ChunkCoord)>,
{
    let mut selector = NearestSelector::new(k);
    for (item, coord) in candidates {
        selector.offer(item, coord.distance(center));
    }
    selector.items
}
