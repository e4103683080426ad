use std::collections::VecDeque;
use std::sync::Arc;

use ndarray::Array2;

/// Bounded least-recently-used cache of decoded frames, keyed by frame index.
///
/// Owned by a single container handle. A capacity of zero disables caching.
#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    // Most recently used entry first.
    entries: VecDeque<(usize, Arc<Array2<f64>>)>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(256)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, index: usize) -> Option<Arc<Array2<f64>>> {
        let pos = self.entries.iter().position(|(i, _)| *i == index)?;
        let entry = self.entries.remove(pos)?;
        let frame = Arc::clone(&entry.1);
        self.entries.push_front(entry);
        Some(frame)
    }

    pub fn insert(&mut self, index: usize, frame: Arc<Array2<f64>>) {
        if self.capacity == 0 {
            return;
        }
        self.invalidate(index);
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front((index, frame));
    }

    pub fn invalidate(&mut self, index: usize) {
        self.entries.retain(|(i, _)| *i != index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f64) -> Arc<Array2<f64>> {
        Arc::new(Array2::from_elem((1, 1), v))
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = FrameCache::new(2);
        cache.insert(0, frame(0.0));
        cache.insert(1, frame(1.0));
        // Touch 0 so that 1 becomes the eviction candidate.
        assert!(cache.get(0).is_some());
        cache.insert(2, frame(2.0));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(0).unwrap()[[0, 0]], 0.0);
        assert_eq!(cache.get(2).unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let mut cache = FrameCache::new(0);
        cache.insert(3, frame(3.0));
        assert!(cache.is_empty());
        assert!(cache.get(3).is_none());
    }

    #[test]
    fn reinsert_replaces_entry() {
        let mut cache = FrameCache::new(4);
        cache.insert(5, frame(1.0));
        cache.insert(5, frame(2.0));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(5).unwrap()[[0, 0]], 2.0);
        cache.invalidate(5);
        assert!(cache.get(5).is_none());
    }
}
