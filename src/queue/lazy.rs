use crate::models::{QueueSource, RepeatMode, Track, TrackId};
use crate::queue::AdvanceReason;
use std::collections::{HashMap, VecDeque};

/// LRU of resolved track records, keyed by id
#[derive(Debug, Clone)]
pub struct PrefetchCache {
    entries: HashMap<TrackId, Track>,
    recency: VecDeque<TrackId>,
    capacity: usize,
}

impl PrefetchCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Look up and mark as recently used
    pub fn get(&mut self, id: &TrackId) -> Option<Track> {
        let track = self.entries.get(id).cloned()?;
        self.touch(id);
        Some(track)
    }

    pub fn peek(&self, id: &TrackId) -> Option<&Track> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, track: Track) {
        let id = track.id.clone();
        if self.entries.insert(id.clone(), track).is_some() {
            self.touch(&id);
            return;
        }

        self.recency.push_back(id);
        while self.recency.len() > self.capacity {
            if let Some(evicted) = self.recency.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn touch(&mut self, id: &TrackId) {
        if let Some(pos) = self.recency.iter().position(|entry| entry == id) {
            self.recency.remove(pos);
        }
        self.recency.push_back(id.clone());
    }
}

/// Identifier-only queue for very large selections.
///
/// Records are resolved on demand into a bounded [`PrefetchCache`]. The
/// `epoch` is replaced whenever the id order is, so batch results requested
/// against an older order (or an older lazy queue) can be recognised and
/// dropped.
#[derive(Debug, Clone)]
pub struct LazyQueue {
    ids: Vec<TrackId>,
    pointer: usize,
    source: Option<QueueSource>,
    current: Option<Track>,
    cache: PrefetchCache,
    lookahead: usize,
    fetch_in_flight: bool,
    epoch: u64,
}

impl LazyQueue {
    pub fn new(
        ids: Vec<TrackId>,
        source: Option<QueueSource>,
        lookahead: usize,
        cache_capacity: usize,
        epoch: u64,
    ) -> Self {
        Self {
            ids,
            pointer: 0,
            source,
            current: None,
            cache: PrefetchCache::new(cache_capacity.max(lookahead + 1)),
            lookahead,
            fetch_in_flight: false,
            epoch,
        }
    }

    pub fn ids(&self) -> &[TrackId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn source(&self) -> Option<&QueueSource> {
        self.source.as_ref()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&TrackId> {
        self.ids.get(self.pointer)
    }

    pub fn cache(&self) -> &PrefetchCache {
        &self.cache
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// First id plus the look-ahead window
    pub fn initial_window(&self) -> Vec<TrackId> {
        self.ids.iter().take(self.lookahead + 1).cloned().collect()
    }

    /// Ids after the pointer within the look-ahead window that are not cached yet
    pub fn uncached_window(&self) -> Vec<TrackId> {
        self.ids
            .iter()
            .skip(self.pointer + 1)
            .take(self.lookahead)
            .filter(|id| !self.cache.contains(id))
            .cloned()
            .collect()
    }

    pub fn upcoming(&self, count: usize) -> Vec<TrackId> {
        self.ids
            .iter()
            .skip(self.pointer + 1)
            .take(count)
            .cloned()
            .collect()
    }

    pub fn id_at(&self, index: usize) -> Option<&TrackId> {
        self.ids.get(index)
    }

    /// Same advance rules as the materialized queue, over the id list
    pub fn plan_next(&self, reason: AdvanceReason, repeat: RepeatMode) -> Option<usize> {
        if self.ids.is_empty() {
            return None;
        }
        if repeat == RepeatMode::One && reason == AdvanceReason::Natural {
            return Some(self.pointer);
        }
        if self.pointer + 1 < self.ids.len() {
            Some(self.pointer + 1)
        } else if repeat != RepeatMode::Off {
            Some(0)
        } else {
            None
        }
    }

    pub fn plan_previous(&self, repeat: RepeatMode) -> Option<usize> {
        if self.pointer > 0 {
            Some(self.pointer - 1)
        } else if repeat == RepeatMode::All && self.ids.len() > 1 {
            Some(self.ids.len() - 1)
        } else {
            None
        }
    }

    /// Cached record for the id at `index`
    pub fn cached_at(&mut self, index: usize) -> Option<Track> {
        let id = self.ids.get(index)?.clone();
        self.cache.get(&id)
    }

    pub fn store(&mut self, tracks: Vec<Track>) {
        for track in tracks {
            self.cache.insert(track);
        }
    }

    /// Move the pointer to `index` now that its record is known.
    /// Returns the track that was current before.
    pub fn commit(&mut self, index: usize, track: Track) -> Option<Track> {
        self.pointer = index.min(self.ids.len().saturating_sub(1));
        self.cache.insert(track.clone());
        self.current.replace(track)
    }

    /// Claim the single fetch slot; false if a fetch is already outstanding
    pub fn begin_fetch(&mut self) -> bool {
        if self.fetch_in_flight {
            return false;
        }
        self.fetch_in_flight = true;
        true
    }

    pub fn finish_fetch(&mut self) {
        self.fetch_in_flight = false;
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch_in_flight
    }

    /// Swap in a freshly ordered id list pinned to the current id
    pub fn replace_order(&mut self, mut ids: Vec<TrackId>, epoch: u64) {
        if let Some(current) = self.current_id().cloned() {
            if let Some(pos) = ids.iter().position(|id| *id == current) {
                ids.remove(pos);
            }
            ids.insert(0, current);
        }
        self.ids = ids;
        self.pointer = 0;
        self.epoch = epoch;
        self.fetch_in_flight = false;
    }

    pub fn append(&mut self, track: Track) {
        self.ids.push(track.id.clone());
        self.cache.insert(track);
    }

    /// Rebuild from a saved session
    pub fn restore(&mut self, pointer: usize, current: Option<Track>) {
        self.pointer = pointer.min(self.ids.len().saturating_sub(1));
        if let Some(track) = current.clone() {
            self.cache.insert(track);
        }
        self.current = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ids(count: usize) -> Vec<TrackId> {
        (0..count).map(|i| TrackId::new(format!("id-{}", i))).collect()
    }

    fn track(id: &TrackId) -> Track {
        Track::new(id.clone(), Duration::from_secs(200))
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache = PrefetchCache::new(2);
        let ids = ids(3);
        cache.insert(track(&ids[0]));
        cache.insert(track(&ids[1]));
        assert!(cache.get(&ids[0]).is_some());

        cache.insert(track(&ids[2]));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&ids[0]));
        assert!(!cache.contains(&ids[1]));
    }

    #[test]
    fn test_cache_stays_bounded_over_long_session() {
        let all = ids(5000);
        let mut queue = LazyQueue::new(all.clone(), None, 3, 16, 1);

        for index in 0..all.len() {
            queue.store(queue.uncached_window().iter().map(track).collect());
            queue.commit(index, track(&all[index]));
            assert!(queue.cache().len() <= 16);
        }
        assert_eq!(queue.cache().len(), 16);
        assert_eq!(queue.pointer(), 4999);
    }

    #[test]
    fn test_cache_never_smaller_than_window() {
        let queue = LazyQueue::new(ids(10), None, 3, 1, 1);
        assert_eq!(queue.cache().capacity(), 4);
    }

    #[test]
    fn test_windows() {
        let all = ids(10);
        let mut queue = LazyQueue::new(all.clone(), None, 3, 64, 1);
        assert_eq!(queue.initial_window(), all[..4].to_vec());

        queue.store(all[..4].iter().map(track).collect());
        queue.commit(0, track(&all[0]));
        queue.commit(1, track(&all[1]));
        assert_eq!(queue.uncached_window(), vec![all[4].clone()]);
    }

    #[test]
    fn test_plan_next_honours_repeat() {
        let all = ids(3);
        let mut queue = LazyQueue::new(all.clone(), None, 3, 64, 1);
        queue.commit(2, track(&all[2]));

        assert_eq!(queue.plan_next(AdvanceReason::User, RepeatMode::Off), None);
        assert_eq!(queue.plan_next(AdvanceReason::User, RepeatMode::All), Some(0));
        assert_eq!(queue.plan_next(AdvanceReason::Natural, RepeatMode::One), Some(2));
        assert_eq!(queue.plan_previous(RepeatMode::Off), Some(1));
    }

    #[test]
    fn test_single_fetch_in_flight() {
        let mut queue = LazyQueue::new(ids(5), None, 3, 64, 1);
        assert!(queue.begin_fetch());
        assert!(!queue.begin_fetch());
        queue.finish_fetch();
        assert!(queue.begin_fetch());
    }

    #[test]
    fn test_replace_order_pins_current_and_takes_new_epoch() {
        let all = ids(6);
        let mut queue = LazyQueue::new(all.clone(), None, 3, 64, 1);
        queue.commit(3, track(&all[3]));
        queue.begin_fetch();

        let mut reordered = all.clone();
        reordered.reverse();
        queue.replace_order(reordered, 9);

        assert_eq!(queue.current_id(), Some(&all[3]));
        assert_eq!(queue.pointer(), 0);
        assert_eq!(queue.len(), 6);
        assert_eq!(queue.epoch(), 9);
        assert!(!queue.is_fetching());
        assert_eq!(queue.current().unwrap().id, all[3]);
    }
}
