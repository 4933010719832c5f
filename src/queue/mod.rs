use crate::error::QueueError;
use crate::models::{QueueId, QueueItem, RepeatMode, Track};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub mod history;
pub mod lazy;
pub mod shuffle;

pub use history::History;
pub use lazy::{LazyQueue, PrefetchCache};
pub use shuffle::ShuffleState;

/// Why the queue is moving forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// The current track reached its end
    Natural,
    /// The user asked for the next track
    User,
    /// The error policy gave up on the current track
    Skip,
}

/// A forward move computed ahead of time so a preload can target it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAdvance {
    pub index: usize,
    /// The move wraps past the end of the queue (repeat all)
    pub wrapped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub removed: QueueItem,
    pub was_current: bool,
}

/// The materialized play queue: items, current index, shuffle order,
/// repeat policy and the bounded history.
///
/// While shuffle is enabled and the queue is not empty, the shuffle order
/// is a permutation of all indices and its pointer designates the current
/// index.
pub struct QueueModel {
    items: Vec<QueueItem>,
    current_index: Option<usize>,
    shuffle: ShuffleState,
    repeat: RepeatMode,
    history: History,
    rng: StdRng,
}

impl QueueModel {
    pub fn new(history_limit: usize) -> Self {
        Self::with_rng(history_limit, StdRng::from_os_rng())
    }

    /// Deterministic shuffles for tests and reproducible sessions
    pub fn with_seed(history_limit: usize, seed: u64) -> Self {
        Self::with_rng(history_limit, StdRng::seed_from_u64(seed))
    }

    fn with_rng(history_limit: usize, rng: StdRng) -> Self {
        Self {
            items: Vec::new(),
            current_index: None,
            shuffle: ShuffleState::new(),
            repeat: RepeatMode::Off,
            history: History::new(history_limit),
            rng,
        }
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_item(&self) -> Option<&QueueItem> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_item().map(|item| &item.track)
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.items.get(index).map(|item| &item.track)
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle.is_enabled()
    }

    pub fn shuffle_state(&self) -> &ShuffleState {
        &self.shuffle
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Replace the whole queue and select `start_index` (clamped)
    pub fn set_queue(&mut self, tracks: Vec<Track>, start_index: usize) -> Option<Track> {
        self.leave_current();
        self.items = tracks.into_iter().map(QueueItem::new).collect();

        if self.items.is_empty() {
            self.current_index = None;
            self.shuffle.clear();
            return None;
        }

        let start = start_index.min(self.items.len() - 1);
        self.current_index = Some(start);
        if self.shuffle.is_enabled() {
            self.shuffle.reshuffle(self.items.len(), start, &mut self.rng);
        }
        self.current_track().cloned()
    }

    /// Append a track. Returns true if it became the current track
    /// because the queue was empty.
    pub fn add(&mut self, track: Track) -> bool {
        self.items.push(QueueItem::new(track));
        let index = self.items.len() - 1;

        if self.current_index.is_none() {
            self.current_index = Some(index);
            if self.shuffle.is_enabled() {
                self.shuffle.reshuffle(self.items.len(), index, &mut self.rng);
            }
            return true;
        }

        self.shuffle.append(index);
        false
    }

    /// Remove one occurrence by queue id.
    ///
    /// Removing the current entry moves on to its follower. In shuffle order
    /// the last entry wraps to the first; in queue order it leaves no current
    /// entry at the end of the queue.
    pub fn remove(&mut self, queue_id: QueueId) -> Result<RemoveOutcome, QueueError> {
        let position = self
            .items
            .iter()
            .position(|item| item.queue_id == queue_id)
            .ok_or(QueueError::UnknownQueueId { queue_id })?;

        let removed = self.items.remove(position);
        self.shuffle.remove_index(position);

        let mut was_current = false;
        self.current_index = match self.current_index {
            Some(current) if position < current => Some(current - 1),
            Some(current) if position == current => {
                was_current = true;
                if self.shuffle.is_enabled() {
                    self.shuffle.current().or_else(|| self.shuffle.rewind())
                } else if position < self.items.len() {
                    Some(position)
                } else {
                    None
                }
            }
            other => other,
        };

        if self.items.is_empty() {
            self.current_index = None;
            self.shuffle.clear();
        }

        Ok(RemoveOutcome {
            removed,
            was_current,
        })
    }

    /// Drop every entry; shuffle and repeat settings are kept
    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = None;
        self.shuffle.clear();
    }

    /// Returns the new shuffle flag. The current index never changes.
    pub fn toggle_shuffle(&mut self) -> bool {
        if self.shuffle.is_enabled() {
            self.shuffle.disable();
        } else {
            let current = self.current_index.unwrap_or(0);
            self.shuffle.enable(self.items.len(), current, &mut self.rng);
        }
        self.shuffle.is_enabled()
    }

    /// Flip the shuffle flag without building a permutation
    pub fn set_shuffle_flag(&mut self, enabled: bool) {
        self.shuffle.set_enabled_flag(enabled);
    }

    pub fn toggle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.next();
        self.repeat
    }

    /// Work out where the queue goes next without moving.
    ///
    /// `None` means the queue is exhausted (repeat off at the last entry).
    /// Repeat one re-selects the current index only for a natural end;
    /// a manual next still moves on and wraps.
    pub fn plan_advance(&self, reason: AdvanceReason) -> Option<PlannedAdvance> {
        let current = self.current_index?;

        if self.repeat == RepeatMode::One && reason == AdvanceReason::Natural {
            return Some(PlannedAdvance {
                index: current,
                wrapped: false,
            });
        }

        let next = if self.shuffle.is_enabled() {
            self.shuffle.peek_next()
        } else {
            Some(current + 1).filter(|&next| next < self.items.len())
        };

        match next {
            Some(index) => Some(PlannedAdvance {
                index,
                wrapped: false,
            }),
            None if self.repeat != RepeatMode::Off => Some(PlannedAdvance {
                index: 0,
                wrapped: true,
            }),
            None => None,
        }
    }

    /// Apply a planned move; the track being left goes to history
    pub fn commit(&mut self, plan: PlannedAdvance) -> Option<Track> {
        if plan.index >= self.items.len() {
            return None;
        }

        if self.shuffle.is_enabled() && (plan.wrapped || !self.shuffle.point_at(plan.index)) {
            self.shuffle
                .reshuffle(self.items.len(), plan.index, &mut self.rng);
        }

        self.leave_current();
        self.current_index = Some(plan.index);
        self.current_track().cloned()
    }

    pub fn advance(&mut self, reason: AdvanceReason) -> Option<Track> {
        let plan = self.plan_advance(reason)?;
        self.commit(plan)
    }

    /// Index a "previous" command steps back to, if any
    pub fn plan_previous(&self) -> Option<usize> {
        let current = self.current_index?;

        if self.shuffle.is_enabled() {
            return self.shuffle.peek_previous().or_else(|| {
                (self.repeat == RepeatMode::All)
                    .then(|| self.shuffle.last())
                    .flatten()
                    .filter(|&last| last != current)
            });
        }

        if current > 0 {
            Some(current - 1)
        } else if self.repeat == RepeatMode::All && self.items.len() > 1 {
            Some(self.items.len() - 1)
        } else {
            None
        }
    }

    /// Jump to a specific occurrence
    pub fn select(&mut self, queue_id: QueueId) -> Result<Track, QueueError> {
        let index = self
            .items
            .iter()
            .position(|item| item.queue_id == queue_id)
            .ok_or(QueueError::UnknownQueueId { queue_id })?;
        self.select_index(index)
    }

    pub fn select_index(&mut self, index: usize) -> Result<Track, QueueError> {
        if index >= self.items.len() {
            return Err(QueueError::InvalidIndex { index });
        }

        if self.current_index != Some(index) {
            self.leave_current();
        }
        self.current_index = Some(index);
        if self.shuffle.is_enabled() && !self.shuffle.point_at(index) {
            self.shuffle.reshuffle(self.items.len(), index, &mut self.rng);
        }

        self.current_track()
            .cloned()
            .ok_or(QueueError::InvalidIndex { index })
    }

    /// History entry for a track played outside the materialized queue
    pub fn record_played(&mut self, track: Track) {
        self.history.push(track);
    }

    /// Collapse the queue to a single playing track, keeping shuffle/repeat
    pub fn replace_with_single(&mut self, track: Track) {
        self.items = vec![QueueItem::new(track)];
        self.current_index = Some(0);
        if self.shuffle.is_enabled() {
            self.shuffle.reshuffle(1, 0, &mut self.rng);
        }
    }

    /// Rebuild from a saved session without touching history
    pub fn restore(
        &mut self,
        items: Vec<QueueItem>,
        current_index: Option<usize>,
        shuffle: bool,
        repeat: RepeatMode,
    ) {
        self.items = items;
        self.current_index = match current_index {
            Some(index) if index < self.items.len() => Some(index),
            _ if self.items.is_empty() => None,
            _ => Some(0),
        };
        self.repeat = repeat;
        if shuffle {
            let current = self.current_index.unwrap_or(0);
            self.shuffle.enable(self.items.len(), current, &mut self.rng);
        } else {
            self.shuffle.disable();
        }
    }

    fn leave_current(&mut self) {
        if let Some(track) = self.current_track().cloned() {
            self.history.push(track);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracks(count: usize) -> Vec<Track> {
        (0..count)
            .map(|i| Track::new(i.to_string(), Duration::from_secs(180)))
            .collect()
    }

    fn model() -> QueueModel {
        QueueModel::with_seed(50, 11)
    }

    fn current_id(queue: &QueueModel) -> String {
        queue.current_track().unwrap().id.to_string()
    }

    #[test]
    fn test_set_queue_clamps_start_index() {
        let mut queue = model();
        let current = queue.set_queue(tracks(3), 10).unwrap();
        assert_eq!(current.id.as_str(), "2");
        assert_eq!(queue.current_index(), Some(2));

        assert!(queue.set_queue(Vec::new(), 0).is_none());
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn test_toggle_shuffle_puts_current_first() {
        for start in 0..8 {
            let mut queue = model();
            queue.set_queue(tracks(8), start);
            assert!(queue.toggle_shuffle());

            let order = queue.shuffle_state().order().to_vec();
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..8).collect::<Vec<_>>());
            assert_eq!(order[0], start);
            assert_eq!(queue.shuffle_state().current(), Some(start));
        }
    }

    #[test]
    fn test_shuffle_twice_keeps_current_track() {
        let mut queue = model();
        queue.set_queue(tracks(5), 3);

        queue.toggle_shuffle();
        queue.toggle_shuffle();

        assert!(!queue.is_shuffled());
        assert_eq!(current_id(&queue), "3");
        assert!(queue.shuffle_state().order().is_empty());
    }

    #[test]
    fn test_set_queue_reshuffles_when_shuffle_enabled() {
        let mut queue = model();
        queue.set_queue(tracks(4), 0);
        queue.toggle_shuffle();

        queue.set_queue(tracks(6), 4);
        assert_eq!(queue.shuffle_state().order().len(), 6);
        assert_eq!(queue.shuffle_state().order()[0], 4);
    }

    #[test]
    fn test_add_while_shuffled_lands_at_end_of_order() {
        let mut queue = model();
        queue.set_queue(tracks(4), 1);
        queue.toggle_shuffle();
        let before = queue.shuffle_state().order().to_vec();

        assert!(!queue.add(Track::new("new", Duration::from_secs(60))));

        let after = queue.shuffle_state().order();
        assert_eq!(&after[..4], &before[..]);
        assert_eq!(after[4], 4);
        assert_eq!(current_id(&queue), "1");
    }

    #[test]
    fn test_add_to_empty_queue_selects_it() {
        let mut queue = model();
        assert!(queue.add(Track::new("first", Duration::from_secs(60))));
        assert_eq!(queue.current_index(), Some(0));
        assert!(!queue.add(Track::new("second", Duration::from_secs(60))));
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_exhaustion_with_repeat_off_keeps_index() {
        let mut queue = model();
        queue.set_queue(tracks(2), 1);

        assert!(queue.advance(AdvanceReason::User).is_none());
        assert_eq!(queue.current_index(), Some(1));
    }

    #[test]
    fn test_exhaustion_with_repeat_all_wraps_to_first() {
        let mut queue = model();
        queue.set_queue(tracks(2), 1);
        queue.set_repeat(RepeatMode::All);

        let track = queue.advance(AdvanceReason::User).unwrap();
        assert_eq!(track.id.as_str(), "0");
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_shuffled_wrap_reshuffles_with_first_index_leading() {
        let mut queue = model();
        queue.set_queue(tracks(5), 2);
        queue.toggle_shuffle();
        queue.set_repeat(RepeatMode::All);

        for _ in 0..4 {
            assert!(!queue.plan_advance(AdvanceReason::Natural).unwrap().wrapped);
            queue.advance(AdvanceReason::Natural);
        }

        let plan = queue.plan_advance(AdvanceReason::Natural).unwrap();
        assert!(plan.wrapped);
        assert_eq!(plan.index, 0);

        queue.commit(plan);
        assert_eq!(queue.current_index(), Some(0));
        assert_eq!(queue.shuffle_state().order()[0], 0);
        assert_eq!(queue.shuffle_state().pointer(), 0);
    }

    #[test]
    fn test_repeat_one_only_repeats_on_natural_end() {
        let mut queue = model();
        queue.set_queue(tracks(3), 2);
        queue.set_repeat(RepeatMode::One);

        let plan = queue.plan_advance(AdvanceReason::Natural).unwrap();
        assert_eq!(plan.index, 2);

        let plan = queue.plan_advance(AdvanceReason::User).unwrap();
        assert_eq!(plan.index, 0);
        assert!(plan.wrapped);
    }

    #[test]
    fn test_sixty_tracks_leave_last_fifty_in_history() {
        let mut queue = model();
        queue.set_queue(tracks(60), 0);
        for _ in 0..59 {
            queue.advance(AdvanceReason::Natural).unwrap();
        }

        let history = queue.history();
        assert_eq!(history.len(), 50);
        assert_eq!(history.get(0).unwrap().id.as_str(), "9");
        assert_eq!(history.get(49).unwrap().id.as_str(), "58");
    }

    #[test]
    fn test_remove_before_current_shifts_index() {
        let mut queue = model();
        queue.set_queue(tracks(4), 2);
        let first = queue.items()[0].queue_id;

        let outcome = queue.remove(first).unwrap();
        assert!(!outcome.was_current);
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(current_id(&queue), "2");
    }

    #[test]
    fn test_remove_current_moves_to_follower_or_stops() {
        let mut queue = model();
        queue.set_queue(tracks(3), 1);
        let current = queue.items()[1].queue_id;

        let outcome = queue.remove(current).unwrap();
        assert!(outcome.was_current);
        assert_eq!(current_id(&queue), "2");

        let last = queue.items()[1].queue_id;
        queue.remove(last).unwrap();
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn test_remove_keeps_shuffle_consistent() {
        let mut queue = model();
        queue.set_queue(tracks(6), 3);
        queue.toggle_shuffle();
        queue.advance(AdvanceReason::User);
        let playing = current_id(&queue);

        let victim = queue
            .items()
            .iter()
            .find(|item| item.track.id.as_str() != playing)
            .unwrap()
            .queue_id;
        queue.remove(victim).unwrap();

        let order = queue.shuffle_state().order().to_vec();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..5).collect::<Vec<_>>());
        assert_eq!(queue.shuffle_state().current(), queue.current_index());
        assert_eq!(current_id(&queue), playing);
    }

    #[test]
    fn test_remove_last_in_shuffle_order_wraps_to_first() {
        let mut queue = model();
        queue.set_queue(tracks(4), 0);
        queue.toggle_shuffle();
        let last = queue.shuffle_state().last().unwrap();
        let playing = queue.items()[last].queue_id;
        queue.select(playing).unwrap();

        let outcome = queue.remove(playing).unwrap();
        assert!(outcome.was_current);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.shuffle_state().pointer(), 0);
        assert_eq!(queue.current_index(), queue.shuffle_state().current());
        assert_eq!(queue.current_index(), Some(queue.shuffle_state().order()[0]));
        assert!(queue.items().iter().all(|item| item.queue_id != playing));
    }

    #[test]
    fn test_remove_unknown_queue_id() {
        let mut queue = model();
        queue.set_queue(tracks(2), 0);
        let stranger = QueueId::new();
        assert_eq!(
            queue.remove(stranger).unwrap_err(),
            QueueError::UnknownQueueId { queue_id: stranger }
        );
    }

    #[test]
    fn test_select_repoints_shuffle_and_records_history() {
        let mut queue = model();
        queue.set_queue(tracks(5), 0);
        queue.toggle_shuffle();
        let target = queue.items()[4].queue_id;

        let track = queue.select(target).unwrap();
        assert_eq!(track.id.as_str(), "4");
        assert_eq!(queue.shuffle_state().current(), Some(4));
        assert_eq!(queue.history().last().unwrap().id.as_str(), "0");
    }

    #[test]
    fn test_plan_previous() {
        let mut queue = model();
        queue.set_queue(tracks(3), 0);
        assert_eq!(queue.plan_previous(), None);

        queue.set_repeat(RepeatMode::All);
        assert_eq!(queue.plan_previous(), Some(2));

        queue.select_index(2).unwrap();
        assert_eq!(queue.plan_previous(), Some(1));
    }

    #[test]
    fn test_clear_keeps_settings() {
        let mut queue = model();
        queue.set_queue(tracks(3), 0);
        queue.toggle_shuffle();
        queue.toggle_repeat();

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.current_index(), None);
        assert!(queue.is_shuffled());
        assert_eq!(queue.repeat(), RepeatMode::All);
    }

    #[test]
    fn test_restore_clamps_bad_index() {
        let mut queue = model();
        let items: Vec<_> = tracks(3).into_iter().map(QueueItem::new).collect();
        queue.restore(items, Some(9), true, RepeatMode::One);

        assert_eq!(queue.current_index(), Some(0));
        assert_eq!(queue.shuffle_state().order()[0], 0);
        assert_eq!(queue.repeat(), RepeatMode::One);
        assert!(queue.history().is_empty());
    }
}
