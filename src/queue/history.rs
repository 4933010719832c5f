use crate::models::Track;
use std::collections::VecDeque;

/// Bounded FIFO of previously played tracks, oldest first
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<Track>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, track: Track) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_back(track);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
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

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&Track> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn track(id: usize) -> Track {
        Track::new(id.to_string(), Duration::from_secs(60))
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = History::new(50);
        for i in 0..59 {
            history.push(track(i));
        }

        assert_eq!(history.len(), 50);
        assert_eq!(history.get(0).unwrap().id.as_str(), "9");
        assert_eq!(history.get(49).unwrap().id.as_str(), "58");
        assert_eq!(history.last().unwrap().id.as_str(), "58");
    }

    #[test]
    fn test_zero_capacity_history_stays_empty() {
        let mut history = History::new(0);
        history.push(track(1));
        assert!(history.is_empty());
    }

    #[test]
    fn test_history_iteration_order() {
        let mut history = History::new(3);
        for i in 0..4 {
            history.push(track(i));
        }
        let ids: Vec<_> = history.iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
