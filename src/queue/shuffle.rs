use rand::Rng;

/// Fisher-Yates over `[0..len)` minus `first`, with `first` prepended.
///
/// `first` must be `< len` when `len > 0`.
pub fn shuffled_order<R: Rng>(len: usize, first: usize, rng: &mut R) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut rest: Vec<usize> = (0..len).filter(|&i| i != first).collect();
    shuffle_in_place(&mut rest, rng);

    let mut order = Vec::with_capacity(len);
    order.push(first);
    order.extend(rest);
    order
}

pub fn shuffle_in_place<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Shuffle permutation over queue indices
///
/// While enabled and non-empty, `order[pointer]` is the current index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShuffleState {
    enabled: bool,
    order: Vec<usize>,
    pointer: usize,
}

impl ShuffleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Turn shuffle on with `current` placed first
    pub fn enable<R: Rng>(&mut self, len: usize, current: usize, rng: &mut R) {
        self.enabled = true;
        self.reshuffle(len, current, rng);
    }

    /// Turn shuffle off; the permutation is discarded
    pub fn disable(&mut self) {
        self.enabled = false;
        self.order.clear();
        self.pointer = 0;
    }

    /// Flip the flag without generating a permutation (lazy queues order server-side)
    pub fn set_enabled_flag(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.order.clear();
            self.pointer = 0;
        }
    }

    pub fn reshuffle<R: Rng>(&mut self, len: usize, current: usize, rng: &mut R) {
        self.order = shuffled_order(len, current.min(len.saturating_sub(1)), rng);
        self.pointer = 0;
    }

    /// A new queue index joins at the very end of the order
    pub fn append(&mut self, index: usize) {
        if self.enabled {
            self.order.push(index);
        }
    }

    /// Drop `removed` from the order and shift higher indices down.
    ///
    /// If the removed entry was at the pointer, the pointer now designates
    /// the entry that followed it.
    pub fn remove_index(&mut self, removed: usize) {
        if !self.enabled {
            return;
        }
        if let Some(pos) = self.order.iter().position(|&i| i == removed) {
            self.order.remove(pos);
            if pos < self.pointer {
                self.pointer -= 1;
            }
        }
        for index in self.order.iter_mut() {
            if *index > removed {
                *index -= 1;
            }
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.order.get(self.pointer).copied()
    }

    pub fn peek_next(&self) -> Option<usize> {
        self.order.get(self.pointer + 1).copied()
    }

    pub fn peek_previous(&self) -> Option<usize> {
        self.pointer.checked_sub(1).and_then(|p| self.order.get(p).copied())
    }

    pub fn last(&self) -> Option<usize> {
        self.order.last().copied()
    }

    /// Point back at the start of the order
    pub fn rewind(&mut self) -> Option<usize> {
        self.pointer = 0;
        self.current()
    }

    /// Re-point at `index`; returns false if it is not part of the order
    pub fn point_at(&mut self, index: usize) -> bool {
        match self.order.iter().position(|&i| i == index) {
            Some(pos) => {
                self.pointer = pos;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.pointer = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_permutation(order: &[usize], len: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == (0..len).collect::<Vec<_>>()
    }

    #[test]
    fn test_shuffled_order_is_permutation_with_fixed_first() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let len = 2 + (seed as usize % 20);
            let first = seed as usize % len;
            let order = shuffled_order(len, first, &mut rng);
            assert_eq!(order[0], first);
            assert!(is_permutation(&order, len));
        }
    }

    #[test]
    fn test_shuffled_order_edge_lengths() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(shuffled_order(0, 0, &mut rng).is_empty());
        assert_eq!(shuffled_order(1, 0, &mut rng), vec![0]);
    }

    #[test]
    fn test_shuffle_distribution_varies_second_slot() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(shuffled_order(5, 2, &mut rng)[1]);
        }
        assert_eq!(seen.len(), 4);
        assert!(!seen.contains(&2));
    }

    #[test]
    fn test_append_goes_to_end() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = ShuffleState::new();
        state.enable(4, 1, &mut rng);
        state.append(4);
        assert_eq!(state.last(), Some(4));
        assert_eq!(state.current(), Some(1));
    }

    #[test]
    fn test_remove_index_shifts_and_keeps_pointer() {
        let mut state = ShuffleState {
            enabled: true,
            order: vec![2, 0, 3, 1],
            pointer: 2,
        };
        // removing index 0 (before pointer in order) shifts everything down
        state.remove_index(0);
        assert_eq!(state.order(), &[1, 2, 0]);
        assert_eq!(state.pointer(), 1);
        assert_eq!(state.current(), Some(2));
    }

    #[test]
    fn test_remove_current_moves_to_follower() {
        let mut state = ShuffleState {
            enabled: true,
            order: vec![2, 0, 3, 1],
            pointer: 1,
        };
        state.remove_index(0);
        assert_eq!(state.order(), &[1, 2, 0]);
        assert_eq!(state.current(), Some(2));
    }

    #[test]
    fn test_point_at_and_peeks() {
        let mut state = ShuffleState {
            enabled: true,
            order: vec![3, 1, 0, 2],
            pointer: 0,
        };
        assert!(state.point_at(0));
        assert_eq!(state.pointer(), 2);
        assert_eq!(state.peek_next(), Some(2));
        assert_eq!(state.peek_previous(), Some(1));
        assert!(!state.point_at(9));
    }

    #[test]
    fn test_disable_clears_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = ShuffleState::new();
        state.enable(3, 0, &mut rng);
        state.disable();
        assert!(!state.is_enabled());
        assert!(state.order().is_empty());
    }
}
