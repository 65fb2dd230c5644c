/// Picks the next or previous index of the working view.
///
/// Sequential mode wraps around in both directions. Shuffle mode draws a
/// fresh uniform index for either direction, so "previous" under shuffle is
/// not a walk back through history.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    rng: fastrand::Rng,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn next(&mut self, len: usize, current: Option<usize>, shuffle: bool) -> Option<usize> {
        self.pick(len, current, shuffle, Direction::Forward)
    }

    pub fn prev(&mut self, len: usize, current: Option<usize>, shuffle: bool) -> Option<usize> {
        self.pick(len, current, shuffle, Direction::Backward)
    }

    pub fn pick(
        &mut self,
        len: usize,
        current: Option<usize>,
        shuffle: bool,
        direction: Direction,
    ) -> Option<usize> {
        if len == 0 {
            return None;
        }
        if shuffle {
            return Some(self.rng.usize(..len));
        }

        let index = match current {
            None => 0,
            // a stale index past the end restarts the walk
            Some(i) if i >= len => 0,
            Some(i) => match direction {
                Direction::Forward => (i + 1) % len,
                Direction::Backward => (i + len - 1) % len,
            },
        };
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn empty_catalog_selects_nothing() {
        let mut policy = SelectionPolicy::with_seed(1);
        assert_eq!(policy.next(0, None, false), None);
        assert_eq!(policy.prev(0, Some(3), false), None);
        assert_eq!(policy.next(0, None, true), None);
    }

    #[test]
    fn absent_index_starts_at_zero() {
        let mut policy = SelectionPolicy::with_seed(1);
        assert_eq!(policy.next(4, None, false), Some(0));
        assert_eq!(policy.prev(4, None, false), Some(0));
    }

    #[test]
    fn sequential_next_visits_every_index_once_per_period() {
        let mut policy = SelectionPolicy::with_seed(1);
        for len in 1..=12 {
            let mut current = Some(0);
            let mut seen = HashSet::new();
            seen.insert(0);
            for _ in 1..len {
                current = policy.next(len, current, false);
                assert!(seen.insert(current.unwrap()), "index repeated before full period");
            }
            assert_eq!(seen.len(), len);
            assert_eq!(policy.next(len, current, false), Some(0));
        }
    }

    #[test]
    fn sequential_prev_undoes_next() {
        let mut policy = SelectionPolicy::with_seed(1);
        for len in 1..=9 {
            for i in 0..len {
                let forward = policy.next(len, Some(i), false);
                assert_eq!(policy.prev(len, forward, false), Some(i));
            }
        }
    }

    #[test]
    fn sequential_wraps_at_both_ends() {
        let mut policy = SelectionPolicy::with_seed(1);
        assert_eq!(policy.next(3, Some(2), false), Some(0));
        assert_eq!(policy.prev(3, Some(0), false), Some(2));
    }

    #[test]
    fn shuffle_stays_in_range() {
        let mut policy = SelectionPolicy::with_seed(42);
        for len in 1..20 {
            for _ in 0..200 {
                let next = policy.next(len, Some(0), true).unwrap();
                let prev = policy.prev(len, Some(0), true).unwrap();
                assert!(next < len);
                assert!(prev < len);
            }
        }
    }

    #[test]
    fn shuffle_is_roughly_uniform() {
        let mut policy = SelectionPolicy::with_seed(7);
        let len = 10;
        let draws = 20_000;
        let mut counts = vec![0usize; len];
        for _ in 0..draws {
            counts[policy.next(len, None, true).unwrap()] += 1;
        }

        let expected = draws as f64 / len as f64;
        let chi_square: f64 = counts
            .iter()
            .map(|&observed| {
                let diff = observed as f64 - expected;
                diff * diff / expected
            })
            .sum();

        // 9 degrees of freedom; 27.88 is the 0.001 critical value
        assert!(chi_square < 27.88, "chi-square {chi_square} with counts {counts:?}");
    }
}
