//! Keep/erase policies.
//!
//! Calendar bucketing (hourly … yearly) is supplied from outside through
//! [`RetentionPolicy`]; the engine only consumes the partition it returns.
//! [`CountPolicy`] is the one policy bundled here.

use std::collections::HashSet;

use rotary_core::KeepTieBreak;

use crate::rotation::Rotation;

/// Splits rotations into `(keep, erase)`.
pub trait RetentionPolicy {
    fn filter(&self, rotations: &HashSet<Rotation>) -> (HashSet<Rotation>, HashSet<Rotation>);
}

impl<F> RetentionPolicy for F
where
    F: Fn(&HashSet<Rotation>) -> (HashSet<Rotation>, HashSet<Rotation>),
{
    fn filter(&self, rotations: &HashSet<Rotation>) -> (HashSet<Rotation>, HashSet<Rotation>) {
        self(rotations)
    }
}

/// Keeps `count` rotations: the youngest or the oldest ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountPolicy {
    pub count: usize,
    pub keep: KeepTieBreak,
}

impl CountPolicy {
    pub fn new(count: usize, keep: KeepTieBreak) -> Self {
        Self { count, keep }
    }
}

impl RetentionPolicy for CountPolicy {
    fn filter(&self, rotations: &HashSet<Rotation>) -> (HashSet<Rotation>, HashSet<Rotation>) {
        let mut ordered: Vec<&Rotation> = rotations.iter().collect();
        ordered.sort();
        if self.keep == KeepTieBreak::Oldest {
            ordered.reverse();
        }
        let (keep, erase) = ordered.split_at(self.count.min(ordered.len()));
        (
            keep.iter().map(|r| (*r).clone()).collect(),
            erase.iter().map(|r| (*r).clone()).collect(),
        )
    }
}
