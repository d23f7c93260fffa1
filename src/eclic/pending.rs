//! Pending-set maintenance
//!
//! Keeps the sources that are eligible for delivery (enabled and
//! pending) in arbitration order at all times, so the dispatcher only
//! ever has to look at the head. A source's rank can change while it is
//! in the set (a ctl or cliccfg write re-decodes it); `insert` replaces
//! any previous rank for the same id.

use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Arbitration rank of one eligible source.
///
/// Orders by level (higher first), then priority (higher first), then
/// id (lower first) so ties resolve deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    pub level: u8,
    pub priority: u8,
    pub id: u32,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .level
            .cmp(&self.level)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Delivery-eligible sources in arbitration order.
pub struct PendingSet {
    ordered: BTreeSet<Rank>,
    /// Rank currently held in `ordered` for each source id, if any.
    member: Vec<Option<Rank>>,
}

impl PendingSet {
    pub fn new(num_sources: usize) -> Self {
        PendingSet {
            ordered: BTreeSet::new(),
            member: vec![None; num_sources],
        }
    }

    /// Add a source with the given rank, replacing any rank it already
    /// holds.
    pub fn insert(&mut self, id: u32, level: u8, priority: u8) {
        let rank = Rank { level, priority, id };
        let slot = &mut self.member[id as usize];
        if let Some(old) = slot.replace(rank) {
            if old == rank {
                return;
            }
            self.ordered.remove(&old);
        }
        self.ordered.insert(rank);
    }

    pub fn remove(&mut self, id: u32) {
        if let Some(old) = self.member[id as usize].take() {
            self.ordered.remove(&old);
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.member[id as usize].is_some()
    }

    /// Best-ranked eligible source, if any.
    pub fn head(&self) -> Option<Rank> {
        self.ordered.iter().next().copied()
    }

    /// All eligible sources, best first.
    pub fn iter(&self) -> impl Iterator<Item = Rank> + '_ {
        self.ordered.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.member.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_dominates_priority() {
        let mut set = PendingSet::new(8);
        set.insert(1, 10, 255);
        set.insert(2, 11, 0);
        assert_eq!(set.head().unwrap().id, 2);
    }

    #[test]
    fn priority_breaks_level_ties() {
        let mut set = PendingSet::new(8);
        set.insert(1, 10, 3);
        set.insert(2, 10, 7);
        assert_eq!(set.head().unwrap().id, 2);
    }

    #[test]
    fn lower_id_breaks_full_ties() {
        let mut set = PendingSet::new(16);
        set.insert(9, 10, 3);
        set.insert(5, 10, 3);
        set.insert(12, 10, 3);
        assert_eq!(set.head().unwrap().id, 5);
        let ids: Vec<u32> = set.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 9, 12]);
    }

    #[test]
    fn insert_replaces_rank() {
        let mut set = PendingSet::new(8);
        set.insert(1, 10, 3);
        set.insert(2, 20, 0);
        assert_eq!(set.head().unwrap().id, 2);

        // re-rank source 1 above source 2; no duplicate entry remains
        set.insert(1, 30, 0);
        assert_eq!(set.len(), 2);
        assert_eq!(set.head().unwrap().id, 1);
        assert_eq!(set.head().unwrap().level, 30);
    }

    #[test]
    fn remove_is_exact() {
        let mut set = PendingSet::new(8);
        set.insert(1, 10, 3);
        set.insert(2, 10, 3);
        set.remove(1);
        assert!(!set.contains(1));
        assert!(set.contains(2));
        assert_eq!(set.len(), 1);
        // removing an absent id is a no-op
        set.remove(1);
        assert_eq!(set.len(), 1);
    }
}
