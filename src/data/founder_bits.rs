//! # Founder-Membership Bitsets
//!
//! Growable bitsets over founder readsets, sized at runtime from the actual
//! founder count. A hard cap is kept for memory planning: panels can number
//! in the thousands but never beyond [`MAX_FOUNDER_READSETS`].

use bitvec::prelude::*;

use crate::data::ReadsetIdx;

/// Hard cap on the number of founder readsets in a panel
pub const MAX_FOUNDER_READSETS: usize = 4096;

/// A set of founders, one bit per founder index
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct FounderSet {
    bits: BitVec<u64, Lsb0>,
}

impl FounderSet {
    /// Create an empty set over `n_founders` founders
    pub fn new(n_founders: usize) -> Self {
        debug_assert!(n_founders <= MAX_FOUNDER_READSETS);
        Self {
            bits: bitvec![u64, Lsb0; 0; n_founders],
        }
    }

    /// Create a set with every founder present
    pub fn full(n_founders: usize) -> Self {
        debug_assert!(n_founders <= MAX_FOUNDER_READSETS);
        Self {
            bits: bitvec![u64, Lsb0; 1; n_founders],
        }
    }

    /// Create a set containing a single founder
    pub fn singleton(n_founders: usize, founder: ReadsetIdx) -> Self {
        let mut set = Self::new(n_founders);
        set.insert(founder);
        set
    }

    /// Number of founders the set ranges over
    pub fn capacity(&self) -> usize {
        self.bits.len()
    }

    /// Add a founder
    #[inline]
    pub fn insert(&mut self, founder: ReadsetIdx) {
        self.bits.set(founder.as_usize(), true);
    }

    /// Remove a founder
    #[inline]
    pub fn remove(&mut self, founder: ReadsetIdx) {
        self.bits.set(founder.as_usize(), false);
    }

    /// Membership test
    #[inline]
    pub fn contains(&self, founder: ReadsetIdx) -> bool {
        self.bits
            .get(founder.as_usize())
            .map(|b| *b)
            .unwrap_or(false)
    }

    /// Number of founders in the set
    #[inline]
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Remove all founders
    pub fn clear(&mut self) {
        self.bits.fill(false);
    }

    /// In-place union
    pub fn union_with(&mut self, other: &FounderSet) {
        debug_assert_eq!(self.bits.len(), other.bits.len());
        for (word, other_word) in self
            .bits
            .as_raw_mut_slice()
            .iter_mut()
            .zip(other.bits.as_raw_slice())
        {
            *word |= other_word;
        }
    }

    /// Whether any founder is shared with `other`
    pub fn intersects(&self, other: &FounderSet) -> bool {
        self.bits
            .as_raw_slice()
            .iter()
            .zip(other.bits.as_raw_slice())
            .any(|(a, b)| a & b != 0)
    }

    /// Iterate the founder indices in the set, ascending
    pub fn iter(&self) -> impl Iterator<Item = ReadsetIdx> + '_ {
        self.bits.iter_ones().map(|i| ReadsetIdx::new(i as u32))
    }

    /// The sole member, if the set is a singleton
    pub fn sole_member(&self) -> Option<ReadsetIdx> {
        let mut ones = self.bits.iter_ones();
        let first = ones.next()?;
        if ones.next().is_some() {
            return None;
        }
        Some(ReadsetIdx::new(first as u32))
    }
}

/// Verify that `groups` exactly partition the founder set: every founder in
/// exactly one group.
pub fn is_partition(groups: &[FounderSet], n_founders: usize) -> bool {
    let mut seen = FounderSet::new(n_founders);
    for group in groups {
        if group.capacity() != n_founders || group.intersects(&seen) {
            return false;
        }
        seen.union_with(group);
    }
    seen.count() == n_founders
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_count() {
        let mut set = FounderSet::new(100);
        assert!(set.is_empty());

        set.insert(ReadsetIdx::new(0));
        set.insert(ReadsetIdx::new(63));
        set.insert(ReadsetIdx::new(64));
        set.insert(ReadsetIdx::new(99));

        assert_eq!(set.count(), 4);
        assert!(set.contains(ReadsetIdx::new(63)));
        assert!(set.contains(ReadsetIdx::new(64)));
        assert!(!set.contains(ReadsetIdx::new(50)));
    }

    #[test]
    fn test_union_and_intersects() {
        let mut a = FounderSet::new(10);
        let mut b = FounderSet::new(10);
        a.insert(ReadsetIdx::new(1));
        b.insert(ReadsetIdx::new(2));

        assert!(!a.intersects(&b));
        a.union_with(&b);
        assert_eq!(a.count(), 2);
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_sole_member() {
        let set = FounderSet::singleton(10, ReadsetIdx::new(7));
        assert_eq!(set.sole_member(), Some(ReadsetIdx::new(7)));

        let mut two = set.clone();
        two.insert(ReadsetIdx::new(3));
        assert_eq!(two.sole_member(), None);
        assert_eq!(FounderSet::new(10).sole_member(), None);
    }

    #[test]
    fn test_iter_ascending() {
        let mut set = FounderSet::new(70);
        set.insert(ReadsetIdx::new(65));
        set.insert(ReadsetIdx::new(2));
        let members: Vec<u32> = set.iter().map(|f| f.0).collect();
        assert_eq!(members, vec![2, 65]);
    }

    #[test]
    fn test_partition_check() {
        let mut g1 = FounderSet::new(6);
        let mut g2 = FounderSet::new(6);
        for i in 0..3 {
            g1.insert(ReadsetIdx::new(i));
            g2.insert(ReadsetIdx::new(i + 3));
        }
        assert!(is_partition(&[g1.clone(), g2.clone()], 6));

        // Overlap breaks the partition
        g2.insert(ReadsetIdx::new(0));
        assert!(!is_partition(&[g1.clone(), g2], 6));

        // A missing founder breaks the partition
        assert!(!is_partition(&[g1], 6));
    }
}
