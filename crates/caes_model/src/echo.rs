//! Echo suppression bookkeeping.

use crate::id::RecordId;
use crate::record::Timestamp;
use std::collections::HashSet;

/// The `(id, timestamp)` pairs an adapter wrote in its most recent batch.
///
/// The inclusive lower bound of `latest_since` means a pass can re-read what
/// the previous pass just wrote. Entries matching this set are treated as
/// echoes and never written back.
///
/// The set is replaced, never merged: it is bounded by the size of the last
/// write batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoSuppressionSet {
    pairs: HashSet<(RecordId, Timestamp)>,
}

impl EchoSuppressionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the pair was written in the last batch.
    pub fn contains(&self, id: &RecordId, timestamp: Timestamp) -> bool {
        self.pairs.contains(&(*id, timestamp))
    }

    /// Replaces the whole set with the pairs of a new batch.
    pub fn replace<I>(&mut self, written: I)
    where
        I: IntoIterator<Item = (RecordId, Timestamp)>,
    {
        self.pairs.clear();
        self.pairs.extend(written);
    }

    /// Number of remembered pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Forgets every pair.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_discards_previous_batch() {
        let a = RecordId::new();
        let b = RecordId::new();

        let mut set = EchoSuppressionSet::new();
        set.replace([(a, 1), (a, 2)]);
        assert!(set.contains(&a, 1));
        assert_eq!(set.len(), 2);

        set.replace([(b, 5)]);
        assert!(!set.contains(&a, 1));
        assert!(!set.contains(&a, 2));
        assert!(set.contains(&b, 5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn timestamp_is_part_of_the_key() {
        let id = RecordId::new();
        let mut set = EchoSuppressionSet::new();
        set.replace([(id, 10)]);
        assert!(set.contains(&id, 10));
        assert!(!set.contains(&id, 11));
    }

    #[test]
    fn empty_batch_empties_the_set() {
        let mut set = EchoSuppressionSet::new();
        set.replace([(RecordId::new(), 1)]);
        set.replace(std::iter::empty());
        assert!(set.is_empty());
    }
}
