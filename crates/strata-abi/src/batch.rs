// Bounded batch of (token, position, seq ids, logits flag) entries handed to
// a single decode call.
// - Capacity is fixed at construction; `add` never grows past it.
// - Safe to reuse with `clear()`: storage stays allocated between steps.

use smallvec::{SmallVec, smallvec};

use crate::error::BatchError;
use crate::token::{Position, SeqId, Token};

/// Sequence ids of one entry. Single-sequence use never spills to the heap.
pub type SeqIds = SmallVec<[SeqId; 1]>;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub token: Token,
    pub pos: Position,
    pub seq_ids: SeqIds,
    /// Backend must produce output logits for this entry.
    pub logits: bool,
}

#[derive(Debug, Clone)]
pub struct Batch {
    entries: Vec<BatchEntry>,
    capacity: usize,
}

impl Batch {
    /// Create an empty batch holding at most `capacity` entries (min 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one entry and return its index within the batch.
    pub fn add(
        &mut self,
        token: Token,
        pos: Position,
        seq_ids: &[SeqId],
        logits: bool,
    ) -> Result<usize, BatchError> {
        if self.is_full() {
            return Err(BatchError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let seq_ids: SeqIds = if seq_ids.is_empty() {
            smallvec![SeqId::MAIN]
        } else {
            SmallVec::from_slice(seq_ids)
        };
        self.entries.push(BatchEntry {
            token,
            pos,
            seq_ids,
            logits,
        });
        Ok(self.entries.len() - 1)
    }

    /// Flag an already-added entry for logits.
    pub fn mark_logits(&mut self, index: usize) -> Result<(), BatchError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(BatchError::IndexOutOfRange { index, len })?;
        entry.logits = true;
        Ok(())
    }

    /// Ensure only the last valid entry is marked for logits.
    /// Returns its index, or `None` on an empty batch.
    pub fn mark_last_for_logits(&mut self) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)?;
        for e in &mut self.entries {
            e.logits = false;
        }
        self.entries[last].logits = true;
        Some(last)
    }

    /// Drop all entries; capacity and storage are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Index of the last entry flagged for logits.
    pub fn logits_index(&self) -> Option<usize> {
        self.entries.iter().rposition(|e| e.logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_returns_sequential_indices() {
        let mut b = Batch::new(4);
        assert_eq!(b.add(Token(5), Position(0), &[SeqId::MAIN], false), Ok(0));
        assert_eq!(b.add(Token(9), Position(1), &[SeqId::MAIN], false), Ok(1));
        assert_eq!(b.len(), 2);
        assert_eq!(b.entries()[1].token, Token(9));
        assert_eq!(b.entries()[1].pos, Position(1));
    }

    #[test]
    fn add_fails_when_full() {
        let mut b = Batch::new(2);
        b.add(Token(1), Position(0), &[], false).unwrap();
        b.add(Token(2), Position(1), &[], false).unwrap();
        assert!(b.is_full());
        assert_eq!(
            b.add(Token(3), Position(2), &[], false),
            Err(BatchError::CapacityExceeded { capacity: 2 })
        );
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn empty_seq_ids_default_to_main() {
        let mut b = Batch::new(1);
        b.add(Token(1), Position(0), &[], false).unwrap();
        assert_eq!(b.entries()[0].seq_ids.as_slice(), &[SeqId::MAIN]);
    }

    #[test]
    fn mark_logits_after_the_fact() {
        let mut b = Batch::new(3);
        for i in 0..3 {
            b.add(Token(i), Position(i as u32), &[], false).unwrap();
        }
        assert_eq!(b.logits_index(), None);
        b.mark_logits(2).unwrap();
        assert_eq!(b.logits_index(), Some(2));
        assert_eq!(b.entries().iter().filter(|e| e.logits).count(), 1);
        assert_eq!(
            b.mark_logits(3),
            Err(BatchError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn mark_last_clears_other_flags() {
        let mut b = Batch::new(3);
        b.add(Token(1), Position(0), &[], true).unwrap();
        b.add(Token(2), Position(1), &[], false).unwrap();
        assert_eq!(b.mark_last_for_logits(), Some(1));
        assert!(!b.entries()[0].logits);
        assert!(b.entries()[1].logits);
        assert_eq!(Batch::new(1).mark_last_for_logits(), None);
    }

    #[test]
    fn clear_restores_capacity() {
        let mut b = Batch::new(1);
        b.add(Token(1), Position(0), &[], true).unwrap();
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.capacity(), 1);
        assert_eq!(b.add(Token(2), Position(1), &[], true), Ok(0));
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        assert_eq!(Batch::new(0).capacity(), 1);
    }
}
