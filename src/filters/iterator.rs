//! Iteration over the entries of a slot table together with their canonical slots.
use std::collections::VecDeque;

use crate::filters::table::{
    CONTINUATION_MASK, METADATA_BITS, OCCUPIED_MASK, SHIFTED_MASK, SlotTable,
};

/// Yields `(canonical slot, fingerprint)` for every stored entry, in physical slot order.
///
/// Stored entries do not know their canonical slot, so the iterator recovers it from the metadata
/// bits while scanning: every occupied slot seen in a cluster queues a canonical slot, and every
/// run start consumes one.
///
/// Expansion and widening rebuild tables from this iterator. Entries of a run come out in run
/// order, so re-inserting them keeps every run ordered from oldest to youngest.
#[derive(Debug)]
pub struct RehashIter<'a> {
    table: &'a SlotTable,
    index: usize,
    bucket_index: usize,
    pending_buckets: VecDeque<usize>,
}

impl<'a> RehashIter<'a> {
    pub(crate) fn new(table: &'a SlotTable) -> Self {
        Self {
            table,
            index: 0,
            bucket_index: 0,
            pending_buckets: VecDeque::new(),
        }
    }
}

impl Iterator for RehashIter<'_> {
    type Item = (usize, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.table.logical_num_slots_plus_extensions();
        let slot = loop {
            if self.index >= total {
                return None;
            }
            let slot = self.table.get_slot(self.index);
            if slot & (OCCUPIED_MASK | CONTINUATION_MASK | SHIFTED_MASK) != 0 {
                break slot;
            }
            self.index += 1;
        };

        let occupied = slot & OCCUPIED_MASK != 0;
        let continuation = slot & CONTINUATION_MASK != 0;
        let shifted = slot & SHIFTED_MASK != 0;
        match (occupied, continuation, shifted) {
            (true, false, false) => {
                // start of a cluster
                self.pending_buckets.clear();
                self.pending_buckets.push_back(self.index);
                self.bucket_index = self.index;
            }
            (true, true, true) => {
                self.pending_buckets.push_back(self.index);
            }
            (false, false, true) => {
                self.pending_buckets.pop_front();
                if let Some(&bucket) = self.pending_buckets.front() {
                    self.bucket_index = bucket;
                }
            }
            (true, false, true) => {
                self.pending_buckets.push_back(self.index);
                self.pending_buckets.pop_front();
                if let Some(&bucket) = self.pending_buckets.front() {
                    self.bucket_index = bucket;
                }
            }
            // continuation of the current run
            _ => {}
        }

        self.index += 1;
        Some((self.bucket_index, slot >> METADATA_BITS))
    }
}
