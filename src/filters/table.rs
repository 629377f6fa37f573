//! Slot algebra shared by all quotient-filter based filters.
use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::ops::RangeInclusive;

use crate::bitmap::Bitmap;
use crate::filters::iterator::RehashIter;

/// Number of metadata bits in front of every fingerprint.
pub const METADATA_BITS: usize = 3;

/// Largest fingerprint that still fits a slot into a single 64-bit word.
pub const MAX_FINGERPRINT_LENGTH: usize = 64 - METADATA_BITS;

pub(crate) const OCCUPIED_MASK: u64 = 0b001;
pub(crate) const CONTINUATION_MASK: u64 = 0b010;
pub(crate) const SHIFTED_MASK: u64 = 0b100;

/// Table of quotient-filter slots. This is the engine behind every filter of this crate; it does
/// not hash anything itself but works on `(fingerprint, canonical slot)` pairs.
///
/// # How It Works
///
/// ## Layout
/// There are `2^power_of_two_size` addressable slots, followed by `2 * power_of_two_size`
/// extension slots that absorb runs spilling over the end of the table. The table is linear, there
/// is no wrap-around. Every slot consists of `fingerprint_length + 3` bits:
///
/// ```text
/// power_of_two_size  = 3
/// fingerprint_length = 4
///
/// +-----------------++-----+-----+-----+-----+-----+-----+-----+-----++-----+-----+ .. +-----+
/// |  position       ||   0 |   1 |   2 |   3 |   4 |   5 |   6 |   7 ||   8 |   9 | .. |  13 |
/// +-----------------++-----+-----+-----+-----+-----+-----+-----+-----++-----+-----+ .. +-----+
/// | is_occupied     ||     |     |     |     |     |     |     |     ||     |     |    |     |
/// | is_continuation ||     |     |     |     |     |     |     |     ||     |     |    |     |
/// | is_shifted      ||     |     |     |     |     |     |     |     ||     |     |    |     |
/// | fingerprint     || 0x0 | 0x0 | 0x0 | 0x0 | 0x0 | 0x0 | 0x0 | 0x0 || 0x0 | 0x0 |    | 0x0 |
/// +-----------------++-----+-----+-----+-----+-----+-----+-----+-----++-----+-----+ .. +-----+
/// ```
///
/// Within a slot, bit 0 is `is_occupied`, bit 1 `is_continuation`, bit 2 `is_shifted` and the
/// fingerprint starts at bit 3.
///
/// ## Runs and Clusters
/// All fingerprints with the same canonical slot form a "run". `is_occupied` is set on the
/// canonical slot of a run, no matter where the run is actually stored. Every entry of a run but
/// the first has `is_continuation` set. Every entry that is not stored in its canonical slot has
/// `is_shifted` set. A maximal sequence of runs without empty slots in between is a "cluster"; only
/// its first slot is unshifted.
///
/// New fingerprints are appended to the end of their run, so every run is ordered from the oldest
/// to the youngest entry:
///
/// ```text
/// insert (0x2, 2), (0xe, 2), (0x1, 3)
///
/// +-----------------++-----+-----+-----+-----+-----+-----+-----+-----+
/// | position        ||   0 |   1 |   2 |   3 |   4 |   5 |   6 |   7 |
/// +-----------------++-----+-----+-----+-----+-----+-----+-----+-----+
/// | is_occupied     ||     |     |   X |   X |     |     |     |     |
/// | is_continuation ||     |     |     |   X |     |     |     |     |
/// | is_shifted      ||     |     |     |   X |   X |     |     |     |
/// | fingerprint     || 0x0 | 0x0 | 0x2 | 0xe | 0x1 | 0x0 | 0x0 | 0x0 |
/// +-----------------++-----+-----+-----+-----+-----+-----+-----+-----+
/// | run             ||            [=========] [===]                  |
/// | cluster         ||            [===============]                  |
/// +-----------------++-----------------------------------------------|
/// ```
///
/// ## Capacity
/// The table keeps track of the last empty slot. An insertion whose canonical slot lies behind it
/// cannot find room and is rejected before anything is modified.
///
/// # Examples
/// ```
/// use infinifilter::filters::table::SlotTable;
///
/// let mut table = SlotTable::new(3, 4);
/// assert!(table.insert(0x2, 2));
/// assert!(table.insert(0xe, 2));
/// assert!(table.insert(0x1, 3));
///
/// assert!(table.search(0xe, 2));
/// assert!(!table.search(0xe, 3));
/// assert_eq!(table.find_run_start(3), 4);
///
/// assert_eq!(table.delete(0x2, 2), Some(0x2));
/// assert_eq!(table.num_physical_entries(), 2);
/// ```
#[derive(Clone)]
pub struct SlotTable {
    bits: Bitmap,
    power_of_two_size: usize,
    fingerprint_length: usize,
    bits_per_entry: usize,
    num_extension_slots: usize,
    num_physical_entries: usize,
    last_empty_slot: Option<usize>,
    last_cluster_start: Option<usize>,
    backward_steps: u64,
}

impl SlotTable {
    /// Create new table with `2^power_of_two_size` addressable slots, `2 * power_of_two_size`
    /// extension slots and `fingerprint_length` fingerprint bits per slot.
    pub fn new(power_of_two_size: usize, fingerprint_length: usize) -> Self {
        assert!(
            power_of_two_size > 0,
            "power_of_two_size ({}) must be greater than 0",
            power_of_two_size,
        );
        assert!(
            (fingerprint_length > 0) && (fingerprint_length <= MAX_FINGERPRINT_LENGTH),
            "fingerprint_length ({}) must be greater than 0 and smaller or equal than {}",
            fingerprint_length,
            MAX_FINGERPRINT_LENGTH,
        );
        assert!(
            power_of_two_size + fingerprint_length <= 64,
            "fingerprint_length ({}) + power_of_two_size ({}) must be smaller or equal than 64",
            fingerprint_length,
            power_of_two_size,
        );

        let num_extension_slots = 2 * power_of_two_size;
        let num_slots = (1 << power_of_two_size) + num_extension_slots;
        let bits_per_entry = fingerprint_length + METADATA_BITS;
        Self {
            bits: Bitmap::new((num_slots * bits_per_entry) as u64),
            power_of_two_size,
            fingerprint_length,
            bits_per_entry,
            num_extension_slots,
            num_physical_entries: 0,
            last_empty_slot: Some(num_slots - 1),
            last_cluster_start: None,
            backward_steps: 0,
        }
    }

    /// Number of bits used for addressing slots.
    pub fn power_of_two_size(&self) -> usize {
        self.power_of_two_size
    }

    /// Number of bits stored as fingerprint information.
    pub fn fingerprint_length(&self) -> usize {
        self.fingerprint_length
    }

    /// Number of bits per slot, metadata included.
    pub fn bits_per_entry(&self) -> usize {
        self.bits_per_entry
    }

    /// Number of slots behind the addressable range.
    pub fn num_extension_slots(&self) -> usize {
        self.num_extension_slots
    }

    /// Number of stored fingerprints, duplicates and tombstones included.
    pub fn num_physical_entries(&self) -> usize {
        self.num_physical_entries
    }

    /// Number of addressable slots, i.e. `2^power_of_two_size`.
    pub fn logical_num_slots(&self) -> usize {
        1 << self.power_of_two_size
    }

    /// Number of addressable slots plus extension slots.
    pub fn logical_num_slots_plus_extensions(&self) -> usize {
        self.logical_num_slots() + self.num_extension_slots
    }

    /// Number of slots the bit store has room for.
    pub fn physical_num_slots(&self) -> usize {
        (self.bits.size() / self.bits_per_entry as u64) as usize
    }

    /// Size of the bit store.
    pub fn num_bits(&self) -> u64 {
        self.bits.size()
    }

    /// Last slot known to be empty, `None` if the table has no empty slot left.
    pub fn last_empty_slot(&self) -> Option<usize> {
        self.last_empty_slot
    }

    /// Number of slots visited while searching backwards for empty slots.
    pub fn backward_steps(&self) -> u64 {
        self.backward_steps
    }

    /// Fraction of slots, extension slots included, that hold a fingerprint.
    pub fn utilization(&self) -> f64 {
        self.num_physical_entries as f64 / self.logical_num_slots_plus_extensions() as f64
    }

    /// Count non-empty slots by scanning the table.
    pub fn num_occupied_slots(&self) -> usize {
        (0..self.logical_num_slots_plus_extensions())
            .filter(|&i| !self.is_slot_empty(i))
            .count()
    }

    fn slot_start(&self, index: usize) -> u64 {
        (index * self.bits_per_entry) as u64
    }

    /// `true` if a run with canonical slot `index` exists.
    pub fn is_occupied(&self, index: usize) -> bool {
        self.bits.get(self.slot_start(index))
    }

    /// `true` if the slot continues the run of the previous slot.
    pub fn is_continuation(&self, index: usize) -> bool {
        self.bits.get(self.slot_start(index) + 1)
    }

    /// `true` if the slot does not hold an entry of its own canonical slot.
    pub fn is_shifted(&self, index: usize) -> bool {
        self.bits.get(self.slot_start(index) + 2)
    }

    /// `true` if all three metadata bits are unset.
    pub fn is_slot_empty(&self, index: usize) -> bool {
        let start = self.slot_start(index);
        self.bits.get_range(start, start + 2) == 0
    }

    fn set_occupied(&mut self, index: usize, value: bool) {
        let start = self.slot_start(index);
        self.bits.set(start, value);
    }

    fn set_continuation(&mut self, index: usize, value: bool) {
        let start = self.slot_start(index);
        self.bits.set(start + 1, value);
    }

    fn set_shifted(&mut self, index: usize, value: bool) {
        let start = self.slot_start(index);
        self.bits.set(start + 2, value);
    }

    /// Fingerprint stored in slot `index`.
    pub fn get_fingerprint(&self, index: usize) -> u64 {
        let start = self.slot_start(index) + METADATA_BITS as u64;
        self.bits
            .get_range(start, start + self.fingerprint_length as u64 - 1)
    }

    pub(crate) fn set_fingerprint(&mut self, index: usize, fingerprint: u64) {
        let start = self.slot_start(index) + METADATA_BITS as u64;
        self.bits
            .set_range(start, start + self.fingerprint_length as u64 - 1, fingerprint);
    }

    pub(crate) fn swap_fingerprint(&mut self, index: usize, fingerprint: u64) -> u64 {
        let existing = self.get_fingerprint(index);
        self.set_fingerprint(index, fingerprint);
        existing
    }

    /// Whole slot, metadata in the lowest three bits.
    pub fn get_slot(&self, index: usize) -> u64 {
        let start = self.slot_start(index);
        self.bits
            .get_range(start, start + self.bits_per_entry as u64 - 1)
    }

    fn clear_slot(&mut self, index: usize) {
        self.set_fingerprint(index, 0);
        self.set_shifted(index, false);
        self.set_continuation(index, false);
    }

    /// First slot of the cluster that contains `index`.
    pub fn find_cluster_start(&self, mut index: usize) -> usize {
        while self.is_shifted(index) {
            index -= 1;
        }
        index
    }

    /// Slot where the run of canonical slot `index` starts, or where it would have to start if
    /// there is no such run yet.
    pub fn find_run_start(&self, index: usize) -> usize {
        self.locate_run(index).0
    }

    /// Returns `(run_start, cluster_start)`.
    fn locate_run(&self, index: usize) -> (usize, usize) {
        let mut current = index;
        let mut runs_to_skip = 1;
        while self.is_shifted(current) {
            if self.is_occupied(current) {
                runs_to_skip += 1;
            }
            current -= 1;
        }
        let cluster_start = current;

        loop {
            if !self.is_continuation(current) {
                runs_to_skip -= 1;
                if runs_to_skip == 0 {
                    return (current, cluster_start);
                }
            }
            current += 1;
        }
    }

    /// Last slot of the run that contains `index`.
    pub fn find_run_end(&self, mut index: usize) -> usize {
        let total = self.logical_num_slots_plus_extensions();
        while index + 1 < total && self.is_continuation(index + 1) {
            index += 1;
        }
        index
    }

    /// Slots of the run starting at `run_start`.
    pub fn run_slots(&self, run_start: usize) -> RangeInclusive<usize> {
        run_start..=self.find_run_end(run_start)
    }

    /// First slot of the run whose fingerprint satisfies `pred`.
    pub fn find_first_in_run<F>(&self, run_start: usize, mut pred: F) -> Option<usize>
    where
        F: FnMut(u64) -> bool,
    {
        self.run_slots(run_start)
            .find(|&i| pred(self.get_fingerprint(i)))
    }

    /// Last slot of the run whose fingerprint satisfies `pred`.
    pub fn find_last_in_run<F>(&self, run_start: usize, mut pred: F) -> Option<usize>
    where
        F: FnMut(u64) -> bool,
    {
        self.run_slots(run_start)
            .rev()
            .find(|&i| pred(self.get_fingerprint(i)))
    }

    fn find_first_empty_slot(&self, mut index: usize) -> Option<usize> {
        let total = self.logical_num_slots_plus_extensions();
        while index < total && !self.is_slot_empty(index) {
            index += 1;
        }
        (index < total).then_some(index)
    }

    fn find_new_run_location(&self, mut index: usize) -> usize {
        if !self.is_slot_empty(index) {
            index += 1;
        }
        while self.is_continuation(index) {
            index += 1;
        }
        index
    }

    fn find_backward_empty_slot(&mut self, from: Option<usize>) -> Option<usize> {
        let mut index = from?;
        loop {
            if self.is_slot_empty(index) {
                return Some(index);
            }
            self.backward_steps += 1;
            index = index.checked_sub(1)?;
        }
    }

    /// The slot `index` just got filled.
    fn note_filled(&mut self, index: usize) {
        if self.last_empty_slot == Some(index) {
            self.last_empty_slot = self.find_backward_empty_slot(self.last_cluster_start);
        }
    }

    /// Append `fingerprint` to the run of `canonical_slot`.
    ///
    /// Returns `false` if there is no empty slot at or behind `canonical_slot`. The table is not
    /// modified in that case.
    pub fn insert(&mut self, fingerprint: u64, canonical_slot: usize) -> bool {
        match self.last_empty_slot {
            Some(last) if canonical_slot <= last => {}
            _ => return false,
        }

        if !self.is_occupied(canonical_slot) {
            return self.insert_new_run(fingerprint, canonical_slot);
        }

        let (run_start, cluster_start) = self.locate_run(canonical_slot);
        self.last_cluster_start = cluster_start.checked_sub(1);
        self.append_to_run(fingerprint, run_start);
        true
    }

    fn insert_new_run(&mut self, fingerprint: u64, canonical_slot: usize) -> bool {
        let Some(first_empty) = self.find_first_empty_slot(canonical_slot) else {
            return false;
        };
        let (preexisting_run_start, cluster_start) = self.locate_run(canonical_slot);
        self.last_cluster_start = cluster_start.checked_sub(1);
        let start = self.find_new_run_location(preexisting_run_start);
        let slot_initially_empty = self.is_slot_empty(start);

        self.set_occupied(canonical_slot, true);
        if first_empty != canonical_slot {
            self.set_shifted(start, true);
        }
        self.set_continuation(start, false);

        if slot_initially_empty {
            self.set_fingerprint(start, fingerprint);
            self.note_filled(start);
        } else {
            // push everything from `start` to the next empty slot one to the right
            let mut current = start;
            let mut carried = fingerprint;
            let mut carried_continuation = false;
            loop {
                let was_empty = self.is_slot_empty(current);
                carried = self.swap_fingerprint(current, carried);
                if current > start {
                    self.set_shifted(current, true);
                    let continuation = self.is_continuation(current);
                    self.set_continuation(current, carried_continuation);
                    carried_continuation = continuation;
                }
                if was_empty {
                    self.note_filled(current);
                    break;
                }
                current += 1;
            }
        }

        self.num_physical_entries += 1;
        true
    }

    fn append_to_run(&mut self, fingerprint: u64, run_start: usize) {
        let mut current = run_start;
        let mut carried = fingerprint;
        let mut carried_continuation = false;
        let mut finished_first_run = false;
        loop {
            let was_empty = self.is_slot_empty(current);
            if current > run_start {
                self.set_shifted(current, true);
            }
            if current > run_start && !finished_first_run && !self.is_continuation(current) {
                // first slot behind the run
                finished_first_run = true;
                self.set_continuation(current, true);
                carried = self.swap_fingerprint(current, carried);
            } else if finished_first_run {
                let continuation = self.is_continuation(current);
                self.set_continuation(current, carried_continuation);
                carried_continuation = continuation;
                carried = self.swap_fingerprint(current, carried);
            }
            if was_empty {
                self.note_filled(current);
                break;
            }
            current += 1;
        }
        self.num_physical_entries += 1;
    }

    /// `true` if the run of `canonical_slot` contains exactly `fingerprint`.
    pub fn search(&self, fingerprint: u64, canonical_slot: usize) -> bool {
        if !self.is_occupied(canonical_slot) {
            return false;
        }
        let run_start = self.find_run_start(canonical_slot);
        self.find_first_in_run(run_start, |fp| fp == fingerprint)
            .is_some()
    }

    /// Remove the youngest entry equal to `fingerprint` from the run of `canonical_slot`.
    ///
    /// Returns the removed fingerprint or `None` if nothing matched.
    pub fn delete(&mut self, fingerprint: u64, canonical_slot: usize) -> Option<u64> {
        if canonical_slot >= self.logical_num_slots() || !self.is_occupied(canonical_slot) {
            return None;
        }
        let run_start = self.find_run_start(canonical_slot);
        let matching = self.find_last_in_run(run_start, |fp| fp == fingerprint)?;
        self.delete_at(canonical_slot, run_start, matching);
        Some(fingerprint)
    }

    /// Remove the entry stored at `matching_slot`, which must be part of the run of
    /// `canonical_slot` starting at `run_start`, and shift all following runs of the cluster one
    /// slot to the left.
    pub fn delete_at(&mut self, canonical_slot: usize, run_start: usize, matching_slot: usize) {
        let mut run_end = self.find_run_end(matching_slot);
        let turn_off_occupied = run_start == run_end;

        for i in matching_slot..run_end {
            let fp = self.get_fingerprint(i + 1);
            self.set_fingerprint(i, fp);
        }

        let cluster_start = self.find_cluster_start(canonical_slot);
        let mut num_continuations = 0i64;
        let mut num_non_occupied = 0i64;
        for i in cluster_start..=run_end {
            if self.is_continuation(i) {
                num_continuations += 1;
            }
            if !self.is_occupied(i) {
                num_non_occupied += 1;
            }
        }
        self.clear_slot(run_end);

        let total = self.logical_num_slots_plus_extensions();
        loop {
            if run_end + 1 >= total
                || self.is_slot_empty(run_end + 1)
                || !self.is_shifted(run_end + 1)
            {
                if turn_off_occupied {
                    self.set_occupied(canonical_slot, false);
                }
                if self.last_empty_slot.is_none_or(|last| run_end > last) {
                    self.last_empty_slot = Some(run_end);
                }
                self.num_physical_entries -= 1;
                return;
            }

            // move the next run of the cluster one slot to the left
            let next_run_start = run_end + 1;
            run_end = self.find_run_end(next_run_start);

            let back_home = self.is_occupied(next_run_start - 1)
                && num_continuations - num_non_occupied == 1;
            self.set_shifted(next_run_start - 1, !back_home);

            for i in next_run_start..=run_end {
                let fp = self.get_fingerprint(i);
                self.set_fingerprint(i - 1, fp);
                if self.is_continuation(i) {
                    self.set_continuation(i - 1, true);
                }
                if !self.is_occupied(i) {
                    num_non_occupied += 1;
                }
            }
            num_continuations += (run_end - next_run_start) as i64;
            self.clear_slot(run_end);
        }
    }

    /// Iterate over `(canonical slot, fingerprint)` of all stored entries in slot order.
    pub fn iter(&self) -> RehashIter<'_> {
        RehashIter::new(self)
    }

    /// Remove all entries, keeping the geometry.
    pub fn clear(&mut self) {
        self.bits.clear();
        self.num_physical_entries = 0;
        self.last_empty_slot = Some(self.logical_num_slots_plus_extensions() - 1);
        self.last_cluster_start = None;
    }

    /// Run and cluster statistics gathered by scanning the whole table.
    pub fn compute_statistics(&self) -> Statistics {
        let mut stats = Statistics::default();
        let mut current_cluster = 0;

        let flush = |stats: &mut Statistics, len: &mut usize| {
            if *len > 0 {
                *stats.cluster_length_histogram.entry(*len).or_insert(0) += 1;
                stats.largest_cluster = stats.largest_cluster.max(*len);
                *len = 0;
            }
        };

        for i in 0..self.logical_num_slots_plus_extensions() {
            if self.is_slot_empty(i) {
                flush(&mut stats, &mut current_cluster);
                continue;
            }
            stats.num_entries += 1;
            if !self.is_continuation(i) {
                stats.num_runs += 1;
            }
            if !self.is_shifted(i) {
                flush(&mut stats, &mut current_cluster);
                stats.num_clusters += 1;
            }
            current_cluster += 1;
        }
        flush(&mut stats, &mut current_cluster);

        if stats.num_runs > 0 {
            stats.avg_run_length = stats.num_entries as f64 / stats.num_runs as f64;
        }
        if stats.num_clusters > 0 {
            stats.avg_cluster_length = stats.num_entries as f64 / stats.num_clusters as f64;
        }
        stats
    }

    /// Human-readable dump of all slots.
    ///
    /// With `vertical` set, every slot gets its own line `index occupied continuation shifted
    /// fingerprint`; otherwise slots are printed in one line each as `ocs:fingerprint`, with the
    /// addressable and the extension range separated by `||`.
    pub fn pretty_string(&self, vertical: bool) -> String {
        let width = self.fingerprint_length;
        let mut out = String::new();
        for i in 0..self.logical_num_slots_plus_extensions() {
            let flags = |b: bool| if b { '1' } else { '0' };
            let (o, c, s) = (
                flags(self.is_occupied(i)),
                flags(self.is_continuation(i)),
                flags(self.is_shifted(i)),
            );
            let fp = self.get_fingerprint(i);
            // writing into a String cannot fail
            if vertical {
                let _ = writeln!(out, "{:>6} {} {} {} {:0width$b}", i, o, c, s, fp, width = width);
            } else {
                if i == self.logical_num_slots() {
                    out.push_str("|| ");
                }
                let _ = write!(out, "{}{}{}:{:0width$b} ", o, c, s, fp, width = width);
            }
        }
        if !vertical {
            out.push('\n');
        }
        out
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SlotTable {{ power_of_two_size: {}, fingerprint_length: {}, num_physical_entries: {} }}",
            self.power_of_two_size, self.fingerprint_length, self.num_physical_entries
        )
    }
}

/// Occupancy statistics of a [`SlotTable`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    /// Number of non-empty slots.
    pub num_entries: usize,
    /// Number of runs.
    pub num_runs: usize,
    /// Number of clusters.
    pub num_clusters: usize,
    /// Mean number of entries per run.
    pub avg_run_length: f64,
    /// Mean number of entries per cluster.
    pub avg_cluster_length: f64,
    /// Length of the longest cluster.
    pub largest_cluster: usize,
    /// Cluster length to number of clusters of that length.
    pub cluster_length_histogram: BTreeMap<usize, usize>,
}
