//! InfiniFilter implementation.
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use crate::filters::growth::GrowthStrategy;
use crate::filters::quotientfilter::DEFAULT_FULLNESS_THRESHOLD;
use crate::filters::table::{MAX_FINGERPRINT_LENGTH, METADATA_BITS, SlotTable};
use crate::filters::{ApproximateSet, Growable};
use crate::hash_utils::{XxHashBuilder, low_mask, split_hash};

/// Fingerprint of a void entry: age `fingerprint_length - 1`, no fingerprint bits left.
///
/// ```text
/// fingerprint_length = 5
/// void entry         = 0b11110
/// ```
pub fn empty_fingerprint(fingerprint_length: usize) -> u64 {
    low_mask(fingerprint_length) - 1
}

/// All-ones fingerprint. It never matches any element and marks entries whose removal is pending.
pub fn tombstone_fingerprint(fingerprint_length: usize) -> u64 {
    low_mask(fingerprint_length)
}

/// Age of a stored fingerprint, i.e. the number of leading one bits.
///
/// Ages range from `0` (fresh) to `fingerprint_length - 1` (void entry). The all-ones tombstone
/// has age `fingerprint_length`.
///
/// # Examples
/// ```
/// use infinifilter::filters::infinifilter::parse_unary;
///
/// assert_eq!(parse_unary(0b0_1011, 5), 0);
/// assert_eq!(parse_unary(0b10_101, 5), 1);
/// assert_eq!(parse_unary(0b1110_1, 5), 3);
/// assert_eq!(parse_unary(0b11110, 5), 4);
/// assert_eq!(parse_unary(0b11111, 5), 5);
/// ```
pub fn parse_unary(fingerprint: u64, fingerprint_length: usize) -> usize {
    let inverted = !fingerprint & low_mask(fingerprint_length);
    if inverted == 0 {
        return fingerprint_length;
    }
    let highest_zero = 63 - inverted.leading_zeros() as usize;
    fingerprint_length - highest_zero - 1
}

/// Mask that is or-ed into every fingerprint shifted right by one during an expansion from
/// `previous_length` to `new_length` bit fingerprints. It adds `new_length - previous_length + 1`
/// one bits on top of the `previous_length - 1` remaining bits, so the age grows by one and
/// additional fingerprint bits are filled with ones. A shrinking fingerprint needs no mask.
///
/// # Examples
/// ```
/// use infinifilter::filters::infinifilter::prep_unary_mask;
///
/// assert_eq!(prep_unary_mask(5, 5), 0b10000);
/// assert_eq!(prep_unary_mask(5, 7), 0b1110000);
/// assert_eq!(prep_unary_mask(5, 4), 0);
/// ```
pub fn prep_unary_mask(previous_length: usize, new_length: usize) -> u64 {
    if new_length < previous_length {
        return 0;
    }
    low_mask(new_length - previous_length + 1) << (previous_length - 1)
}

/// `true` if the stored fingerprint agrees with the searched one on all fingerprint bits the stored
/// one still has.
pub fn fingerprint_matches(stored: u64, searched: u64, fingerprint_length: usize) -> bool {
    let age = parse_unary(stored, fingerprint_length);
    if age >= fingerprint_length {
        return false;
    }
    let mask = low_mask(fingerprint_length - age - 1);
    (stored & mask) == (searched & mask)
}

/// What to do with void entries while rehashing into a table twice the size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VoidPolicy {
    /// Leave them behind.
    Drop,
    /// Place one copy into both slots they could belong to.
    Duplicate,
}

/// Outcome of rehashing into a table twice the size.
#[derive(Debug, Default)]
pub(crate) struct GrowthReport {
    /// Canonical slots of entries that lost their last fingerprint bit.
    pub(crate) new_void_slots: Vec<usize>,
    /// Number of void entries that were copied into two slots.
    pub(crate) duplicated_voids: usize,
    /// Number of void entries left behind.
    pub(crate) dropped_voids: usize,
}

/// Histogram of fingerprint ages, see [`parse_unary`].
pub type AgeHistogram = BTreeMap<usize, usize>;

/// An InfiniFilter is a quotient filter that never fills up: when it reaches its fullness
/// threshold it doubles the number of slots and keeps all existing entries.
///
/// # How It Works
/// Elements are hashed to 64 bits. The lowest `power_of_two_size` bits select the canonical slot,
/// the following bits are stored as fingerprint. The topmost fingerprint bit of a fresh entry is
/// always cleared.
///
/// On expansion the lowest fingerprint bit of every entry moves into its slot address and a one
/// bit is added on top of the fingerprint. The number of leading one bits therefore counts the
/// expansions an entry went through, the "age". Stored fingerprints are compared on their
/// remaining bits only:
///
/// ```text
/// fingerprint_length = 5, power_of_two_size = 3
///
/// h(x)        = ...0 1101 011   slot 0b011, fingerprint 0b01101 -> 0b0_1101 (age 0)
///
/// expand      ->  slot 0b1011, fingerprint 0b10_110 (age 1, fingerprint bits 0b110)
/// expand      ->  slot 0b01011, fingerprint 0b110_11 (age 2, fingerprint bits 0b11)
/// ...
/// expand      ->  slot ..., fingerprint 0b11110 (age 4, no fingerprint bits: void entry)
/// ```
///
/// Entries inserted after an expansion get fingerprints of the length chosen by the
/// [`GrowthStrategy`], so each generation of entries keeps its own false positive rate.
///
/// Once an entry runs out of fingerprint bits it becomes a void entry: it matches every element of
/// its slot but can no longer decide which of the two slots of the next expansion it belongs to.
/// This filter refuses to expand while void entries exist (see [`Growable::is_full`]); the
/// [`DuplicatingChainedInfiniFilter`](crate::filters::duplicating::DuplicatingChainedInfiniFilter)
/// lifts that restriction.
///
/// # Examples
/// ```
/// use infinifilter::filters::{ApproximateSet, Growable};
/// use infinifilter::filters::infinifilter::BasicInfiniFilter;
///
/// let mut filter = BasicInfiniFilter::with_params(3, 12);
/// for i in 0..100 {
///     filter.insert(&i, false).unwrap();
/// }
/// assert!(filter.num_expansions() > 0);
/// for i in 0..100 {
///     assert!(filter.query(&i));
/// }
/// ```
///
/// # References
/// - ["InfiniFilter: Expanding Filters to Infinity and Beyond", Niv Dayan and others, 2023](https://dl.acm.org/doi/10.1145/3589285)
#[derive(Clone)]
pub struct BasicInfiniFilter<B = XxHashBuilder>
where
    B: BuildHasher + Clone,
{
    table: SlotTable,
    buildhasher: B,
    n_logical: usize,
    empty_fingerprint: u64,
    num_void_entries: usize,
    num_distinct_void_entries: usize,
    growth_strategy: GrowthStrategy,
    num_expansions: usize,
    num_expansions_estimate: Option<usize>,
    original_fingerprint_length: usize,
    expand_autonomously: bool,
    fullness_threshold: f64,
}

impl BasicInfiniFilter {
    /// Create new InfiniFilter with:
    ///
    /// - `power_of_two_size`: number of bits used for addressing, aka `2^power_of_two_size` slots
    ///   (plus `2 * power_of_two_size` extension slots) will be allocated initially
    /// - `bits_per_entry`: number of bits per slot, the fingerprint gets `bits_per_entry - 3` of
    ///   them
    ///
    /// and a default hasher.
    pub fn with_params(power_of_two_size: usize, bits_per_entry: usize) -> Self {
        Self::with_params_and_hash(power_of_two_size, bits_per_entry, XxHashBuilder::default())
    }
}

impl<B> BasicInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    /// Create new InfiniFilter with:
    ///
    /// - `power_of_two_size`: number of bits used for addressing, aka `2^power_of_two_size` slots
    ///   (plus `2 * power_of_two_size` extension slots) will be allocated initially
    /// - `bits_per_entry`: number of bits per slot, the fingerprint gets `bits_per_entry - 3` of
    ///   them
    /// - `buildhasher`: hash implementation
    pub fn with_params_and_hash(
        power_of_two_size: usize,
        bits_per_entry: usize,
        buildhasher: B,
    ) -> Self {
        Self::with_fingerprint_length(
            power_of_two_size,
            bits_per_entry,
            None,
            buildhasher,
        )
    }

    /// Create new InfiniFilter that expects to expand `expansions_estimate` times.
    ///
    /// Fingerprints start longer than `bits_per_entry - 3` and shrink towards it with every
    /// expansion ([`GrowthStrategy::PolynomialShrink`]), so entries of all generations end up with
    /// similar false positive rates.
    pub fn with_expansions_estimate(
        power_of_two_size: usize,
        bits_per_entry: usize,
        expansions_estimate: usize,
        buildhasher: B,
    ) -> Self {
        Self::with_fingerprint_length(
            power_of_two_size,
            bits_per_entry,
            Some(expansions_estimate),
            buildhasher,
        )
    }

    fn with_fingerprint_length(
        power_of_two_size: usize,
        bits_per_entry: usize,
        expansions_estimate: Option<usize>,
        buildhasher: B,
    ) -> Self {
        assert!(
            bits_per_entry > METADATA_BITS + 1,
            "bits_per_entry ({}) must be greater than {}",
            bits_per_entry,
            METADATA_BITS + 1,
        );
        let original_fingerprint_length = bits_per_entry - METADATA_BITS;
        let (growth_strategy, fingerprint_length) = match expansions_estimate {
            Some(_) => {
                let strategy = GrowthStrategy::PolynomialShrink;
                let len = strategy.new_fingerprint_size(
                    original_fingerprint_length,
                    0,
                    expansions_estimate,
                );
                (strategy, len)
            }
            None => (GrowthStrategy::Uniform, original_fingerprint_length),
        };

        Self {
            table: SlotTable::new(power_of_two_size, fingerprint_length),
            buildhasher,
            n_logical: 0,
            empty_fingerprint: empty_fingerprint(fingerprint_length),
            num_void_entries: 0,
            num_distinct_void_entries: 0,
            growth_strategy,
            num_expansions: 0,
            num_expansions_estimate: expansions_estimate,
            original_fingerprint_length,
            expand_autonomously: true,
            fullness_threshold: DEFAULT_FULLNESS_THRESHOLD,
        }
    }

    /// Underlying slot table.
    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut SlotTable {
        &mut self.table
    }

    pub(crate) fn buildhasher(&self) -> &B {
        &self.buildhasher
    }

    /// Number of bits used for addressing slots.
    pub fn power_of_two_size(&self) -> usize {
        self.table.power_of_two_size()
    }

    /// Number of bits of fingerprints inserted now.
    pub fn fingerprint_length(&self) -> usize {
        self.table.fingerprint_length()
    }

    /// Fingerprint length the filter was configured with.
    pub fn original_fingerprint_length(&self) -> usize {
        self.original_fingerprint_length
    }

    /// Fingerprint that marks void entries at the current fingerprint length.
    pub fn empty_fingerprint(&self) -> u64 {
        self.empty_fingerprint
    }

    /// Number of void entries in the table.
    pub fn num_void_entries(&self) -> usize {
        self.num_void_entries
    }

    /// Number of void entries that stand for different elements.
    pub fn num_distinct_void_entries(&self) -> usize {
        self.num_distinct_void_entries
    }

    pub(crate) fn add_void_entries(&mut self, physical: usize, distinct: usize) {
        self.num_void_entries += physical;
        self.num_distinct_void_entries += distinct;
    }

    pub(crate) fn remove_void_entries(&mut self, physical: usize, distinct: usize) {
        self.num_void_entries = self.num_void_entries.saturating_sub(physical);
        self.num_distinct_void_entries = self.num_distinct_void_entries.saturating_sub(distinct);
    }

    /// Strategy used to pick fingerprint lengths after expansions.
    pub fn growth_strategy(&self) -> GrowthStrategy {
        self.growth_strategy
    }

    /// Replace the fingerprint growth strategy.
    pub fn set_growth_strategy(&mut self, strategy: GrowthStrategy) {
        self.growth_strategy = strategy;
    }

    /// `true` if the filter expands on its own when it reaches the fullness threshold.
    pub fn expands_autonomously(&self) -> bool {
        self.expand_autonomously
    }

    /// Enable or disable expanding on insertion.
    pub fn set_expand_autonomously(&mut self, value: bool) {
        self.expand_autonomously = value;
    }

    /// Set the fraction of addressable slots that may be filled, must be in `(0, 1]`.
    pub fn set_expansion_threshold(&mut self, threshold: f64) {
        assert!(
            threshold > 0.0 && threshold <= 1.0,
            "threshold ({}) must be in (0, 1]",
            threshold,
        );
        self.fullness_threshold = threshold;
    }

    /// Number of stored fingerprints at which the filter expands.
    pub fn max_entries_before_expansion(&self) -> usize {
        (self.table.logical_num_slots() as f64 * self.fullness_threshold) as usize
    }

    pub(crate) fn needs_expansion(&self) -> bool {
        self.expand_autonomously
            && self.table.num_physical_entries() >= self.max_entries_before_expansion()
    }

    pub(crate) fn hash<T>(&self, obj: &T) -> u64
    where
        T: Hash + ?Sized,
    {
        self.buildhasher.hash_one(obj)
    }

    /// Canonical slot and fresh fingerprint (age 0) of a hash.
    pub(crate) fn split(&self, hash: u64) -> (usize, u64) {
        let len = self.table.fingerprint_length();
        let (slot, fingerprint) = split_hash(hash, self.table.power_of_two_size(), len);
        (slot, fingerprint & !(1 << (len - 1)))
    }

    /// Age of a stored fingerprint.
    pub fn age(&self, fingerprint: u64) -> usize {
        parse_unary(fingerprint, self.table.fingerprint_length())
    }

    pub(crate) fn matches(&self, stored: u64, searched: u64) -> bool {
        fingerprint_matches(stored, searched, self.table.fingerprint_length())
    }

    /// Slot of the youngest entry in the run starting at `run_start` that matches `fingerprint`.
    pub(crate) fn find_youngest_match(&self, run_start: usize, fingerprint: u64) -> Option<usize> {
        let mut youngest: Option<(usize, usize)> = None;
        for index in self.table.run_slots(run_start) {
            let stored = self.table.get_fingerprint(index);
            if !self.matches(stored, fingerprint) {
                continue;
            }
            let age = self.age(stored);
            if age == 0 {
                return Some(index);
            }
            if youngest.is_none_or(|(_, best)| age < best) {
                youngest = Some((index, age));
            }
        }
        youngest.map(|(index, _)| index)
    }

    fn contains(&self, slot: usize, fingerprint: u64) -> bool {
        if !self.table.is_occupied(slot) {
            return false;
        }
        let run_start = self.table.find_run_start(slot);
        self.table
            .find_first_in_run(run_start, |stored| self.matches(stored, fingerprint))
            .is_some()
    }

    /// Insert an element given by its 64-bit hash.
    pub fn insert_hash(&mut self, hash: u64, insert_only_if_absent: bool) -> bool {
        let (slot, fingerprint) = self.split(hash);
        if insert_only_if_absent && self.contains(slot, fingerprint) {
            return false;
        }
        if !self.table.insert(fingerprint, slot) {
            return false;
        }
        self.n_logical += 1;

        if self.needs_expansion() && !self.has_void_entries() {
            self.expand_to(self.next_fingerprint_length());
        }
        true
    }

    /// Check for an element given by its 64-bit hash.
    pub fn search_hash(&self, hash: u64) -> bool {
        let (slot, fingerprint) = self.split(hash);
        self.contains(slot, fingerprint)
    }

    /// Delete the youngest entry matching an element given by its 64-bit hash.
    pub fn delete_hash(&mut self, hash: u64) -> Option<u64> {
        let (slot, fingerprint) = self.split(hash);
        if slot >= self.table.logical_num_slots() || !self.table.is_occupied(slot) {
            return None;
        }
        let run_start = self.table.find_run_start(slot);
        let matching = self.find_youngest_match(run_start, fingerprint)?;
        let removed = self.table.get_fingerprint(matching);
        self.table.delete_at(slot, run_start, matching);
        if removed == self.empty_fingerprint {
            self.remove_void_entries(1, 1);
        }
        self.n_logical = self.n_logical.saturating_sub(1);
        Some(removed)
    }

    /// Replace the youngest entry matching an element given by its 64-bit hash with a fresh one.
    pub fn rejuvenate_hash(&mut self, hash: u64) -> bool {
        let (slot, fingerprint) = self.split(hash);
        if !self.table.is_occupied(slot) {
            return false;
        }
        let run_start = self.table.find_run_start(slot);
        let Some(matching) = self.find_youngest_match(run_start, fingerprint) else {
            return false;
        };
        let previous = self.table.swap_fingerprint(matching, fingerprint);
        if previous == self.empty_fingerprint {
            self.remove_void_entries(1, 1);
        }
        true
    }

    fn has_void_entries(&self) -> bool {
        self.num_void_entries > 0
    }

    /// Fingerprint length for the next expansion: the growth strategy's choice, but never more
    /// than one bit shorter than the current length.
    pub fn next_fingerprint_length(&self) -> usize {
        let current = self.table.fingerprint_length();
        let proposed = self.growth_strategy.new_fingerprint_size(
            self.original_fingerprint_length,
            self.num_expansions,
            self.num_expansions_estimate,
        );
        if proposed < current { current - 1 } else { proposed }
    }

    fn can_hold(&self, power_of_two_size: usize, fingerprint_length: usize) -> bool {
        fingerprint_length >= 2
            && fingerprint_length <= MAX_FINGERPRINT_LENGTH
            && power_of_two_size + fingerprint_length <= 64
    }

    /// Rehash all entries into a table with twice the slots and `new_fingerprint_length` bit
    /// fingerprints.
    ///
    /// Returns `None`, leaving the filter untouched, if the new table overflows. Void counters are
    /// not touched; the report tells the caller what happened to void entries.
    pub(crate) fn grow(
        &mut self,
        new_fingerprint_length: usize,
        voids: VoidPolicy,
    ) -> Option<GrowthReport> {
        let old_power = self.table.power_of_two_size();
        if !self.can_hold(old_power + 1, new_fingerprint_length) {
            return None;
        }

        let mut new_table = SlotTable::new(old_power + 1, new_fingerprint_length);
        let unary_mask = prep_unary_mask(self.table.fingerprint_length(), new_fingerprint_length);
        let new_empty = empty_fingerprint(new_fingerprint_length);
        let mut report = GrowthReport::default();

        for (bucket, fingerprint) in self.table.iter() {
            if fingerprint != self.empty_fingerprint {
                let pivot_bit = (fingerprint & 1) as usize;
                let updated_bucket = bucket | (pivot_bit << old_power);
                let updated_fingerprint = (fingerprint >> 1) | unary_mask;
                if !new_table.insert(updated_fingerprint, updated_bucket) {
                    return None;
                }
                if updated_fingerprint == new_empty {
                    report.new_void_slots.push(updated_bucket);
                }
                continue;
            }

            match voids {
                VoidPolicy::Drop => report.dropped_voids += 1,
                VoidPolicy::Duplicate => {
                    let sibling = bucket | (1 << old_power);
                    if !new_table.insert(new_empty, bucket) || !new_table.insert(new_empty, sibling)
                    {
                        return None;
                    }
                    report.duplicated_voids += 1;
                }
            }
        }

        self.table = new_table;
        self.empty_fingerprint = new_empty;
        Some(report)
    }

    /// Expand into `new_fingerprint_length` bit fingerprints, dropping void entries.
    pub(crate) fn expand_to(&mut self, new_fingerprint_length: usize) -> bool {
        let Some(report) = self.grow(new_fingerprint_length, VoidPolicy::Drop) else {
            return false;
        };
        self.remove_void_entries(report.dropped_voids, report.dropped_voids);
        self.add_void_entries(report.new_void_slots.len(), report.new_void_slots.len());
        self.num_expansions += 1;
        true
    }

    pub(crate) fn note_expansion(&mut self) {
        self.num_expansions += 1;
    }

    /// Lengthen all fingerprints by one bit, keeping their fingerprint bits and slots.
    pub(crate) fn widen_fingerprints(&mut self) -> bool {
        let power = self.table.power_of_two_size();
        let len = self.table.fingerprint_length();
        if !self.can_hold(power, len + 1) {
            return false;
        }

        let mut new_table = SlotTable::new(power, len + 1);
        let unary_mask = prep_unary_mask(len, len) << 1;
        for (bucket, fingerprint) in self.table.iter() {
            if !new_table.insert(fingerprint | unary_mask, bucket) {
                return false;
            }
        }
        self.table = new_table;
        self.empty_fingerprint = empty_fingerprint(len + 1);
        true
    }

    /// Number of stored fingerprints per age.
    pub fn age_histogram(&self) -> AgeHistogram {
        let mut histogram = AgeHistogram::new();
        for (_, fingerprint) in self.table.iter() {
            *histogram.entry(self.age(fingerprint)).or_insert(0) += 1;
        }
        histogram
    }

    /// Count void entries by scanning the table.
    pub fn num_void_entries_by_counting(&self) -> usize {
        self.table
            .iter()
            .filter(|&(_, fingerprint)| fingerprint == self.empty_fingerprint)
            .count()
    }
}

impl<T, B> ApproximateSet<T> for BasicInfiniFilter<B>
where
    T: Hash + ?Sized,
    B: BuildHasher + Clone,
{
    type Err = Infallible;

    fn clear(&mut self) {
        self.table.clear();
        self.n_logical = 0;
        self.num_void_entries = 0;
        self.num_distinct_void_entries = 0;
    }

    fn insert(&mut self, obj: &T, insert_only_if_absent: bool) -> Result<bool, Self::Err> {
        let hash = self.hash(obj);
        Ok(self.insert_hash(hash, insert_only_if_absent))
    }

    fn query(&self, obj: &T) -> bool {
        self.search_hash(self.hash(obj))
    }

    fn delete(&mut self, obj: &T) -> Result<Option<u64>, Self::Err> {
        let hash = self.hash(obj);
        Ok(self.delete_hash(hash))
    }

    fn rejuvenate(&mut self, obj: &T) -> Result<bool, Self::Err> {
        let hash = self.hash(obj);
        Ok(self.rejuvenate_hash(hash))
    }

    fn len(&self) -> usize {
        self.n_logical
    }

    fn measure_num_bits_per_entry(&self) -> f64 {
        self.table.num_bits() as f64 / self.n_logical as f64
    }
}

impl<B> Growable for BasicInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    type Err = Infallible;

    fn expand(&mut self) -> Result<bool, Self::Err> {
        if self.is_full() {
            return Ok(false);
        }
        Ok(self.expand_to(self.next_fingerprint_length()))
    }

    fn widen(&mut self) -> Result<bool, Self::Err> {
        Ok(self.widen_fingerprints())
    }

    /// Void entries cannot be split between the two slots of an expansion, so the filter refuses
    /// to expand as soon as one exists.
    fn is_full(&self) -> bool {
        self.has_void_entries()
    }

    fn num_expansions(&self) -> usize {
        self.num_expansions
    }
}

impl<B> fmt::Debug for BasicInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BasicInfiniFilter {{ power_of_two_size: {}, fingerprint_length: {}, num_expansions: {} }}",
            self.table.power_of_two_size(),
            self.table.fingerprint_length(),
            self.num_expansions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BasicInfiniFilter, empty_fingerprint, fingerprint_matches, parse_unary, prep_unary_mask,
        tombstone_fingerprint,
    };
    use crate::filters::growth::GrowthStrategy;
    use crate::filters::{ApproximateSet, Growable};
    use crate::hash_utils::XxHashBuilder;
    use crate::test_util::{assert_send, random_keys};

    fn len(filter: &BasicInfiniFilter) -> usize {
        ApproximateSet::<u64>::len(filter)
    }

    #[test]
    #[should_panic(expected = "bits_per_entry (4) must be greater than 4")]
    fn new_bits_per_entry_4() {
        BasicInfiniFilter::with_params(3, 4);
    }

    #[test]
    fn unary() {
        assert_eq!(empty_fingerprint(5), 0b11110);
        assert_eq!(tombstone_fingerprint(5), 0b11111);
        assert_eq!(parse_unary(0, 5), 0);
        assert_eq!(parse_unary(0b01111, 5), 0);
        assert_eq!(parse_unary(0b10000, 5), 1);
        assert_eq!(parse_unary(0b11011, 5), 2);
        assert_eq!(parse_unary(empty_fingerprint(5), 5), 4);
        assert_eq!(parse_unary(tombstone_fingerprint(5), 5), 5);
        assert_eq!(parse_unary(empty_fingerprint(61), 61), 60);
    }

    #[test]
    fn unary_mask() {
        assert_eq!(prep_unary_mask(2, 2), 0b10);
        assert_eq!(prep_unary_mask(4, 5), 0b11000);
        assert_eq!(prep_unary_mask(3, 6), 0b111100);
        assert_eq!(prep_unary_mask(6, 5), 0);
    }

    #[test]
    fn matching() {
        // age 0 compares the low four bits
        assert!(fingerprint_matches(0b01011, 0b01011, 5));
        assert!(fingerprint_matches(0b01011, 0b11011, 5));
        assert!(!fingerprint_matches(0b01011, 0b01010, 5));
        // age 2 compares the low two bits
        assert!(fingerprint_matches(0b11011, 0b00111, 5));
        assert!(!fingerprint_matches(0b11011, 0b00110, 5));
        // void entries match everything, tombstones nothing
        assert!(fingerprint_matches(empty_fingerprint(5), 0b01101, 5));
        assert!(!fingerprint_matches(tombstone_fingerprint(5), 0b01111, 5));
    }

    #[test]
    fn new() {
        let filter = BasicInfiniFilter::with_params(3, 8);
        assert_eq!(filter.power_of_two_size(), 3);
        assert_eq!(filter.fingerprint_length(), 5);
        assert_eq!(filter.original_fingerprint_length(), 5);
        assert_eq!(filter.empty_fingerprint(), 0b11110);
        assert_eq!(filter.num_expansions(), 0);
        assert_eq!(filter.max_entries_before_expansion(), 6);
        assert!(!filter.is_full());
        assert!(filter.expands_autonomously());
        assert_eq!(len(&filter), 0);
    }

    #[test]
    fn insert_search_delete() {
        let mut filter = BasicInfiniFilter::with_params(6, 16);
        assert!(filter.insert(&1u64, false).unwrap());
        assert!(filter.insert(&2u64, false).unwrap());
        assert!(filter.query(&1u64));
        assert!(filter.query(&2u64));
        assert!(!filter.query(&3u64));
        assert_eq!(len(&filter), 2);

        assert!(filter.delete(&1u64).unwrap().is_some());
        assert!(!filter.query(&1u64));
        assert!(filter.query(&2u64));
        assert!(filter.delete(&1u64).unwrap().is_none());
        assert_eq!(len(&filter), 1);
    }

    #[test]
    fn fresh_fingerprints_have_age_0() {
        let mut filter = BasicInfiniFilter::with_params(4, 8);
        for i in 0..10u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        let histogram = filter.age_histogram();
        assert_eq!(histogram.len(), 1);
        assert_eq!(histogram.get(&0), Some(&10));
    }

    #[test]
    fn insert_only_if_absent() {
        let mut filter = BasicInfiniFilter::with_params(4, 16);
        assert!(filter.insert(&7u64, true).unwrap());
        assert!(!filter.insert(&7u64, true).unwrap());
        assert_eq!(len(&filter), 1);
    }

    #[test]
    fn expansion_preserves_membership() {
        let mut filter = BasicInfiniFilter::with_params(3, 8);
        for i in 0..20u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert_eq!(filter.num_expansions(), 2);
        assert_eq!(filter.power_of_two_size(), 5);

        assert!(filter.expand().unwrap());
        assert_eq!(filter.num_expansions(), 3);
        assert_eq!(filter.power_of_two_size(), 6);
        assert_eq!(filter.fingerprint_length(), 5);
        assert_eq!(filter.table().num_extension_slots(), 12);
        assert_eq!(filter.table().num_physical_entries(), 20);
        assert_eq!(len(&filter), 20);
        assert_eq!(filter.num_void_entries(), 0);
        for i in 0..20u64 {
            assert!(filter.query(&i), "lost {}", i);
        }

        let histogram = filter.age_histogram();
        assert_eq!(histogram.values().sum::<usize>(), 20);
        assert!(histogram.keys().all(|&age| (1..=3).contains(&age)));
        assert_eq!(histogram.get(&3), Some(&6));
    }

    #[test]
    fn manual_expansion() {
        let mut filter = BasicInfiniFilter::with_params(4, 10);
        filter.set_expand_autonomously(false);
        for i in 0..14u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert_eq!(filter.num_expansions(), 0);
        assert!(filter.expand().unwrap());
        assert!(filter.expand().unwrap());
        assert_eq!(filter.power_of_two_size(), 6);
        for i in 0..14u64 {
            assert!(filter.query(&i));
        }
        assert_eq!(filter.age_histogram().get(&2), Some(&14));
    }

    #[test]
    fn void_entries_block_expansion() {
        // 2 bit fingerprints have a single fingerprint bit
        let mut filter = BasicInfiniFilter::with_params(4, 5);
        filter.set_expand_autonomously(false);
        for i in 0..3u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert!(filter.expand().unwrap());
        assert_eq!(filter.num_void_entries(), 3);
        assert_eq!(filter.num_distinct_void_entries(), 3);
        assert_eq!(filter.num_void_entries_by_counting(), 3);
        assert!(filter.is_full());
        assert!(!filter.expand().unwrap());
        assert_eq!(filter.power_of_two_size(), 5);

        for i in 0..3u64 {
            assert!(filter.query(&i));
        }

        assert_eq!(filter.delete(&0u64).unwrap(), Some(filter.empty_fingerprint()));
        assert_eq!(filter.num_void_entries(), 2);
        assert_eq!(len(&filter), 2);
    }

    #[test]
    fn rejuvenate() {
        let mut filter = BasicInfiniFilter::with_params(4, 10);
        filter.set_expand_autonomously(false);
        assert!(filter.insert(&42u64, false).unwrap());
        assert!(filter.expand().unwrap());
        assert!(filter.expand().unwrap());
        assert_eq!(filter.age_histogram().get(&2), Some(&1));

        assert!(filter.rejuvenate(&42u64).unwrap());
        assert_eq!(filter.age_histogram().get(&0), Some(&1));
        assert!(filter.query(&42u64));

        // rejuvenating a fresh entry changes nothing
        assert!(filter.rejuvenate(&42u64).unwrap());
        assert_eq!(filter.age_histogram().get(&0), Some(&1));
        assert!(filter.query(&42u64));
        assert_eq!(len(&filter), 1);
        assert_eq!(filter.table().num_physical_entries(), 1);

        assert!(!filter.rejuvenate(&43u64).unwrap());
    }

    #[test]
    fn rejuvenate_void_entry() {
        let mut filter = BasicInfiniFilter::with_params(4, 5);
        filter.set_expand_autonomously(false);
        assert!(filter.insert(&42u64, false).unwrap());
        assert!(filter.expand().unwrap());
        assert_eq!(filter.num_void_entries(), 1);

        assert!(filter.rejuvenate(&42u64).unwrap());
        assert_eq!(filter.num_void_entries(), 0);
        assert!(!filter.is_full());
        assert!(filter.query(&42u64));
    }

    #[test]
    fn widen() {
        let mut filter = BasicInfiniFilter::with_params(4, 8);
        filter.set_expand_autonomously(false);
        for i in 0..10u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert!(filter.widen().unwrap());
        assert_eq!(filter.fingerprint_length(), 6);
        assert_eq!(filter.power_of_two_size(), 4);
        assert_eq!(filter.empty_fingerprint(), 0b111110);
        assert_eq!(filter.age_histogram().get(&1), Some(&10));
        for i in 0..10u64 {
            assert!(filter.query(&i));
        }

        assert!(filter.insert(&100u64, false).unwrap());
        assert_eq!(filter.age_histogram().get(&0), Some(&1));
        assert!(filter.query(&100u64));
    }

    #[test]
    fn polynomial_growth() {
        let mut filter = BasicInfiniFilter::with_params(4, 8);
        filter.set_growth_strategy(GrowthStrategy::Polynomial);
        filter.set_expand_autonomously(false);
        assert!(filter.insert(&1u64, false).unwrap());
        assert!(filter.expand().unwrap());
        assert_eq!(filter.fingerprint_length(), 5);
        assert!(filter.expand().unwrap());
        assert_eq!(filter.fingerprint_length(), 7);
        assert!(filter.expand().unwrap());
        assert_eq!(filter.fingerprint_length(), 9);
        assert!(filter.query(&1u64));
        assert_eq!(filter.growth_strategy(), GrowthStrategy::Polynomial);
    }

    #[test]
    fn expansions_estimate() {
        let mut filter =
            BasicInfiniFilter::with_expansions_estimate(4, 8, 3, XxHashBuilder::default());
        filter.set_expand_autonomously(false);
        assert_eq!(filter.growth_strategy(), GrowthStrategy::PolynomialShrink);
        assert_eq!(filter.fingerprint_length(), 9);
        assert!(filter.insert(&1u64, false).unwrap());

        let mut lengths = vec![];
        for _ in 0..4 {
            assert!(filter.expand().unwrap());
            lengths.push(filter.fingerprint_length());
        }
        assert_eq!(lengths, vec![9, 9, 8, 7]);
        assert!(filter.query(&1u64));
    }

    #[test]
    fn no_false_negatives() {
        let keys = random_keys(1, 2_000);
        let mut filter = BasicInfiniFilter::with_params(5, 12);
        for k in &keys {
            assert!(filter.insert(k, false).unwrap());
        }
        assert_eq!(filter.num_expansions(), 7);
        assert_eq!(filter.num_void_entries(), 0);
        for k in &keys {
            assert!(filter.query(k));
        }

        for k in &keys[..1_000] {
            assert!(filter.delete(k).unwrap().is_some());
        }
        assert_eq!(len(&filter), 1_000);
        assert_eq!(filter.table().num_physical_entries(), 1_000);
        for k in &keys[1_000..] {
            assert!(filter.query(k));
        }
    }

    #[test]
    fn false_positive_rate() {
        let mut filter = BasicInfiniFilter::with_params(10, 14);
        for i in 0..500u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        let false_positives = (500..100_500u64).filter(|i| filter.query(i)).count();
        let rate = false_positives as f64 / 100_000.0;
        // ~0.5 fingerprints of 10 bits per query
        assert!(rate < 2.0 / 1024.0, "false positive rate {}", rate);
    }

    #[test]
    fn clear() {
        let mut filter = BasicInfiniFilter::with_params(3, 8);
        for i in 0..20u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        ApproximateSet::<u64>::clear(&mut filter);
        assert_eq!(len(&filter), 0);
        assert_eq!(filter.table().num_physical_entries(), 0);
        assert_eq!(filter.power_of_two_size(), 5);
        assert!(!filter.query(&1u64));
    }

    #[test]
    fn clone() {
        let mut filter1 = BasicInfiniFilter::with_params(3, 8);
        assert!(filter1.insert(&1u64, false).unwrap());
        let mut filter2 = filter1.clone();
        assert!(filter2.insert(&2u64, false).unwrap());
        assert!(filter2.expand().unwrap());
        assert_eq!(len(&filter1), 1);
        assert_eq!(filter1.power_of_two_size(), 3);
        assert_eq!(len(&filter2), 2);
        assert_eq!(filter2.power_of_two_size(), 4);
        assert!(filter2.query(&1u64));
    }

    #[test]
    fn bits_per_entry() {
        let mut filter = BasicInfiniFilter::with_params(3, 8);
        filter.set_expand_autonomously(false);
        for i in 0..2u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert_eq!(ApproximateSet::<u64>::measure_num_bits_per_entry(&filter), 56.0);
    }

    #[test]
    fn debug() {
        let filter = BasicInfiniFilter::with_params(3, 8);
        assert_eq!(
            format!("{:?}", filter),
            "BasicInfiniFilter { power_of_two_size: 3, fingerprint_length: 5, num_expansions: 0 }"
        );
    }

    #[test]
    fn send() {
        let filter = BasicInfiniFilter::with_params(3, 8);
        assert_send(&filter);
    }
}
