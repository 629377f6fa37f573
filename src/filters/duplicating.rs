//! InfiniFilter that keeps void entries alive across expansions.
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;

use crate::filters::growth::GrowthStrategy;
use crate::filters::infinifilter::{BasicInfiniFilter, VoidPolicy, tombstone_fingerprint};
use crate::filters::{ApproximateSet, ChainAware, FilterError, Growable};
use crate::hash_utils::XxHashBuilder;

/// How the duplicates of a void entry are removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DuplicateRemoval {
    /// All duplicates still carry the void fingerprint.
    Delete,
    /// The duplicate in the canonical slot was turned into a tombstone.
    LazyDelete,
    /// The duplicate in the canonical slot was replaced by a fresh fingerprint and stays.
    Rejuvenate,
}

/// Deferred operations, resolved in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingQueue {
    NewDeletes,
    VoidDeletes,
    Rejuvenations,
}

/// Auxiliary filter that recorded a void entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Holder {
    Secondary,
    Chain(usize),
}

/// InfiniFilter that expands through void entries.
///
/// A [`BasicInfiniFilter`] stops expanding once an entry runs out of fingerprint bits. This filter
/// instead places a copy of every void entry into both slots it could belong to after an
/// expansion, so a void entry created `age` expansions ago occupies `2^age` slots:
///
/// ```text
/// power_of_two_size = 5: void entry in slot 0b11101
/// expand            ->   slots 0b011101, 0b111101
/// expand            ->   slots 0b0011101, 0b0111101, 0b1011101, 0b1111101
/// ```
///
/// All duplicates have to go when the element is deleted. To find them, the canonical slot of every
/// new void entry is recorded in a secondary [`BasicInfiniFilter`], keyed by the slot address. The
/// number of address bits a record still knows tells when the void entry was created and hence how
/// many duplicates exist. A secondary that gets too full is either expanded or retired into a
/// chain of older auxiliary filters and replaced by a fresh one.
///
/// Deletes and rejuvenations of void entries may be deferred (see
/// [`set_lazy_void_deletes`](Self::set_lazy_void_deletes)): the void entry in the canonical slot
/// is replaced by a tombstone and the remaining duplicates are removed by
/// [`resolve_pending_operations`](ChainAware::resolve_pending_operations), which every expansion
/// and widening calls first. Deletes of other entries can be deferred the same way
/// ([`set_lazy_new_deletes`](Self::set_lazy_new_deletes)).
///
/// # Examples
/// ```
/// use infinifilter::filters::{ApproximateSet, ChainAware, Growable};
/// use infinifilter::filters::duplicating::DuplicatingChainedInfiniFilter;
///
/// // 2 bit fingerprints: entries turn void after a single expansion
/// let mut filter = DuplicatingChainedInfiniFilter::with_params(4, 5, false, None);
/// filter.set_expand_autonomously(false);
/// filter.insert(&"foo", false).unwrap();
///
/// filter.expand().unwrap();
/// filter.expand().unwrap();
/// assert!(filter.query(&"foo"));
/// assert_eq!(filter.num_distinct_void_entries(), 1);
/// assert_eq!(filter.base().num_void_entries(), 2);
///
/// filter.delete(&"foo").unwrap();
/// assert!(!filter.query(&"foo"));
/// assert_eq!(filter.base().table().num_physical_entries(), 0);
/// ```
#[derive(Clone)]
pub struct DuplicatingChainedInfiniFilter<B = XxHashBuilder>
where
    B: BuildHasher + Clone,
{
    base: BasicInfiniFilter<B>,
    secondary: Option<BasicInfiniFilter<B>>,
    chain: Vec<BasicInfiniFilter<B>>,
    n_logical: usize,
    expand_autonomously: bool,
    lazy_void_deletes: bool,
    lazy_new_deletes: bool,
    deleted_void_fingerprint: u64,
    deleted_void_entries: Vec<usize>,
    rejuvenated_void_entries: Vec<usize>,
    deleted_new_entries: Vec<usize>,
}

impl DuplicatingChainedInfiniFilter {
    /// Create new filter with:
    ///
    /// - `power_of_two_size`: number of bits used for addressing, aka `2^power_of_two_size` slots
    ///   (plus `2 * power_of_two_size` extension slots) will be allocated initially
    /// - `bits_per_entry`: number of bits per slot, the fingerprint gets `bits_per_entry - 3` of
    ///   them
    /// - `lazy_void_deletes`: defer removing the duplicates of deleted void entries
    /// - `expansions_estimate`: expected number of expansions; `Some` selects
    ///   [`GrowthStrategy::PolynomialShrink`] and starts with longer fingerprints
    ///
    /// and a default hasher.
    pub fn with_params(
        power_of_two_size: usize,
        bits_per_entry: usize,
        lazy_void_deletes: bool,
        expansions_estimate: Option<usize>,
    ) -> Self {
        Self::with_params_and_hash(
            power_of_two_size,
            bits_per_entry,
            lazy_void_deletes,
            expansions_estimate,
            XxHashBuilder::default(),
        )
    }
}

impl<B> DuplicatingChainedInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    /// Same as [`with_params`](DuplicatingChainedInfiniFilter::with_params), but with a custom
    /// hash implementation.
    pub fn with_params_and_hash(
        power_of_two_size: usize,
        bits_per_entry: usize,
        lazy_void_deletes: bool,
        expansions_estimate: Option<usize>,
        buildhasher: B,
    ) -> Self {
        let mut base = match expansions_estimate {
            Some(estimate) => BasicInfiniFilter::with_expansions_estimate(
                power_of_two_size,
                bits_per_entry,
                estimate,
                buildhasher,
            ),
            None => BasicInfiniFilter::with_params_and_hash(
                power_of_two_size,
                bits_per_entry,
                buildhasher,
            ),
        };
        base.set_expand_autonomously(false);
        let deleted_void_fingerprint = tombstone_fingerprint(base.fingerprint_length());

        Self {
            base,
            secondary: None,
            chain: vec![],
            n_logical: 0,
            expand_autonomously: true,
            lazy_void_deletes,
            lazy_new_deletes: false,
            deleted_void_fingerprint,
            deleted_void_entries: vec![],
            rejuvenated_void_entries: vec![],
            deleted_new_entries: vec![],
        }
    }

    /// Filter holding the elements.
    pub fn base(&self) -> &BasicInfiniFilter<B> {
        &self.base
    }

    /// Auxiliary filter recording new void entries, if any void entry was created yet.
    pub fn secondary(&self) -> Option<&BasicInfiniFilter<B>> {
        self.secondary.as_ref()
    }

    /// Retired auxiliary filters, oldest first.
    pub fn chain(&self) -> &[BasicInfiniFilter<B>] {
        &self.chain
    }

    /// Fingerprint that marks entries whose removal is deferred.
    pub fn deleted_void_fingerprint(&self) -> u64 {
        self.deleted_void_fingerprint
    }

    /// `true` if removing duplicates of deleted void entries is deferred.
    pub fn lazy_void_deletes(&self) -> bool {
        self.lazy_void_deletes
    }

    /// `true` if removing deleted non-void entries is deferred.
    pub fn lazy_new_deletes(&self) -> bool {
        self.lazy_new_deletes
    }

    /// Defer removing the duplicates of deleted void entries. Resolves pending operations first.
    pub fn set_lazy_void_deletes(&mut self, value: bool) -> Result<(), FilterError> {
        self.resolve_pending_operations()?;
        self.lazy_void_deletes = value;
        Ok(())
    }

    /// Defer removing deleted non-void entries. Resolves pending operations first.
    pub fn set_lazy_new_deletes(&mut self, value: bool) -> Result<(), FilterError> {
        self.resolve_pending_operations()?;
        self.lazy_new_deletes = value;
        Ok(())
    }

    /// Enable or disable expanding on insertion.
    pub fn set_expand_autonomously(&mut self, value: bool) {
        self.expand_autonomously = value;
    }

    /// Set the fraction of addressable slots that may be filled, must be in `(0, 1]`.
    pub fn set_expansion_threshold(&mut self, threshold: f64) {
        self.base.set_expansion_threshold(threshold);
    }

    /// Replace the fingerprint growth strategy.
    pub fn set_growth_strategy(&mut self, strategy: GrowthStrategy) {
        self.base.set_growth_strategy(strategy);
    }

    /// Independent deep copy, including auxiliary filters and pending operations.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Insert an element given by its 64-bit hash.
    pub fn insert_hash(
        &mut self,
        hash: u64,
        insert_only_if_absent: bool,
    ) -> Result<bool, FilterError> {
        let (slot, fingerprint) = self.base.split(hash);
        if insert_only_if_absent && self.base.search_hash(hash) {
            return Ok(false);
        }
        if !self.base.table_mut().insert(fingerprint, slot) {
            return Ok(false);
        }
        self.n_logical += 1;

        if self.expand_autonomously
            && self.base.table().num_physical_entries() >= self.base.max_entries_before_expansion()
        {
            self.expand()?;
        }
        Ok(true)
    }

    /// Check for an element given by its 64-bit hash.
    pub fn search_hash(&self, hash: u64) -> bool {
        self.base.search_hash(hash)
    }

    /// Delete the youngest entry matching an element given by its 64-bit hash.
    ///
    /// Deleting a void entry removes all of its duplicates, unless void deletes are lazy.
    pub fn delete_hash(&mut self, hash: u64) -> Result<Option<u64>, FilterError> {
        let (slot, fingerprint) = self.base.split(hash);
        let table = self.base.table();
        if slot >= table.logical_num_slots() || !table.is_occupied(slot) {
            return Ok(None);
        }
        let run_start = table.find_run_start(slot);
        let Some(matching) = self.base.find_youngest_match(run_start, fingerprint) else {
            return Ok(None);
        };
        let removed = table.get_fingerprint(matching);

        if removed == self.base.empty_fingerprint() {
            if self.lazy_void_deletes {
                self.base
                    .table_mut()
                    .set_fingerprint(matching, self.deleted_void_fingerprint);
                self.deleted_void_entries.push(slot);
            } else {
                self.delete_duplicates(slot, DuplicateRemoval::Delete)?;
            }
        } else if self.lazy_new_deletes {
            self.base
                .table_mut()
                .set_fingerprint(matching, self.deleted_void_fingerprint);
            self.deleted_new_entries.push(slot);
        } else {
            self.base.table_mut().delete_at(slot, run_start, matching);
        }

        self.n_logical = self.n_logical.saturating_sub(1);
        Ok(Some(removed))
    }

    /// Replace the youngest entry matching an element given by its 64-bit hash with a fresh one.
    ///
    /// Rejuvenating a void entry removes its other duplicates, unless void deletes are lazy.
    pub fn rejuvenate_hash(&mut self, hash: u64) -> Result<bool, FilterError> {
        let (slot, fingerprint) = self.base.split(hash);
        let table = self.base.table();
        if slot >= table.logical_num_slots() || !table.is_occupied(slot) {
            return Ok(false);
        }
        let run_start = table.find_run_start(slot);
        let Some(matching) = self.base.find_youngest_match(run_start, fingerprint) else {
            return Ok(false);
        };

        let previous = self.base.table_mut().swap_fingerprint(matching, fingerprint);
        if previous != self.base.empty_fingerprint() {
            return Ok(true);
        }

        if self.lazy_void_deletes {
            self.rejuvenated_void_entries.push(slot);
        } else {
            self.delete_duplicates(slot, DuplicateRemoval::Rejuvenate)?;
        }
        Ok(true)
    }

    /// Age of the void entry in `slot` according to one auxiliary filter.
    fn void_entry_age_in(&self, filter: &BasicInfiniFilter<B>, slot: usize) -> Option<usize> {
        let (aux_slot, aux_fingerprint) = filter.split(slot as u64);
        let table = filter.table();
        if !table.is_occupied(aux_slot) {
            return None;
        }
        let run_start = table.find_run_start(aux_slot);
        let matching = filter.find_youngest_match(run_start, aux_fingerprint)?;
        let unary_size = filter.age(table.get_fingerprint(matching)) + 1;
        let known_address_bits =
            filter.power_of_two_size() + filter.fingerprint_length() - unary_size;
        self.base
            .power_of_two_size()
            .checked_sub(known_address_bits)
    }

    /// Auxiliary filter with the youngest record of the void entry in `slot`, and the entry's age.
    fn locate_void_record(&self, slot: usize) -> Option<(Holder, usize)> {
        let secondary = self
            .secondary
            .as_ref()
            .and_then(|filter| self.void_entry_age_in(filter, slot))
            .map(|age| (Holder::Secondary, age));
        let chained = self
            .chain
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(i, filter)| {
                self.void_entry_age_in(filter, slot)
                    .map(|age| (Holder::Chain(i), age))
            });

        secondary
            .into_iter()
            .chain(chained)
            .reduce(|best, candidate| if candidate.1 < best.1 { candidate } else { best })
    }

    fn holder_mut(&mut self, holder: Holder) -> Option<&mut BasicInfiniFilter<B>> {
        match holder {
            Holder::Secondary => self.secondary.as_mut(),
            Holder::Chain(i) => self.chain.get_mut(i),
        }
    }

    /// Slots holding the duplicates of the void entry in `slot` together with the fingerprint
    /// expected there. Fails if one of them is missing.
    fn duplicate_targets(
        &self,
        slot: usize,
        age: usize,
        mode: DuplicateRemoval,
    ) -> Result<Vec<(usize, u64)>, FilterError> {
        let spacing = 1usize << (self.base.power_of_two_size() - age);
        let first = slot & (spacing - 1);
        let table = self.base.table();

        let mut targets = Vec::with_capacity(1 << age);
        for i in 0..(1usize << age) {
            let address = first + i * spacing;
            if mode == DuplicateRemoval::Rejuvenate && address == slot {
                continue;
            }
            let target = if mode == DuplicateRemoval::LazyDelete && address == slot {
                self.deleted_void_fingerprint
            } else {
                self.base.empty_fingerprint()
            };

            if !table.is_occupied(address) {
                return Err(FilterError::DuplicateNotFound { slot: address });
            }
            let run_start = table.find_run_start(address);
            if table.find_first_in_run(run_start, |fp| fp == target).is_none() {
                return Err(FilterError::DuplicateNotFound { slot: address });
            }
            targets.push((address, target));
        }
        Ok(targets)
    }

    /// Remove all duplicates of the void entry in `slot` and its record.
    ///
    /// Every duplicate is located before the first one is removed, so an error leaves the filter
    /// unchanged.
    fn delete_duplicates(&mut self, slot: usize, mode: DuplicateRemoval) -> Result<(), FilterError> {
        let (holder, age) = self
            .locate_void_record(slot)
            .ok_or(FilterError::VoidAgeUnknown { slot })?;
        let targets = self.duplicate_targets(slot, age, mode)?;

        let table = self.base.table_mut();
        for (address, target) in targets {
            let run_start = table.find_run_start(address);
            let matching = table
                .find_first_in_run(run_start, |fp| fp == target)
                .ok_or(FilterError::DuplicateNotFound { slot: address })?;
            table.delete_at(address, run_start, matching);
        }
        self.base.remove_void_entries(1 << age, 1);

        if let Some(filter) = self.holder_mut(holder) {
            filter.delete_hash(slot as u64);
        }
        Ok(())
    }

    /// Move the secondary into the chain and start a new one with one more slot bit.
    fn retire_secondary(&mut self) {
        let Some(old) = self.secondary.take() else {
            return;
        };
        let power = (old.power_of_two_size() + 1)
            .min(self.base.power_of_two_size() - 1)
            .max(1);
        self.chain.push(old);
        self.secondary = Some(self.new_auxiliary_filter(power));
    }

    fn new_auxiliary_filter(&self, power_of_two_size: usize) -> BasicInfiniFilter<B> {
        let fingerprint_length = self.base.power_of_two_size() + 1 - power_of_two_size;
        let mut filter = BasicInfiniFilter::with_params_and_hash(
            power_of_two_size,
            fingerprint_length + 3,
            self.base.buildhasher().clone(),
        );
        filter.set_expand_autonomously(false);
        filter
    }

    /// Make room in the secondary for another record.
    fn prepare_secondary(&mut self) {
        let Some(secondary) = self.secondary.as_mut() else {
            return;
        };
        if secondary.table().num_physical_entries() <= secondary.max_entries_before_expansion() {
            return;
        }

        let len = secondary.fingerprint_length();
        let lossless = secondary
            .age_histogram()
            .keys()
            .next_back()
            .is_none_or(|&age| age + 2 < len);
        if !(len > 2 && lossless && secondary.expand_to(len - 1)) {
            self.retire_secondary();
        }
    }

    /// Lengthen the secondary's fingerprints until fresh records keep every address bit.
    fn widen_secondary(&mut self) -> bool {
        let target = self.base.power_of_two_size();
        let Some(secondary) = self.secondary.as_mut() else {
            return false;
        };
        while secondary.power_of_two_size() + secondary.fingerprint_length() - 1 < target {
            if !secondary.widen_fingerprints() {
                return false;
            }
        }
        true
    }

    /// Record a void entry created by the last expansion.
    fn record_void_entry(&mut self, slot: usize) -> Result<(), FilterError> {
        if self.secondary.is_none() {
            let power = self.base.power_of_two_size();
            let expansions = self.base.num_expansions();
            let secondary_power = power.saturating_sub(expansions).clamp(1, power - 1);
            self.secondary = Some(self.new_auxiliary_filter(secondary_power));
        }

        self.prepare_secondary();
        if !self.widen_secondary() {
            self.retire_secondary();
        }

        for _ in 0..2 {
            let recorded = self
                .secondary
                .as_mut()
                .is_some_and(|secondary| secondary.insert_hash(slot as u64, false));
            if recorded {
                return Ok(());
            }
            self.retire_secondary();
        }
        Err(FilterError::AuxiliaryFilterOverflow { slot })
    }

    /// Double the number of slots, duplicating void entries.
    fn expand_with_duplicates(&mut self) -> Result<bool, FilterError> {
        self.resolve_pending_operations()?;

        let new_fingerprint_length = self.base.next_fingerprint_length();
        let Some(report) = self.base.grow(new_fingerprint_length, VoidPolicy::Duplicate) else {
            return Ok(false);
        };
        self.base.add_void_entries(report.duplicated_voids, 0);
        for slot in report.new_void_slots {
            self.record_void_entry(slot)?;
            self.base.add_void_entries(1, 1);
        }
        self.base.note_expansion();
        self.deleted_void_fingerprint = tombstone_fingerprint(self.base.fingerprint_length());
        Ok(true)
    }

    fn delete_new_entry_tombstone(&mut self, slot: usize) -> Result<(), FilterError> {
        let tombstone = self.deleted_void_fingerprint;
        let table = self.base.table_mut();
        let found = if table.is_occupied(slot) {
            let run_start = table.find_run_start(slot);
            table
                .find_first_in_run(run_start, |fp| fp == tombstone)
                .map(|matching| (run_start, matching))
        } else {
            None
        };
        let (run_start, matching) = found.ok_or(FilterError::TombstoneNotFound { slot })?;
        table.delete_at(slot, run_start, matching);
        Ok(())
    }

    fn queue_mut(&mut self, queue: PendingQueue) -> &mut Vec<usize> {
        match queue {
            PendingQueue::NewDeletes => &mut self.deleted_new_entries,
            PendingQueue::VoidDeletes => &mut self.deleted_void_entries,
            PendingQueue::Rejuvenations => &mut self.rejuvenated_void_entries,
        }
    }

    /// Carry out the operations of one queue. On failure the failed slot and all following ones
    /// stay queued.
    fn resolve_queue(&mut self, queue: PendingQueue) -> Result<(), FilterError> {
        let slots = mem::take(self.queue_mut(queue));
        for (i, &slot) in slots.iter().enumerate() {
            let result = match queue {
                PendingQueue::NewDeletes => self.delete_new_entry_tombstone(slot),
                PendingQueue::VoidDeletes => {
                    self.delete_duplicates(slot, DuplicateRemoval::LazyDelete)
                }
                PendingQueue::Rejuvenations => {
                    self.delete_duplicates(slot, DuplicateRemoval::Rejuvenate)
                }
            };
            if let Err(e) = result {
                self.queue_mut(queue).extend_from_slice(&slots[i..]);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<T, B> ApproximateSet<T> for DuplicatingChainedInfiniFilter<B>
where
    T: Hash + ?Sized,
    B: BuildHasher + Clone,
{
    type Err = FilterError;

    fn clear(&mut self) {
        ApproximateSet::<T>::clear(&mut self.base);
        self.secondary = None;
        self.chain.clear();
        self.n_logical = 0;
        self.deleted_void_entries.clear();
        self.rejuvenated_void_entries.clear();
        self.deleted_new_entries.clear();
    }

    fn insert(&mut self, obj: &T, insert_only_if_absent: bool) -> Result<bool, Self::Err> {
        let hash = self.base.hash(obj);
        self.insert_hash(hash, insert_only_if_absent)
    }

    fn query(&self, obj: &T) -> bool {
        self.search_hash(self.base.hash(obj))
    }

    fn delete(&mut self, obj: &T) -> Result<Option<u64>, Self::Err> {
        let hash = self.base.hash(obj);
        self.delete_hash(hash)
    }

    fn rejuvenate(&mut self, obj: &T) -> Result<bool, Self::Err> {
        let hash = self.base.hash(obj);
        self.rejuvenate_hash(hash)
    }

    fn len(&self) -> usize {
        self.n_logical
    }

    /// Counts the bits of the auxiliary filters as well.
    fn measure_num_bits_per_entry(&self) -> f64 {
        let auxiliary: u64 = self
            .secondary
            .iter()
            .chain(self.chain.iter())
            .map(|filter| filter.table().num_bits())
            .sum();
        (self.base.table().num_bits() + auxiliary) as f64 / self.n_logical as f64
    }
}

impl<B> Growable for DuplicatingChainedInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    type Err = FilterError;

    fn expand(&mut self) -> Result<bool, Self::Err> {
        self.expand_with_duplicates()
    }

    fn widen(&mut self) -> Result<bool, Self::Err> {
        self.resolve_pending_operations()?;
        if !self.base.widen_fingerprints() {
            return Ok(false);
        }
        self.deleted_void_fingerprint = tombstone_fingerprint(self.base.fingerprint_length());
        Ok(true)
    }

    /// Void entries never block expansion here.
    fn is_full(&self) -> bool {
        false
    }

    fn num_expansions(&self) -> usize {
        self.base.num_expansions()
    }
}

impl<B> ChainAware for DuplicatingChainedInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    fn resolve_pending_operations(&mut self) -> Result<(), FilterError> {
        self.resolve_queue(PendingQueue::NewDeletes)?;
        self.resolve_queue(PendingQueue::VoidDeletes)?;
        self.resolve_queue(PendingQueue::Rejuvenations)
    }

    fn num_pending_operations(&self) -> usize {
        self.deleted_new_entries.len()
            + self.deleted_void_entries.len()
            + self.rejuvenated_void_entries.len()
    }

    fn chain_len(&self) -> usize {
        self.chain.len()
    }

    fn num_distinct_void_entries(&self) -> usize {
        self.base.num_distinct_void_entries()
    }
}

impl<B> fmt::Debug for DuplicatingChainedInfiniFilter<B>
where
    B: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DuplicatingChainedInfiniFilter {{ power_of_two_size: {}, fingerprint_length: {}, num_expansions: {}, chain_len: {} }}",
            self.base.power_of_two_size(),
            self.base.fingerprint_length(),
            self.base.num_expansions(),
            self.chain.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::DuplicatingChainedInfiniFilter;
    use crate::filters::growth::GrowthStrategy;
    use crate::filters::{ApproximateSet, ChainAware, FilterError, Growable};
    use crate::test_util::{assert_send, random_keys};

    fn len(filter: &DuplicatingChainedInfiniFilter) -> usize {
        ApproximateSet::<u64>::len(filter)
    }

    fn physical(filter: &DuplicatingChainedInfiniFilter) -> usize {
        filter.base().table().num_physical_entries()
    }

    /// 3 bit fingerprints, hash 29 lands in slot 5 and turns void after two expansions.
    fn with_void_entry(lazy_void_deletes: bool) -> DuplicatingChainedInfiniFilter {
        let mut filter = DuplicatingChainedInfiniFilter::with_params(3, 6, lazy_void_deletes, None);
        filter.set_expand_autonomously(false);
        assert!(filter.insert_hash(29, false).unwrap());
        assert!(filter.expand().unwrap());
        assert!(filter.expand().unwrap());
        filter
    }

    #[test]
    fn new() {
        let filter = DuplicatingChainedInfiniFilter::with_params(3, 8, false, None);
        assert_eq!(filter.base().power_of_two_size(), 3);
        assert_eq!(filter.base().fingerprint_length(), 5);
        assert_eq!(filter.deleted_void_fingerprint(), 0b11111);
        assert!(filter.secondary().is_none());
        assert_eq!(filter.chain_len(), 0);
        assert_eq!(filter.num_pending_operations(), 0);
        assert!(!filter.lazy_void_deletes());
        assert!(!filter.lazy_new_deletes());
        assert!(!filter.is_full());
        assert_eq!(len(&filter), 0);
    }

    #[test]
    fn expansions_estimate() {
        let filter = DuplicatingChainedInfiniFilter::with_params(4, 8, true, Some(3));
        assert_eq!(filter.base().fingerprint_length(), 9);
        assert_eq!(
            filter.base().growth_strategy(),
            GrowthStrategy::PolynomialShrink
        );
        assert!(filter.lazy_void_deletes());
    }

    #[test]
    fn void_entry_is_recorded() {
        let filter = with_void_entry(false);
        assert_eq!(filter.base().power_of_two_size(), 5);
        assert_eq!(filter.base().num_void_entries(), 1);
        assert_eq!(filter.num_distinct_void_entries(), 1);
        assert_eq!(physical(&filter), 1);
        assert!(filter.search_hash(29));

        let secondary = filter.secondary().unwrap();
        assert_eq!(secondary.power_of_two_size(), 4);
        assert_eq!(secondary.fingerprint_length(), 2);
        assert_eq!(secondary.table().num_physical_entries(), 1);
        assert!(secondary.table().is_occupied(13));
    }

    #[test]
    fn void_entry_is_duplicated() {
        let mut filter = with_void_entry(false);
        assert!(filter.expand().unwrap());
        assert_eq!(filter.num_expansions(), 3);
        assert_eq!(filter.base().power_of_two_size(), 6);
        assert_eq!(physical(&filter), 2);
        assert_eq!(filter.base().num_void_entries(), 2);
        assert_eq!(filter.base().num_void_entries_by_counting(), 2);
        assert_eq!(filter.num_distinct_void_entries(), 1);
        assert!(filter.search_hash(29));
        assert!(filter.search_hash(61));

        assert_eq!(filter.delete_hash(29).unwrap(), Some(0b110));
        assert_eq!(physical(&filter), 0);
        assert_eq!(filter.base().num_void_entries(), 0);
        assert_eq!(filter.num_distinct_void_entries(), 0);
        assert_eq!(filter.secondary().unwrap().table().num_physical_entries(), 0);
        assert!(!filter.search_hash(29));
        assert!(!filter.search_hash(61));
        assert_eq!(len(&filter), 0);
    }

    #[test]
    fn lazy_void_delete() {
        let mut filter = with_void_entry(true);
        assert!(filter.expand().unwrap());

        assert_eq!(filter.delete_hash(29).unwrap(), Some(0b110));
        assert_eq!(filter.num_pending_operations(), 1);
        assert_eq!(physical(&filter), 2);
        assert!(!filter.search_hash(29));
        assert!(filter.search_hash(61));
        assert_eq!(len(&filter), 0);

        filter.resolve_pending_operations().unwrap();
        assert_eq!(filter.num_pending_operations(), 0);
        assert_eq!(physical(&filter), 0);
        assert_eq!(filter.base().num_void_entries(), 0);
        assert!(!filter.search_hash(61));
    }

    #[test]
    fn expansion_resolves_pending_operations() {
        let mut filter = with_void_entry(true);
        assert_eq!(filter.delete_hash(29).unwrap(), Some(0b110));
        assert_eq!(filter.num_pending_operations(), 1);

        assert!(filter.expand().unwrap());
        assert_eq!(filter.num_pending_operations(), 0);
        assert_eq!(physical(&filter), 0);
        assert_eq!(filter.deleted_void_fingerprint(), 0b111);
    }

    #[test]
    fn rejuvenate_void_entry() {
        let mut filter = with_void_entry(false);
        assert!(filter.expand().unwrap());

        assert!(filter.rejuvenate_hash(29).unwrap());
        assert_eq!(physical(&filter), 1);
        assert_eq!(filter.base().num_void_entries(), 0);
        assert_eq!(filter.num_distinct_void_entries(), 0);
        assert_eq!(filter.base().age_histogram().get(&0), Some(&1));
        assert!(filter.search_hash(29));
        assert!(!filter.search_hash(61));
        assert_eq!(len(&filter), 1);
    }

    #[test]
    fn lazy_rejuvenate_void_entry() {
        let mut filter = with_void_entry(true);
        assert!(filter.expand().unwrap());

        assert!(filter.rejuvenate_hash(29).unwrap());
        assert_eq!(filter.num_pending_operations(), 1);
        assert_eq!(physical(&filter), 2);

        filter.resolve_pending_operations().unwrap();
        assert_eq!(physical(&filter), 1);
        assert!(filter.search_hash(29));
        assert!(!filter.search_hash(61));
    }

    #[test]
    fn rejuvenate_missing() {
        let mut filter = with_void_entry(false);
        assert!(!filter.rejuvenate_hash(30).unwrap());
    }

    #[test]
    fn lazy_new_deletes() {
        let mut filter = DuplicatingChainedInfiniFilter::with_params(6, 16, false, None);
        filter.set_lazy_new_deletes(true).unwrap();
        for i in 0..10u64 {
            assert!(filter.insert(&i, false).unwrap());
        }

        assert!(filter.delete(&3u64).unwrap().is_some());
        assert_eq!(filter.num_pending_operations(), 1);
        assert_eq!(physical(&filter), 10);
        assert!(!filter.query(&3u64));
        assert_eq!(len(&filter), 9);

        filter.resolve_pending_operations().unwrap();
        assert_eq!(physical(&filter), 9);
        for i in (0..10u64).filter(|&i| i != 3) {
            assert!(filter.query(&i));
        }
    }

    #[test]
    fn changing_laziness_resolves() {
        let mut filter = with_void_entry(true);
        assert!(filter.delete_hash(29).unwrap().is_some());
        assert_eq!(filter.num_pending_operations(), 1);

        filter.set_lazy_void_deletes(false).unwrap();
        assert_eq!(filter.num_pending_operations(), 0);
        assert_eq!(physical(&filter), 0);
    }

    #[test]
    fn unknown_void_age() {
        let mut filter = with_void_entry(false);
        assert!(filter.expand().unwrap());
        filter.secondary = None;

        assert_eq!(
            filter.delete_hash(29),
            Err(FilterError::VoidAgeUnknown { slot: 29 })
        );
        assert_eq!(physical(&filter), 2);
        assert_eq!(len(&filter), 1);
    }

    #[test]
    fn missing_duplicate() {
        let mut filter = with_void_entry(false);
        assert!(filter.expand().unwrap());
        assert_eq!(filter.base.table_mut().delete(0b110, 61), Some(0b110));

        assert_eq!(
            filter.delete_hash(29),
            Err(FilterError::DuplicateNotFound { slot: 61 })
        );
        assert_eq!(physical(&filter), 1);
        assert!(filter.search_hash(29));
    }

    #[test]
    fn missing_tombstone() {
        let mut filter = DuplicatingChainedInfiniFilter::with_params(4, 8, false, None);
        filter.deleted_new_entries.push(3);

        assert_eq!(
            filter.resolve_pending_operations(),
            Err(FilterError::TombstoneNotFound { slot: 3 })
        );
        assert_eq!(filter.num_pending_operations(), 1);
    }

    #[test]
    fn widen_keeps_void_entries() {
        let mut filter = DuplicatingChainedInfiniFilter::with_params(4, 5, false, None);
        filter.set_expand_autonomously(false);
        assert!(filter.insert(&1u64, false).unwrap());
        assert!(filter.expand().unwrap());
        assert_eq!(filter.base().num_void_entries(), 1);

        assert!(filter.widen().unwrap());
        assert_eq!(filter.base().fingerprint_length(), 3);
        assert_eq!(filter.base().num_void_entries_by_counting(), 1);
        assert_eq!(filter.deleted_void_fingerprint(), 0b111);
        assert!(filter.query(&1u64));

        assert!(filter.expand().unwrap());
        assert_eq!(physical(&filter), 2);
        assert!(filter.delete(&1u64).unwrap().is_some());
        assert_eq!(physical(&filter), 0);
    }

    #[test]
    fn secondary_retires_into_chain() {
        // 2 bit fingerprints: every entry turns void after one expansion
        let mut filter = DuplicatingChainedInfiniFilter::with_params(5, 5, false, None);
        filter.set_expand_autonomously(false);
        for i in 0..20u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert!(filter.expand().unwrap());
        assert!(filter.expand().unwrap());
        for i in 20..40u64 {
            assert!(filter.insert(&i, false).unwrap());
        }
        assert!(filter.expand().unwrap());

        assert_eq!(filter.chain_len(), 1);
        assert_eq!(filter.chain()[0].power_of_two_size(), 5);
        assert_eq!(filter.chain()[0].fingerprint_length(), 4);
        assert_eq!(filter.secondary().unwrap().power_of_two_size(), 6);
        assert_eq!(filter.secondary().unwrap().fingerprint_length(), 3);
        assert_eq!(filter.num_distinct_void_entries(), 40);
        assert_eq!(filter.base().num_void_entries(), 100);
        assert_eq!(physical(&filter), 100);
        for i in 0..40u64 {
            assert!(filter.query(&i));
        }

        for i in 0..40u64 {
            assert!(filter.delete(&i).unwrap().is_some(), "delete {}", i);
        }
        assert_eq!(physical(&filter), 0);
        assert_eq!(filter.base().num_void_entries(), 0);
        assert_eq!(filter.num_distinct_void_entries(), 0);
        assert_eq!(filter.chain()[0].table().num_physical_entries(), 0);
        assert_eq!(filter.secondary().unwrap().table().num_physical_entries(), 0);
        assert_eq!(len(&filter), 0);
    }

    #[test]
    fn no_false_negatives() {
        let keys = random_keys(2, 3_000);
        let mut filter = DuplicatingChainedInfiniFilter::with_params(4, 8, false, None);
        for k in &keys {
            assert!(filter.insert(k, false).unwrap());
        }
        assert!(filter.num_expansions() >= 8);
        assert!(filter.num_distinct_void_entries() > 0);
        for k in &keys {
            assert!(filter.query(k));
        }

        for k in &keys[..1_500] {
            assert!(filter.delete(k).unwrap().is_some());
        }
        assert_eq!(len(&filter), 1_500);
        for k in &keys[1_500..] {
            assert!(filter.query(k));
        }

        for k in &keys[1_500..] {
            assert!(filter.delete(k).unwrap().is_some());
        }
        assert_eq!(physical(&filter), 0);
        assert_eq!(filter.base().num_void_entries(), 0);
        assert_eq!(filter.num_distinct_void_entries(), 0);
    }

    #[test]
    fn lazy_no_false_negatives() {
        let keys = random_keys(3, 2_000);
        let mut filter = DuplicatingChainedInfiniFilter::with_params(4, 8, true, None);
        filter.set_lazy_new_deletes(true).unwrap();
        for k in &keys[..1_000] {
            assert!(filter.insert(k, false).unwrap());
        }
        for k in &keys[..500] {
            assert!(filter.delete(k).unwrap().is_some());
        }
        assert!(filter.num_pending_operations() > 0);

        // expansions triggered by these inserts resolve the deletes
        for k in &keys[1_000..] {
            assert!(filter.insert(k, false).unwrap());
        }
        for k in &keys[500..] {
            assert!(filter.query(k));
        }
        filter.resolve_pending_operations().unwrap();
        assert_eq!(len(&filter), 1_500);
        for k in &keys[500..] {
            assert!(filter.query(k));
        }
    }

    #[test]
    fn insert_only_if_absent() {
        let mut filter = DuplicatingChainedInfiniFilter::with_params(4, 16, false, None);
        assert!(filter.insert(&"foo", true).unwrap());
        assert!(!filter.insert(&"foo", true).unwrap());
        assert!(filter.insert(&"foo", false).unwrap());
        assert_eq!(ApproximateSet::<&str>::len(&filter), 2);
    }

    #[test]
    fn snapshot() {
        let mut filter = with_void_entry(true);
        assert!(filter.delete_hash(29).unwrap().is_some());

        let mut copy = filter.snapshot();
        filter.resolve_pending_operations().unwrap();
        assert_eq!(physical(&filter), 0);
        assert_eq!(copy.num_pending_operations(), 1);
        assert_eq!(physical(&copy), 1);

        copy.resolve_pending_operations().unwrap();
        assert_eq!(physical(&copy), 0);
    }

    #[test]
    fn clear() {
        let mut filter = with_void_entry(false);
        ApproximateSet::<u64>::clear(&mut filter);
        assert_eq!(len(&filter), 0);
        assert_eq!(physical(&filter), 0);
        assert!(filter.secondary().is_none());
        assert_eq!(filter.num_distinct_void_entries(), 0);
        assert!(!filter.search_hash(29));
    }

    #[test]
    fn bits_per_entry() {
        let filter = with_void_entry(false);
        // (32 + 10) slots * 6 bits + (16 + 8) slots * 5 bits
        assert_eq!(
            ApproximateSet::<u64>::measure_num_bits_per_entry(&filter),
            372.0
        );
    }

    #[test]
    fn debug() {
        let filter = DuplicatingChainedInfiniFilter::with_params(3, 8, false, None);
        assert_eq!(
            format!("{:?}", filter),
            "DuplicatingChainedInfiniFilter { power_of_two_size: 3, fingerprint_length: 5, num_expansions: 0, chain_len: 0 }"
        );
    }

    #[test]
    fn send() {
        let filter = DuplicatingChainedInfiniFilter::with_params(3, 8, false, None);
        assert_send(&filter);
    }
}
