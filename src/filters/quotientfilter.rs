//! QuotientFilter implementation.
use std::convert::Infallible;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use crate::filters::ApproximateSet;
use crate::filters::table::{METADATA_BITS, SlotTable};
use crate::hash_utils::{XxHashBuilder, split_hash};

/// Fraction of addressable slots that may be filled before a filter grows.
pub const DEFAULT_FULLNESS_THRESHOLD: f64 = 0.8;

/// A QuotientFilter is a set-like data structure, that keeps track of elements it has seen without
/// the need to store them. Looking up values has a certain false positive rate, but a false
/// negative rate of 0%.
///
/// Every element is hashed to 64 bits. The lowest `power_of_two_size` bits select the canonical
/// slot, the following `bits_per_entry - 3` bits are stored as fingerprint. See
/// [`SlotTable`](crate::filters::table::SlotTable) for the slot layout.
///
/// A plain QuotientFilter cannot grow. Once the number of stored fingerprints reaches the
/// fullness threshold (80% of the addressable slots by default) it marks itself full and rejects
/// all further insertions. Disable this with
/// [`set_expand_autonomously`](Self::set_expand_autonomously) to fill it up to the last extension
/// slot.
///
/// # Examples
/// ```
/// use infinifilter::filters::ApproximateSet;
/// use infinifilter::filters::quotientfilter::QuotientFilter;
///
/// // set up filter
/// let power_of_two_size = 16;
/// let bits_per_entry = 13;
/// let mut filter = QuotientFilter::with_params(power_of_two_size, bits_per_entry);
///
/// // add some data
/// assert!(filter.insert("my super long string", false).unwrap());
///
/// // later
/// assert!(filter.query("my super long string"));
/// assert!(!filter.query("another super long string"));
///
/// // and remove it again
/// assert!(filter.delete("my super long string").unwrap().is_some());
/// assert!(!filter.query("my super long string"));
/// ```
///
/// # Applications
/// - when a lot of data should be added to the set and a moderate false positive rate is
///   acceptable
/// - as a pre-filter for more expensive lookups, e.g. in combination with a real set, map or
///   database, so the final false positive rate is 0%
/// - when elements must also be removed again, which Bloom filters cannot do
///
/// # See Also
/// - [`BasicInfiniFilter`](crate::filters::infinifilter::BasicInfiniFilter): grows instead of
///   filling up
/// - `std::collections::HashSet`: has a false positive rate of 0%, but also needs to store all
///   elements
///
/// # References
/// - ["Don’t Thrash: How to Cache your Hash on Flash" (long version), Michael A. Bender and others, 2012](https://www.vldb.org/pvldb/vol5/p1627_michaelabender_vldb2012.pdf)
/// - [Wikipedia: Quotient Filter](https://en.wikipedia.org/wiki/Quotient_filter)
#[derive(Clone)]
pub struct QuotientFilter<B = XxHashBuilder>
where
    B: BuildHasher + Clone,
{
    table: SlotTable,
    buildhasher: B,
    n_logical: usize,
    expand_autonomously: bool,
    is_full: bool,
    fullness_threshold: f64,
}

impl QuotientFilter {
    /// Create new quotient filter with:
    ///
    /// - `power_of_two_size`: number of bits used for addressing, aka `2^power_of_two_size` slots
    ///   (plus `2 * power_of_two_size` extension slots) will be allocated
    /// - `bits_per_entry`: number of bits per slot, the fingerprint gets `bits_per_entry - 3` of
    ///   them
    ///
    /// and a default hasher.
    pub fn with_params(power_of_two_size: usize, bits_per_entry: usize) -> Self {
        Self::with_params_and_hash(power_of_two_size, bits_per_entry, XxHashBuilder::default())
    }
}

impl<B> QuotientFilter<B>
where
    B: BuildHasher + Clone,
{
    /// Create new quotient filter with:
    ///
    /// - `power_of_two_size`: number of bits used for addressing, aka `2^power_of_two_size` slots
    ///   (plus `2 * power_of_two_size` extension slots) will be allocated
    /// - `bits_per_entry`: number of bits per slot, the fingerprint gets `bits_per_entry - 3` of
    ///   them
    /// - `buildhasher`: hash implementation
    pub fn with_params_and_hash(
        power_of_two_size: usize,
        bits_per_entry: usize,
        buildhasher: B,
    ) -> Self {
        assert!(
            bits_per_entry > METADATA_BITS,
            "bits_per_entry ({}) must be greater than {}",
            bits_per_entry,
            METADATA_BITS,
        );
        Self {
            table: SlotTable::new(power_of_two_size, bits_per_entry - METADATA_BITS),
            buildhasher,
            n_logical: 0,
            expand_autonomously: true,
            is_full: false,
            fullness_threshold: DEFAULT_FULLNESS_THRESHOLD,
        }
    }

    /// Underlying slot table.
    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    /// Number of bits used for addressing slots.
    pub fn power_of_two_size(&self) -> usize {
        self.table.power_of_two_size()
    }

    /// Number of bits stored as fingerprint information.
    pub fn fingerprint_length(&self) -> usize {
        self.table.fingerprint_length()
    }

    /// `true` once the fullness threshold was reached with autonomous expansion enabled.
    pub fn is_full(&self) -> bool {
        self.is_full
    }

    /// Enable or disable the fullness check after every insertion.
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

    /// Number of stored fingerprints at which the filter marks itself full.
    pub fn max_entries_before_expansion(&self) -> usize {
        (self.table.logical_num_slots() as f64 * self.fullness_threshold) as usize
    }

    fn hash<T>(&self, obj: &T) -> u64
    where
        T: Hash + ?Sized,
    {
        self.buildhasher.hash_one(obj)
    }

    fn split(&self, hash: u64) -> (usize, u64) {
        split_hash(
            hash,
            self.table.power_of_two_size(),
            self.table.fingerprint_length(),
        )
    }

    /// Insert an element given by its 64-bit hash.
    pub fn insert_hash(&mut self, hash: u64, insert_only_if_absent: bool) -> bool {
        if self.is_full {
            return false;
        }
        let (slot, fingerprint) = self.split(hash);
        if insert_only_if_absent && self.table.search(fingerprint, slot) {
            return false;
        }
        if !self.table.insert(fingerprint, slot) {
            return false;
        }
        self.n_logical += 1;

        if self.expand_autonomously
            && self.table.num_physical_entries() >= self.max_entries_before_expansion()
        {
            self.is_full = true;
        }
        true
    }

    /// Check for an element given by its 64-bit hash.
    pub fn search_hash(&self, hash: u64) -> bool {
        let (slot, fingerprint) = self.split(hash);
        self.table.search(fingerprint, slot)
    }

    /// Delete an element given by its 64-bit hash.
    pub fn delete_hash(&mut self, hash: u64) -> Option<u64> {
        let (slot, fingerprint) = self.split(hash);
        let removed = self.table.delete(fingerprint, slot)?;
        self.n_logical -= 1;
        Some(removed)
    }
}

impl<T, B> ApproximateSet<T> for QuotientFilter<B>
where
    T: Hash + ?Sized,
    B: BuildHasher + Clone,
{
    type Err = Infallible;

    fn clear(&mut self) {
        self.table.clear();
        self.n_logical = 0;
        self.is_full = false;
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

    fn rejuvenate(&mut self, _obj: &T) -> Result<bool, Self::Err> {
        Ok(false)
    }

    fn len(&self) -> usize {
        self.n_logical
    }

    fn measure_num_bits_per_entry(&self) -> f64 {
        self.table.num_bits() as f64 / self.n_logical as f64
    }
}

impl<B> fmt::Debug for QuotientFilter<B>
where
    B: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuotientFilter {{ power_of_two_size: {}, fingerprint_length: {} }}",
            self.table.power_of_two_size(),
            self.table.fingerprint_length()
        )
    }
}
