//! Filters, Approximate Membership Queries (AMQs).

pub mod duplicating;

pub mod growth;

pub mod infinifilter;

pub mod iterator;

pub mod quotientfilter;

pub mod table;

use std::error;
use std::fmt::{self, Debug};
use std::hash::Hash;

/// A filter is a set-like data structure, that keeps track of elements it has seen without
/// the need to store them. Looking up values has a certain false positive rate, but a false
/// negative rate of 0%.
///
/// This kind of lookup is also referred to as Approximate Membership Queries (AMQs).
///
/// Unlike most filters, the ones in this crate keep a multiset of fingerprints: inserting the same
/// element twice stores two fingerprints (unless `insert_only_if_absent` is set) and it takes two
/// deletes to forget it again.
pub trait ApproximateSet<T>
where
    T: Hash + ?Sized,
{
    /// Error type for structural invariant violations.
    type Err: Debug;

    /// Clear state of the filter, so that it behaves like a fresh one with the current geometry.
    fn clear(&mut self);

    /// Insert new element into the filter.
    ///
    /// Returns `false` if the element was rejected, either because `insert_only_if_absent` is set
    /// and the element is likely already present or because the table ran out of space. A
    /// rejected element leaves the filter unchanged.
    fn insert(&mut self, obj: &T, insert_only_if_absent: bool) -> Result<bool, Self::Err>;

    /// Guess if the given element was added to the filter.
    fn query(&self, obj: &T) -> bool;

    /// Remove one fingerprint matching the element.
    ///
    /// Returns the removed fingerprint or `None` if nothing matched.
    fn delete(&mut self, obj: &T) -> Result<Option<u64>, Self::Err>;

    /// Replace one stored fingerprint of the element by a fresh, full-length one.
    ///
    /// Returns `false` if the element was not found or the filter does not age fingerprints.
    fn rejuvenate(&mut self, obj: &T) -> Result<bool, Self::Err>;

    /// Number of elements inserted minus number of elements deleted.
    fn len(&self) -> usize;

    /// Check if filters is empty, i.e. contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage bits spent per element currently in the filter.
    fn measure_num_bits_per_entry(&self) -> f64;
}

/// A filter that can trade fingerprint bits for slots.
pub trait Growable {
    /// Error type for structural invariant violations.
    type Err: Debug;

    /// Double the number of slots, moving one fingerprint bit into the slot address of every
    /// entry.
    ///
    /// Returns `false` if the filter refuses to grow. In that case nothing changed.
    fn expand(&mut self) -> Result<bool, Self::Err>;

    /// Keep the number of slots but lengthen every fingerprint by one bit.
    ///
    /// Returns `false` if the filter refuses to widen. In that case nothing changed.
    fn widen(&mut self) -> Result<bool, Self::Err>;

    /// `true` if the filter refuses to expand any further.
    fn is_full(&self) -> bool;

    /// Number of successful expansions since construction.
    fn num_expansions(&self) -> usize;
}

/// A filter that keeps void entries alive across expansions by duplicating them and tracks their
/// ages in auxiliary filters.
pub trait ChainAware {
    /// Carry out all deferred deletes and rejuvenations.
    fn resolve_pending_operations(&mut self) -> Result<(), FilterError>;

    /// Number of deferred operations waiting for [`resolve_pending_operations`](Self::resolve_pending_operations).
    fn num_pending_operations(&self) -> usize;

    /// Number of retired auxiliary filters.
    fn chain_len(&self) -> usize;

    /// Number of void entries that stand for different elements (duplicates counted once).
    fn num_distinct_void_entries(&self) -> usize;
}

/// Structural invariant violation of a filter.
///
/// These errors indicate corrupted bookkeeping. The operation that reports one stops before it
/// modifies the slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterError {
    /// No auxiliary filter knows the age of the void entry at `slot`.
    VoidAgeUnknown {
        /// Canonical slot of the void entry.
        slot: usize,
    },
    /// A physical duplicate of a void entry is missing from its expected run.
    DuplicateNotFound {
        /// Canonical slot of the missing duplicate.
        slot: usize,
    },
    /// A deferred delete left no tombstone in the run of `slot`.
    TombstoneNotFound {
        /// Canonical slot of the missing tombstone.
        slot: usize,
    },
    /// A void entry could not be recorded in any auxiliary filter.
    AuxiliaryFilterOverflow {
        /// Canonical slot of the void entry.
        slot: usize,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VoidAgeUnknown { slot } => {
                write!(f, "age of void entry at slot {} is unknown", slot)
            }
            Self::DuplicateNotFound { slot } => {
                write!(f, "duplicate of void entry missing at slot {}", slot)
            }
            Self::TombstoneNotFound { slot } => write!(f, "tombstone missing at slot {}", slot),
            Self::AuxiliaryFilterOverflow { slot } => {
                write!(f, "cannot record void entry at slot {}", slot)
            }
        }
    }
}

impl error::Error for FilterError {}
