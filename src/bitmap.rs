//! Packed bit storage used by the slot tables.
use std::fmt;

use succinct::{BitVec, BitVecMut, BitVector};

/// Fixed-size, zero-initialized array of bits with single-bit and bit-range access.
///
/// Ranges are given as inclusive `[from, to]` bit positions and may cross 64-bit word boundaries.
/// A single range can hold at most 64 bits.
///
/// # Examples
/// ```
/// use infinifilter::bitmap::Bitmap;
///
/// let mut bits = Bitmap::new(100);
/// bits.set_range(60, 67, 0xa5);
/// assert_eq!(bits.get_range(60, 67), 0xa5);
/// assert!(bits.get(60));
/// assert!(!bits.get(61));
/// ```
#[derive(Clone)]
pub struct Bitmap {
    bits: BitVector<u64>,
}

impl Bitmap {
    /// Create a bitmap that holds `len` bits, all set to `false`.
    pub fn new(len: u64) -> Self {
        Self {
            bits: BitVector::with_fill(len, false),
        }
    }

    /// Number of bits.
    pub fn size(&self) -> u64 {
        self.bits.bit_len()
    }

    /// Read bit at `position`.
    pub fn get(&self, position: u64) -> bool {
        self.bits.get_bit(position)
    }

    /// Write bit at `position`.
    pub fn set(&mut self, position: u64, value: bool) {
        self.bits.set_bit(position, value);
    }

    /// Read bits `[from, to]` as an integer, `from` being the least significant bit.
    pub fn get_range(&self, from: u64, to: u64) -> u64 {
        debug_assert!(from <= to && to - from < 64);
        self.bits.get_bits(from, (to - from + 1) as usize)
    }

    /// Write the low `to - from + 1` bits of `value` into `[from, to]`.
    pub fn set_range(&mut self, from: u64, to: u64, value: u64) {
        debug_assert!(from <= to && to - from < 64);
        let count = (to - from + 1) as usize;
        let value = if count == 64 {
            value
        } else {
            value & ((1 << count) - 1)
        };
        self.bits.set_bits(from, count, value);
    }

    /// Reset all bits to `false`.
    pub fn clear(&mut self) {
        self.bits = BitVector::with_fill(self.size(), false);
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap {{ size: {} }}", self.size())
    }
}
