//! Hash-related utils.
use std::hash::{BuildHasher, Hasher};

use xxhash_rust::xxh3::Xxh3;

/// Split a 64-bit digest into a canonical slot and a fingerprint.
///
/// The lowest `power_of_two_size` bits address the slot, the following `fingerprint_length` bits
/// form the fingerprint. All other bits are dropped.
///
/// # Examples
/// ```
/// use infinifilter::hash_utils::split_hash;
///
/// let (slot, fingerprint) = split_hash(0b1011_0110, 4, 3);
/// assert_eq!(slot, 0b0110);
/// assert_eq!(fingerprint, 0b011);
/// ```
pub fn split_hash(hash: u64, power_of_two_size: usize, fingerprint_length: usize) -> (usize, u64) {
    debug_assert!(power_of_two_size + fingerprint_length <= 64);
    let slot = hash & low_mask(power_of_two_size);
    let fingerprint = (hash >> power_of_two_size) & low_mask(fingerprint_length);
    (slot as usize, fingerprint)
}

/// Mask with the lowest `bits` bits set.
pub(crate) fn low_mask(bits: usize) -> u64 {
    if bits >= 64 { u64::MAX } else { (1 << bits) - 1 }
}

/// `BuildHasher` for seeded xxh3 hashers.
///
/// This is the default hasher of all filters in this crate. The digest is stable across
/// processes and platforms, so two filters built with the same seed agree on every element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct XxHashBuilder {
    seed: u64,
}

impl XxHashBuilder {
    /// Create new builder with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed used for every hasher.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl BuildHasher for XxHashBuilder {
    type Hasher = Xxh3;

    fn build_hasher(&self) -> Xxh3 {
        Xxh3::with_seed(self.seed)
    }
}

/// `BuildHasher` for [`IntegerMixHasher`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntegerMixBuilder;

impl BuildHasher for IntegerMixBuilder {
    type Hasher = IntegerMixHasher;

    fn build_hasher(&self) -> IntegerMixHasher {
        IntegerMixHasher::default()
    }
}

/// Cheap deterministic hasher for small integer keys.
///
/// Every 8-byte chunk written is folded into the state through a splitmix64 finalizer, so
/// consecutive integers end up with unrelated slots and fingerprints.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegerMixHasher {
    state: u64,
}

impl Hasher for IntegerMixHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.state = mix64(self.state ^ u64::from_le_bytes(buf));
        }
    }

    fn write_u64(&mut self, i: u64) {
        self.state = mix64(self.state ^ i);
    }
}

/// splitmix64 finalizer.
pub fn mix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::{IntegerMixBuilder, XxHashBuilder, low_mask, mix64, split_hash};
    use std::hash::BuildHasher;

    #[test]
    fn split() {
        let hash = 0xdead_beef_u64;
        let (slot, fp) = split_hash(hash, 8, 12);
        assert_eq!(slot, 0xef);
        assert_eq!(fp, 0xdbe);
    }

    #[test]
    fn split_drops_high_bits() {
        let (slot, fp) = split_hash(u64::MAX, 10, 5);
        assert_eq!(slot, 0x3ff);
        assert_eq!(fp, 0x1f);
    }

    #[test]
    fn split_full_width() {
        let (slot, fp) = split_hash(u64::MAX, 4, 60);
        assert_eq!(slot, 0xf);
        assert_eq!(fp, (1 << 60) - 1);
    }

    #[test]
    fn masks() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(3), 0b111);
        assert_eq!(low_mask(64), u64::MAX);
    }

    #[test]
    fn xxhash_stable() {
        let bh = XxHashBuilder::default();
        assert_eq!(bh.hash_one(1337u64), bh.hash_one(1337u64));
        assert_ne!(bh.hash_one(1337u64), bh.hash_one(1338u64));
    }

    #[test]
    fn xxhash_seeded() {
        let bh1 = XxHashBuilder::new(1);
        let bh2 = XxHashBuilder::new(2);
        assert_eq!(bh1.seed(), 1);
        assert_ne!(bh1.hash_one("foo"), bh2.hash_one("foo"));
    }

    #[test]
    fn integer_mix_spreads() {
        let bh = IntegerMixBuilder;
        let h0 = bh.hash_one(0u64);
        let h1 = bh.hash_one(1u64);
        assert_ne!(h0, h1);
        assert_eq!(h1, mix64(1));
    }

    #[test]
    fn integer_mix_bytes() {
        let bh = IntegerMixBuilder;
        assert_eq!(bh.hash_one(*b"abc"), bh.hash_one(*b"abc"));
        assert_ne!(bh.hash_one(*b"abc"), bh.hash_one(*b"abd"));
    }
}
