use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

pub(crate) fn assert_send<T>(_: &T)
where
    T: Send,
{
}

/// Distinct pseudo-random keys, reproducible per seed.
pub(crate) fn random_keys(seed: u8, n: usize) -> Vec<u64> {
    let mut rng = ChaChaRng::from_seed([seed; 32]);
    let mut keys = Vec::with_capacity(n);
    let mut seen = std::collections::HashSet::with_capacity(n);
    while keys.len() < n {
        let key: u64 = rng.random();
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}
