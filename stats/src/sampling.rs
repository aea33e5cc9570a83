//! Deterministic key-hash sampling: whether a key falls in a `sample_rate` fraction
//! of the keyspace, without a global RNG or wall-clock seed, so a stats collection
//! run is reproducible given the same data.

/// FNV-1a, chosen only for its simplicity and lack of external dependency; this is a
/// sampling decision, not a security boundary.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// `true` for roughly `rate` of all possible keys, `rate` in `(0, 1]`.
pub fn sampled_in(key: &[u8], rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    let fraction = fnv1a(key) as f64 / u64::MAX as f64;
    fraction < rate
}
