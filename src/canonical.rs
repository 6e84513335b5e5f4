//! Canonical serialization for topology and config fingerprints.
//!
//! Two loads of the same configuration must produce the same fingerprint,
//! whatever order the source listed nodes and segments in. Callers sort
//! before hashing; this module only guarantees the byte encoding is stable.
//!
//! - Struct fields serialize in declaration order
//! - Maps in hashed data must be `BTreeMap`

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
///
/// Serializing owned, derive-based data to JSON cannot fail; a failure here
/// means a non-string map key slipped into hashed data.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_determinism() {
        let mut map = BTreeMap::new();
        map.insert("V2", 1);
        map.insert("V1", 2);
        assert_eq!(canonical_hash(&map), canonical_hash(&map.clone()));
        assert_eq!(canonical_hash_hex(&map).len(), 16);
    }
}
