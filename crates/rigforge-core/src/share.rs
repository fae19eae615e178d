//! Share-key generation and collision-checked allocation.
//!
//! A share key is a short public identifier that lets anyone view or import
//! a persisted build without authenticating as its owner.

use rand::Rng;

use crate::store::{BuildStore, StoreError};

/// Length of a public share key.
pub const KEY_LEN: usize = 8;

/// Uppercase letters and digits: 36^8 ≈ 2.8e12 possible keys.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Attempts before allocation gives up and surfaces the collision.
const MAX_ATTEMPTS: usize = 32;

/// Generate a single candidate key.  Uniqueness is not checked here.
pub fn generate_key(rng: &mut impl Rng) -> String {
    (0..KEY_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Allocate a key not assigned to any persisted build at the moment of the
/// check.
///
/// The existence pre-check is an optimization, not the safety mechanism:
/// under concurrent writers the storage layer's uniqueness constraint is
/// what actually guarantees no two builds share a key, and an insert that
/// trips it must surface [`StoreError::ShareKeyCollision`] so the caller
/// can come back here for a fresh key.
pub fn allocate_key(store: &dyn BuildStore) -> Result<String, StoreError> {
    let mut rng = rand::thread_rng();
    for attempt in 0..MAX_ATTEMPTS {
        let key = generate_key(&mut rng);
        if !store.share_key_exists(&key)? {
            return Ok(key);
        }
        log::debug!("share key collision on attempt {attempt}: {key}");
    }
    Err(StoreError::ShareKeyCollision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_eight_chars_from_the_alphabet() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let key = generate_key(&mut rng);
            assert_eq!(key.len(), KEY_LEN);
            assert!(key.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }
}
