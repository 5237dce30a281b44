//! Cryptographically secure random generation.
//!
//! Used for artifact message handles and protocol message identifiers.

use rand::Rng;

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a fixed-size array of cryptographically secure random bytes.
#[must_use]
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut rng = rand::rng();
    let mut bytes = [0u8; N];
    rng.fill(&mut bytes[..]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_bytes_produces_correct_length() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(0).len(), 0);
    }

    #[test]
    fn random_arrays_are_unique() {
        let handles: HashSet<[u8; 20]> = (0..1000).map(|_| random_array::<20>()).collect();
        assert_eq!(handles.len(), 1000);
    }
}
