//! # SHA-256 Hashing
//!
//! All chain hashes, body digests, and peer id derivation use SHA-256 with
//! lowercase hex encoding.

use sha2::{Digest, Sha256};

/// Hash bytes with SHA-256, returning the raw 32-byte digest.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash bytes with SHA-256, returning a lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_bytes(data))
}

/// Derive a stable peer id from a coordinator's public URL.
///
/// The id is the first 16 hex characters of `SHA-256(url)`, which is stable
/// across restarts and collision-resistant enough for a mesh of thousands of
/// coordinators.
pub fn derive_peer_id(public_url: &str) -> String {
    sha256_hex(public_url.as_bytes())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // NIST vector for "abc"
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn peer_id_is_stable_and_short() {
        let a = derive_peer_id("https://coord-a.example.org");
        let b = derive_peer_id("https://coord-a.example.org");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, derive_peer_id("https://coord-b.example.org"));
    }
}
