//! # Task Payload Envelopes
//!
//! Hybrid encryption for subtask payloads targeted at a specific agent:
//! X25519 key agreement against the agent's registered public key, SHA-256 of
//! the shared secret as the symmetric key, XChaCha20-Poly1305 for the AEAD.
//!
//! The coordinator keeps the derived key in [`EnvelopeKeyCache`] keyed by
//! subtask id so the agent's encrypted result can be opened later; entries
//! expire after one hour and are swept by the runtime's prune loop.
//!
//! ## Security Properties
//!
//! - **XChaCha20-Poly1305**: 192-bit random nonce, constant-time ARX design
//! - Ephemeral sender key per envelope; the agent's static key never decrypts
//!   two envelopes with the same symmetric key

use crate::{sha256_bytes, CryptoError};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Default time-to-live for cached envelope keys.
pub const ENVELOPE_KEY_TTL_MS: u64 = 60 * 60 * 1000;

/// Wire form of an encrypted payload. All fields hex-encoded.
///
/// A coordinator-to-agent envelope carries the coordinator's ephemeral public
/// key; the agent's reply reuses the derived key and leaves it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedPayload {
    /// Sender's ephemeral X25519 public key (32 bytes hex), empty on replies.
    #[serde(default)]
    pub ephemeral_public_key: String,
    /// XChaCha20 nonce (24 bytes hex).
    pub nonce: String,
    /// AEAD ciphertext + tag.
    pub ciphertext: String,
}

fn parse_32(hexstr: &str) -> Result<[u8; 32], CryptoError> {
    let raw = hex::decode(hexstr).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: 0,
    })?;
    let len = raw.len();
    raw.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: len,
    })
}

/// Derive the shared symmetric key between a local X25519 secret and a peer
/// public key. Used by agents to open envelopes and seal replies.
pub fn derive_shared_key(local_secret: [u8; 32], peer_public: [u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(local_secret);
    let shared = secret.diffie_hellman(&PublicKey::from(peer_public));
    sha256_bytes(shared.as_bytes())
}

/// Encrypt a payload for the holder of `recipient_public_hex`.
///
/// Returns the wire envelope and the derived symmetric key; the caller caches
/// the key by subtask id to open the agent's encrypted result.
pub fn seal_for(
    recipient_public_hex: &str,
    plaintext: &[u8],
) -> Result<(SealedPayload, [u8; 32]), CryptoError> {
    let recipient = PublicKey::from(parse_32(recipient_public_hex)?);

    let ephemeral = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let key = sha256_bytes(ephemeral.diffie_hellman(&recipient).as_bytes());

    let mut nonce = [0u8; 24];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok((
        SealedPayload {
            ephemeral_public_key: hex::encode(ephemeral_public.as_bytes()),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        },
        key,
    ))
}

/// Open a sealed payload with a previously derived key.
pub fn open_sealed(sealed: &SealedPayload, key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let nonce_raw = hex::decode(&sealed.nonce)
        .map_err(|e| CryptoError::DecryptionFailed(format!("bad nonce hex: {e}")))?;
    if nonce_raw.len() != 24 {
        return Err(CryptoError::DecryptionFailed(format!(
            "bad nonce length {}",
            nonce_raw.len()
        )));
    }
    let ciphertext = hex::decode(&sealed.ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(format!("bad ciphertext hex: {e}")))?;

    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(&nonce_raw), ciphertext.as_ref())
        .map_err(|_| CryptoError::DecryptionFailed("AEAD tag mismatch".into()))
}

struct CachedKey {
    key: [u8; 32],
    created_at_ms: u64,
}

impl Drop for CachedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Process-local cache of envelope keys keyed by subtask id.
pub struct EnvelopeKeyCache {
    entries: DashMap<String, CachedKey>,
    ttl_ms: u64,
}

impl EnvelopeKeyCache {
    /// Create a cache with the default one-hour TTL.
    pub fn new() -> Self {
        Self::with_ttl(ENVELOPE_KEY_TTL_MS)
    }

    /// Create a cache with an explicit TTL.
    pub fn with_ttl(ttl_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ms,
        }
    }

    /// Remember the envelope key for a subtask.
    pub fn insert(&self, subtask_id: &str, key: [u8; 32], now_ms: u64) {
        self.entries.insert(
            subtask_id.to_string(),
            CachedKey {
                key,
                created_at_ms: now_ms,
            },
        );
    }

    /// Look up a live key; expired entries read as missing.
    pub fn get(&self, subtask_id: &str, now_ms: u64) -> Result<[u8; 32], CryptoError> {
        match self.entries.get(subtask_id) {
            Some(entry) if now_ms.saturating_sub(entry.created_at_ms) <= self.ttl_ms => {
                Ok(entry.key)
            }
            _ => Err(CryptoError::EnvelopeKeyMissing(subtask_id.to_string())),
        }
    }

    /// Drop the key for a subtask once its result has been opened.
    pub fn remove(&self, subtask_id: &str) {
        self.entries.remove(subtask_id);
    }

    /// Evict expired entries. Called from the runtime prune loop.
    pub fn prune(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, v| now_ms.saturating_sub(v.created_at_ms) <= self.ttl_ms);
        before - self.entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EnvelopeKeyCache {
    fn default() -> Self {
        Self::new()
    }
}
