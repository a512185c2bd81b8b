//! # Ed25519 Signatures
//!
//! Coordinator and agent identity keys. Signatures cover canonical JSON bytes
//! (see [`crate::canonical`]); public keys travel the mesh PEM-serialized.
//!
//! ## Security Properties
//!
//! - No RNG dependency at signing time (deterministic nonce from message)
//! - Secret key material is zeroized on drop

use crate::CryptoError;
use base64ct::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    /// Create from raw bytes, validating the curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Parse from a PEM-serialized SubjectPublicKeyInfo document.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_public_key_pem(pem).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(key.to_bytes()))
    }

    /// Serialize to PEM.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        key.to_public_key_pem(LineEnding::LF)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse from lowercase hex (the wire encoding for signatures).
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let raw = hex::decode(s).map_err(|_| CryptoError::InvalidSignatureFormat)?;
        let bytes: [u8; 64] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;
        Ok(Self(bytes))
    }

    /// Hex-encode for the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Ed25519 keypair.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from a secret seed (32 bytes).
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Parse from a PEM-serialized PKCS#8 private key document.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_pkcs8_pem(pem).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Serialize the private key to PKCS#8 PEM.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|z| z.to_string())
            .map_err(|_| CryptoError::InvalidPrivateKey)
    }

    /// Get the public half.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message (deterministic, no RNG needed).
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl Drop for Ed25519KeyPair {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let keypair = Ed25519KeyPair::generate();
        let message = b"mesh envelope bytes";

        let signature = keypair.sign(message);
        assert!(keypair.public_key().verify(message, &signature).is_ok());
    }

    #[test]
    fn tampered_message_rejected() {
        let keypair = Ed25519KeyPair::generate();
        let signature = keypair.sign(b"original");
        assert!(keypair.public_key().verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn wrong_key_rejected() {
        let a = Ed25519KeyPair::generate();
        let b = Ed25519KeyPair::generate();
        let signature = a.sign(b"payload");
        assert!(b.public_key().verify(b"payload", &signature).is_err());
    }

    #[test]
    fn public_key_pem_roundtrip() {
        let keypair = Ed25519KeyPair::generate();
        let pem = keypair.public_key().to_pem().unwrap();
        assert!(pem.contains("BEGIN PUBLIC KEY"));
        let parsed = Ed25519PublicKey::from_pem(&pem).unwrap();
        assert_eq!(parsed, keypair.public_key());
    }

    #[test]
    fn private_key_pem_roundtrip() {
        let keypair = Ed25519KeyPair::generate();
        let pem = keypair.to_pem().unwrap();
        let restored = Ed25519KeyPair::from_pem(&pem).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn signature_hex_roundtrip() {
        let keypair = Ed25519KeyPair::generate();
        let sig = keypair.sign(b"x");
        let parsed = Ed25519Signature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(parsed, sig);
    }
}
