//! Signature schemes for checkpoints
//!
//! Two schemes with different trust guarantees:
//!
//! | Scheme | Sign with | Verify with | Non-repudiable |
//! |--------|-----------|-------------|----------------|
//! | `ed25519` | private key | public key | yes |
//! | `shared-secret` | shared secret | same secret | no |
//!
//! The shared-secret scheme derives a 32-byte key from the secret with
//! BLAKE3's key derivation mode, then signs with BLAKE3 keyed hashing.
//! Signatures are lowercase hex in both schemes.

use crate::error::{KeyError, Result};
use cairn_core::sha256_hex;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

const SHARED_SECRET_CONTEXT: &str = "cairn 2026-01-01 checkpoint signing v1";

/// Length of a key fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 16;

/// Checkpoint signature scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// Asymmetric Ed25519
    Ed25519,
    /// Keyed BLAKE3 over a shared secret
    SharedSecret,
}

impl SignatureScheme {
    /// Configuration name of the scheme
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::Ed25519 => "ed25519",
            SignatureScheme::SharedSecret => "shared-secret",
        }
    }

    /// Whether a valid signature proves which party produced it
    pub fn is_non_repudiable(&self) -> bool {
        matches!(self, SignatureScheme::Ed25519)
    }

    /// Parse a configuration name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ed25519" => Some(SignatureScheme::Ed25519),
            "shared-secret" => Some(SignatureScheme::SharedSecret),
            _ => None,
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key derived from a shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecretKey([u8; 32]);

impl SharedSecretKey {
    /// Derive the signing key from raw secret bytes
    pub fn derive(secret: &[u8]) -> Self {
        SharedSecretKey(blake3::derive_key(SHARED_SECRET_CONTEXT, secret))
    }

    fn mac(&self, message: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.0, message)
    }
}

impl fmt::Debug for SharedSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecretKey(<redacted>)")
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Holds signing material for one pipeline instance
#[derive(Clone)]
pub enum CheckpointSigner {
    /// Ed25519 private key
    Ed25519(SigningKey),
    /// Shared-secret derived key
    SharedSecret(SharedSecretKey),
}

impl CheckpointSigner {
    /// Fresh random signing material held only in memory
    pub fn generate(scheme: SignatureScheme) -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        match scheme {
            SignatureScheme::Ed25519 => CheckpointSigner::Ed25519(SigningKey::from_bytes(&secret)),
            SignatureScheme::SharedSecret => {
                CheckpointSigner::SharedSecret(SharedSecretKey::derive(&secret))
            }
        }
    }

    /// Scheme of this signer
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            CheckpointSigner::Ed25519(_) => SignatureScheme::Ed25519,
            CheckpointSigner::SharedSecret(_) => SignatureScheme::SharedSecret,
        }
    }

    /// Sign a message, returning a hex signature
    pub fn sign(&self, message: &[u8]) -> String {
        match self {
            CheckpointSigner::Ed25519(key) => {
                let sig: Signature = key.sign(message);
                hex::encode(sig.to_bytes())
            }
            CheckpointSigner::SharedSecret(key) => key.mac(message).to_hex().to_string(),
        }
    }

    /// Key that verifies this signer's signatures
    pub fn verification_key(&self) -> VerificationKey {
        match self {
            CheckpointSigner::Ed25519(key) => VerificationKey::Ed25519(key.verifying_key()),
            CheckpointSigner::SharedSecret(key) => VerificationKey::SharedSecret(key.clone()),
        }
    }

    /// Verify a signature produced by this signer
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        self.verification_key().verify(message, signature_hex)
    }
}

impl fmt::Debug for CheckpointSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointSigner")
            .field("scheme", &self.scheme())
            .field("fingerprint", &self.verification_key().fingerprint())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Verification key
// ============================================================================

/// Verifies checkpoint signatures
///
/// For Ed25519 this is public and may be handed to any auditor. For the
/// shared-secret scheme it is as sensitive as the signer itself.
#[derive(Clone, PartialEq, Eq)]
pub enum VerificationKey {
    /// Ed25519 public key
    Ed25519(VerifyingKey),
    /// Shared-secret derived key
    SharedSecret(SharedSecretKey),
}

impl VerificationKey {
    /// Parse an Ed25519 public key from hex
    pub fn ed25519_from_hex(public_hex: &str) -> Result<Self> {
        let bytes = hex::decode(public_hex.trim()).map_err(|_| KeyError::Malformed("public key"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::Malformed("public key"))?;
        VerifyingKey::from_bytes(&bytes)
            .map(VerificationKey::Ed25519)
            .map_err(|_| KeyError::Malformed("public key"))
    }

    /// Scheme of this key
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            VerificationKey::Ed25519(_) => SignatureScheme::Ed25519,
            VerificationKey::SharedSecret(_) => SignatureScheme::SharedSecret,
        }
    }

    /// Check a hex signature over `message`
    ///
    /// Malformed hex or wrong-length signatures verify as false.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        match self {
            VerificationKey::Ed25519(key) => {
                let Ok(bytes) = hex::decode(signature_hex) else {
                    return false;
                };
                let Ok(sig) = Signature::from_slice(&bytes) else {
                    return false;
                };
                key.verify(message, &sig).is_ok()
            }
            VerificationKey::SharedSecret(key) => match blake3::Hash::from_hex(signature_hex) {
                // blake3::Hash equality is constant-time
                Ok(expected) => key.mac(message) == expected,
                Err(_) => false,
            },
        }
    }

    /// Public key hex, only for the asymmetric scheme
    pub fn public_key_hex(&self) -> Option<String> {
        match self {
            VerificationKey::Ed25519(key) => Some(hex::encode(key.to_bytes())),
            VerificationKey::SharedSecret(_) => None,
        }
    }

    /// Short, non-secret identifier of the key
    ///
    /// First 16 hex chars of SHA-256 over the public key, or over the derived
    /// key for the shared-secret scheme.
    pub fn fingerprint(&self) -> String {
        let digest = match self {
            VerificationKey::Ed25519(key) => sha256_hex(key.as_bytes()),
            VerificationKey::SharedSecret(key) => sha256_hex(&key.0),
        };
        digest[..FINGERPRINT_LEN].to_string()
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("scheme", &self.scheme())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}
