//! Checkpoint signing for Cairn
//!
//! This crate provides the [`SignatureScheme`] choice and the signing and
//! verification keys used by the checkpoint chain:
//! - [`CheckpointSigner`]: held by the running pipeline, never logged
//! - [`VerificationKey`]: handed to auditors (public for Ed25519)
//! - key files at rest: [`load_signer`], [`generate_key_file`], [`load_or_generate`]
//!
//! The scheme is always an explicit choice; there is no default.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keyfile;
pub mod scheme;

pub use error::{KeyError, Result};
pub use keyfile::{generate_key_file, load_or_generate, load_signer};
pub use scheme::{CheckpointSigner, SharedSecretKey, SignatureScheme, VerificationKey, FINGERPRINT_LEN};
