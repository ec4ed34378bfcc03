//! Signing material at rest
//!
//! Key files are small text files:
//! - `ed25519`: 64 hex chars encoding the 32-byte secret key
//! - `shared-secret`: any non-empty byte string (trailing whitespace trimmed);
//!   generated secrets are 64 hex chars
//!
//! On unix, files are created with mode 0600 and loading refuses files that
//! are readable by group or others. Key bytes are never logged.

use crate::error::{KeyError, Result};
use crate::scheme::{CheckpointSigner, SharedSecretKey, SignatureScheme};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Load a signer for `scheme` from `path`
pub fn load_signer(scheme: SignatureScheme, path: &Path) -> Result<CheckpointSigner> {
    ensure_secret_key_permissions(path)?;
    let raw = std::fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = trim_trailing_whitespace(&raw);

    let signer = match scheme {
        SignatureScheme::Ed25519 => {
            let text = std::str::from_utf8(trimmed).map_err(|_| invalid(path, "not utf-8 hex"))?;
            let bytes = hex::decode(text).map_err(|_| invalid(path, "not hex"))?;
            let secret: [u8; 32] = bytes
                .try_into()
                .map_err(|_| invalid(path, "expected 32 bytes"))?;
            CheckpointSigner::Ed25519(SigningKey::from_bytes(&secret))
        }
        SignatureScheme::SharedSecret => {
            if trimmed.is_empty() {
                return Err(invalid(path, "shared secret is empty"));
            }
            CheckpointSigner::SharedSecret(SharedSecretKey::derive(trimmed))
        }
    };

    info!(
        scheme = %scheme,
        fingerprint = %signer.verification_key().fingerprint(),
        "Loaded signing key"
    );
    Ok(signer)
}

/// Generate fresh key material and write it to `path`
///
/// Fails if the file already exists.
pub fn generate_key_file(scheme: SignatureScheme, path: &Path) -> Result<CheckpointSigner> {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    let encoded = hex::encode(secret);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| KeyError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    write_secret_key(path, format!("{encoded}\n").as_bytes())?;

    let signer = match scheme {
        SignatureScheme::Ed25519 => CheckpointSigner::Ed25519(SigningKey::from_bytes(&secret)),
        SignatureScheme::SharedSecret => {
            CheckpointSigner::SharedSecret(SharedSecretKey::derive(encoded.as_bytes()))
        }
    };
    info!(
        scheme = %scheme,
        path = %path.display(),
        fingerprint = %signer.verification_key().fingerprint(),
        "Generated signing key"
    );
    Ok(signer)
}

/// Load the key at `path`, generating it first if the file is missing
pub fn load_or_generate(scheme: SignatureScheme, path: &Path) -> Result<CheckpointSigner> {
    if path.exists() {
        load_signer(scheme, path)
    } else {
        generate_key_file(scheme, path)
    }
}

fn invalid(path: &Path, reason: &str) -> KeyError {
    KeyError::InvalidKey {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn write_secret_key(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            KeyError::AlreadyExists(path.to_path_buf())
        } else {
            KeyError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
fn ensure_secret_key_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.permissions().mode() & 0o077 != 0 {
        return Err(KeyError::InsecurePermissions(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_secret_key_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
