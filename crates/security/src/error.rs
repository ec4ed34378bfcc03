//! Key management errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors loading, generating or parsing signing material
///
/// Messages never include key bytes.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Reading or writing a key file failed
    #[error("key file {path}: {source}")]
    Io {
        /// Key file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Key file content is not a valid key for the scheme
    #[error("invalid key material in {path}: {reason}")]
    InvalidKey {
        /// Key file path
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// Key file is readable by group or others
    #[error("key file {0} permissions are too broad; require 0600 or stricter")]
    InsecurePermissions(PathBuf),

    /// Refused to overwrite an existing key file
    #[error("key file {0} already exists")]
    AlreadyExists(PathBuf),

    /// Encoded public key or signature could not be parsed
    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// Result type for key operations
pub type Result<T> = std::result::Result<T, KeyError>;
