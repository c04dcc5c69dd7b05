//! Raw secret blob layout
//!
//! A secret blob is the passphrase-encrypted secret, stored with fixed
//! offsets and no length fields:
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - ciphertext‖tag: remainder (16-byte AES-GCM tag at the end)
//!
//! The same bytes travel inside the packaged cipher of every fragment, and are
//! written verbatim in single-file mode (conventionally `*.bin`), which is why
//! the manual decoder below accepts nothing else.

use crate::cipher::{NONCE_LEN, TAG_LEN};
use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::fmt;

/// Length of the scrypt salt in bytes
pub const SALT_LEN: usize = 16;

/// Bytes before the ciphertext: salt followed by nonce
pub const BLOB_HEADER_LEN: usize = SALT_LEN + NONCE_LEN;

/// Conventional file extension for single-file mode
pub const BLOB_EXTENSION: &str = "bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBlob {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    sealed: Vec<u8>,
}

impl SecretBlob {
    pub fn new(salt: [u8; SALT_LEN], nonce: [u8; NONCE_LEN], sealed: Vec<u8>) -> Self {
        Self {
            salt,
            nonce,
            sealed,
        }
    }

    /// Reinterpret raw bytes as `salt[0:16] ‖ nonce[16:28] ‖ ciphertext‖tag[28:]`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOB_HEADER_LEN {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::TooShort,
                format!(
                    "secret blob too small to be valid ({} bytes, need at least {})",
                    bytes.len(),
                    BLOB_HEADER_LEN
                ),
            ));
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| layout_invariant())?;
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| layout_invariant())?;

        Ok(Self::new(salt, nonce, sealed.to_vec()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOB_HEADER_LEN + self.sealed.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext with the tag still attached.
    pub fn sealed(&self) -> &[u8] {
        &self.sealed
    }

    /// Size of the serialized blob.
    pub fn encoded_len(&self) -> usize {
        BLOB_HEADER_LEN + self.sealed.len()
    }

    pub fn summary(&self) -> BlobSummary {
        let split = self.sealed.len().saturating_sub(TAG_LEN);
        let (ciphertext, tag) = self.sealed.split_at(split);
        BlobSummary {
            salt: STANDARD.encode(self.salt),
            nonce: STANDARD.encode(self.nonce),
            ciphertext: STANDARD.encode(ciphertext),
            tag: STANDARD.encode(tag),
        }
    }
}

/// Base64 rendering of the public blob fields, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobSummary {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
    pub tag: String,
}

impl fmt::Display for BlobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Salt: {}", self.salt)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        writeln!(f, "Ciphertext: {}", self.ciphertext)?;
        write!(f, "Auth Tag: {}", self.tag)
    }
}

fn layout_invariant() -> FracturedKeyError {
    FracturedKeyError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        "secret blob split produced unexpected field sizes",
    )
}
