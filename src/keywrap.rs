//! Ephemeral key wrapping
//!
//! Every encryption session draws a fresh 128-bit ephemeral key and seals the
//! secret blob under it with AES-128-GCM. The result, the packaged cipher, is
//! `nonce(12) ‖ ciphertext‖tag` and is copied verbatim into every fragment
//! envelope of the session. The key itself is never stored; only its
//! threshold shares are.

use crate::blob::SecretBlob;
use crate::cipher::{self, NONCE_LEN};
use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use aes_gcm::Aes128Gcm;
use std::fmt;
use tracing::warn;
use zeroize::Zeroizing;

/// Length of the ephemeral key in bytes
pub const EPHEMERAL_KEY_LEN: usize = 16;

pub struct EphemeralKey(Zeroizing<[u8; EPHEMERAL_KEY_LEN]>);

impl EphemeralKey {
    pub fn generate() -> Self {
        Self(Zeroizing::new(cipher::random_bytes::<EPHEMERAL_KEY_LEN>()))
    }

    pub fn from_bytes(bytes: [u8; EPHEMERAL_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Coerce reconstructed key bytes to exactly 16 bytes.
    ///
    /// Shorter input is left-padded with zeros, longer input keeps its last 16
    /// bytes. A malformed reconstruction therefore still yields *a* key and is
    /// only caught by the tag check in [`unwrap`].
    pub fn normalize(candidate: &[u8]) -> Self {
        let mut key = Zeroizing::new([0u8; EPHEMERAL_KEY_LEN]);
        if candidate.len() != EPHEMERAL_KEY_LEN {
            warn!(
                len = candidate.len(),
                "reconstructed ephemeral key has unexpected length; normalizing to {} bytes",
                EPHEMERAL_KEY_LEN
            );
        }
        if candidate.len() >= EPHEMERAL_KEY_LEN {
            key.copy_from_slice(&candidate[candidate.len() - EPHEMERAL_KEY_LEN..]);
        } else {
            key[EPHEMERAL_KEY_LEN - candidate.len()..].copy_from_slice(candidate);
        }
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; EPHEMERAL_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralKey(<redacted>)")
    }
}

/// `nonce ‖ AEAD(secret blob)` under the ephemeral key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackagedCipher(Vec<u8>);

impl PackagedCipher {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Seal a secret blob under a freshly generated ephemeral key.
pub fn wrap(blob: &SecretBlob) -> Result<(EphemeralKey, PackagedCipher)> {
    let key = EphemeralKey::generate();
    let nonce = cipher::random_bytes::<NONCE_LEN>();
    let packaged = wrap_with(blob, &key, &nonce)?;
    Ok((key, packaged))
}

/// Seal with caller-provided key and nonce. Only for deterministic tests.
pub fn wrap_with(
    blob: &SecretBlob,
    key: &EphemeralKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<PackagedCipher> {
    let sealed = cipher::seal::<Aes128Gcm>(key.as_bytes(), nonce, &blob.to_bytes())?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&sealed);
    Ok(PackagedCipher(out))
}

/// Open a packaged cipher with a (reconstructed) ephemeral key.
pub fn unwrap(packaged: &PackagedCipher, key: &EphemeralKey) -> Result<SecretBlob> {
    if packaged.len() < NONCE_LEN {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::TooShort,
            "packaged cipher likely truncated while reading nonce",
        ));
    }
    let (nonce, sealed) = packaged.as_bytes().split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
        FracturedKeyError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to read packaged cipher nonce",
        )
    })?;

    let plain = Zeroizing::new(cipher::open::<Aes128Gcm>(key.as_bytes(), &nonce, sealed)?);
    SecretBlob::from_bytes(&plain).map_err(|e| e.with_context("unwrapped secret blob is malformed"))
}
