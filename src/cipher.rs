//! AEAD primitive shared by the vault and the key-wrap layer
//!
//! Both layers use AES-GCM with a 12-byte nonce and a 16-byte tag appended to
//! the ciphertext. Only the key size differs (256-bit for the passphrase
//! layer, 128-bit for the ephemeral key).

use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use rand::RngCore;
use rand::rngs::OsRng;

/// Length of an AES-GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the AES-GCM authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Message used for every tag failure. Wrong key, wrong passphrase and
/// tampering are indistinguishable.
pub(crate) const AUTH_FAILED_MSG: &str = "corrupt input, tampered-with data, or bad passphrase";

/// Fill a fixed-size array from the operating system RNG.
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

/// Encrypt `plaintext`, returning `ciphertext‖tag`.
pub(crate) fn seal<C>(key: &[u8], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key_length(key.len()))?;
    cipher
        .encrypt(GenericArray::from_slice(nonce), plaintext)
        .map_err(|_| {
            FracturedKeyError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "AEAD encryption failed",
            )
        })
}

/// Decrypt `ciphertext‖tag`, failing with `AuthenticationFailed` on a bad tag.
pub(crate) fn open<C>(key: &[u8], nonce: &[u8; NONCE_LEN], sealed: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key_length(key.len()))?;
    cipher
        .decrypt(GenericArray::from_slice(nonce), sealed)
        .map_err(|_| {
            FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                AUTH_FAILED_MSG,
            )
        })
}

fn invalid_key_length(len: usize) -> FracturedKeyError {
    FracturedKeyError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        format!("invalid AEAD key length {}", len),
    )
}
