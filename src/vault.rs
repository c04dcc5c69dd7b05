//! Passphrase layer: scrypt + AES-256-GCM
//!
//! The secret is encrypted under a key derived from the master passphrase.
//! The output is a [`SecretBlob`]:
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - ciphertext‖tag: variable length (includes 16-byte GCM tag)

use crate::blob::{SALT_LEN, SecretBlob};
use crate::cipher::{self, NONCE_LEN};
use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use aes_gcm::Aes256Gcm;
use scrypt::{Params, scrypt};
use zeroize::Zeroizing;

/// Length of derived key in bytes
const KEY_LEN: usize = 32;

/// scrypt N parameter (CPU/memory cost), as log2
const SCRYPT_LOG_N: u8 = 15;

/// scrypt r parameter (block size)
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization)
const SCRYPT_P: u32 = 1;

/// Derive a 32-byte key from a passphrase and salt using scrypt
fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN).map_err(|e| {
        FracturedKeyError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::KdfFailure,
            format!("failed to create scrypt params: {}", e),
        )
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(passphrase, salt, &params, &mut key[..]).map_err(|e| {
        FracturedKeyError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::KdfFailure,
            format!("scrypt key derivation failed: {}", e),
        )
    })?;

    Ok(key)
}

/// Encrypt a secret under the master passphrase using random salt and nonce
pub fn encrypt(passphrase: &[u8], secret: &[u8]) -> Result<SecretBlob> {
    let salt = cipher::random_bytes::<SALT_LEN>();
    let nonce = cipher::random_bytes::<NONCE_LEN>();

    encrypt_deterministic(passphrase, secret, &salt, &nonce)
}

/// Encrypt a secret using the provided salt and nonce
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which generates random salt/nonce.
pub fn encrypt_deterministic(
    passphrase: &[u8],
    secret: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<SecretBlob> {
    let key = derive_key(passphrase, salt)?;
    let sealed = cipher::seal::<Aes256Gcm>(&key[..], nonce, secret)?;

    Ok(SecretBlob::new(*salt, *nonce, sealed))
}

/// Decrypt a secret blob with the master passphrase
pub fn decrypt(passphrase: &[u8], blob: &SecretBlob) -> Result<Zeroizing<Vec<u8>>> {
    let key = derive_key(passphrase, blob.salt())?;
    let secret = cipher::open::<Aes256Gcm>(&key[..], blob.nonce(), blob.sealed())?;

    Ok(Zeroizing::new(secret))
}
