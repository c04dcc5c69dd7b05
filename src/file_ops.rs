//! High-level operations on files and images
//!
//! These are the operation boundaries used by the CLI and the background
//! worker: protect a secret into carrier images or a raw blob file, and
//! recover it from stego images or from a blob file.

use crate::blob::{BLOB_EXTENSION, BlobSummary, SecretBlob};
use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use crate::orchestrator::{
    CarrierSlot, DefaultOrchestrator, EmbedReport, FragmentOrchestrator, SharingParams,
};
use crate::passphrase::require_non_empty;
use crate::sharing::SecretSharer;
use crate::stego::Steganographer;
use crate::vault;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

/// Result of a fragmented encryption.
#[derive(Debug, Clone)]
pub struct EncryptOutcome {
    pub summary: BlobSummary,
    pub report: EmbedReport,
}

/// Plaintext recovered by a decryption. Wiped on drop, redacted in `Debug`.
pub struct RecoveredSecret(Zeroizing<Vec<u8>>);

impl RecoveredSecret {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The secret as text, replacing invalid UTF-8 sequences.
    pub fn to_string_lossy(&self) -> Zeroizing<String> {
        Zeroizing::new(String::from_utf8_lossy(&self.0).into_owned())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RecoveredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoveredSecret(<{} bytes redacted>)", self.0.len())
    }
}

/// Encrypt `secret` and hide its key fragments in the given carriers.
pub fn encrypt_to_images(
    secret: &[u8],
    passphrase: &[u8],
    params: SharingParams,
    carriers: &[Option<CarrierSlot>],
) -> Result<EncryptOutcome> {
    encrypt_to_images_with(
        &DefaultOrchestrator::default(),
        secret,
        passphrase,
        params,
        carriers,
    )
}

pub fn encrypt_to_images_with<S: SecretSharer, G: Steganographer>(
    orchestrator: &FragmentOrchestrator<S, G>,
    secret: &[u8],
    passphrase: &[u8],
    params: SharingParams,
    carriers: &[Option<CarrierSlot>],
) -> Result<EncryptOutcome> {
    require_non_empty(secret, "a password to encrypt")?;
    require_non_empty(passphrase, "a master passphrase")?;

    info!(len = secret.len(), "encrypting secret under master passphrase");
    let blob =
        vault::encrypt(passphrase, secret).map_err(|e| e.with_context("encryption failed"))?;
    let report = orchestrator
        .embed(&blob, params, carriers)
        .map_err(|e| e.with_context("fragment creation failed"))?;

    Ok(EncryptOutcome {
        summary: blob.summary(),
        report,
    })
}

/// Encrypt `secret` into a raw blob file without fragmentation.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_to_file(
    secret: &[u8],
    passphrase: &[u8],
    output_path: &Path,
) -> Result<BlobSummary> {
    require_non_empty(secret, "a password to encrypt")?;
    require_non_empty(passphrase, "a master passphrase")?;

    let blob =
        vault::encrypt(passphrase, secret).map_err(|e| e.with_context("encryption failed"))?;
    write_file_atomic(output_path, &blob.to_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    info!(path = %output_path.display(), "binary file saved");

    Ok(blob.summary())
}

/// Recover a secret from stego images, in the order given.
pub fn decrypt_from_images(images: &[PathBuf], passphrase: &[u8]) -> Result<RecoveredSecret> {
    decrypt_from_images_with(&DefaultOrchestrator::default(), images, passphrase)
}

pub fn decrypt_from_images_with<S: SecretSharer, G: Steganographer>(
    orchestrator: &FragmentOrchestrator<S, G>,
    images: &[PathBuf],
    passphrase: &[u8],
) -> Result<RecoveredSecret> {
    require_non_empty(passphrase, "a master passphrase")?;

    let blob = orchestrator
        .recover_from_images(images)
        .map_err(|e| e.with_context("failed to recover secret blob from fragments"))?;
    info!("decrypting with master passphrase");
    let secret =
        vault::decrypt(passphrase, &blob).map_err(|e| e.with_context("failed to decrypt"))?;

    Ok(RecoveredSecret(secret))
}

/// Decrypt a raw blob file written by [`encrypt_to_file`].
pub fn decrypt_blob_file(input_path: &Path, passphrase: &[u8]) -> Result<RecoveredSecret> {
    require_non_empty(passphrase, "a master passphrase")?;

    let raw = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    info!(path = %input_path.display(), size = raw.len(), "read secret blob");
    let blob = SecretBlob::from_bytes(&raw)?;
    let secret =
        vault::decrypt(passphrase, &blob).map_err(|e| e.with_context("failed to decrypt"))?;

    Ok(RecoveredSecret(secret))
}

/// Single-file output path: `.bin` is appended when `path` has no extension.
pub fn blob_output_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(_) => path.to_path_buf(),
        None => path.with_extension(BLOB_EXTENSION),
    }
}

/// Read the secret to protect from a file, verbatim.
pub fn read_secret_file(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    fs::read(path)
        .map(Zeroizing::new)
        .map_err(|e| read_error(path, e))
}

/// Write a recovered secret to a file readable only by its owner.
pub fn write_secret_file(path: &Path, secret: &RecoveredSecret) -> Result<()> {
    write_file_atomic(path, secret.as_bytes())
        .map_err(|e| e.with_context(format!("failed to write to {}", path.display())))
}

/// Write via tempfile + fsync + rename so that readers see either the old
/// file or the complete new one. Mode 0o600 on Unix.
fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    // Output is owner-only regardless of umask.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                FracturedKeyError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }
    temp_file.persist(path).map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> FracturedKeyError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    FracturedKeyError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
