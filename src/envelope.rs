//! Fragment envelope wire format
//!
//! One envelope is hidden in each carrier image. It bundles one share of the
//! ephemeral key with the session metadata needed to recombine it:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 6 | magic `FKSS01` |
//! | 6 | 1 | version |
//! | 7 | 1 | index (1-based) |
//! | 8 | 1 | total |
//! | 9 | 1 | threshold |
//! | 10 | 4 | fragment length (big-endian) |
//! | 14 | 4 | packaged cipher length (big-endian) |
//! | 18 | var | fragment |
//! | 18+len | var | packaged cipher |
//!
//! Index, total and threshold are single bytes, so a session can have at most
//! 255 fragments. Bytes after the packaged cipher are ignored.

use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use crate::keywrap::PackagedCipher;
use std::fmt;

/// Magic prefix identifying a fragment envelope
pub const MAGIC: &[u8; 6] = b"FKSS01";

/// Current envelope format version
pub const VERSION: u8 = 1;

/// Fixed header length: magic, four single-byte fields, two u32 lengths
pub const HEADER_LEN: usize = MAGIC.len() + 4 + 4 + 4;

#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u8,
    pub index: u8,
    pub total: u8,
    pub threshold: u8,
    pub fragment: Vec<u8>,
    pub packaged_cipher: PackagedCipher,
}

impl Envelope {
    /// An envelope at the current format version.
    pub fn new(
        fragment: Vec<u8>,
        index: u8,
        total: u8,
        threshold: u8,
        packaged_cipher: PackagedCipher,
    ) -> Self {
        Self {
            version: VERSION,
            index,
            total,
            threshold,
            fragment,
            packaged_cipher,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let fragment_len = length_field(self.fragment.len(), "fragment")?;
        let cipher_len = length_field(self.packaged_cipher.len(), "packaged cipher")?;

        let mut out =
            Vec::with_capacity(HEADER_LEN + self.fragment.len() + self.packaged_cipher.len());
        out.extend_from_slice(MAGIC);
        out.push(self.version);
        out.push(self.index);
        out.push(self.total);
        out.push(self.threshold);
        out.extend_from_slice(&fragment_len.to_be_bytes());
        out.extend_from_slice(&cipher_len.to_be_bytes());
        out.extend_from_slice(&self.fragment);
        out.extend_from_slice(self.packaged_cipher.as_bytes());
        Ok(out)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("version", &self.version)
            .field("index", &self.index)
            .field("total", &self.total)
            .field("threshold", &self.threshold)
            .field("fragment_len", &self.fragment.len())
            .field("packaged_cipher_len", &self.packaged_cipher.len())
            .finish()
    }
}

/// Serialize a fragment and its session metadata at the current version.
pub fn wrap(
    fragment: &[u8],
    index: u8,
    total: u8,
    threshold: u8,
    packaged_cipher: &PackagedCipher,
) -> Result<Vec<u8>> {
    Envelope::new(
        fragment.to_vec(),
        index,
        total,
        threshold,
        packaged_cipher.clone(),
    )
    .to_bytes()
}

/// Parse an envelope extracted from a carrier image.
pub fn parse(bytes: &[u8]) -> Result<Envelope> {
    if bytes.len() < HEADER_LEN {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::TooShort,
            format!(
                "fragment payload too short ({} bytes, header needs {})",
                bytes.len(),
                HEADER_LEN
            ),
        ));
    }

    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::MagicMismatch,
            "fragment magic mismatch; image does not carry a fractured-key fragment",
        ));
    }

    let mut pos = MAGIC.len();
    let version = bytes[pos];
    let index = bytes[pos + 1];
    let total = bytes[pos + 2];
    let threshold = bytes[pos + 3];
    pos += 4;

    let fragment_len = read_u32(bytes, pos)? as usize;
    pos += 4;
    let cipher_len = read_u32(bytes, pos)? as usize;
    pos += 4;

    let body_len = fragment_len.checked_add(cipher_len);
    if body_len.is_none_or(|len| len > bytes.len() - pos) {
        return Err(FracturedKeyError::with_kind(
            ErrorCategory::User,
            ErrorKind::SizeOverflow,
            "declared fragment sizes exceed payload size",
        ));
    }

    let fragment = bytes[pos..pos + fragment_len].to_vec();
    pos += fragment_len;
    let packaged_cipher = PackagedCipher::from_bytes(bytes[pos..pos + cipher_len].to_vec());

    Ok(Envelope {
        version,
        index,
        total,
        threshold,
        fragment,
        packaged_cipher,
    })
}

fn read_u32(bytes: &[u8], pos: usize) -> Result<u32> {
    let field: [u8; 4] = bytes[pos..pos + 4].try_into().map_err(|_| {
        FracturedKeyError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to read length field",
        )
    })?;
    Ok(u32::from_be_bytes(field))
}

fn length_field(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::SizeOverflow,
            format!("{} too large for a 32-bit length field", what),
            e,
        )
    })
}
