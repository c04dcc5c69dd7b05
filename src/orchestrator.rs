//! Splitting the ephemeral key into fragments and recombining them
//!
//! Encryption wraps the secret blob under a fresh ephemeral key, splits that
//! key into `total` shares and hides one envelope per share in a carrier
//! image. Every envelope carries the same packaged cipher.
//!
//! Recovery parses one envelope per image, checks that they all come from the
//! same session, rebuilds the ephemeral key from the first `threshold`
//! distinct envelopes (in the order the images were given) and opens the packaged
//! cipher with it.

use crate::blob::SecretBlob;
use crate::envelope::{self, Envelope};
use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use crate::keywrap::{self, EphemeralKey};
use crate::sharing::{SecretSharer, ShamirSharer};
use crate::stego::{LsbSteganographer, Steganographer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fragments produced per session unless configured otherwise
pub const DEFAULT_TOTAL: u8 = 3;

/// Fragments needed for recovery unless configured otherwise
pub const DEFAULT_THRESHOLD: u8 = 2;

/// Recovery never proceeds with fewer images than this, whatever the threshold.
pub const MIN_RECOVERY_FRAGMENTS: usize = 2;

/// How many fragments to produce and how many are needed to recombine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharingParams {
    total: u8,
    threshold: u8,
}

impl SharingParams {
    pub fn new(total: u8, threshold: u8) -> Result<Self> {
        if threshold == 0 {
            return Err(FracturedKeyError::validation("threshold must be at least 1"));
        }
        if threshold > total {
            return Err(FracturedKeyError::validation(format!(
                "threshold {} exceeds total fragment count {}",
                threshold, total
            )));
        }
        if (total as usize) < MIN_RECOVERY_FRAGMENTS {
            return Err(FracturedKeyError::validation(format!(
                "at least {} fragments are needed for recovery, so total must be at least {}",
                MIN_RECOVERY_FRAGMENTS, MIN_RECOVERY_FRAGMENTS
            )));
        }
        Ok(Self { total, threshold })
    }

    pub fn total(&self) -> u8 {
        self.total
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Images recovery actually needs: the threshold, but never fewer than
    /// [`MIN_RECOVERY_FRAGMENTS`].
    pub fn required_for_recovery(&self) -> usize {
        (self.threshold as usize).max(MIN_RECOVERY_FRAGMENTS)
    }
}

impl Default for SharingParams {
    fn default() -> Self {
        Self {
            total: DEFAULT_TOTAL,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// A carrier image chosen for one fragment, plus where to write the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierSlot {
    pub carrier: PathBuf,
    pub output: Option<PathBuf>,
}

impl CarrierSlot {
    pub fn new(carrier: impl Into<PathBuf>) -> Self {
        Self {
            carrier: carrier.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Explicit output path, or `<carrier-stem>_stego_<index>.png` next to the carrier.
    pub fn output_path(&self, index: u8) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => default_output_path(&self.carrier, index),
        }
    }
}

pub fn default_output_path(carrier: &Path, index: u8) -> PathBuf {
    let stem = carrier
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "carrier".to_string());
    carrier.with_file_name(format!("{}_stego_{}.png", stem, index))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFragment {
    pub index: u8,
    pub path: PathBuf,
}

/// Outcome of the embedding loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedReport {
    pub params: SharingParams,
    pub embedded: Vec<EmbeddedFragment>,
    /// 1-based indices of fragments that had no carrier.
    pub skipped: Vec<u8>,
}

impl EmbedReport {
    pub fn embedded_count(&self) -> usize {
        self.embedded.len()
    }

    /// Fewer fragments exist than the session was configured for.
    pub fn is_degraded(&self) -> bool {
        self.embedded.len() < self.params.total as usize
    }

    /// Enough fragments exist to ever recover the secret.
    pub fn is_recoverable(&self) -> bool {
        self.embedded.len() >= self.params.required_for_recovery()
    }
}

pub struct FragmentOrchestrator<S, G> {
    sharer: S,
    stego: G,
}

/// Shamir sharing with LSB image steganography.
pub type DefaultOrchestrator = FragmentOrchestrator<ShamirSharer, LsbSteganographer>;

impl Default for DefaultOrchestrator {
    fn default() -> Self {
        Self::new(ShamirSharer, LsbSteganographer)
    }
}

impl<S: SecretSharer, G: Steganographer> FragmentOrchestrator<S, G> {
    pub fn new(sharer: S, stego: G) -> Self {
        Self { sharer, stego }
    }

    /// Wrap the blob under a fresh ephemeral key and produce one envelope per share.
    pub fn seal_envelopes(
        &self,
        blob: &SecretBlob,
        params: SharingParams,
    ) -> Result<Vec<Envelope>> {
        let (key, packaged) = keywrap::wrap(blob)?;
        let fragments = self
            .sharer
            .split(key.as_bytes(), params.total, params.threshold)?;

        let envelopes = (1..=params.total)
            .zip(fragments)
            .map(|(index, fragment)| {
                Envelope::new(
                    fragment,
                    index,
                    params.total,
                    params.threshold,
                    packaged.clone(),
                )
            })
            .collect();
        Ok(envelopes)
    }

    /// Hide each envelope in its carrier.
    ///
    /// `carriers[i]` belongs to fragment `i + 1`. A missing slot skips that
    /// fragment; any embedding failure aborts the remaining fragments.
    pub fn embed(
        &self,
        blob: &SecretBlob,
        params: SharingParams,
        carriers: &[Option<CarrierSlot>],
    ) -> Result<EmbedReport> {
        info!(
            total = params.total,
            threshold = params.threshold,
            "splitting ephemeral key into fragments"
        );
        let envelopes = self.seal_envelopes(blob, params)?;

        let mut report = EmbedReport {
            params,
            embedded: Vec::new(),
            skipped: Vec::new(),
        };

        for env in &envelopes {
            let index = env.index;
            debug!(index, total = params.total, "processing fragment");

            let Some(slot) = carriers.get(index as usize - 1).and_then(Option::as_ref) else {
                warn!(index, "no carrier selected for fragment; skipping");
                report.skipped.push(index);
                continue;
            };

            let output = slot.output_path(index);
            let payload = env.to_bytes()?;
            let saved = self
                .stego
                .embed(&slot.carrier, &payload, &output)
                .map_err(|e| e.with_context(format!("failed to embed fragment {}", index)))?;
            info!(index, path = %saved.display(), "fragment embedded");
            report.embedded.push(EmbeddedFragment { index, path: saved });
        }

        if report.embedded.is_empty() {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::NoFragmentsEmbedded,
                "no carrier images were supplied; nothing was embedded",
            ));
        }
        if report.is_degraded() {
            warn!(
                embedded = report.embedded.len(),
                total = params.total,
                "fewer fragments embedded than configured"
            );
        }

        Ok(report)
    }

    /// Validate a set of parsed envelopes and open their packaged cipher.
    pub fn recombine(&self, envelopes: &[Envelope]) -> Result<SecretBlob> {
        if envelopes.len() < MIN_RECOVERY_FRAGMENTS {
            return Err(insufficient(MIN_RECOVERY_FRAGMENTS, envelopes.len()));
        }

        let first = &envelopes[0];
        let same_session = envelopes.iter().all(|env| {
            env.version == first.version
                && env.total == first.total
                && env.threshold == first.threshold
                && env.packaged_cipher == first.packaged_cipher
        });
        if !same_session {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::Compatibility,
                "selected images are not from the same session",
            ));
        }
        if first.version != envelope::VERSION {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::Compatibility,
                format!("unsupported fragment version {}", first.version),
            ));
        }

        let threshold = first.threshold;
        if threshold == 0 {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::Compatibility,
                "fragments declare a threshold of 0",
            ));
        }
        if envelopes.len() < threshold as usize {
            return Err(insufficient(threshold as usize, envelopes.len()));
        }

        // The same image given twice carries the same share.
        let mut seen = HashSet::new();
        let distinct: Vec<&Envelope> = envelopes
            .iter()
            .filter(|env| seen.insert(env.index))
            .collect();
        if distinct.len() < envelopes.len() {
            warn!(
                supplied = envelopes.len(),
                distinct = distinct.len(),
                "duplicate fragments ignored"
            );
        }
        let required = (threshold as usize).max(MIN_RECOVERY_FRAGMENTS);
        if distinct.len() < required {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::InsufficientFragments,
                format!(
                    "need at least {} distinct fragments, got {}",
                    required,
                    distinct.len()
                ),
            ));
        }

        info!(threshold, "recovering ephemeral key");
        let fragments: Vec<&[u8]> = distinct[..threshold as usize]
            .iter()
            .map(|env| env.fragment.as_slice())
            .collect();
        let candidate = self.sharer.reconstruct(&fragments, threshold)?;
        let key = EphemeralKey::normalize(&candidate);

        keywrap::unwrap(&first.packaged_cipher, &key)
    }

    /// Extract and parse one envelope per image, then recombine.
    ///
    /// A malformed payload in any image is fatal.
    pub fn recover_from_images(&self, images: &[PathBuf]) -> Result<SecretBlob> {
        info!(count = images.len(), "processing stego images");

        let mut envelopes = Vec::with_capacity(images.len());
        for path in images {
            let payload = self
                .stego
                .extract(path)
                .map_err(|e| e.with_context(format!("failed to extract from {}", path.display())))?;
            let env = envelope::parse(&payload).map_err(|e| {
                e.with_context(format!("failed to parse fragment from {}", path.display()))
            })?;
            info!(index = env.index, total = env.total, "found fragment");
            envelopes.push(env);
        }

        self.recombine(&envelopes)
    }
}

fn insufficient(required: usize, provided: usize) -> FracturedKeyError {
    FracturedKeyError::with_kind(
        ErrorCategory::User,
        ErrorKind::InsufficientFragments,
        format!("need at least {} fragments, got {}", required, provided),
    )
}
