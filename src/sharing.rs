//! Threshold secret sharing of the ephemeral key
//!
//! The orchestrator only depends on the [`SecretSharer`] trait. The concrete
//! implementation is Shamir's scheme over GF(256) from the `sharks` crate:
//! each fragment is `x ‖ y-bytes`, one y byte per secret byte.

use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use sharks::{Share, Sharks};
use zeroize::Zeroizing;

/// Splits a secret into `total` fragments, any `threshold` of which rebuild it.
pub trait SecretSharer {
    fn split(&self, secret: &[u8], total: u8, threshold: u8) -> Result<Vec<Vec<u8>>>;

    /// Rebuild the secret from at least `threshold` fragments. Fragment order
    /// must not matter.
    fn reconstruct(&self, fragments: &[&[u8]], threshold: u8) -> Result<Zeroizing<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShamirSharer;

impl SecretSharer for ShamirSharer {
    fn split(&self, secret: &[u8], total: u8, threshold: u8) -> Result<Vec<Vec<u8>>> {
        if threshold == 0 || total < threshold {
            return Err(FracturedKeyError::validation(format!(
                "cannot split into {} fragments with threshold {}",
                total, threshold
            )));
        }

        let dealer = Sharks(threshold).dealer(secret);
        let fragments: Vec<Vec<u8>> = dealer
            .take(total as usize)
            .map(|share| Vec::from(&share))
            .collect();

        if fragments.len() != total as usize {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::SharingFailure,
                format!("expected {} fragments, got {}", total, fragments.len()),
            ));
        }

        Ok(fragments)
    }

    fn reconstruct(&self, fragments: &[&[u8]], threshold: u8) -> Result<Zeroizing<Vec<u8>>> {
        if threshold == 0 || fragments.len() < threshold as usize {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::InsufficientFragments,
                format!(
                    "need at least {} fragments, got {}",
                    threshold.max(1),
                    fragments.len()
                ),
            ));
        }

        let shares = fragments
            .iter()
            .map(|bytes| {
                Share::try_from(*bytes).map_err(|e| {
                    FracturedKeyError::with_kind(
                        ErrorCategory::User,
                        ErrorKind::SharingFailure,
                        format!("invalid fragment: {}", e),
                    )
                })
            })
            .collect::<Result<Vec<Share>>>()?;

        let secret = Sharks(threshold).recover(&shares).map_err(|e| {
            FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::SharingFailure,
                format!("failed to reconstruct key from fragments: {}", e),
            )
        })?;

        Ok(Zeroizing::new(secret))
    }
}
