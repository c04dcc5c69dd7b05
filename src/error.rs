use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Fallback when the code cannot tell who is at fault. The user may still
    /// be the cause.
    Internal,

    /// Missing fields, unrelated or damaged images, a wrong passphrase.
    User,
}

/// What went wrong, for callers that react differently per condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Required user input is missing or out of range.
    Validation,
    /// An envelope or blob is shorter than its fixed header.
    TooShort,
    /// The envelope does not start with the fragment magic.
    MagicMismatch,
    /// Declared fragment/cipher lengths run past the end of the envelope.
    SizeOverflow,
    /// Envelopes disagree on version, total, threshold or packaged cipher.
    Compatibility,
    /// Fewer fragments than the session threshold were supplied.
    InsufficientFragments,
    /// AEAD tag check failed: wrong key, wrong passphrase, or tampering.
    AuthenticationFailed,
    /// Reading or writing a file, stdin or stdout failed.
    Io,
    /// Every carrier slot was empty, so no fragment was written.
    NoFragmentsEmbedded,
    /// scrypt key derivation failed.
    KdfFailure,
    /// Splitting or reconstructing the ephemeral key failed.
    SharingFailure,
    /// Embedding into or extracting from an image failed.
    Steganography,
    /// No terminal to prompt on, or the prompt itself failed.
    PassphraseUnavailable,
    /// A length or layout assumption inside the crate did not hold.
    InternalInvariant,
}

impl ErrorKind {
    /// True for the envelope/blob format family (too short, bad magic, bad lengths).
    pub fn is_format(self) -> bool {
        matches!(
            self,
            ErrorKind::TooShort | ErrorKind::MagicMismatch | ErrorKind::SizeOverflow
        )
    }
}

/// Error returned by every fallible fractured-key operation.
///
/// `Display` shows only the outermost message; use [`chain_message`] to render
/// the context chain down to the root cause.
///
/// [`chain_message`]: FracturedKeyError::chain_message
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct FracturedKeyError {
    pub category: ErrorCategory,
    /// Not every failure is tagged; callers branching on it need a fallback arm.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl FracturedKeyError {
    fn build(
        category: ErrorCategory,
        kind: Option<ErrorKind>,
        msg: String,
        source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            category,
            kind,
            source,
            msg,
        }
    }

    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self::build(category, Some(kind), msg.into(), None)
    }

    /// Tagged error caused by a lower-level failure (I/O, image codec, ...).
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::build(category, Some(kind), msg.into(), Some(Box::new(source)))
    }

    /// Missing or out-of-range user input.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::Validation, msg)
    }

    /// TooShort, MagicMismatch or SizeOverflow.
    pub fn is_format_error(&self) -> bool {
        self.kind.is_some_and(ErrorKind::is_format)
    }

    /// Prefix a higher-level message. Category and kind carry over from `self`,
    /// which becomes the source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let (category, kind) = (self.category, self.kind);
        Self::build(category, kind, msg.into(), Some(Box::new(self)))
    }

    /// `outer: inner: root`, one segment per error in the source chain.
    pub fn chain_message(&self) -> String {
        let mut out = self.msg.clone();
        let mut next = StdError::source(self);
        while let Some(err) = next {
            out.push_str(": ");
            out.push_str(&err.to_string());
            next = err.source();
        }
        out
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FracturedKeyError>;
