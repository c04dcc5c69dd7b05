//! Sources for the master passphrase and the protected secret
//!
//! Both values are plain byte strings. They come from a no-echo terminal
//! prompt, a pipe on stdin, or a fixed value in tests.

use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

pub const MASTER_PROMPT: &str = "Master passphrase (fractured-key): ";

pub const SECRET_PROMPT: &str = "Password to protect (fractured-key): ";

/// Something that yields one sensitive value per call.
pub trait PassphraseReader {
    /// The value is wiped from memory when the returned buffer is dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Yields the same bytes on every call.
pub struct ConstantPassphraseReader {
    value: Zeroizing<Vec<u8>>,
}

impl ConstantPassphraseReader {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            value: Zeroizing::new(value),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.value.clone())
    }
}

/// Drains a byte stream, usually stdin.
///
/// Exactly one line ending (`\n` or `\r\n`) is removed from the end, so
/// `echo pass | fractured-key --passphrase-stdin ...` reads `pass`. All other
/// bytes, including invalid UTF-8, are kept as-is.
pub struct ReaderPassphraseReader {
    source: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(source: Box<dyn Read>) -> Self {
        Self { source }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(Vec::new());
        self.source
            .read_to_end(&mut buf)
            .map_err(|e| io_failure(ErrorKind::Io, "reading passphrase input", e))?;
        strip_line_ending(&mut buf);
        Ok(buf)
    }
}

/// Prompts on stderr and reads one line from the terminal without echo.
///
/// rpassword only hands back UTF-8; non-UTF-8 values have to come through
/// `--passphrase-stdin`.
pub struct TerminalPassphraseReader {
    prompt: &'static str,
}

impl TerminalPassphraseReader {
    pub fn new(prompt: &'static str) -> Self {
        Self { prompt }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new(MASTER_PROMPT)
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(FracturedKeyError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "stdin is not a terminal; pass --passphrase-stdin to pipe the passphrase",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(self.prompt.as_bytes())
            .and_then(|_| stderr.flush())
            .map_err(|e| io_failure(ErrorKind::Io, "showing prompt", e))?;

        let line = rpassword::read_password()
            .map(Zeroizing::new)
            .map_err(|e| io_failure(ErrorKind::PassphraseUnavailable, "reading from terminal", e))?;
        Ok(Zeroizing::new(line.as_bytes().to_vec()))
    }
}

/// Fail with `Validation` when a required value is empty.
pub fn require_non_empty(value: &[u8], what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(FracturedKeyError::validation(format!("please enter {}", what)));
    }
    Ok(())
}

fn strip_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

fn io_failure(kind: ErrorKind, during: &str, err: io::Error) -> FracturedKeyError {
    FracturedKeyError::with_kind_and_source(
        ErrorCategory::Internal,
        kind,
        format!("failed while {}: {}", during, err),
        err,
    )
}
