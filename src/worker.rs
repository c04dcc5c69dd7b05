//! Running operations off the caller's thread
//!
//! Key derivation and image processing take long enough to freeze an
//! interactive front end, so each operation runs as a blocking task on a
//! tokio runtime. The request owns a snapshot of everything it needs (the
//! image list included) and the task posts exactly one [`OperationMessage`]
//! back over an unbounded channel when it finishes.

use crate::blob::BlobSummary;
use crate::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use crate::file_ops::{self, EncryptOutcome, RecoveredSecret};
use crate::orchestrator::{CarrierSlot, SharingParams};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Encrypt,
    Decrypt,
    ManualDecrypt,
}

impl OperationKind {
    fn slot(self) -> usize {
        match self {
            OperationKind::Encrypt => 0,
            OperationKind::Decrypt => 1,
            OperationKind::ManualDecrypt => 2,
        }
    }
}

/// Work to run in the background, with its inputs captured at submit time.
pub enum OperationRequest {
    EncryptToImages {
        secret: Zeroizing<Vec<u8>>,
        passphrase: Zeroizing<Vec<u8>>,
        params: SharingParams,
        carriers: Vec<Option<CarrierSlot>>,
    },
    EncryptToFile {
        secret: Zeroizing<Vec<u8>>,
        passphrase: Zeroizing<Vec<u8>>,
        output: PathBuf,
    },
    DecryptImages {
        images: Vec<PathBuf>,
        passphrase: Zeroizing<Vec<u8>>,
    },
    DecryptBlob {
        input: PathBuf,
        passphrase: Zeroizing<Vec<u8>>,
    },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::EncryptToImages { .. } | OperationRequest::EncryptToFile { .. } => {
                OperationKind::Encrypt
            }
            OperationRequest::DecryptImages { .. } => OperationKind::Decrypt,
            OperationRequest::DecryptBlob { .. } => OperationKind::ManualDecrypt,
        }
    }

    /// Run the request on the current thread.
    pub fn run(self) -> Result<OperationOutput> {
        match self {
            OperationRequest::EncryptToImages {
                secret,
                passphrase,
                params,
                carriers,
            } => file_ops::encrypt_to_images(&secret, &passphrase, params, &carriers)
                .map(OperationOutput::Encrypted),
            OperationRequest::EncryptToFile {
                secret,
                passphrase,
                output,
            } => file_ops::encrypt_to_file(&secret, &passphrase, &output)
                .map(|summary| OperationOutput::BlobWritten { path: output, summary }),
            OperationRequest::DecryptImages { images, passphrase } => {
                file_ops::decrypt_from_images(&images, &passphrase).map(OperationOutput::Recovered)
            }
            OperationRequest::DecryptBlob { input, passphrase } => {
                file_ops::decrypt_blob_file(&input, &passphrase).map(OperationOutput::Recovered)
            }
        }
    }
}

#[derive(Debug)]
pub enum OperationOutput {
    Encrypted(EncryptOutcome),
    BlobWritten { path: PathBuf, summary: BlobSummary },
    Recovered(RecoveredSecret),
}

/// Posted once per finished operation.
#[derive(Debug)]
pub struct OperationMessage {
    pub kind: OperationKind,
    pub outcome: Result<OperationOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Receiver-side view of each operation kind.
#[derive(Debug, Default)]
pub struct OperationBoard {
    states: [OperationState; 3],
}

impl OperationBoard {
    pub fn state(&self, kind: OperationKind) -> OperationState {
        self.states[kind.slot()]
    }

    pub fn mark_running(&mut self, kind: OperationKind) {
        self.states[kind.slot()] = OperationState::Running;
    }

    pub fn handle_message(&mut self, msg: &OperationMessage) {
        self.states[msg.kind.slot()] = match msg.outcome {
            Ok(_) => OperationState::Succeeded,
            Err(_) => OperationState::Failed,
        };
    }

    /// Return a finished kind to `Idle` once its result has been shown.
    /// A running operation is left alone.
    pub fn acknowledge(&mut self, kind: OperationKind) {
        let state = &mut self.states[kind.slot()];
        if matches!(state, OperationState::Succeeded | OperationState::Failed) {
            *state = OperationState::Idle;
        }
    }
}

/// Clears the running flag of one operation kind when dropped.
pub struct RunningGuard {
    flags: Arc<[AtomicBool; 3]>,
    slot: usize,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flags[self.slot].store(false, Ordering::Release);
    }
}

pub struct OperationRunner {
    rt: Handle,
    tx: mpsc::UnboundedSender<OperationMessage>,
    running: Arc<[AtomicBool; 3]>,
}

impl OperationRunner {
    pub fn new(rt: Handle, tx: mpsc::UnboundedSender<OperationMessage>) -> Self {
        Self {
            rt,
            tx,
            running: Arc::new([
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ]),
        }
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.running[kind.slot()].load(Ordering::Acquire)
    }

    /// Mark `kind` as running, or fail if it already is.
    pub fn try_acquire(&self, kind: OperationKind) -> Result<RunningGuard> {
        let slot = kind.slot();
        self.running[slot]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FracturedKeyError::validation("operation already running"))?;
        Ok(RunningGuard {
            flags: Arc::clone(&self.running),
            slot,
        })
    }

    /// Start `request` in the background.
    ///
    /// Fails without spawning anything if an operation of the same kind is
    /// still running. Otherwise exactly one message is posted when it ends.
    pub fn start(&self, request: OperationRequest) -> Result<()> {
        let kind = request.kind();
        let guard = self.try_acquire(kind)?;
        let tx = self.tx.clone();

        debug!(?kind, "starting background operation");
        self.rt.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| request.run()))
                .unwrap_or_else(|_| {
                    error!(?kind, "background operation panicked");
                    Err(FracturedKeyError::with_kind(
                        ErrorCategory::Internal,
                        ErrorKind::InternalInvariant,
                        "background operation panicked",
                    ))
                });
            // Release before posting so the receiver may start the next one.
            drop(guard);
            if tx.send(OperationMessage { kind, outcome }).is_err() {
                debug!(?kind, "result receiver dropped before operation finished");
            }
        });
        Ok(())
    }
}
