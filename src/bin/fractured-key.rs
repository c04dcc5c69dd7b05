//! Fractured Key CLI
//!
//! Encrypts a secret under a master passphrase, splits the wrapping key into
//! k-of-n fragments and hides each fragment in a carrier image. Recovery
//! takes any `threshold` of the stego images plus the passphrase.

use clap::{Parser, Subcommand};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fractured_key::error::{ErrorCategory, ErrorKind, FracturedKeyError, Result};
use fractured_key::file_ops::{self, RecoveredSecret};
use fractured_key::orchestrator::{CarrierSlot, SharingParams};
use fractured_key::orchestrator::{DEFAULT_THRESHOLD, DEFAULT_TOTAL};
use fractured_key::passphrase::{
    MASTER_PROMPT, PassphraseReader, ReaderPassphraseReader, SECRET_PROMPT,
    TerminalPassphraseReader,
};
use fractured_key::worker::{OperationMessage, OperationOutput, OperationRequest, OperationRunner};

#[derive(Parser)]
#[command(name = "fractured-key")]
#[command(version)]
#[command(
    about = "Protect a secret with a master passphrase and key fragments hidden in images.",
    long_about = None
)]
struct Cli {
    /// Read the master passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a secret and hide its key fragments in carrier images
    #[command(alias = "e")]
    Encrypt {
        /// File holding the secret to protect (prompted for if omitted)
        #[arg(long, value_name = "FILE")]
        secret_file: Option<PathBuf>,

        /// Carrier image for the next fragment; repeat once per fragment
        #[arg(short, long = "carrier", value_name = "IMAGE")]
        carriers: Vec<PathBuf>,

        /// Output path for the matching carrier (default: <carrier>_stego_<i>.png)
        #[arg(long = "output", value_name = "IMAGE")]
        outputs: Vec<PathBuf>,

        /// Number of fragments to produce
        #[arg(long, default_value_t = DEFAULT_TOTAL)]
        total: u8,

        /// Number of fragments needed to recover the secret
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: u8,

        /// Skip fragmentation and write the encrypted blob to this file instead
        /// (`.bin` is appended when the name has no extension)
        #[arg(long, value_name = "FILE", conflicts_with_all = ["carriers", "outputs"])]
        single_file: Option<PathBuf>,
    },

    /// Recover a secret from stego images
    #[command(alias = "d")]
    Decrypt {
        /// Stego image holding one fragment; fragments are combined in the order given
        #[arg(short, long = "image", value_name = "IMAGE", required = true)]
        images: Vec<PathBuf>,

        /// Write the recovered secret to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Decrypt a blob written by `encrypt --single-file`
    #[command(alias = "b")]
    DecryptBlob {
        /// Path to the encrypted blob
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Write the recovered secret to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e.chain_message());
        process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "fractured_key=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut reader = get_passphrase_reader(cli.passphrase_stdin);

    let (request, output) = match cli.command {
        Commands::Encrypt {
            secret_file,
            carriers,
            outputs,
            total,
            threshold,
            single_file,
        } => {
            let params = SharingParams::new(total, threshold)?;
            let secret = match &secret_file {
                Some(path) => file_ops::read_secret_file(path)?,
                None => TerminalPassphraseReader::new(SECRET_PROMPT).read_passphrase()?,
            };
            let passphrase = reader.read_passphrase()?;

            let request = match single_file {
                Some(output) => OperationRequest::EncryptToFile {
                    secret,
                    passphrase,
                    output: file_ops::blob_output_path(&output),
                },
                None => OperationRequest::EncryptToImages {
                    secret,
                    passphrase,
                    params,
                    carriers: carrier_slots(params, carriers, outputs)?,
                },
            };
            (request, None)
        }
        Commands::Decrypt { images, output } => {
            let passphrase = reader.read_passphrase()?;
            (OperationRequest::DecryptImages { images, passphrase }, output)
        }
        Commands::DecryptBlob { input, output } => {
            let passphrase = reader.read_passphrase()?;
            (OperationRequest::DecryptBlob { input, passphrase }, output)
        }
    };

    let msg = run_in_background(request)?;
    match msg.outcome? {
        OperationOutput::Encrypted(outcome) => {
            eprintln!("{}", outcome.summary);
            for fragment in &outcome.report.embedded {
                eprintln!("Fragment {} saved to {}", fragment.index, fragment.path.display());
            }
            let params = outcome.report.params;
            if !outcome.report.is_recoverable() {
                eprintln!(
                    "WARNING: only {} of {} fragments were embedded but {} are required; \
                     the secret cannot be recovered from these images",
                    outcome.report.embedded_count(),
                    params.total(),
                    params.required_for_recovery()
                );
            } else if outcome.report.is_degraded() {
                eprintln!(
                    "WARNING: only {} of {} fragments were embedded; redundancy is reduced",
                    outcome.report.embedded_count(),
                    params.total()
                );
            }
        }
        OperationOutput::BlobWritten { path, summary } => {
            eprintln!("{}", summary);
            eprintln!("Encrypted blob saved to {}", path.display());
        }
        OperationOutput::Recovered(secret) => emit_secret(&secret, output.as_deref())?,
    }
    Ok(())
}

/// Run one operation on a blocking worker and wait for its single result.
fn run_in_background(request: OperationRequest) -> Result<OperationMessage> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .map_err(|e| {
            FracturedKeyError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to start worker runtime",
                e,
            )
        })?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = OperationRunner::new(rt.handle().clone(), tx);
    runner.start(request)?;

    rx.blocking_recv().ok_or_else(|| {
        FracturedKeyError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "worker exited without reporting a result",
        )
    })
}

/// Pair carriers with outputs and pad to `total` slots; unfilled slots are skipped fragments.
fn carrier_slots(
    params: SharingParams,
    carriers: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
) -> Result<Vec<Option<CarrierSlot>>> {
    let total = params.total() as usize;
    if carriers.len() > total {
        return Err(FracturedKeyError::validation(format!(
            "{} carriers given but only {} fragments are produced",
            carriers.len(),
            total
        )));
    }
    if outputs.len() > carriers.len() {
        return Err(FracturedKeyError::validation(
            "more --output paths than --carrier images",
        ));
    }

    let mut outputs = outputs.into_iter();
    let mut slots: Vec<Option<CarrierSlot>> = carriers
        .into_iter()
        .map(|carrier| {
            let slot = CarrierSlot::new(carrier);
            Some(match outputs.next() {
                Some(output) => slot.with_output(output),
                None => slot,
            })
        })
        .collect();
    slots.resize(total, None);
    Ok(slots)
}

fn emit_secret(secret: &RecoveredSecret, output: Option<&std::path::Path>) -> Result<()> {
    if let Some(path) = output {
        file_ops::write_secret_file(path, secret)?;
        eprintln!("Recovered secret written to {}", path.display());
        return Ok(());
    }

    let mut stdout = io::stdout();
    let mut write = || -> io::Result<()> {
        stdout.write_all(secret.as_bytes())?;
        if stdout.is_terminal() {
            stdout.write_all(b"\n")?;
        }
        stdout.flush()
    };
    write().map_err(|e| {
        FracturedKeyError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write secret to stdout",
            e,
        )
    })
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader::new(MASTER_PROMPT))
    }
}
