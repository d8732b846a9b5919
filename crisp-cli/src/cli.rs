//! Definitions of CLI arguments and commands

use std::{
    fmt::{self, Display},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use crisp_common::constants::{CIRCUIT_PROGRAM_FILE, NUM_POLL_OPTIONS, PROVING_KEY_FILE};
use crisp_core::{artifacts::ArtifactSource, coordinator::ProtocolVersion};
use eyre::Result;

use crate::commands::{cast_vote, setup, show_round};

/// Casts encrypted votes in CRISP polls
#[derive(Parser)]
pub struct Cli {
    /// Base URL of the round server's API
    #[arg(long, env = "ENCLAVE_API", default_value = "http://127.0.0.1:4000")]
    pub enclave_api: String,

    /// Timeout for requests to the round server, in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The available commands
#[derive(Subcommand)]
pub enum Command {
    /// Compile the vote circuit and generate its keys
    Setup(SetupArgs),
    /// Show the current round
    Round,
    /// Cast a vote in the current round
    Vote(VoteArgs),
}

impl Command {
    /// Runs the command
    pub async fn run(self, enclave_api: &str, timeout_secs: u64) -> Result<()> {
        match self {
            Command::Setup(args) => setup(args).await,
            Command::Round => show_round(enclave_api, timeout_secs).await,
            Command::Vote(args) => cast_vote(args, enclave_api, timeout_secs).await,
        }
    }
}

/// Compile the vote circuit and write its program, proving key and
/// verifying key to a directory
#[derive(Args)]
pub struct SetupArgs {
    /// Directory to write the artifacts to
    #[arg(short, long, default_value = "artifacts")]
    pub out_dir: PathBuf,

    /// Number of options in the poll
    #[arg(short, long, default_value_t = NUM_POLL_OPTIONS)]
    pub num_options: usize,
}

/// Cast a vote in the current round
#[derive(Args)]
pub struct VoteArgs {
    /// Index of the chosen option
    #[arg(short, long)]
    pub choice: u64,

    /// Authentication token identifying the voter to the round server
    #[arg(long, env = "CRISP_AUTH_TOKEN")]
    pub auth_token: String,

    /// Path or URL of the compiled vote circuit
    #[arg(long, default_value_t = default_source(CIRCUIT_PROGRAM_FILE))]
    pub circuit: ArtifactSource,

    /// Path or URL of the vote circuit's proving key
    #[arg(long, default_value_t = default_source(PROVING_KEY_FILE))]
    pub proving_key: ArtifactSource,

    /// Whether to attach a validity proof to the vote
    #[arg(long, value_enum, default_value_t = Protocol::WithProof)]
    pub protocol: Protocol,
}

/// An artifact under its default name in the default setup directory
fn default_source(file_name: &str) -> ArtifactSource {
    ArtifactSource::Path(PathBuf::from("artifacts").join(file_name))
}

/// The submission protocol
#[derive(ValueEnum, Copy, Clone)]
pub enum Protocol {
    /// Submit the encrypted vote alone
    EncryptionOnly,
    /// Submit the encrypted vote with a validity proof
    WithProof,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::EncryptionOnly => write!(f, "encryption-only"),
            Protocol::WithProof => write!(f, "with-proof"),
        }
    }
}

impl From<Protocol> for ProtocolVersion {
    fn from(protocol: Protocol) -> Self {
        match protocol {
            Protocol::EncryptionOnly => ProtocolVersion::EncryptionOnly,
            Protocol::WithProof => ProtocolVersion::WithProof,
        }
    }
}
