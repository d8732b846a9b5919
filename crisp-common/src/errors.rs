//! Errors that can occur while casting a vote

use thiserror::Error;

use crate::types::RoundId;

/// An error in any stage of the vote pipeline.
///
/// Every stage surfaces its failures unchanged to the coordinator, which halts
/// the attempt. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum VoteError {
    /// Fetching or parsing the circuit program or proving key failed.
    /// A later attempt re-runs initialization
    #[error("error initializing crypto context: {0}")]
    Initialization(String),
    /// The round public key is malformed or the encryption primitive faulted
    #[error("error encrypting vote: {0}")]
    Encryption(String),
    /// The crypto context is unavailable, the witness does not satisfy the
    /// circuit, or the prover faulted
    #[error("error generating proof: {0}")]
    ProofGeneration(String),
    /// The round server refused the vote, carrying its message verbatim
    #[error("{0}")]
    SubmissionRejected(String),
    /// The round server could not be reached or replied with garbage
    #[error("network error: {0}")]
    Network(String),
    /// There is no round open for voting
    #[error("no active round")]
    NoActiveRound,
    /// The choice is not one of the round's options
    #[error("choice {choice} is not one of the {num_options} options of round {round_id}")]
    InvalidChoice {
        /// The rejected choice
        choice: u64,
        /// The number of options in the round
        num_options: usize,
        /// The round the choice was made for
        round_id: RoundId,
    },
    /// The caller abandoned the attempt before submission
    #[error("vote attempt abandoned before submission")]
    Abandoned,
    /// This client already had a vote accepted in the round
    #[error("a vote for round {0} was already accepted from this client")]
    AlreadySubmitted(RoundId),
}

/// An error that occurs during de/serialization of curve points
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerdeError {
    /// A coordinate is not an element of the base field
    #[error("coordinate is not a canonical field element")]
    ScalarConversion,
    /// The coordinates do not describe a point on the curve
    #[error("point is not on the curve")]
    InvalidPoint,
}
