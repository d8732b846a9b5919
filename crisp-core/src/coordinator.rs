//! Orchestration of a single vote: encrypt, prove, submit, refresh.
//!
//! An attempt moves through the states
//! `Idle -> Encrypting -> Proving -> Submitting -> {Succeeded | Failed}`.
//! Every stage runs only after the previous one succeeded, any failure ends
//! the attempt in `Failed`, and nothing is ever retried automatically.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use crisp_common::{
    backends::RoundStateClient,
    errors::VoteError,
    types::{
        BroadcastOutcome, BroadcastVoteRequest, RoundContext, RoundId, RoundState, VoteChoice,
        VoteSubmission,
    },
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::{encryption::EncryptionEngine, prover::ProofEngine};

// ---------
// | TYPES |
// ---------

/// Whether submissions carry a validity proof
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Submit the ciphertext alone, skipping the proving stage
    EncryptionOnly,
    /// Submit the ciphertext along with a proof that it encrypts a valid choice
    #[default]
    WithProof,
}

impl ProtocolVersion {
    /// Whether this protocol version attaches a proof to submissions
    pub fn requires_proof(&self) -> bool {
        matches!(self, ProtocolVersion::WithProof)
    }
}

/// The configuration of a [`VoteSubmissionCoordinator`]
#[derive(Clone, Debug, Default)]
pub struct CoordinatorConfig {
    /// Whether submissions carry a proof
    pub protocol: ProtocolVersion,
    /// The voter's authentication token, forwarded to the round server
    pub auth_token: String,
}

/// The state of a vote attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    /// No attempt has started
    Idle,
    /// The choice is being encrypted
    Encrypting,
    /// The validity proof is being generated
    Proving,
    /// The vote was handed to the round server
    Submitting,
    /// The round server accepted the vote
    Succeeded,
    /// The attempt ended without the vote being accepted
    Failed,
}

impl SubmissionState {
    /// Whether the attempt is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Succeeded | SubmissionState::Failed)
    }
}

/// A handle through which the caller may abandon an attempt in flight.
///
/// Abandoning does not interrupt the stage in progress, but its result is
/// discarded and nothing is submitted afterwards
#[derive(Clone, Debug, Default)]
pub struct AttemptHandle {
    /// Set once the attempt is abandoned
    abandoned: Arc<AtomicBool>,
}

impl AttemptHandle {
    /// Creates a handle for a fresh attempt
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandons the attempt
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    /// Whether the attempt was abandoned
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// The result of an accepted vote
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CastReceipt {
    /// The round the vote was cast in
    pub round_id: RoundId,
    /// The hash of the relay transaction
    pub tx_hash: String,
    /// The round server's message
    pub message: String,
    /// The round state read back after the vote was accepted, if the read
    /// succeeded
    pub refreshed_round: Option<RoundState>,
}

// ---------------
// | COORDINATOR |
// ---------------

/// Casts votes, one attempt at a time.
///
/// Concurrent calls queue behind the attempt in flight, so the local record
/// of voted rounds is always consulted after the previous attempt settled
pub struct VoteSubmissionCoordinator<C: RoundStateClient> {
    /// The round server
    client: Arc<C>,
    /// The vote encryptor
    encryption: EncryptionEngine,
    /// The validity prover
    prover: ProofEngine,
    /// The coordinator's configuration
    config: CoordinatorConfig,
    /// Held for the whole of an attempt
    attempt_lock: AsyncMutex<()>,
    /// The states the latest attempt went through, in order
    history: Mutex<Vec<SubmissionState>>,
    /// The rounds a vote from this coordinator was already recorded in
    voted_rounds: Mutex<HashSet<RoundId>>,
}

impl<C: RoundStateClient> VoteSubmissionCoordinator<C> {
    /// Creates a coordinator
    pub fn new(
        client: Arc<C>,
        encryption: EncryptionEngine,
        prover: ProofEngine,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            client,
            encryption,
            prover,
            config,
            attempt_lock: AsyncMutex::new(()),
            history: Mutex::new(vec![SubmissionState::Idle]),
            voted_rounds: Mutex::new(HashSet::new()),
        }
    }

    /// The state of the latest attempt
    pub fn state(&self) -> SubmissionState {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
            .unwrap_or(SubmissionState::Idle)
    }

    /// Every state the latest attempt went through, starting at `Idle`
    pub fn history(&self) -> Vec<SubmissionState> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetches the latest round and casts `choice` in it
    pub async fn vote_in_current_round(&self, choice: u64) -> Result<CastReceipt, VoteError> {
        let _attempt = self.attempt_lock.lock().await;
        self.begin_attempt();

        let round = match self.client.current_round().await {
            Ok(state) => RoundContext::from_state(&state, unix_now()),
            Err(e) => Err(e),
        };
        match round {
            Ok(round) => self.run_attempt(choice, &round, &AttemptHandle::new()).await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Casts `choice` in `round`
    pub async fn cast_vote(
        &self,
        choice: u64,
        round: &RoundContext,
    ) -> Result<CastReceipt, VoteError> {
        self.cast_vote_with_handle(choice, round, &AttemptHandle::new())
            .await
    }

    /// Casts `choice` in `round`, giving up before submission if `handle`
    /// is abandoned
    pub async fn cast_vote_with_handle(
        &self,
        choice: u64,
        round: &RoundContext,
        handle: &AttemptHandle,
    ) -> Result<CastReceipt, VoteError> {
        let _attempt = self.attempt_lock.lock().await;
        self.begin_attempt();
        self.run_attempt(choice, round, handle).await
    }

    /// Runs an attempt that was already started
    async fn run_attempt(
        &self,
        choice: u64,
        round: &RoundContext,
        handle: &AttemptHandle,
    ) -> Result<CastReceipt, VoteError> {
        self.encrypt_prove_submit(choice, round, handle)
            .await
            .map_err(|e| self.fail(e))
    }

    /// The body of an attempt, from validation to the read-back of the round
    async fn encrypt_prove_submit(
        &self,
        choice: u64,
        round: &RoundContext,
        handle: &AttemptHandle,
    ) -> Result<CastReceipt, VoteError> {
        let round_id = round.id();
        if self.has_voted_in(round_id) {
            return Err(VoteError::AlreadySubmitted(round_id));
        }
        if !round.is_open(unix_now()) || round.public_key().is_empty() {
            return Err(VoteError::NoActiveRound);
        }
        let choice = VoteChoice::new(choice, round)?;

        self.transition(SubmissionState::Encrypting);
        info!(round_id, "encrypting vote");
        let encrypted_vote = self.encryption.encrypt(&choice, round.public_key()).await?;
        ensure_live(handle)?;

        let proof = if self.config.protocol.requires_proof() {
            self.transition(SubmissionState::Proving);
            let proof = self.prover.prove(&choice).await?;
            ensure_live(handle)?;
            Some(proof)
        } else {
            None
        };

        self.transition(SubmissionState::Submitting);
        let submission = VoteSubmission {
            round_id,
            encrypted_vote,
            proof,
            auth_token: self.config.auth_token.clone(),
        };
        info!(round_id, with_proof = submission.proof.is_some(), "submitting vote");
        let response = self
            .client
            .broadcast_vote(&BroadcastVoteRequest::from(submission))
            .await?;

        match BroadcastOutcome::from(response.response.as_str()) {
            BroadcastOutcome::VoteSuccessful => {
                self.record_vote(round_id);
                self.transition(SubmissionState::Succeeded);
                info!(round_id, tx_hash = %response.tx_hash, "vote accepted");
            }
            BroadcastOutcome::AlreadyVoted => {
                self.record_vote(round_id);
                warn!(round_id, "round server reports a vote was already cast");
                return Err(VoteError::SubmissionRejected(response.response));
            }
            BroadcastOutcome::Unknown(message) => {
                warn!(round_id, response = %message, "unrecognised response from round server");
                return Err(VoteError::SubmissionRejected(message));
            }
        }

        let refreshed_round = match self.client.round_state(round_id).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(round_id, error = %e, "failed to refresh round after vote");
                None
            }
        };

        Ok(CastReceipt {
            round_id,
            tx_hash: response.tx_hash,
            message: response.response,
            refreshed_round,
        })
    }

    /// Starts a fresh attempt
    fn begin_attempt(&self) {
        *self.history.lock().unwrap_or_else(PoisonError::into_inner) = vec![SubmissionState::Idle];
    }

    /// Records a state transition of the current attempt
    fn transition(&self, state: SubmissionState) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state);
    }

    /// Ends the current attempt in failure, passing the error through
    fn fail(&self, error: VoteError) -> VoteError {
        warn!(error = %error, "vote attempt failed");
        self.transition(SubmissionState::Failed);
        error
    }

    /// Whether a vote from this coordinator was recorded in the round
    fn has_voted_in(&self, round_id: RoundId) -> bool {
        self.voted_rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&round_id)
    }

    /// Records that the round server holds a vote from this coordinator
    fn record_vote(&self, round_id: RoundId) {
        self.voted_rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(round_id);
    }
}

/// Fails if the attempt was abandoned
fn ensure_live(handle: &AttemptHandle) -> Result<(), VoteError> {
    if handle.is_abandoned() {
        return Err(VoteError::Abandoned);
    }
    Ok(())
}

/// The current unix timestamp, in seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{AttemptHandle, ProtocolVersion, SubmissionState};

    #[test]
    fn test_terminal_states() {
        assert!(SubmissionState::Succeeded.is_terminal());
        assert!(SubmissionState::Failed.is_terminal());
        assert!(!SubmissionState::Submitting.is_terminal());
        assert!(!SubmissionState::Idle.is_terminal());
    }

    #[test]
    fn test_abandon_is_shared_across_clones() {
        let handle = AttemptHandle::new();
        let observer = handle.clone();

        handle.abandon();
        assert!(observer.is_abandoned());
    }

    #[test]
    fn test_default_protocol_requires_proof() {
        assert!(ProtocolVersion::default().requires_proof());
        assert!(!ProtocolVersion::EncryptionOnly.requires_proof());
    }
}
