//! An in-memory round server

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
};

use crisp_common::{
    backends::RoundStateClient,
    constants::{USER_ALREADY_VOTED, VOTE_SUCCESSFUL},
    errors::VoteError,
    types::{BroadcastVoteRequest, BroadcastVoteResponse, RoundId, RoundPublicKey, RoundState},
};
use crisp_core::coordinator::unix_now;

/// The labels of the options of every mock round
pub const MOCK_OPTIONS: [&str; 2] = ["yes", "no"];

/// How long mock rounds stay open, in seconds
pub const MOCK_POLL_LENGTH: u32 = 3600;

/// The mutable state of the mock server
#[derive(Default)]
struct ServerState {
    /// The rounds, indexed by id - 1
    rounds: Vec<RoundState>,
    /// The `(round, auth token)` pairs that have voted
    voters: HashSet<(RoundId, String)>,
    /// Every broadcast request received, in order
    broadcasts: Vec<BroadcastVoteRequest>,
    /// A response returned to every broadcast instead of processing it
    forced_response: Option<String>,
    /// Whether broadcasts fail as if the server were unreachable
    broadcast_unreachable: bool,
    /// Whether round state reads fail as if the server were unreachable
    reads_unreachable: bool,
}

/// A round server that keeps rounds and votes in memory, mimicking the
/// responses of the real one
#[derive(Default)]
pub struct MockRoundServer {
    /// The server's state
    state: Mutex<ServerState>,
    /// The number of round state reads served
    round_state_calls: AtomicUsize,
}

impl MockRoundServer {
    /// Creates a server with no rounds
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the server's state
    fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a new round under `public_key` that already holds `vote_count`
    /// votes, returning its state
    pub fn open_round(&self, public_key: &RoundPublicKey, vote_count: u32) -> RoundState {
        let mut state = self.state();
        let round = RoundState {
            id: state.rounds.len() as RoundId + 1,
            status: "Active".to_string(),
            poll_length: MOCK_POLL_LENGTH,
            vote_count,
            pk: public_key.as_bytes().to_vec(),
            start_time: unix_now(),
            emojis: MOCK_OPTIONS.map(str::to_string),
            ..Default::default()
        };
        state.rounds.push(round.clone());
        round
    }

    /// Answers every subsequent broadcast with `response`
    pub fn force_response(&self, response: &str) {
        self.state().forced_response = Some(response.to_string());
    }

    /// Makes broadcasts fail as if the server were unreachable
    pub fn make_broadcast_unreachable(&self) {
        self.state().broadcast_unreachable = true;
    }

    /// Makes round state reads fail as if the server were unreachable
    pub fn make_reads_unreachable(&self) {
        self.state().reads_unreachable = true;
    }

    /// Every broadcast request received so far
    pub fn broadcasts(&self) -> Vec<BroadcastVoteRequest> {
        self.state().broadcasts.clone()
    }

    /// The number of round state reads served so far
    pub fn round_state_calls(&self) -> usize {
        self.round_state_calls.load(Ordering::SeqCst)
    }

    /// Looks up a round
    fn round(&self, round_id: RoundId) -> Result<RoundState, VoteError> {
        let state = self.state();
        if state.reads_unreachable {
            return Err(VoteError::Network("connection refused".to_string()));
        }

        round_id
            .checked_sub(1)
            .and_then(|idx| state.rounds.get(idx as usize))
            .cloned()
            .ok_or_else(|| VoteError::Network(format!("round {round_id} not found")))
    }
}

impl RoundStateClient for MockRoundServer {
    async fn round_count(&self) -> Result<u32, VoteError> {
        Ok(self.state().rounds.len() as u32)
    }

    async fn round_state(&self, round_id: RoundId) -> Result<RoundState, VoteError> {
        self.round_state_calls.fetch_add(1, Ordering::SeqCst);
        self.round(round_id)
    }

    async fn vote_count(&self, round_id: RoundId) -> Result<u32, VoteError> {
        self.round(round_id).map(|round| round.vote_count)
    }

    async fn broadcast_vote(
        &self,
        request: &BroadcastVoteRequest,
    ) -> Result<BroadcastVoteResponse, VoteError> {
        let mut state = self.state();
        state.broadcasts.push(request.clone());

        if state.broadcast_unreachable {
            return Err(VoteError::Network("connection reset by peer".to_string()));
        }
        if let Some(response) = state.forced_response.clone() {
            return Ok(BroadcastVoteResponse {
                response,
                tx_hash: String::new(),
            });
        }

        let round_idx = request
            .round_id
            .checked_sub(1)
            .map(|idx| idx as usize)
            .filter(|idx| *idx < state.rounds.len())
            .ok_or_else(|| VoteError::Network(format!("round {} not found", request.round_id)))?;

        let voter = (request.round_id, request.auth_token.clone());
        if !state.voters.insert(voter) {
            return Ok(BroadcastVoteResponse {
                response: USER_ALREADY_VOTED.to_string(),
                tx_hash: String::new(),
            });
        }

        state.rounds[round_idx].vote_count += 1;
        let num_broadcasts = state.broadcasts.len();

        Ok(BroadcastVoteResponse {
            response: VOTE_SUCCESSFUL.to_string(),
            tx_hash: format!("0x{num_broadcasts:064x}"),
        })
    }
}
