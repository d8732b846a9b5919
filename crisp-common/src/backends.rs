//! "Backends" representing the round server, either reached over HTTP
//! or simulated in memory in tests.
//!
//! This abstraction exists primarly to enable mocks for testing.

use std::future::Future;

use crate::{
    errors::VoteError,
    types::{BroadcastVoteRequest, BroadcastVoteResponse, RoundId, RoundState},
};

/// The round server as seen by the voter client: a source of round state
/// and a relay for encrypted votes
pub trait RoundStateClient: Send + Sync {
    /// Fetch the number of rounds created so far
    fn round_count(&self) -> impl Future<Output = Result<u32, VoteError>> + Send;

    /// Fetch the lite state of a round
    fn round_state(
        &self,
        round_id: RoundId,
    ) -> impl Future<Output = Result<RoundState, VoteError>> + Send;

    /// Fetch the number of votes cast in a round
    fn vote_count(&self, round_id: RoundId)
        -> impl Future<Output = Result<u32, VoteError>> + Send;

    /// Submit an encrypted vote for relaying
    fn broadcast_vote(
        &self,
        request: &BroadcastVoteRequest,
    ) -> impl Future<Output = Result<BroadcastVoteResponse, VoteError>> + Send;

    /// Fetch the state of the latest round.
    ///
    /// Round ids start at 1, so a round count of 0 means there is no round
    fn current_round(&self) -> impl Future<Output = Result<RoundState, VoteError>> + Send {
        async move {
            match self.round_count().await? {
                0 => Err(VoteError::NoActiveRound),
                latest => self.round_state(latest).await,
            }
        }
    }
}
