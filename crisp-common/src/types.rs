//! Common types used throughout the vote pipeline

use ark_bn254::{g1::Config as G1Config, g2::Config as G2Config, Fq, Fq2, Fr};
use ark_ec::short_weierstrass::Affine;
use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{
    constants::{USER_ALREADY_VOTED, VOTE_SUCCESSFUL},
    errors::VoteError,
};

/// Type alias for an element of the scalar field of the Bn254 curve
pub type ScalarField = Fr;

/// Type alias for an element of the Bn254 curve's G1 pairing group
pub type G1Affine = Affine<G1Config>;

/// Type alias for an element of the Bn254 curve's G2 pairing group
pub type G2Affine = Affine<G2Config>;

/// Type alias for an element of the Bn254 curve's G1 pairing group's base field
pub type G1BaseField = Fq;

/// Type alias for an element of the Bn254 curve's G2 pairing group's base field
pub type G2BaseField = Fq2;

/// The identifier of a voting round, as assigned by the round server
pub type RoundId = u32;

/// The affine coordinates of a G1 point, or one coordinate of a G2 point
pub type U256Pair = [U256; 2];

// ----------
// | ROUNDS |
// ----------

/// The homomorphic encryption public key of a round
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundPublicKey(Vec<u8>);

impl RoundPublicKey {
    /// Wraps the serialized key
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The serialized key
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the round server has published a key yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The lite view of a round's state, as served by the round server.
///
/// Fields the server adds that are not listed here are ignored
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundState {
    /// The round identifier
    pub id: RoundId,
    /// The lifecycle status of the round
    pub status: String,
    /// The length of the voting window, in seconds
    pub poll_length: u32,
    /// The address of the voting contract votes are relayed to
    pub voting_address: String,
    /// The chain the voting contract is deployed on
    pub chain_id: u32,
    /// The number of ciphernodes that joined the round
    pub ciphernode_count: u32,
    /// The number of public key shares received
    pub pk_share_count: u32,
    /// The number of secret key shares received
    pub sks_share_count: u32,
    /// The number of votes cast so far
    pub vote_count: u32,
    /// The aggregated BFV public key of the round
    pub pk: Vec<u8>,
    /// The unix timestamp at which voting opened
    pub start_time: i64,
    /// The number of ciphernodes the round requires
    pub ciphernode_total: u32,
    /// The labels of the two poll options
    pub emojis: [String; 2],
}

/// A round that is open for voting.
///
/// This is the only way to obtain a round to vote in, so a stale round, or a
/// round without a public key, can never reach the encryption stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundContext {
    /// The round identifier
    id: RoundId,
    /// The round public key
    public_key: RoundPublicKey,
    /// The labels of the round's options, indexed by choice
    options: Vec<String>,
    /// The unix timestamp at which voting closes
    end_time: i64,
}

impl RoundContext {
    /// Validates that the round is open at `now` and has a public key
    pub fn from_state(state: &RoundState, now: i64) -> Result<Self, VoteError> {
        let end_time = state.start_time.saturating_add(i64::from(state.poll_length));
        if state.pk.is_empty() || now >= end_time {
            return Err(VoteError::NoActiveRound);
        }

        Ok(Self {
            id: state.id,
            public_key: RoundPublicKey::new(state.pk.clone()),
            options: state.emojis.to_vec(),
            end_time,
        })
    }

    /// The round identifier
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// The round public key
    pub fn public_key(&self) -> &RoundPublicKey {
        &self.public_key
    }

    /// The labels of the round's options
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// The unix timestamp at which voting closes
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Whether voting is still open at `now`
    pub fn is_open(&self, now: i64) -> bool {
        now < self.end_time
    }
}

/// A choice that was validated against a round's option set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteChoice {
    /// The index of the chosen option
    index: u64,
    /// The round the choice was validated against
    round_id: RoundId,
}

impl VoteChoice {
    /// Validates `index` against the options of `round`
    pub fn new(index: u64, round: &RoundContext) -> Result<Self, VoteError> {
        let num_options = round.options().len();
        if index >= num_options as u64 {
            return Err(VoteError::InvalidChoice {
                choice: index,
                num_options,
                round_id: round.id(),
            });
        }

        Ok(Self {
            index,
            round_id: round.id(),
        })
    }

    /// Builds a choice without checking it against any round.
    ///
    /// Only the vote circuit stands between such a choice and a proof,
    /// which is what tests of the circuit's range check need
    pub fn new_unchecked(index: u64, round_id: RoundId) -> Self {
        Self { index, round_id }
    }

    /// The index of the chosen option
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The round the choice was validated against
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }
}

// ----------
// | VOTING |
// ----------

/// A BFV ciphertext of a vote
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedVote(Vec<u8>);

impl EncryptedVote {
    /// Wraps a serialized ciphertext
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The serialized ciphertext
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the vote, returning the serialized ciphertext
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// A Groth16 proof in the coordinate order the proving library emits.
///
/// Each G2 coordinate of `b` is the pair `(c0, c1)` of its extension field
/// coefficients
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawProof {
    /// The G1 element `A`
    pub a: U256Pair,
    /// The G2 element `B`, coefficients in library order
    pub b: [U256Pair; 2],
    /// The G1 element `C`
    pub c: U256Pair,
}

/// A Groth16 proof that a vote is one of the round's options,
/// in the coordinate order expected by the EVM pairing precompile.
///
/// Each G2 coordinate of `b` is the pair `(c1, c0)`, see
/// https://eips.ethereum.org/EIPS/eip-197#encoding
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteProof {
    /// The G1 element `A`
    #[serde_as(as = "[DisplayFromStr; 2]")]
    pub a: U256Pair,
    /// The G2 element `B`, coefficients in EVM order
    #[serde_as(as = "[[DisplayFromStr; 2]; 2]")]
    pub b: [U256Pair; 2],
    /// The G1 element `C`
    #[serde_as(as = "[DisplayFromStr; 2]")]
    pub c: U256Pair,
}

impl From<RawProof> for VoteProof {
    /// Reverses the coefficients of both G2 coordinates of `b`, leaving `a`
    /// and `c` untouched
    fn from(raw: RawProof) -> Self {
        let [[x_c0, x_c1], [y_c0, y_c1]] = raw.b;
        VoteProof {
            a: raw.a,
            b: [[x_c1, x_c0], [y_c1, y_c0]],
            c: raw.c,
        }
    }
}

impl From<VoteProof> for RawProof {
    fn from(proof: VoteProof) -> Self {
        let [[x_c1, x_c0], [y_c1, y_c0]] = proof.b;
        RawProof {
            a: proof.a,
            b: [[x_c0, x_c1], [y_c0, y_c1]],
            c: proof.c,
        }
    }
}

/// Everything the round server needs to relay a vote.
///
/// The ciphertext and the proof are only ever built together, from the same
/// [`VoteChoice`], by the submission coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteSubmission {
    /// The round the vote is cast in
    pub round_id: RoundId,
    /// The encrypted vote
    pub encrypted_vote: EncryptedVote,
    /// The validity proof, absent under the encryption-only protocol
    pub proof: Option<VoteProof>,
    /// The voter's authentication token
    pub auth_token: String,
}

// -----------------
// | WIRE MESSAGES |
// -----------------

/// The response to a round count query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCount {
    /// The number of rounds created so far, which is the id of the latest round
    pub round_count: u32,
}

/// A request scoped to a single round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRequest {
    /// The round to query
    pub round_id: RoundId,
}

/// The response to a vote count query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCountResponse {
    /// The round queried
    pub round_id: RoundId,
    /// The number of votes cast in the round
    pub vote_count: u32,
}

/// The body of a `broadcast_enc_vote` request
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastVoteRequest {
    /// The round the vote is cast in
    pub round_id: RoundId,
    /// The serialized ciphertext
    pub enc_vote_bytes: Vec<u8>,
    /// The `A` element of the proof
    #[serde_as(as = "Option<[DisplayFromStr; 2]>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_a: Option<U256Pair>,
    /// The `B` element of the proof, in EVM order
    #[serde_as(as = "Option<[[DisplayFromStr; 2]; 2]>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_b: Option<[U256Pair; 2]>,
    /// The `C` element of the proof
    #[serde_as(as = "Option<[DisplayFromStr; 2]>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_c: Option<U256Pair>,
    /// The voter's authentication token
    pub auth_token: String,
}

impl From<VoteSubmission> for BroadcastVoteRequest {
    fn from(submission: VoteSubmission) -> Self {
        BroadcastVoteRequest {
            round_id: submission.round_id,
            enc_vote_bytes: submission.encrypted_vote.into_bytes(),
            proof_a: submission.proof.map(|p| p.a),
            proof_b: submission.proof.map(|p| p.b),
            proof_c: submission.proof.map(|p| p.c),
            auth_token: submission.auth_token,
        }
    }
}

impl BroadcastVoteRequest {
    /// Reassembles the proof, if all three of its elements are present
    pub fn proof(&self) -> Option<VoteProof> {
        Some(VoteProof {
            a: self.proof_a?,
            b: self.proof_b?,
            c: self.proof_c?,
        })
    }
}

/// The body of a `broadcast_enc_vote` response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastVoteResponse {
    /// The outcome, as a human readable message
    pub response: String,
    /// The hash of the relay transaction, empty if nothing was relayed
    #[serde(default)]
    pub tx_hash: String,
}

/// The interpretation of a [`BroadcastVoteResponse`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The vote was relayed
    VoteSuccessful,
    /// The voter already cast a vote in this round
    AlreadyVoted,
    /// A response this client does not recognise
    Unknown(String),
}

impl From<&str> for BroadcastOutcome {
    fn from(response: &str) -> Self {
        match response {
            VOTE_SUCCESSFUL => BroadcastOutcome::VoteSuccessful,
            USER_ALREADY_VOTED => BroadcastOutcome::AlreadyVoted,
            other => BroadcastOutcome::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RoundContext, RoundState};

    #[test]
    fn test_far_future_round_does_not_overflow() {
        let state = RoundState {
            id: 1,
            pk: vec![1; 8],
            start_time: i64::MAX,
            poll_length: 60,
            ..Default::default()
        };

        let round = RoundContext::from_state(&state, 0).unwrap();
        assert!(round.is_open(i64::MAX - 1));
    }

    #[test]
    fn test_closed_round_rejected() {
        let state = RoundState {
            id: 1,
            pk: vec![1; 8],
            start_time: 100,
            poll_length: 60,
            ..Default::default()
        };

        assert!(RoundContext::from_state(&state, 160).is_err());
    }
}
