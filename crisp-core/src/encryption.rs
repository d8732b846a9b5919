//! Homomorphic encryption of votes under a round's BFV public key.
//!
//! A vote is encoded as the constant coefficient of a plaintext polynomial,
//! so that summing ciphertexts tallies the votes for each option

use std::sync::{Arc, OnceLock};

use crisp_common::{
    constants::{BFV_DEGREE, BFV_MODULI, BFV_PLAINTEXT_MODULUS},
    errors::VoteError,
    types::{EncryptedVote, RoundPublicKey, VoteChoice},
};
use fhe::bfv::{BfvParameters, BfvParametersBuilder, Encoding, Plaintext, PublicKey};
use fhe_traits::{DeserializeParametrized, FheEncoder, FheEncrypter, Serialize as FheSerialize};
use rand::{thread_rng, CryptoRng, RngCore};
use tracing::debug;

/// The process-wide BFV parameter set
static BFV_PARAMS: OnceLock<Arc<BfvParameters>> = OnceLock::new();

/// The BFV parameter set round keys are generated under.
///
/// Keys and ciphertexts only interoperate when they point at the same
/// parameter instance, so every caller receives the same `Arc`
pub fn bfv_params() -> Result<Arc<BfvParameters>, VoteError> {
    if let Some(params) = BFV_PARAMS.get() {
        return Ok(params.clone());
    }

    let params = BfvParametersBuilder::new()
        .set_degree(BFV_DEGREE)
        .set_plaintext_modulus(BFV_PLAINTEXT_MODULUS)
        .set_moduli(&BFV_MODULI)
        .build_arc()
        .map_err(|e| VoteError::Encryption(e.to_string()))?;
    Ok(BFV_PARAMS.get_or_init(|| params).clone())
}

/// Encrypts vote choices under round public keys
#[derive(Clone, Debug)]
pub struct EncryptionEngine {
    /// The BFV parameter set
    params: Arc<BfvParameters>,
}

impl EncryptionEngine {
    /// Creates an engine over the fixed BFV parameter set
    pub fn new() -> Result<Self, VoteError> {
        Ok(Self {
            params: bfv_params()?,
        })
    }

    /// The BFV parameter set votes are encrypted under
    pub fn params(&self) -> &Arc<BfvParameters> {
        &self.params
    }

    /// Encrypts `choice` under `public_key` on a blocking worker
    pub async fn encrypt(
        &self,
        choice: &VoteChoice,
        public_key: &RoundPublicKey,
    ) -> Result<EncryptedVote, VoteError> {
        let engine = self.clone();
        let choice = *choice;
        let public_key = public_key.clone();

        tokio::task::spawn_blocking(move || {
            engine.encrypt_with_rng(&choice, &public_key, &mut thread_rng())
        })
        .await
        .map_err(|e| VoteError::Encryption(format!("encryption task failed: {e}")))?
    }

    /// Encrypts `choice` under `public_key`, drawing the encryption
    /// randomness from `rng`
    pub fn encrypt_with_rng<R: RngCore + CryptoRng>(
        &self,
        choice: &VoteChoice,
        public_key: &RoundPublicKey,
        rng: &mut R,
    ) -> Result<EncryptedVote, VoteError> {
        if public_key.is_empty() {
            return Err(VoteError::Encryption("round public key is empty".to_string()));
        }

        let pk = PublicKey::from_bytes(public_key.as_bytes(), &self.params)
            .map_err(|e| VoteError::Encryption(format!("malformed round public key: {e}")))?;

        let plaintext = Plaintext::try_encode(&[choice.index()], Encoding::poly(), &self.params)
            .map_err(|e| VoteError::Encryption(e.to_string()))?;

        let ciphertext = pk
            .try_encrypt(&plaintext, rng)
            .map_err(|e| VoteError::Encryption(e.to_string()))?;

        let bytes = ciphertext.to_bytes();
        debug!(
            round_id = choice.round_id(),
            num_bytes = bytes.len(),
            "vote encrypted"
        );

        Ok(EncryptedVote::new(bytes))
    }
}
