//! The Groth16 prover for the vote integrity circuit.
//!
//! [`ProofEngine`] is the only entry point: it lazily loads the circuit
//! program and proving key through the shared [`CryptoContextCache`], then
//! proves on a blocking worker thread

pub mod circuit;
pub mod witness;

use std::sync::Arc;

use ark_bn254::Bn254;
use ark_groth16::{Groth16, Proof, ProvingKey};
use ark_serialize::CanonicalDeserialize;
use ark_std::UniformRand;
use crisp_common::{
    custom_serde::proof_to_wire,
    errors::VoteError,
    types::{ScalarField, VoteChoice, VoteProof},
};
use rand::{thread_rng, CryptoRng, RngCore};
use tracing::{debug, info};

use crate::{artifacts::ArtifactSources, cache::CryptoContextCache};

use self::{circuit::CircuitProgram, witness::Witness};

/// The prover's setup artifacts, parsed and checked against each other
pub struct CryptoContext {
    /// The compiled vote circuit
    program: CircuitProgram,
    /// The Groth16 proving key for the circuit
    proving_key: ProvingKey<Bn254>,
}

impl CryptoContext {
    /// Bundles a program with its proving key, checking that the key was
    /// generated for a circuit of the program's shape
    pub fn new(program: CircuitProgram, proving_key: ProvingKey<Bn254>) -> Result<Self, VoteError> {
        let num_variables = program.num_variables();
        if proving_key.a_query.len() != num_variables {
            return Err(VoteError::Initialization(format!(
                "proving key covers {} variables, circuit program has {num_variables}",
                proving_key.a_query.len(),
            )));
        }
        if proving_key.vk.gamma_abc_g1.len() != program.matrices().num_instance_variables {
            return Err(VoteError::Initialization(
                "proving key public inputs do not match the circuit program".to_string(),
            ));
        }

        Ok(Self {
            program,
            proving_key,
        })
    }

    /// Parses a serialized circuit program and proving key
    pub fn from_bytes(program: &[u8], proving_key: &[u8]) -> Result<Self, VoteError> {
        let program = CircuitProgram::from_bytes(program)?;
        let proving_key = ProvingKey::<Bn254>::deserialize_uncompressed(proving_key)
            .map_err(|e| VoteError::Initialization(format!("malformed proving key: {e}")))?;

        Self::new(program, proving_key)
    }

    /// The compiled vote circuit
    pub fn program(&self) -> &CircuitProgram {
        &self.program
    }

    /// Proves that `vote` satisfies the circuit
    pub fn prove<R: RngCore + CryptoRng>(
        &self,
        vote: u64,
        rng: &mut R,
    ) -> Result<Proof<Bn254>, VoteError> {
        let witness = Witness::compute(&self.program, vote)?;
        let matrices = self.program.matrices();

        let r = ScalarField::rand(rng);
        let s = ScalarField::rand(rng);
        Groth16::<Bn254>::create_proof_with_reduction_and_matrices(
            &self.proving_key,
            r,
            s,
            matrices,
            matrices.num_instance_variables,
            matrices.num_constraints,
            witness.assignment(),
        )
        .map_err(|e| VoteError::ProofGeneration(e.to_string()))
    }
}

/// Generates validity proofs for vote choices
pub struct ProofEngine {
    /// The cache of the parsed setup artifacts
    cache: Arc<CryptoContextCache>,
    /// Where to load the setup artifacts from
    sources: ArtifactSources,
    /// The client used to fetch remote artifacts
    http: reqwest::Client,
}

impl ProofEngine {
    /// Creates a prover that loads its artifacts from `sources` into `cache`
    pub fn new(cache: Arc<CryptoContextCache>, sources: ArtifactSources) -> Self {
        Self {
            cache,
            sources,
            http: reqwest::Client::new(),
        }
    }

    /// The cache the prover loads its artifacts into
    pub fn cache(&self) -> &Arc<CryptoContextCache> {
        &self.cache
    }

    /// Loads the circuit program and proving key, unless another caller
    /// already did
    pub async fn initialize(&self) -> Result<Arc<CryptoContext>, VoteError> {
        self.cache
            .get_or_init(|| self.sources.load(&self.http))
            .await
    }

    /// Proves that `choice` is one of the circuit's options, returning the
    /// proof in the wire format
    pub async fn prove(&self, choice: &VoteChoice) -> Result<VoteProof, VoteError> {
        let context = self
            .initialize()
            .await
            .map_err(|e| VoteError::ProofGeneration(format!("crypto context unavailable: {e}")))?;

        let vote = choice.index();
        info!(round_id = choice.round_id(), "generating vote proof");
        let proof = tokio::task::spawn_blocking(move || context.prove(vote, &mut thread_rng()))
            .await
            .map_err(|e| VoteError::ProofGeneration(format!("prover task failed: {e}")))??;
        debug!(round_id = choice.round_id(), "vote proof generated");

        Ok(proof_to_wire(&proof))
    }
}
