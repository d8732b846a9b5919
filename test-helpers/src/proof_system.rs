//! Circuit artifacts for tests, and a reference verifier for wire proofs

use std::sync::Arc;

use ark_bn254::Bn254;
use ark_groth16::{Groth16, VerifyingKey};
use ark_snark::SNARK;
use crisp_common::{constants::NUM_POLL_OPTIONS, custom_serde::proof_from_wire, types::VoteProof};
use crisp_core::{
    artifacts::{ArtifactSource, ArtifactSources},
    prover::circuit::{generate_artifacts, CircuitArtifacts},
};
use eyre::{eyre, Result};
use rand::thread_rng;

/// Circuit artifacts serialized the way they are served to clients
pub struct TestArtifacts {
    /// The artifacts themselves
    pub artifacts: CircuitArtifacts,
    /// The serialized circuit program
    pub program_bytes: Arc<[u8]>,
    /// The serialized proving key
    pub proving_key_bytes: Arc<[u8]>,
}

impl TestArtifacts {
    /// Runs a fresh setup of the two-option vote circuit
    pub fn generate() -> Result<Self> {
        let artifacts = generate_artifacts(NUM_POLL_OPTIONS, &mut thread_rng())?;
        let program_bytes = artifacts.program_bytes()?.into();
        let proving_key_bytes = artifacts.proving_key_bytes()?.into();

        Ok(Self {
            artifacts,
            program_bytes,
            proving_key_bytes,
        })
    }

    /// Sources serving the artifacts from memory
    pub fn sources(&self) -> ArtifactSources {
        ArtifactSources {
            circuit: ArtifactSource::Bytes(self.program_bytes.clone()),
            proving_key: ArtifactSource::Bytes(self.proving_key_bytes.clone()),
        }
    }

    /// The verifying key matching the proving key
    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.artifacts.verifying_key
    }
}

/// Verifies a proof in the wire format, as the on-chain verifier would
pub fn verify_vote_proof(vkey: &VerifyingKey<Bn254>, proof: &VoteProof) -> Result<bool> {
    let proof = proof_from_wire(proof)?;
    Groth16::<Bn254>::verify(vkey, &[], &proof).map_err(|e| eyre!("verification failed: {e}"))
}
