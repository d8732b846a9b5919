//! Tests of the proof engine against a reference verifier

use std::{path::PathBuf, sync::Arc};

use crisp_common::{
    errors::VoteError,
    types::{VoteChoice, VoteProof},
};
use crisp_core::{
    artifacts::ArtifactSources,
    cache::CryptoContextCache,
    prover::ProofEngine,
};
use eyre::Result;
use test_helpers::proof_system::{verify_vote_proof, TestArtifacts};

/// Sources that cannot be loaded
fn missing_sources() -> ArtifactSources {
    ArtifactSources::from_dir(&PathBuf::from("/nonexistent/artifacts"))
}

#[tokio::test]
async fn test_proofs_of_valid_choices_verify() -> Result<()> {
    let artifacts = TestArtifacts::generate()?;
    let engine = ProofEngine::new(Arc::new(CryptoContextCache::new()), artifacts.sources());

    for index in [0, 1] {
        let proof = engine.prove(&VoteChoice::new_unchecked(index, 1)).await?;
        assert!(verify_vote_proof(artifacts.verifying_key(), &proof)?);
    }

    Ok(())
}

#[tokio::test]
async fn test_proof_without_b_reordering_fails() -> Result<()> {
    let artifacts = TestArtifacts::generate()?;
    let engine = ProofEngine::new(Arc::new(CryptoContextCache::new()), artifacts.sources());

    let proof = engine.prove(&VoteChoice::new_unchecked(1, 1)).await?;
    let [[x_c1, x_c0], [y_c1, y_c0]] = proof.b;
    let unordered = VoteProof {
        b: [[x_c0, x_c1], [y_c0, y_c1]],
        ..proof
    };

    assert!(!matches!(
        verify_vote_proof(artifacts.verifying_key(), &unordered),
        Ok(true)
    ));

    Ok(())
}

#[tokio::test]
async fn test_out_of_range_choice_fails() -> Result<()> {
    let artifacts = TestArtifacts::generate()?;
    let engine = ProofEngine::new(Arc::new(CryptoContextCache::new()), artifacts.sources());

    let res = engine.prove(&VoteChoice::new_unchecked(2, 1)).await;
    assert!(matches!(res, Err(VoteError::ProofGeneration(_))));

    Ok(())
}

#[tokio::test]
async fn test_unloadable_artifacts_fail_proving_and_are_retried() -> Result<()> {
    let cache = Arc::new(CryptoContextCache::new());
    let broken = ProofEngine::new(cache.clone(), missing_sources());

    let res = broken.prove(&VoteChoice::new_unchecked(0, 1)).await;
    assert!(matches!(res, Err(VoteError::ProofGeneration(_))));
    assert!(!cache.is_initialized());

    // The failure was not cached, a working source initializes the same cache
    let artifacts = TestArtifacts::generate()?;
    let engine = ProofEngine::new(cache.clone(), artifacts.sources());
    let proof = engine.prove(&VoteChoice::new_unchecked(0, 1)).await?;
    assert!(verify_vote_proof(artifacts.verifying_key(), &proof)?);
    assert!(cache.is_initialized());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_provers_share_context() -> Result<()> {
    let artifacts = TestArtifacts::generate()?;
    let cache = Arc::new(CryptoContextCache::new());
    let engine = Arc::new(ProofEngine::new(cache.clone(), artifacts.sources()));

    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.prove(&VoteChoice::new_unchecked(i % 2, 1)).await })
        })
        .collect();
    for handle in handles {
        let proof = handle.await??;
        assert!(verify_vote_proof(artifacts.verifying_key(), &proof)?);
    }

    // Once initialized, the cache serves engines whose own sources are broken
    let context = engine.cache().get().expect("context initialized");
    let other = ProofEngine::new(cache.clone(), missing_sources());
    assert!(Arc::ptr_eq(&other.initialize().await?, &context));

    Ok(())
}

#[tokio::test]
async fn test_reset_reloads_context() -> Result<()> {
    let artifacts = TestArtifacts::generate()?;
    let cache = Arc::new(CryptoContextCache::new());
    let engine = ProofEngine::new(cache.clone(), artifacts.sources());

    let before = engine.initialize().await?;
    cache.reset();
    assert!(!cache.is_initialized());

    let after = engine.initialize().await?;
    assert!(!Arc::ptr_eq(&before, &after));

    Ok(())
}
