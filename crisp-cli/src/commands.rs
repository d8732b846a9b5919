//! Implementations of the CLI commands

use std::{sync::Arc, time::Duration};

use crisp_common::{
    backends::RoundStateClient,
    constants::{CIRCUIT_PROGRAM_FILE, PROVING_KEY_FILE, VERIFYING_KEY_FILE},
    types::RoundContext,
};
use crisp_core::{
    artifacts::ArtifactSources,
    cache::CryptoContextCache,
    client::HttpRoundStateClient,
    coordinator::{unix_now, CoordinatorConfig, VoteSubmissionCoordinator},
    encryption::EncryptionEngine,
    prover::{circuit::generate_artifacts, ProofEngine},
};
use eyre::Result;
use rand::thread_rng;
use tracing::info;

use crate::cli::{SetupArgs, VoteArgs};

/// Compiles the vote circuit and writes its artifacts
pub async fn setup(args: SetupArgs) -> Result<()> {
    let SetupArgs {
        out_dir,
        num_options,
    } = args;

    info!(num_options, "running vote circuit setup");
    let artifacts =
        tokio::task::spawn_blocking(move || generate_artifacts(num_options, &mut thread_rng()))
            .await??;

    tokio::fs::create_dir_all(&out_dir).await?;
    for (file_name, bytes) in [
        (CIRCUIT_PROGRAM_FILE, artifacts.program_bytes()?),
        (PROVING_KEY_FILE, artifacts.proving_key_bytes()?),
        (VERIFYING_KEY_FILE, artifacts.verifying_key_bytes()?),
    ] {
        let path = out_dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), num_bytes = bytes.len(), "wrote artifact");
    }

    Ok(())
}

/// Prints the state of the current round
pub async fn show_round(enclave_api: &str, timeout_secs: u64) -> Result<()> {
    let client = HttpRoundStateClient::new(enclave_api, Duration::from_secs(timeout_secs))?;

    let state = client.current_round().await?;
    let vote_count = client.vote_count(state.id).await?;
    let open = RoundContext::from_state(&state, unix_now()).is_ok();
    info!(round_id = state.id, vote_count, open, "current round");

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Casts a vote in the current round
pub async fn cast_vote(args: VoteArgs, enclave_api: &str, timeout_secs: u64) -> Result<()> {
    let VoteArgs {
        choice,
        auth_token,
        circuit,
        proving_key,
        protocol,
    } = args;

    let client = Arc::new(HttpRoundStateClient::new(
        enclave_api,
        Duration::from_secs(timeout_secs),
    )?);
    let prover = ProofEngine::new(
        Arc::new(CryptoContextCache::new()),
        ArtifactSources {
            circuit,
            proving_key,
        },
    );
    let coordinator = VoteSubmissionCoordinator::new(
        client,
        EncryptionEngine::new()?,
        prover,
        CoordinatorConfig {
            protocol: protocol.into(),
            auth_token,
        },
    );

    let receipt = coordinator.vote_in_current_round(choice).await?;
    info!(
        round_id = receipt.round_id,
        tx_hash = %receipt.tx_hash,
        "{}", receipt.message
    );
    if let Some(round) = receipt.refreshed_round {
        println!("round {} now has {} votes", round.id, round.vote_count);
    }

    Ok(())
}
