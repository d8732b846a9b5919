use clap::Parser;
use crisp_cli::cli::Cli;
use eyre::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        enclave_api,
        timeout_secs,
        command,
    } = Cli::parse();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    command.run(&enclave_api, timeout_secs).await
}
