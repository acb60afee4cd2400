//! Entry point for the bank listing verification gate.
//!
//! Reads a listing config artifact, runs the full verification pipeline,
//! and exits 0 only when every check passed. Nothing is ever signed or
//! submitted from here.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Result};
use listing_sentry::validator::{
    JupiterPriceSource, ListingPipeline, OnDemandExplorer, OracleValidator, RpcChainClient,
};
use listing_sentry::ListingConfig;
use tracing::{error, info, Level};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_EXPLORER_URL: &str = "https://ondemand.switchboard.xyz";
const DEFAULT_PRICE_API_URL: &str = "https://lite-api.jup.ag";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("verification finished with failures; see the report");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("pipeline aborted: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<bool> {
    let mut args = std::env::args().skip(1);
    let config_path = match args.next() {
        Some(path) => PathBuf::from(path),
        None => bail!("usage: listing-sentry <listing-config.json> [out-dir]"),
    };
    let out_dir = args.next().map(PathBuf::from).unwrap_or_else(|| {
        config_path
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf()
    });

    let rpc_url = env_or("RPC_URL", DEFAULT_RPC_URL);
    let explorer_url = env_or("EXPLORER_URL", DEFAULT_EXPLORER_URL);
    let price_api_url = env_or("PRICE_API_URL", DEFAULT_PRICE_API_URL);
    info!("using rpc {}", rpc_url);

    let mut config = ListingConfig::load(&config_path)?;

    let chain = RpcChainClient::from_url(rpc_url.clone());
    let dry_runner = RpcChainClient::from_url(rpc_url);
    let oracle_validator = OracleValidator::new(
        OnDemandExplorer::new(explorer_url),
        JupiterPriceSource::new(price_api_url, reqwest::Client::new()),
    );

    let mut pipeline = ListingPipeline::new(chain, oracle_validator, dry_runner, out_dir);
    let outcome = pipeline.run(&mut config, &config_path).await?;

    info!("report written to {}", outcome.report_path.display());
    Ok(outcome.report.overall_valid)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
