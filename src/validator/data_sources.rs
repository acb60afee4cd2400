//! External data sources consumed by the listing pipeline.
//!
//! Every network-facing collaborator sits behind a trait so the pipeline and
//! its tests run against mocks: the chain reader, the feed-explorer service,
//! the reference price API and the dry-run executor. None of the production
//! implementations retry: this tool is a read-only advisory gate and a
//! transient failure must surface, not be papered over.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSimulateTransactionConfig,
};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use tracing::{debug, instrument};

/// Byte-comparison predicate for a program-account scan.
#[derive(Debug, Clone)]
pub struct MemcmpFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl MemcmpFilter {
    pub fn new(offset: usize, bytes: Vec<u8>) -> Self {
        Self { offset, bytes }
    }

    /// Check the predicate against raw account data.
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.offset + self.bytes.len()
            && &data[self.offset..self.offset + self.bytes.len()] == self.bytes.as_slice()
    }
}

/// Rendered metadata of a hosted price feed.
#[derive(Debug, Clone)]
pub struct FeedMetadata {
    /// Display name, e.g. "JTO/USD".
    pub name: String,
    /// Authority that owns the feed on the hosting service.
    pub authority: Pubkey,
    /// Latest value the feed reports.
    pub value: f64,
}

/// Result of a risk-free dry run of the creation transaction.
#[derive(Debug, Clone)]
pub struct DryRunOutcome {
    pub succeeded: bool,
    /// Program error, if the execution itself failed.
    pub error: Option<String>,
    /// Ordered execution trace.
    pub logs: Vec<String>,
    pub compute_units: u64,
}

/// Read-only chain access.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Fetch raw account data; `None` if the account does not exist.
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Fetch the owner of an account; `None` if the account does not exist.
    async fn fetch_account_owner(&self, address: &Pubkey) -> Result<Option<Pubkey>>;

    /// Enumerate program accounts matching every filter.
    async fn scan_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[MemcmpFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>>;

    async fn latest_blockhash(&self) -> Result<Hash>;
}

/// Oracle-hosting service, rendered-page mechanism opaque.
#[async_trait]
pub trait FeedExplorer: Send {
    async fn feed_metadata(&mut self, feed: &Pubkey) -> Result<FeedMetadata>;

    /// Release the underlying session. Idempotent.
    async fn close(&mut self);
}

/// Independent USD reference price, keyed by mint.
#[async_trait]
pub trait RefPriceSource: Send + Sync {
    /// `Ok(None)` means the source has no price for this mint.
    async fn usd_price(&self, mint: &Pubkey) -> Result<Option<f64>>;
}

/// Risk-free execution of an unsigned transaction against current state.
#[async_trait]
pub trait DryRunner: Send + Sync {
    async fn dry_run(&self, tx: &Transaction) -> Result<DryRunOutcome>;
}

/// `ChainReader` + `DryRunner` over a shared nonblocking RPC client.
pub struct RpcChainClient {
    rpc: Arc<RpcClient>,
}

impl RpcChainClient {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    pub fn from_url(url: String) -> Self {
        Self::new(Arc::new(RpcClient::new_with_timeout(
            url,
            Duration::from_secs(30),
        )))
    }
}

#[async_trait]
impl ChainReader for RpcChainClient {
    #[instrument(skip(self), fields(address = %address))]
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .with_context(|| format!("failed to fetch account {address}"))?;
        Ok(response.value.map(|account| account.data))
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn fetch_account_owner(&self, address: &Pubkey) -> Result<Option<Pubkey>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .with_context(|| format!("failed to fetch account {address}"))?;
        Ok(response.value.map(|account| account.owner))
    }

    #[instrument(skip(self, filters), fields(program = %program_id))]
    async fn scan_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[MemcmpFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let rpc_filters = filters
            .iter()
            .map(|f| {
                RpcFilterType::Memcmp(Memcmp::new_raw_bytes(f.offset, f.bytes.clone()))
            })
            .collect();
        let config = RpcProgramAccountsConfig {
            filters: Some(rpc_filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            ..Default::default()
        };
        let accounts = self
            .rpc
            .get_program_accounts_with_config(program_id, config)
            .await
            .with_context(|| format!("program account scan failed for {program_id}"))?;
        debug!("scan matched {} accounts", accounts.len());
        Ok(accounts
            .into_iter()
            .map(|(address, account)| (address, account.data))
            .collect())
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        self.rpc
            .get_latest_blockhash()
            .await
            .context("failed to fetch latest blockhash")
    }
}

#[async_trait]
impl DryRunner for RpcChainClient {
    #[instrument(skip(self, tx))]
    async fn dry_run(&self, tx: &Transaction) -> Result<DryRunOutcome> {
        let response = self
            .rpc
            .simulate_transaction_with_config(
                tx,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    commitment: Some(CommitmentConfig::confirmed()),
                    encoding: Some(UiTransactionEncoding::Base64),
                    ..Default::default()
                },
            )
            .await
            .context("dry run transport failure")?;
        let value = response.value;
        let outcome = DryRunOutcome {
            succeeded: value.err.is_none(),
            error: value.err.map(|e| e.to_string()),
            logs: value.logs.unwrap_or_default(),
            compute_units: value.units_consumed.unwrap_or(0),
        };
        debug!(
            "dry run finished: succeeded={} units={} log_lines={}",
            outcome.succeeded,
            outcome.compute_units,
            outcome.logs.len()
        );
        Ok(outcome)
    }
}

/// Feed-explorer client with a lazily created HTTP session.
///
/// The session is owned by whoever owns this struct; `close()` drops it and
/// its connection pool. The hosting service renders feed pages server-side
/// and exposes the rendered metadata as JSON.
pub struct OnDemandExplorer {
    endpoint: String,
    session: Option<Client>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedResponse {
    name: String,
    authority: String,
    latest_value: f64,
}

impl OnDemandExplorer {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&Client> {
        if self.session.is_none() {
            debug!("opening feed explorer session against {}", self.endpoint);
            let client = Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .context("failed to build explorer session")?;
            self.session = Some(client);
        }
        Ok(self.session.as_ref().unwrap())
    }
}

#[async_trait]
impl FeedExplorer for OnDemandExplorer {
    #[instrument(skip(self), fields(feed = %feed))]
    async fn feed_metadata(&mut self, feed: &Pubkey) -> Result<FeedMetadata> {
        let url = format!("{}/api/feed/{}", self.endpoint.trim_end_matches('/'), feed);
        let response = self
            .session()?
            .get(&url)
            .send()
            .await
            .context("feed explorer unreachable")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "feed explorer returned {} for {feed}",
                response.status()
            ));
        }
        let feed_response: FeedResponse = response
            .json()
            .await
            .context("address did not resolve to a feed")?;
        let authority = feed_response
            .authority
            .parse::<Pubkey>()
            .context("feed authority is not a valid address")?;
        debug!("feed {} -> {}", feed, feed_response.name);
        Ok(FeedMetadata {
            name: feed_response.name,
            authority,
            value: feed_response.latest_value,
        })
    }

    async fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("feed explorer session released");
        }
    }
}

/// Reference price over the public Jupiter price API.
pub struct JupiterPriceSource {
    endpoint: String,
    http_client: Client,
}

impl JupiterPriceSource {
    pub fn new(endpoint: String, http_client: Client) -> Self {
        Self {
            endpoint,
            http_client,
        }
    }
}

#[async_trait]
impl RefPriceSource for JupiterPriceSource {
    #[instrument(skip(self), fields(mint = %mint))]
    async fn usd_price(&self, mint: &Pubkey) -> Result<Option<f64>> {
        let url = format!(
            "{}/price/v2?ids={}",
            self.endpoint.trim_end_matches('/'),
            mint
        );
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("reference price API unreachable")?
            .json::<serde_json::Value>()
            .await
            .context("failed to parse reference price response")?;

        let entry = &response["data"][mint.to_string().as_str()];
        if entry.is_null() {
            return Ok(None);
        }
        // The API reports prices as decimal strings.
        let price = entry["price"]
            .as_str()
            .and_then(|p| p.parse::<f64>().ok())
            .or_else(|| entry["price"].as_f64());
        match price {
            Some(p) => {
                debug!("reference price for {}: ${:.6}", mint, p);
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memcmp_filter_matches_at_offset() {
        let filter = MemcmpFilter::new(2, vec![0xAA, 0xBB]);
        assert!(filter.matches(&[0, 0, 0xAA, 0xBB, 9]));
        assert!(!filter.matches(&[0xAA, 0xBB, 0, 0]));
        // Data shorter than offset + pattern never matches.
        assert!(!filter.matches(&[0, 0, 0xAA]));
    }

    #[test]
    fn explorer_session_is_lazy_and_closable() {
        let mut explorer = OnDemandExplorer::new("https://feeds.example".to_string());
        assert!(explorer.session.is_none());
        explorer.session().expect("session should build");
        assert!(explorer.session.is_some());
        // close() is sync-shaped enough to test via a tiny runtime.
        tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(explorer.close());
        assert!(explorer.session.is_none());
    }
}
