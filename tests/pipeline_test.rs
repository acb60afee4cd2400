//! End-to-end pipeline scenarios over mocked collaborators.
//!
//! Each scenario wires a fake chain, feed explorer, price source and dry
//! runner, then drives the full pipeline exactly the way `main` does.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;

use listing_sentry::validator::address::{bank_layout, derive_bank_address};
use listing_sentry::validator::reserve::reserve_layout;
use listing_sentry::validator::simulation::INSTRUCTION_MARKER;
use listing_sentry::validator::{
    ChainReader, DryRunOutcome, DryRunner, FeedExplorer, FeedMetadata, ListingPipeline,
    MemcmpFilter, OracleValidator, RefPriceSource,
};
use listing_sentry::{ListingConfig, OracleKind};

const ASSET_TAG_KAMINO: u8 = 2;

// --- mocks -----------------------------------------------------------------

struct MockChain {
    /// address -> (owner, data)
    accounts: HashMap<Pubkey, (Pubkey, Vec<u8>)>,
    /// accounts owned by the lending program, scanned via memcmp filters
    program_accounts: Vec<(Pubkey, Vec<u8>)>,
}

#[async_trait]
impl ChainReader for MockChain {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        Ok(self.accounts.get(address).map(|(_, data)| data.clone()))
    }

    async fn fetch_account_owner(&self, address: &Pubkey) -> Result<Option<Pubkey>> {
        Ok(self.accounts.get(address).map(|(owner, _)| *owner))
    }

    async fn scan_accounts(
        &self,
        _program_id: &Pubkey,
        filters: &[MemcmpFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        Ok(self
            .program_accounts
            .iter()
            .filter(|(_, data)| filters.iter().all(|f| f.matches(data)))
            .cloned()
            .collect())
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }
}

struct MockExplorer {
    metadata: Option<FeedMetadata>,
}

#[async_trait]
impl FeedExplorer for MockExplorer {
    async fn feed_metadata(&mut self, _feed: &Pubkey) -> Result<FeedMetadata> {
        self.metadata
            .clone()
            .ok_or_else(|| anyhow!("explorer unreachable"))
    }

    async fn close(&mut self) {}
}

struct MockPrices {
    price: Option<f64>,
}

#[async_trait]
impl RefPriceSource for MockPrices {
    async fn usd_price(&self, _mint: &Pubkey) -> Result<Option<f64>> {
        Ok(self.price)
    }
}

struct MockRunner {
    outcome: DryRunOutcome,
    executed: Arc<AtomicBool>,
}

#[async_trait]
impl DryRunner for MockRunner {
    async fn dry_run(&self, _tx: &Transaction) -> Result<DryRunOutcome> {
        self.executed.store(true, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

// --- fixtures --------------------------------------------------------------

fn bank_account_bytes(group: &Pubkey, mint: &Pubkey, reserve: Option<&Pubkey>) -> Vec<u8> {
    let mut data = vec![0u8; bank_layout::MIN_LEN];
    data[..8].copy_from_slice(&bank_layout::DISCRIMINATOR);
    data[bank_layout::GROUP_OFFSET..bank_layout::GROUP_OFFSET + 32]
        .copy_from_slice(group.as_ref());
    data[bank_layout::MINT_OFFSET..bank_layout::MINT_OFFSET + 32].copy_from_slice(mint.as_ref());
    if let Some(reserve) = reserve {
        data[bank_layout::KAMINO_RESERVE_OFFSET..bank_layout::KAMINO_RESERVE_OFFSET + 32]
            .copy_from_slice(reserve.as_ref());
    }
    data[bank_layout::ASSET_TAG_OFFSET] = ASSET_TAG_KAMINO;
    data
}

fn reserve_account_bytes(market: &Pubkey, mint: &Pubkey, oracle: &Pubkey, decimals: u8) -> Vec<u8> {
    let mut data = vec![0u8; reserve_layout::MIN_LEN];
    data[..8].copy_from_slice(&reserve_layout::DISCRIMINATOR);
    data[reserve_layout::VERSION_OFFSET..reserve_layout::VERSION_OFFSET + 8]
        .copy_from_slice(&1u64.to_le_bytes());
    data[reserve_layout::LENDING_MARKET_OFFSET..reserve_layout::LENDING_MARKET_OFFSET + 32]
        .copy_from_slice(market.as_ref());
    data[reserve_layout::LIQUIDITY_MINT_OFFSET..reserve_layout::LIQUIDITY_MINT_OFFSET + 32]
        .copy_from_slice(mint.as_ref());
    data[reserve_layout::MINT_DECIMALS_OFFSET..reserve_layout::MINT_DECIMALS_OFFSET + 8]
        .copy_from_slice(&(decimals as u64).to_le_bytes());
    data[reserve_layout::SUPPLY_VAULT_OFFSET..reserve_layout::SUPPLY_VAULT_OFFSET + 32]
        .copy_from_slice(Pubkey::new_unique().as_ref());
    data[reserve_layout::FEE_VAULT_OFFSET..reserve_layout::FEE_VAULT_OFFSET + 32]
        .copy_from_slice(Pubkey::new_unique().as_ref());
    data[reserve_layout::PRICE_ORACLE_OFFSET..reserve_layout::PRICE_ORACLE_OFFSET + 32]
        .copy_from_slice(oracle.as_ref());
    data
}

fn listing_config(oracle_kind: OracleKind) -> ListingConfig {
    ListingConfig {
        asset: "JTO".to_string(),
        market: "main".to_string(),
        program_id: Pubkey::new_unique().to_string(),
        group: Pubkey::new_unique().to_string(),
        admin: Pubkey::new_unique().to_string(),
        fee_payer: Pubkey::new_unique().to_string(),
        mint: Pubkey::new_unique().to_string(),
        kamino_reserve: Pubkey::new_unique().to_string(),
        kamino_market: Pubkey::new_unique().to_string(),
        oracle: Pubkey::new_unique().to_string(),
        oracle_kind,
        asset_weight_init: 0.8,
        asset_weight_maint: 0.9,
        deposit_limit: "1000000000".to_string(),
        total_asset_value_init_limit: "50000000".to_string(),
        oracle_max_age: 300,
        oracle_max_confidence: 0,
        seed: None,
        resolved_seed: None,
        bank_address: None,
        token_program: None,
        mint_decimals: None,
        reserve_oracle: None,
    }
}

fn matching_trace(config: &ListingConfig) -> Vec<String> {
    vec![
        format!("Program {} invoke [1]", config.program_id),
        format!("Program log: {INSTRUCTION_MARKER}"),
        format!(
            "Program log: asset weight init: {}, asset weight maint: {}",
            config.asset_weight_init, config.asset_weight_maint
        ),
        format!(
            "Program log: deposit limit: {}, total asset value init limit: {}",
            config.deposit_limit, config.total_asset_value_init_limit
        ),
        "Program log: operational state: 1, risk tier: 0, asset tag: 2".to_string(),
        format!(
            "Program log: oracle max age: {}, oracle max confidence: {}",
            config.oracle_max_age % 256,
            config.oracle_max_confidence
        ),
    ]
}

struct Scenario {
    config: ListingConfig,
    chain: MockChain,
    explorer: MockExplorer,
    prices: MockPrices,
    runner_outcome: DryRunOutcome,
    expected_authority: Pubkey,
}

impl Scenario {
    /// A clean listing: matching reserve, spl mint, matching trace.
    fn clean(oracle_kind: OracleKind) -> Self {
        let config = listing_config(oracle_kind);
        let mint = Pubkey::from_str(&config.mint).unwrap();
        let market = Pubkey::from_str(&config.kamino_market).unwrap();
        let reserve_addr = Pubkey::from_str(&config.kamino_reserve).unwrap();
        let reserve_oracle = Pubkey::new_unique();
        let token_program = Pubkey::new_unique();

        let mut accounts = HashMap::new();
        accounts.insert(
            reserve_addr,
            (
                Pubkey::new_unique(),
                reserve_account_bytes(&market, &mint, &reserve_oracle, 9),
            ),
        );
        accounts.insert(mint, (token_program, vec![0u8; 82]));

        let expected_authority = Pubkey::new_unique();
        let runner_outcome = DryRunOutcome {
            succeeded: true,
            error: None,
            logs: matching_trace(&config),
            compute_units: 52_000,
        };
        Self {
            config,
            chain: MockChain {
                accounts,
                program_accounts: vec![],
            },
            explorer: MockExplorer {
                metadata: Some(FeedMetadata {
                    name: "JTO/USD".to_string(),
                    authority: expected_authority,
                    value: 2.0,
                }),
            },
            prices: MockPrices { price: Some(2.0) },
            runner_outcome,
            expected_authority,
        }
    }

    async fn run(self, out_dir: &PathBuf) -> (Result<bool>, ListingConfig, Arc<AtomicBool>) {
        std::fs::create_dir_all(out_dir).unwrap();
        let config_path = out_dir.join("listing.json");
        self.config.save(&config_path).unwrap();
        let mut config = ListingConfig::load(&config_path).unwrap();

        let executed = Arc::new(AtomicBool::new(false));
        let oracle_validator = OracleValidator::with_expectations(
            self.explorer,
            self.prices,
            self.expected_authority,
            1.0,
        );
        let runner = MockRunner {
            outcome: self.runner_outcome,
            executed: executed.clone(),
        };
        let mut pipeline =
            ListingPipeline::new(self.chain, oracle_validator, runner, out_dir.clone());

        let result = pipeline
            .run(&mut config, &config_path)
            .await
            .map(|outcome| outcome.report.overall_valid);
        (result, config, executed)
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("listing-sentry-{}-{}", name, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

// --- scenarios -------------------------------------------------------------

#[tokio::test]
async fn scenario_a_clean_listing_passes() {
    let out_dir = temp_dir("scenario-a");
    let scenario = Scenario::clean(OracleKind::PythPushOracle);
    let (result, config, _) = scenario.run(&out_dir).await;

    assert!(result.unwrap(), "clean listing must be overall valid");

    // Derived fields were recorded back into the artifact.
    let reloaded = ListingConfig::load(&out_dir.join("listing.json")).unwrap();
    assert_eq!(reloaded.resolved_seed, Some(0));
    assert_eq!(reloaded.mint_decimals, Some(9));
    assert!(reloaded.bank_address.is_some());
    assert!(reloaded.token_program.is_some());
    assert!(reloaded.reserve_oracle.is_some());
    assert_eq!(reloaded.bank_address, config.bank_address);

    // Report document exists and names the bank.
    let report = std::fs::read_to_string(out_dir.join("jto_bank_listing.md")).unwrap();
    assert!(report.contains("PASS"));
    assert!(report.contains(config.bank_address.as_deref().unwrap()));

    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn scenario_b_reserve_mint_mismatch_fails_softly() {
    let out_dir = temp_dir("scenario-b");
    let mut scenario = Scenario::clean(OracleKind::PythPushOracle);

    // Rewrite the reserve record so it wraps a different mint.
    let reserve_addr = Pubkey::from_str(&scenario.config.kamino_reserve).unwrap();
    let market = Pubkey::from_str(&scenario.config.kamino_market).unwrap();
    let other_mint = Pubkey::new_unique();
    scenario.chain.accounts.insert(
        reserve_addr,
        (
            Pubkey::new_unique(),
            reserve_account_bytes(&market, &other_mint, &Pubkey::new_unique(), 9),
        ),
    );

    let (result, _, _) = scenario.run(&out_dir).await;

    // The pipeline continues (Ok) but the run is reported as failed.
    assert_eq!(result.unwrap(), false);
    let report = std::fs::read_to_string(out_dir.join("jto_bank_listing.md")).unwrap();
    assert!(report.contains("FAIL"));
    assert!(report.contains("mint"));

    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn scenario_c_duplicate_reserve_aborts_before_building() {
    let out_dir = temp_dir("scenario-c");
    let mut scenario = Scenario::clean(OracleKind::PythPushOracle);

    // An existing bank already wired to the same reserve, created with the
    // same seed the config pins explicitly.
    let program = Pubkey::from_str(&scenario.config.program_id).unwrap();
    let group = Pubkey::from_str(&scenario.config.group).unwrap();
    let mint = Pubkey::from_str(&scenario.config.mint).unwrap();
    let reserve = Pubkey::from_str(&scenario.config.kamino_reserve).unwrap();
    let existing_bank = derive_bank_address(&program, &group, &mint, 0);
    scenario.config.seed = Some(0);
    scenario
        .chain
        .program_accounts
        .push((existing_bank, bank_account_bytes(&group, &mint, Some(&reserve))));

    let (result, _, executed) = scenario.run(&out_dir).await;

    assert!(result.is_err(), "duplicate reserve must abort");
    assert!(
        !executed.load(Ordering::SeqCst),
        "no transaction may be built or dry-run after an abort"
    );
    // No artifact is persisted on an aborting failure.
    assert!(!out_dir.join("jto_bank_listing.md").exists());

    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn scenario_d_bad_authority_still_produces_partial_report() {
    let out_dir = temp_dir("scenario-d");
    let mut scenario = Scenario::clean(OracleKind::SwitchboardPull);

    // Scraped authority differs from the expected constant.
    scenario.explorer.metadata = Some(FeedMetadata {
        name: "JTO/USD".to_string(),
        authority: Pubkey::new_unique(),
        value: 2.0,
    });

    let (result, _, executed) = scenario.run(&out_dir).await;

    assert_eq!(result.unwrap(), false);
    assert!(
        executed.load(Ordering::SeqCst),
        "dry run still executes on a soft oracle failure"
    );
    let report = std::fs::read_to_string(out_dir.join("jto_bank_listing.md")).unwrap();
    assert!(report.contains("authority"));
    assert!(report.contains("Simulation results"));

    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn switchboard_listing_with_legitimate_feed_passes() {
    let out_dir = temp_dir("switchboard-pass");
    let scenario = Scenario::clean(OracleKind::SwitchboardPull);
    let (result, _, _) = scenario.run(&out_dir).await;
    assert!(result.unwrap());
    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn second_listing_takes_next_free_seed() {
    let out_dir = temp_dir("next-seed");
    let mut scenario = Scenario::clean(OracleKind::PythPushOracle);

    // Seed 0 is taken by a bank wired to a different reserve.
    let program = Pubkey::from_str(&scenario.config.program_id).unwrap();
    let group = Pubkey::from_str(&scenario.config.group).unwrap();
    let mint = Pubkey::from_str(&scenario.config.mint).unwrap();
    let other_reserve = Pubkey::new_unique();
    let existing_bank = derive_bank_address(&program, &group, &mint, 0);
    scenario
        .chain
        .program_accounts
        .push((existing_bank, bank_account_bytes(&group, &mint, Some(&other_reserve))));

    let (result, config, _) = scenario.run(&out_dir).await;
    assert!(result.unwrap());
    assert_eq!(config.resolved_seed, Some(1));
    assert_eq!(
        config.bank_address.unwrap(),
        derive_bank_address(&program, &group, &mint, 1).to_string()
    );

    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn missing_reserve_account_aborts() {
    let out_dir = temp_dir("missing-reserve");
    let mut scenario = Scenario::clean(OracleKind::PythPushOracle);
    let reserve_addr = Pubkey::from_str(&scenario.config.kamino_reserve).unwrap();
    scenario.chain.accounts.remove(&reserve_addr);

    let (result, _, executed) = scenario.run(&out_dir).await;
    assert!(result.is_err());
    assert!(!executed.load(Ordering::SeqCst));
    assert!(!out_dir.join("jto_bank_listing.md").exists());

    std::fs::remove_dir_all(&out_dir).ok();
}

#[tokio::test]
async fn simulated_parameter_mismatch_fails_the_run() {
    let out_dir = temp_dir("sim-mismatch");
    let mut scenario = Scenario::clean(OracleKind::PythPushOracle);

    // The dry run encoded a different deposit limit than the config.
    scenario.runner_outcome.logs = scenario
        .runner_outcome
        .logs
        .iter()
        .map(|line| {
            if line.contains("deposit limit") {
                "Program log: deposit limit: 999, total asset value init limit: 50000000"
                    .to_string()
            } else {
                line.clone()
            }
        })
        .collect();

    let (result, _, _) = scenario.run(&out_dir).await;
    assert_eq!(result.unwrap(), false);
    let report = std::fs::read_to_string(out_dir.join("jto_bank_listing.md")).unwrap();
    assert!(report.contains("999"));

    std::fs::remove_dir_all(&out_dir).ok();
}
