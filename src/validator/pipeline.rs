//! Pipeline orchestration.
//!
//! A sequential state machine with no retries:
//! derive seed -> validate reserve -> validate oracle -> build transaction
//! -> dry run -> validate trace -> persist artifacts. Stages either abort
//! (error propagates, nothing is persisted) or continue with recorded
//! errors that force the final overall-valid flag to false. This is the
//! only place allowed to terminate the run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, instrument};

use crate::txbuild;
use crate::types::ListingConfig;
use crate::validator::address;
use crate::validator::data_sources::{ChainReader, DryRunner, FeedExplorer, RefPriceSource};
use crate::validator::oracle::OracleValidator;
use crate::validator::report::ReportGenerator;
use crate::validator::reserve;
use crate::validator::simulation;
use crate::validator::types::ListingReport;

pub struct PipelineOutcome {
    pub report: ListingReport,
    pub report_path: PathBuf,
}

pub struct ListingPipeline<C, X, P, D>
where
    C: ChainReader,
    X: FeedExplorer,
    P: RefPriceSource,
    D: DryRunner,
{
    chain: C,
    oracle_validator: OracleValidator<X, P>,
    dry_runner: D,
    generator: ReportGenerator,
}

impl<C, X, P, D> ListingPipeline<C, X, P, D>
where
    C: ChainReader,
    X: FeedExplorer,
    P: RefPriceSource,
    D: DryRunner,
{
    pub fn new(
        chain: C,
        oracle_validator: OracleValidator<X, P>,
        dry_runner: D,
        out_dir: PathBuf,
    ) -> Self {
        Self {
            chain,
            oracle_validator,
            dry_runner,
            generator: ReportGenerator::new(out_dir),
        }
    }

    /// Run the full verification pipeline for one listing.
    ///
    /// `Err` means an aborting failure: no artifact has been written. An
    /// `Ok` outcome may still carry `overall_valid == false`; the caller
    /// maps that to a non-zero exit.
    #[instrument(skip_all, fields(asset = %config.asset))]
    pub async fn run(
        &mut self,
        config: &mut ListingConfig,
        config_path: &Path,
    ) -> Result<PipelineOutcome> {
        let keys = config.validate().context("listing config is invalid")?;
        info!("verifying listing of {} into group {}", config.asset, keys.group);

        // Stage: seed derivation with collision avoidance.
        let existing = address::scan_existing_banks(
            &self.chain,
            &keys.program_id,
            &keys.group,
            &keys.mint,
        )
        .await?;
        let selection = address::select_seed(config.seed, &keys.kamino_reserve, existing)?;
        if let Some(duplicate) = &selection.duplicate_reserve {
            bail!(
                "reserve {} is already wired to bank {}; refusing to list it twice",
                keys.kamino_reserve,
                duplicate.address
            );
        }
        let bank = address::derive_bank_address(
            &keys.program_id,
            &keys.group,
            &keys.mint,
            selection.selected_seed,
        );
        info!("bank will be created at {} (seed {})", bank, selection.selected_seed);

        // Stage: cross-reference the partner reserve. Fetch/decode failures
        // abort; field mismatches accumulate.
        let (reserve_data, reserve_errors) = reserve::fetch_and_validate(
            &self.chain,
            &keys.kamino_reserve,
            &keys.kamino_market,
            &keys.mint,
        )
        .await?;

        // Stage: independent oracle validation (soft-fail-tolerant).
        let oracle_report = self
            .oracle_validator
            .validate(&config.asset, &keys.oracle, config.oracle_kind, &keys.mint)
            .await;

        // Stage: build the unsigned transaction against the live blockhash.
        let token_program = match self.chain.fetch_account_owner(&keys.mint).await? {
            Some(owner) => owner,
            None => bail!("mint {} does not exist on-chain", keys.mint),
        };
        let blockhash = self.chain.latest_blockhash().await?;
        let tx = txbuild::build_add_bank_transaction(
            config,
            &keys,
            selection.selected_seed,
            &bank,
            &token_program,
            blockhash,
        )?;

        // Stage: risk-free dry run; transport failure aborts.
        let dry_run = self.dry_runner.dry_run(&tx).await?;
        let simulation_report = simulation::validate_dry_run(&dry_run, config);

        let (encoded_tx, tx_size) = txbuild::encode_transaction_base64(&tx)?;
        let overall_valid =
            reserve_errors.is_empty() && oracle_report.valid && simulation_report.passed();

        // Record derived values back into the config artifact.
        config.resolved_seed = Some(selection.selected_seed);
        config.bank_address = Some(bank.to_string());
        config.token_program = Some(token_program.to_string());
        config.mint_decimals = Some(reserve_data.mint_decimals);
        config.reserve_oracle = Some(reserve_data.price_oracle.to_string());

        let report = ListingReport {
            asset: config.asset.clone(),
            bank_address: bank,
            seed_selection: selection,
            reserve: reserve_data,
            reserve_errors,
            oracle: oracle_report,
            simulation: simulation_report,
            encoded_tx,
            tx_size,
            overall_valid,
            generated_at: Utc::now(),
        };

        self.generator.log_summary(&report);
        let report_path = self.generator.persist(&report, config, config_path)?;

        Ok(PipelineOutcome {
            report,
            report_path,
        })
    }
}
