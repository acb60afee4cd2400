//! Result types produced by the pipeline stages.
//!
//! All of these are ephemeral: they live within one pipeline run and are
//! persisted only through the generated report document. Soft failures are
//! carried as error strings inside these structs; only fatal failures
//! propagate as errors.

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;

use crate::types::OracleKind;

/// How a bank's seed was recovered during the scan.
///
/// The chain stores no reverse index from address to seed, so recovery is a
/// bounded brute-force search. A bank whose seed lies outside the window is
/// kept with `Unknown` rather than dropped: it still participates in
/// duplicate-reserve detection, it is only excluded from the used-seed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedRecovery {
    Known(u64),
    Unknown,
}

/// An existing bank found for the target (group, mint).
#[derive(Debug, Clone)]
pub struct ExistingBank {
    pub address: Pubkey,
    pub seed: SeedRecovery,
    /// Partner reserve this bank is wired to, if any.
    pub kamino_reserve: Option<Pubkey>,
}

/// Outcome of the seed-selection stage.
#[derive(Debug, Clone)]
pub struct SeedSelection {
    pub existing: Vec<ExistingBank>,
    pub selected_seed: u64,
    /// Set when the target reserve already backs one of the existing banks.
    /// The pipeline aborts on it: listing the same reserve twice is never
    /// intended.
    pub duplicate_reserve: Option<ExistingBank>,
    pub warnings: Vec<String>,
}

/// Fields read from the partner protocol's reserve account.
#[derive(Debug, Clone)]
pub struct ReserveData {
    pub market: Pubkey,
    pub mint: Pubkey,
    pub mint_decimals: u8,
    pub price_oracle: Pubkey,
    pub farm_collateral: Option<Pubkey>,
    pub supply_vault: Pubkey,
    pub fee_vault: Pubkey,
}

/// Everything the oracle validation discovered, pass or fail.
#[derive(Debug, Clone)]
pub struct OracleReport {
    pub oracle: Pubkey,
    pub kind: OracleKind,
    /// Feed name as rendered by the hosting service.
    pub name: Option<String>,
    pub authority: Option<Pubkey>,
    pub authority_valid: bool,
    pub ticker_valid: bool,
    pub oracle_price: Option<f64>,
    pub reference_price: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub tolerance_pct: f64,
    pub price_valid: bool,
    /// Set for the oracle kind whose authority the protocol itself
    /// guarantees; all checks are skipped with this note.
    pub skipped: Option<String>,
    pub errors: Vec<String>,
    pub valid: bool,
}

impl OracleReport {
    /// Report for the kind that needs no independent validation.
    pub fn skipped(oracle: Pubkey, kind: OracleKind, note: String) -> Self {
        Self {
            oracle,
            kind,
            name: None,
            authority: None,
            authority_valid: true,
            ticker_valid: true,
            oracle_price: None,
            reference_price: None,
            deviation_pct: None,
            tolerance_pct: 0.0,
            price_valid: true,
            skipped: Some(note),
            errors: Vec::new(),
            valid: true,
        }
    }
}

/// One parameter recovered from the dry-run trace.
#[derive(Debug, Clone)]
pub struct SimulationCheck {
    pub name: &'static str,
    pub expected: String,
    pub actual: String,
    pub matched: bool,
}

/// Outcome of parsing the dry-run trace against the intended config.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub instruction_found: bool,
    pub dry_run_succeeded: bool,
    pub dry_run_error: Option<String>,
    pub compute_units: u64,
    pub checks: Vec<SimulationCheck>,
    /// Parameter groups the trace never logged. The instruction logs only
    /// a subset of its config, so these are unchecked rather than mismatched.
    pub missing: Vec<&'static str>,
}

impl SimulationReport {
    pub fn all_match(&self) -> bool {
        self.checks.iter().all(|c| c.matched)
    }

    pub fn passed(&self) -> bool {
        self.instruction_found && self.dry_run_succeeded && self.all_match()
    }
}

/// Aggregate handed to the report generator.
#[derive(Debug, Clone)]
pub struct ListingReport {
    pub asset: String,
    pub bank_address: Pubkey,
    pub seed_selection: SeedSelection,
    pub reserve: ReserveData,
    pub reserve_errors: Vec<String>,
    pub oracle: OracleReport,
    pub simulation: SimulationReport,
    /// base64 of the wire-encoded unsigned transaction.
    pub encoded_tx: String,
    pub tx_size: usize,
    pub overall_valid: bool,
    pub generated_at: DateTime<Utc>,
}
