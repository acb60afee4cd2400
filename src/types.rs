//! Core types for the bank listing pipeline.
//!
//! `ListingConfig` is the human-authored intent document: it is read from a
//! JSON artifact at pipeline start, and rewritten once at the end of a
//! successful run with the derived fields appended.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Seed prefix of the bank program-derived address.
pub const BANK_SEED_PREFIX: &[u8] = b"bank";

/// Lowest seed ever assigned to a bank.
pub const SEED_FLOOR: u64 = 0;

/// Width of the brute-force window used to map a bank address back to its
/// seed. A bank outside `SEED_FLOOR..SEED_FLOOR + SEED_SCAN_WINDOW` cannot
/// be recovered and is reported with an unknown seed.
pub const SEED_SCAN_WINDOW: u64 = 100;

/// Expected `operational_state` encoded by the add-bank instruction.
pub const OPERATIONAL_STATE_ACTIVE: u8 = 1;
/// Expected `risk_tier` encoded by the add-bank instruction.
pub const RISK_TIER_COLLATERAL: u8 = 0;
/// Asset tag marking a bank backed by a partner (Kamino) reserve.
pub const ASSET_TAG_KAMINO: u8 = 2;

/// Which kind of price oracle the bank is wired to.
///
/// Only `SwitchboardPull` feeds are validated against the hosting service;
/// the lending program itself enforces the feed identity for
/// `PythPushOracle`, so that kind skips independent validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OracleKind {
    SwitchboardPull,
    PythPushOracle,
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleKind::SwitchboardPull => "switchboardPull",
            OracleKind::PythPushOracle => "pythPushOracle",
        }
    }
}

/// Human-authored listing intent, persisted as a JSON artifact.
///
/// Address fields are kept as strings so the artifact stays hand-editable;
/// `validate()` parses them all and returns the typed key set used by the
/// pipeline. Ceilings are decimal strings because both are compared by
/// exact string equality against the dry-run trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingConfig {
    /// Asset ticker, e.g. "JTO".
    pub asset: String,
    /// Human label of the group this bank joins.
    pub market: String,
    /// Lending program that owns the new bank.
    pub program_id: String,
    /// Group (marginfi-group-style) address the bank is created under.
    pub group: String,
    /// Group admin expected to co-sign via the multisig.
    pub admin: String,
    /// Fee payer of the creation transaction.
    pub fee_payer: String,
    /// Mint of the listed asset.
    pub mint: String,
    /// Partner protocol reserve backing this bank.
    pub kamino_reserve: String,
    /// Partner protocol lending market the reserve must belong to.
    pub kamino_market: String,
    /// Price oracle address.
    pub oracle: String,
    pub oracle_kind: OracleKind,
    /// Initial collateral weight, 0..=1.
    pub asset_weight_init: f64,
    /// Maintenance collateral weight, 0..=1.
    pub asset_weight_maint: f64,
    /// Deposit ceiling in native units (decimal string).
    pub deposit_limit: String,
    /// Total asset value ceiling in USD units (decimal string).
    pub total_asset_value_init_limit: String,
    /// Maximum accepted oracle staleness in seconds.
    pub oracle_max_age: u64,
    /// Maximum accepted oracle confidence interval, bps-like.
    pub oracle_max_confidence: u64,
    /// Explicit seed override. Re-verified for collision before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    // Derived fields, appended after a successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint_decimals: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_oracle: Option<String>,
}

/// Every address-shaped config field, parsed.
#[derive(Debug, Clone)]
pub struct ListingKeys {
    pub program_id: Pubkey,
    pub group: Pubkey,
    pub admin: Pubkey,
    pub fee_payer: Pubkey,
    pub mint: Pubkey,
    pub kamino_reserve: Pubkey,
    pub kamino_market: Pubkey,
    pub oracle: Pubkey,
}

impl ListingConfig {
    /// Read a config artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read listing config {}", path.display()))?;
        let config: ListingConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse listing config {}", path.display()))?;
        Ok(config)
    }

    /// Rewrite the config artifact, including any derived fields set so far.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("failed to serialize listing config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write listing config {}", path.display()))?;
        Ok(())
    }

    /// Check every config invariant and parse the address fields.
    ///
    /// A violation here is a fatal, pre-network failure: nothing has been
    /// fetched yet and the pipeline must not proceed.
    pub fn validate(&self) -> Result<ListingKeys> {
        for (label, weight) in [
            ("assetWeightInit", self.asset_weight_init),
            ("assetWeightMaint", self.asset_weight_maint),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                bail!("{label} must be within [0, 1], got {weight}");
            }
        }
        if self.asset_weight_maint < self.asset_weight_init {
            bail!(
                "assetWeightMaint ({}) must be >= assetWeightInit ({})",
                self.asset_weight_maint,
                self.asset_weight_init
            );
        }
        if self.oracle_max_age == 0 {
            bail!("oracleMaxAge must be positive");
        }
        self.deposit_limit_value()?;
        self.total_asset_value_limit_value()?;

        Ok(ListingKeys {
            program_id: parse_pubkey("programId", &self.program_id)?,
            group: parse_pubkey("group", &self.group)?,
            admin: parse_pubkey("admin", &self.admin)?,
            fee_payer: parse_pubkey("feePayer", &self.fee_payer)?,
            mint: parse_pubkey("mint", &self.mint)?,
            kamino_reserve: parse_pubkey("kaminoReserve", &self.kamino_reserve)?,
            kamino_market: parse_pubkey("kaminoMarket", &self.kamino_market)?,
            oracle: parse_pubkey("oracle", &self.oracle)?,
        })
    }

    pub fn deposit_limit_value(&self) -> Result<u128> {
        parse_ceiling("depositLimit", &self.deposit_limit)
    }

    pub fn total_asset_value_limit_value(&self) -> Result<u128> {
        parse_ceiling("totalAssetValueInitLimit", &self.total_asset_value_init_limit)
    }

    /// Map of "parameter name -> expected value" used by the report.
    pub fn display_fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        fields.insert("asset", self.asset.clone());
        fields.insert("oracle", self.oracle.clone());
        fields.insert("oracle kind", self.oracle_kind.as_str().to_string());
        fields.insert("asset weight init", format!("{}", self.asset_weight_init));
        fields.insert("asset weight maint", format!("{}", self.asset_weight_maint));
        fields.insert("deposit limit", self.deposit_limit.clone());
        fields.insert(
            "total asset value init limit",
            self.total_asset_value_init_limit.clone(),
        );
        fields.insert("oracle max age", format!("{}s", self.oracle_max_age));
        fields.insert("oracle max confidence", format!("{}", self.oracle_max_confidence));
        fields
    }
}

fn parse_pubkey(label: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value).with_context(|| format!("{label} is not a valid address: {value:?}"))
}

fn parse_ceiling(label: &str, value: &str) -> Result<u128> {
    value
        .parse::<u128>()
        .with_context(|| format!("{label} is not a non-negative integer: {value:?}"))
}
