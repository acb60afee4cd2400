//! Unsigned add-bank transaction construction.
//!
//! The transaction built here is never signed or submitted by this tool: it
//! is dry-run against current chain state and then embedded, wire-encoded,
//! in the report for the multisig custodian to execute.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;

use crate::types::{
    ListingConfig, ListingKeys, OracleKind, ASSET_TAG_KAMINO, OPERATIONAL_STATE_ACTIVE,
    RISK_TIER_COLLATERAL,
};

/// Anchor-style discriminator of the add-bank instruction.
pub const ADD_BANK_DISCRIMINATOR: [u8; 8] = [76, 211, 213, 171, 117, 78, 2, 100];

/// Fixed-point scale used for the weight fields on the wire.
const WEIGHT_SCALE: f64 = 1e9;

/// Serialize the bank configuration into instruction data.
///
/// Layout, little-endian throughout: discriminator, seed (u64), the two
/// weights scaled to u64, both ceilings (u128), operational state, risk
/// tier, asset tag (u8 each), oracle kind (u8), oracle max age (u64),
/// oracle max confidence (u64).
pub fn encode_add_bank_config(config: &ListingConfig, seed: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(8 + 8 + 16 + 32 + 3 + 1 + 16);
    data.extend_from_slice(&ADD_BANK_DISCRIMINATOR);
    data.extend_from_slice(&seed.to_le_bytes());
    data.extend_from_slice(&scale_weight(config.asset_weight_init).to_le_bytes());
    data.extend_from_slice(&scale_weight(config.asset_weight_maint).to_le_bytes());
    data.extend_from_slice(&config.deposit_limit_value()?.to_le_bytes());
    data.extend_from_slice(&config.total_asset_value_limit_value()?.to_le_bytes());
    data.push(OPERATIONAL_STATE_ACTIVE);
    data.push(RISK_TIER_COLLATERAL);
    data.push(ASSET_TAG_KAMINO);
    data.push(match config.oracle_kind {
        OracleKind::SwitchboardPull => 0,
        OracleKind::PythPushOracle => 1,
    });
    data.extend_from_slice(&config.oracle_max_age.to_le_bytes());
    data.extend_from_slice(&config.oracle_max_confidence.to_le_bytes());
    Ok(data)
}

fn scale_weight(weight: f64) -> u64 {
    (weight * WEIGHT_SCALE).round() as u64
}

/// Build the unsigned creation transaction.
///
/// The fee payer and admin are marked as signers in the message; their
/// signatures are supplied later by the multisig flow.
pub fn build_add_bank_transaction(
    config: &ListingConfig,
    keys: &ListingKeys,
    seed: u64,
    bank: &Pubkey,
    token_program: &Pubkey,
    blockhash: Hash,
) -> Result<Transaction> {
    let data = encode_add_bank_config(config, seed)?;
    let accounts = vec![
        AccountMeta::new_readonly(keys.group, false),
        AccountMeta::new_readonly(keys.admin, true),
        AccountMeta::new(keys.fee_payer, true),
        AccountMeta::new(*bank, false),
        AccountMeta::new_readonly(keys.mint, false),
        AccountMeta::new_readonly(keys.kamino_reserve, false),
        AccountMeta::new_readonly(keys.oracle, false),
        AccountMeta::new_readonly(*token_program, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    let instruction = Instruction {
        program_id: keys.program_id,
        accounts,
        data,
    };
    let mut message = Message::new(&[instruction], Some(&keys.fee_payer));
    message.recent_blockhash = blockhash;
    Ok(Transaction::new_unsigned(message))
}

/// Wire-encode the unsigned transaction for the report document.
pub fn encode_transaction_base64(tx: &Transaction) -> Result<(String, usize)> {
    let bytes = bincode::serialize(tx).context("failed to serialize transaction")?;
    let size = bytes.len();
    Ok((BASE64.encode(bytes), size))
}
