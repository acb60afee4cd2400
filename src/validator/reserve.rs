//! Partner-protocol reserve verification.
//!
//! The proposed bank must be backed by a real reserve that belongs to the
//! declared lending market and wraps the declared mint. An unfetchable or
//! undecodable reserve is fatal: the address is simply not a reserve and no
//! further check is meaningful. A decoded reserve whose fields disagree with
//! the config is a soft failure: the full diagnostic context still lands in
//! the report.

use anyhow::{bail, Result};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument};

use crate::validator::data_sources::ChainReader;
use crate::validator::types::ReserveData;

/// KLend-style reserve account layout (fixed offsets).
pub mod reserve_layout {
    pub const DISCRIMINATOR: [u8; 8] = [43, 242, 204, 202, 26, 247, 59, 127];
    /// u64 layout version.
    pub const VERSION_OFFSET: usize = 8;
    /// slot (u64) + stale flag + price status + padding.
    pub const LAST_UPDATE_OFFSET: usize = 16;
    pub const LENDING_MARKET_OFFSET: usize = 32;
    pub const FARM_COLLATERAL_OFFSET: usize = 64;
    pub const LIQUIDITY_MINT_OFFSET: usize = 96;
    /// u64, low byte is the SPL decimals.
    pub const MINT_DECIMALS_OFFSET: usize = 128;
    pub const SUPPLY_VAULT_OFFSET: usize = 136;
    pub const FEE_VAULT_OFFSET: usize = 168;
    pub const PRICE_ORACLE_OFFSET: usize = 200;
    pub const MIN_LEN: usize = 232;
}

/// Fetch the reserve and cross-check it against the declared market and mint.
///
/// Returns the decoded reserve plus any field-mismatch errors. Errors from
/// the fetch or the decode itself propagate and abort the pipeline.
#[instrument(skip(chain), fields(reserve = %reserve_addr))]
pub async fn fetch_and_validate<C: ChainReader + ?Sized>(
    chain: &C,
    reserve_addr: &Pubkey,
    expected_market: &Pubkey,
    expected_mint: &Pubkey,
) -> Result<(ReserveData, Vec<String>)> {
    let data = match chain.fetch_account(reserve_addr).await? {
        Some(data) => data,
        None => bail!("reserve account {reserve_addr} does not exist"),
    };
    let reserve = decode_reserve(reserve_addr, &data)?;
    debug!(
        "reserve {} decoded: market={} mint={} oracle={}",
        reserve_addr, reserve.market, reserve.mint, reserve.price_oracle
    );

    let mut errors = Vec::new();
    if reserve.market != *expected_market {
        errors.push(format!(
            "reserve belongs to market {} but config declares {}",
            reserve.market, expected_market
        ));
    }
    if reserve.mint != *expected_mint {
        errors.push(format!(
            "reserve wraps mint {} but config declares {}",
            reserve.mint, expected_mint
        ));
    }
    Ok((reserve, errors))
}

/// Decode the reserve fields this pipeline cares about.
pub fn decode_reserve(address: &Pubkey, data: &[u8]) -> Result<ReserveData> {
    use reserve_layout as layout;

    if data.len() < layout::MIN_LEN {
        bail!(
            "account {address} is too short to be a reserve ({} bytes)",
            data.len()
        );
    }
    if data[..8] != layout::DISCRIMINATOR {
        bail!("account {address} does not carry the reserve discriminator");
    }

    let farm_collateral = read_pubkey(data, layout::FARM_COLLATERAL_OFFSET)?;
    Ok(ReserveData {
        market: read_pubkey(data, layout::LENDING_MARKET_OFFSET)?,
        mint: read_pubkey(data, layout::LIQUIDITY_MINT_OFFSET)?,
        mint_decimals: data[layout::MINT_DECIMALS_OFFSET],
        price_oracle: read_pubkey(data, layout::PRICE_ORACLE_OFFSET)?,
        farm_collateral: if farm_collateral == Pubkey::default() {
            None
        } else {
            Some(farm_collateral)
        },
        supply_vault: read_pubkey(data, layout::SUPPLY_VAULT_OFFSET)?,
        fee_vault: read_pubkey(data, layout::FEE_VAULT_OFFSET)?,
    })
}

fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey> {
    if data.len() < offset + 32 {
        bail!("reserve data truncated at offset {offset}");
    }
    Ok(Pubkey::try_from(&data[offset..offset + 32]).expect("slice is 32 bytes"))
}
