//! Deterministic bank address derivation and seed selection.
//!
//! Banks are program-derived addresses over (group, mint, seed). The seed is
//! an integer discriminator; new listings take the lowest unused one unless
//! the config pins a seed explicitly, in which case the override is
//! re-verified for collision here, right before anything is built.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, instrument, warn};

use crate::types::{ASSET_TAG_KAMINO, BANK_SEED_PREFIX, SEED_FLOOR, SEED_SCAN_WINDOW};
use crate::validator::data_sources::{ChainReader, MemcmpFilter};
use crate::validator::types::{ExistingBank, SeedRecovery, SeedSelection};

/// Bank account layout, shared with the scan filters and test fixtures.
pub mod bank_layout {
    /// Anchor-style account discriminator.
    pub const DISCRIMINATOR: [u8; 8] = [142, 49, 166, 242, 50, 66, 97, 188];
    pub const GROUP_OFFSET: usize = 8;
    pub const MINT_OFFSET: usize = 40;
    pub const KAMINO_RESERVE_OFFSET: usize = 72;
    pub const ASSET_TAG_OFFSET: usize = 104;
    pub const MIN_LEN: usize = 105;
}

/// Derive the bank address for (program, group, mint, seed).
///
/// Pure and deterministic: the same inputs always yield the same address,
/// and distinct seeds never collide for a fixed (program, group, mint).
pub fn derive_bank_address(
    program_id: &Pubkey,
    group: &Pubkey,
    mint: &Pubkey,
    seed: u64,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            BANK_SEED_PREFIX,
            group.as_ref(),
            mint.as_ref(),
            &seed.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

/// Smallest integer >= `floor` not present in `existing`.
pub fn find_next_seed(existing: &BTreeSet<u64>, floor: u64) -> u64 {
    let mut candidate = floor;
    while existing.contains(&candidate) {
        candidate += 1;
    }
    candidate
}

/// Enumerate banks already created for this (group, mint).
///
/// Records are filtered on-chain by group, mint and the partner asset tag;
/// for each match the seed is recovered by searching the bounded window
/// `SEED_FLOOR..SEED_FLOOR + SEED_SCAN_WINDOW`. A network failure here is
/// fatal: without the existing-bank set no safe seed can be chosen.
#[instrument(skip(chain), fields(group = %group, mint = %mint))]
pub async fn scan_existing_banks<C: ChainReader + ?Sized>(
    chain: &C,
    program_id: &Pubkey,
    group: &Pubkey,
    mint: &Pubkey,
) -> Result<Vec<ExistingBank>> {
    let filters = [
        MemcmpFilter::new(0, bank_layout::DISCRIMINATOR.to_vec()),
        MemcmpFilter::new(bank_layout::GROUP_OFFSET, group.as_ref().to_vec()),
        MemcmpFilter::new(bank_layout::MINT_OFFSET, mint.as_ref().to_vec()),
        MemcmpFilter::new(bank_layout::ASSET_TAG_OFFSET, vec![ASSET_TAG_KAMINO]),
    ];
    let records = chain
        .scan_accounts(program_id, &filters)
        .await
        .context("existing-bank scan failed")?;
    debug!("found {} existing banks for this (group, mint)", records.len());

    let mut banks = Vec::with_capacity(records.len());
    for (address, data) in records {
        let seed = recover_seed(program_id, group, mint, &address);
        if seed == SeedRecovery::Unknown {
            warn!(
                "bank {} seed not recovered within window {}..{}",
                address,
                SEED_FLOOR,
                SEED_FLOOR + SEED_SCAN_WINDOW
            );
        }
        banks.push(ExistingBank {
            address,
            seed,
            kamino_reserve: read_linked_reserve(&data),
        });
    }
    Ok(banks)
}

/// Brute-force the seed that produced `address` within the fixed window.
fn recover_seed(
    program_id: &Pubkey,
    group: &Pubkey,
    mint: &Pubkey,
    address: &Pubkey,
) -> SeedRecovery {
    for seed in SEED_FLOOR..SEED_FLOOR + SEED_SCAN_WINDOW {
        if derive_bank_address(program_id, group, mint, seed) == *address {
            return SeedRecovery::Known(seed);
        }
    }
    SeedRecovery::Unknown
}

fn read_linked_reserve(data: &[u8]) -> Option<Pubkey> {
    if data.len() < bank_layout::MIN_LEN {
        return None;
    }
    let start = bank_layout::KAMINO_RESERVE_OFFSET;
    let reserve = Pubkey::try_from(&data[start..start + 32]).ok()?;
    if reserve == Pubkey::default() {
        None
    } else {
        Some(reserve)
    }
}

/// Choose the seed for the new bank and flag reserve duplicates.
///
/// An explicit config seed colliding with an existing bank is a fatal
/// misconfiguration. A duplicate reserve is returned in the selection for
/// the orchestrator to abort on, so the report can name the colliding bank.
pub fn select_seed(
    explicit_seed: Option<u64>,
    target_reserve: &Pubkey,
    existing: Vec<ExistingBank>,
) -> Result<SeedSelection> {
    let mut warnings = Vec::new();
    let mut used = BTreeSet::new();
    for bank in &existing {
        match bank.seed {
            SeedRecovery::Known(seed) => {
                used.insert(seed);
            }
            SeedRecovery::Unknown => warnings.push(format!(
                "bank {} has an unrecoverable seed; its seed is not excluded from selection",
                bank.address
            )),
        }
    }

    let duplicate_reserve = existing
        .iter()
        .find(|bank| bank.kamino_reserve.as_ref() == Some(target_reserve))
        .cloned();

    let selected_seed = match explicit_seed {
        Some(seed) => {
            if used.contains(&seed) {
                bail!("explicit seed {seed} already used by an existing bank for this (group, mint)");
            }
            seed
        }
        None => find_next_seed(&used, SEED_FLOOR),
    };

    Ok(SeedSelection {
        existing,
        selected_seed,
        duplicate_reserve,
        warnings,
    })
}
