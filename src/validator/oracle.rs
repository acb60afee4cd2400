//! Independent oracle validation.
//!
//! Switchboard pull feeds are permissionlessly created, so a listing must
//! not trust the config's word that a feed address is the real one: the
//! validator re-derives identity (ticker), ownership (authority) and
//! plausibility (price deviation against an independent reference) from the
//! hosting service. Pyth push oracles skip all of this; the lending
//! program verifies the feed id on-chain itself.
//!
//! Nothing in here propagates: every fetch or scrape failure is downgraded
//! to a recorded error string so a partial report can still be produced.
//! The explorer session is acquired lazily and released on every exit path
//! of [`OracleValidator::validate`].

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, instrument, warn};

use crate::types::OracleKind;
use crate::validator::data_sources::{FeedExplorer, FeedMetadata, RefPriceSource};
use crate::validator::types::OracleReport;

/// Authority every legitimate Switchboard pull feed is owned by.
pub const SWITCHBOARD_FEED_AUTHORITY: &str = "SBondMDrcV3K4kxZR1HNVT7osZxAHVHgYXL5Ze1oMUv";

/// Maximum accepted deviation between feed price and reference price.
pub const PRICE_TOLERANCE_PCT: f64 = 1.0;

/// Absolute deviation of `oracle` from `reference`, as a percentage of the
/// reference.
pub fn deviation_pct(oracle: f64, reference: f64) -> f64 {
    ((oracle - reference).abs() / reference) * 100.0
}

/// Base-asset ticker from a feed display name: the text before the first
/// separator, upper-cased. "jto/usd" -> "JTO".
pub fn ticker_from_feed_name(name: &str) -> String {
    name.split(['/', '-', ' '])
        .next()
        .unwrap_or(name)
        .trim()
        .to_uppercase()
}

/// Validates a proposed oracle against the hosting service and a reference
/// price source.
pub struct OracleValidator<X: FeedExplorer, P: RefPriceSource> {
    explorer: X,
    prices: P,
    expected_authority: Pubkey,
    tolerance_pct: f64,
}

impl<X: FeedExplorer, P: RefPriceSource> OracleValidator<X, P> {
    pub fn new(explorer: X, prices: P) -> Self {
        Self {
            explorer,
            prices,
            expected_authority: SWITCHBOARD_FEED_AUTHORITY
                .parse()
                .expect("authority constant is a valid address"),
            tolerance_pct: PRICE_TOLERANCE_PCT,
        }
    }

    pub fn with_expectations(
        explorer: X,
        prices: P,
        expected_authority: Pubkey,
        tolerance_pct: f64,
    ) -> Self {
        Self {
            explorer,
            prices,
            expected_authority,
            tolerance_pct,
        }
    }

    /// Run every applicable check. Never fails; the session held by the
    /// explorer is released before this returns, on success and error paths
    /// alike.
    pub async fn validate(
        &mut self,
        asset: &str,
        oracle: &Pubkey,
        kind: OracleKind,
        mint: &Pubkey,
    ) -> OracleReport {
        let report = self.validate_inner(asset, oracle, kind, mint).await;
        self.explorer.close().await;
        report
    }

    #[instrument(skip(self), fields(oracle = %oracle, kind = ?kind))]
    async fn validate_inner(
        &mut self,
        asset: &str,
        oracle: &Pubkey,
        kind: OracleKind,
        mint: &Pubkey,
    ) -> OracleReport {
        match kind {
            OracleKind::PythPushOracle => {
                info!("oracle kind {} needs no independent validation", kind.as_str());
                OracleReport::skipped(
                    *oracle,
                    kind,
                    "feed id is enforced by the lending program on-chain".to_string(),
                )
            }
            OracleKind::SwitchboardPull => self.validate_switchboard(asset, oracle, mint).await,
        }
    }

    async fn validate_switchboard(
        &mut self,
        asset: &str,
        oracle: &Pubkey,
        mint: &Pubkey,
    ) -> OracleReport {
        let mut errors = Vec::new();

        let metadata = match self.explorer.feed_metadata(oracle).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("feed metadata unavailable for {}: {e:#}", oracle);
                errors.push(format!("feed metadata unavailable: {e:#}"));
                None
            }
        };

        let (authority_valid, ticker_valid) = match &metadata {
            Some(metadata) => (
                self.check_authority(metadata, &mut errors),
                self.check_ticker(asset, metadata, &mut errors),
            ),
            // Without metadata neither identity check can pass.
            None => (false, false),
        };

        let oracle_price = metadata.as_ref().map(|m| m.value);
        let (reference_price, deviation, price_valid) =
            self.check_price(oracle, oracle_price, mint, &mut errors).await;

        let valid = authority_valid && ticker_valid && price_valid;
        OracleReport {
            oracle: *oracle,
            kind: OracleKind::SwitchboardPull,
            name: metadata.as_ref().map(|m| m.name.clone()),
            authority: metadata.as_ref().map(|m| m.authority),
            authority_valid,
            ticker_valid,
            oracle_price,
            reference_price,
            deviation_pct: deviation,
            tolerance_pct: self.tolerance_pct,
            price_valid,
            skipped: None,
            errors,
            valid,
        }
    }

    fn check_authority(&self, metadata: &FeedMetadata, errors: &mut Vec<String>) -> bool {
        if metadata.authority == self.expected_authority {
            debug!("feed authority matches {}", self.expected_authority);
            true
        } else {
            errors.push(format!(
                "feed authority {} does not match expected {}",
                metadata.authority, self.expected_authority
            ));
            false
        }
    }

    fn check_ticker(&self, asset: &str, metadata: &FeedMetadata, errors: &mut Vec<String>) -> bool {
        let ticker = ticker_from_feed_name(&metadata.name);
        if ticker == asset.to_uppercase() {
            debug!("feed ticker {ticker} matches listing asset");
            true
        } else {
            errors.push(format!(
                "feed name {:?} is for {ticker}, not {}",
                metadata.name,
                asset.to_uppercase()
            ));
            false
        }
    }

    /// Price plausibility. Fails closed: no feed price or no reference
    /// price means the check cannot pass.
    async fn check_price(
        &self,
        oracle: &Pubkey,
        oracle_price: Option<f64>,
        mint: &Pubkey,
        errors: &mut Vec<String>,
    ) -> (Option<f64>, Option<f64>, bool) {
        let oracle_price = match oracle_price {
            Some(price) => price,
            None => return (None, None, false),
        };

        let reference = match self.prices.usd_price(mint).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                errors.push(format!("no reference price available for mint {mint}"));
                return (None, None, false);
            }
            Err(e) => {
                errors.push(format!("reference price lookup failed: {e:#}"));
                return (None, None, false);
            }
        };

        let deviation = deviation_pct(oracle_price, reference);
        let within = deviation <= self.tolerance_pct;
        if within {
            debug!(
                "oracle {} price {:.6} within {:.2}% of reference {:.6}",
                oracle, oracle_price, deviation, reference
            );
        } else {
            errors.push(format!(
                "oracle price {oracle_price} deviates {deviation:.3}% from reference {reference} (tolerance {}%)",
                self.tolerance_pct
            ));
        }
        (Some(reference), Some(deviation), within)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct StubExplorer {
        metadata: Option<FeedMetadata>,
        closed: bool,
    }

    #[async_trait]
    impl FeedExplorer for StubExplorer {
        async fn feed_metadata(&mut self, _feed: &Pubkey) -> Result<FeedMetadata> {
            self.metadata
                .clone()
                .ok_or_else(|| anyhow!("service unreachable"))
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    struct StubPrices {
        price: Result<Option<f64>, String>,
    }

    #[async_trait]
    impl RefPriceSource for StubPrices {
        async fn usd_price(&self, _mint: &Pubkey) -> Result<Option<f64>> {
            match &self.price {
                Ok(price) => Ok(*price),
                Err(e) => Err(anyhow!(e.clone())),
            }
        }
    }

    fn validator(
        metadata: Option<FeedMetadata>,
        price: Result<Option<f64>, String>,
        authority: Pubkey,
    ) -> OracleValidator<StubExplorer, StubPrices> {
        OracleValidator::with_expectations(
            StubExplorer {
                metadata,
                closed: false,
            },
            StubPrices { price },
            authority,
            PRICE_TOLERANCE_PCT,
        )
    }

    fn feed(name: &str, authority: Pubkey, value: f64) -> FeedMetadata {
        FeedMetadata {
            name: name.to_string(),
            authority,
            value,
        }
    }

    #[test]
    fn deviation_boundary_is_inclusive() {
        assert!((deviation_pct(101.0, 100.0) - 1.0).abs() < 1e-9);
        assert!(deviation_pct(101.0, 100.0) <= PRICE_TOLERANCE_PCT);
        assert!(deviation_pct(101.01, 100.0) > PRICE_TOLERANCE_PCT);
    }

    #[test]
    fn ticker_extraction_handles_separators() {
        assert_eq!(ticker_from_feed_name("JTO/USD"), "JTO");
        assert_eq!(ticker_from_feed_name("jto-usd"), "JTO");
        assert_eq!(ticker_from_feed_name("WIF USD price"), "WIF");
        assert_eq!(ticker_from_feed_name("SOL"), "SOL");
    }

    #[tokio::test]
    async fn pyth_kind_short_circuits_as_valid() {
        let authority = Pubkey::new_unique();
        let mut v = validator(None, Ok(None), authority);
        let report = v
            .validate(
                "JTO",
                &Pubkey::new_unique(),
                OracleKind::PythPushOracle,
                &Pubkey::new_unique(),
            )
            .await;
        assert!(report.valid);
        assert!(report.skipped.is_some());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn all_checks_pass_for_legitimate_feed() {
        let authority = Pubkey::new_unique();
        let mut v = validator(
            Some(feed("JTO/USD", authority, 2.02)),
            Ok(Some(2.0)),
            authority,
        );
        let report = v
            .validate(
                "JTO",
                &Pubkey::new_unique(),
                OracleKind::SwitchboardPull,
                &Pubkey::new_unique(),
            )
            .await;
        assert!(report.authority_valid);
        assert!(report.ticker_valid);
        assert!(report.price_valid);
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(report.name.as_deref(), Some("JTO/USD"));
    }

    #[tokio::test]
    async fn authority_mismatch_fails_and_is_recorded() {
        let expected = Pubkey::new_unique();
        let scraped = Pubkey::new_unique();
        let mut v = validator(Some(feed("JTO/USD", scraped, 2.0)), Ok(Some(2.0)), expected);
        let report = v
            .validate(
                "JTO",
                &Pubkey::new_unique(),
                OracleKind::SwitchboardPull,
                &Pubkey::new_unique(),
            )
            .await;
        assert!(!report.authority_valid);
        assert!(report.ticker_valid);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("authority")));
    }

    #[tokio::test]
    async fn wrong_ticker_fails() {
        let authority = Pubkey::new_unique();
        let mut v = validator(
            Some(feed("BONK/USD", authority, 2.0)),
            Ok(Some(2.0)),
            authority,
        );
        let report = v
            .validate(
                "JTO",
                &Pubkey::new_unique(),
                OracleKind::SwitchboardPull,
                &Pubkey::new_unique(),
            )
            .await;
        assert!(!report.ticker_valid);
        assert!(!report.valid);
    }

    #[tokio::test]
    async fn missing_reference_price_fails_closed() {
        let authority = Pubkey::new_unique();
        let mut v = validator(Some(feed("JTO/USD", authority, 2.0)), Ok(None), authority);
        let report = v
            .validate(
                "JTO",
                &Pubkey::new_unique(),
                OracleKind::SwitchboardPull,
                &Pubkey::new_unique(),
            )
            .await;
        assert!(!report.price_valid);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("reference price")));
    }

    #[tokio::test]
    async fn unreachable_service_downgrades_to_errors() {
        let authority = Pubkey::new_unique();
        let mut v = validator(None, Ok(Some(2.0)), authority);
        let report = v
            .validate(
                "JTO",
                &Pubkey::new_unique(),
                OracleKind::SwitchboardPull,
                &Pubkey::new_unique(),
            )
            .await;
        assert!(!report.valid);
        assert!(!report.authority_valid);
        assert!(report.errors.iter().any(|e| e.contains("unavailable")));
    }

    #[tokio::test]
    async fn session_is_released_on_every_path() {
        let authority = Pubkey::new_unique();

        // Error path: service unreachable.
        let mut v = validator(None, Ok(Some(2.0)), authority);
        v.validate(
            "JTO",
            &Pubkey::new_unique(),
            OracleKind::SwitchboardPull,
            &Pubkey::new_unique(),
        )
        .await;
        assert!(v.explorer.closed);

        // Skip path: pyth kind never touches the explorer, still closes.
        let mut v = validator(None, Ok(None), authority);
        v.validate(
            "JTO",
            &Pubkey::new_unique(),
            OracleKind::PythPushOracle,
            &Pubkey::new_unique(),
        )
        .await;
        assert!(v.explorer.closed);
    }
}
