//! Report rendering and artifact persistence.
//!
//! No validation logic lives here: the generator renders the structured
//! results of the upstream stages into a console summary and a markdown
//! document, then writes the document and the updated config artifact
//! exactly once, after every stage has completed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::types::ListingConfig;
use crate::validator::types::{ListingReport, SeedRecovery};

pub struct ReportGenerator {
    out_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    /// Ordered plain-text summary, one section per stage.
    pub fn log_summary(&self, report: &ListingReport) {
        info!("===== bank listing verification: {} =====", report.asset);
        info!(
            "bank address {} (seed {})",
            report.bank_address, report.seed_selection.selected_seed
        );
        info!(
            "existing banks for this (group, mint): {}",
            report.seed_selection.existing.len()
        );
        for warning in &report.seed_selection.warnings {
            warn!("{warning}");
        }

        if report.reserve_errors.is_empty() {
            info!(
                "reserve ok: market {} mint {} ({} decimals)",
                report.reserve.market, report.reserve.mint, report.reserve.mint_decimals
            );
        } else {
            for error in &report.reserve_errors {
                warn!("reserve: {error}");
            }
        }

        match &report.oracle.skipped {
            Some(note) => info!("oracle validation skipped: {note}"),
            None => {
                info!(
                    "oracle {} authority={} ticker={} price={}",
                    report.oracle.oracle,
                    flag(report.oracle.authority_valid),
                    flag(report.oracle.ticker_valid),
                    flag(report.oracle.price_valid)
                );
                for error in &report.oracle.errors {
                    warn!("oracle: {error}");
                }
            }
        }

        info!(
            "dry run: instruction={} succeeded={} units={} checks={} matched={}",
            flag(report.simulation.instruction_found),
            flag(report.simulation.dry_run_succeeded),
            report.simulation.compute_units,
            report.simulation.checks.len(),
            report.simulation.checks.iter().filter(|c| c.matched).count()
        );
        for check in report.simulation.checks.iter().filter(|c| !c.matched) {
            warn!(
                "simulated {} = {} but config says {}",
                check.name, check.actual, check.expected
            );
        }
        if !report.simulation.missing.is_empty() {
            warn!(
                "trace did not log: {} (unchecked, not mismatched)",
                report.simulation.missing.join(", ")
            );
        }

        if report.overall_valid {
            info!("RESULT: PASS, configuration verified; hand off to the multisig");
        } else {
            warn!("RESULT: FAIL, do not sign; see the report for details");
        }
    }

    /// Render the persisted report document.
    pub fn render_markdown(&self, report: &ListingReport, config: &ListingConfig) -> String {
        let mut doc = String::new();
        let push = |doc: &mut String, line: &str| {
            doc.push_str(line);
            doc.push('\n');
        };

        push(&mut doc, &format!("# Bank listing verification: {}", report.asset));
        push(&mut doc, "");
        push(
            &mut doc,
            &format!(
                "Generated {}, overall: **{}**",
                report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                if report.overall_valid { "PASS" } else { "FAIL" }
            ),
        );

        push(&mut doc, "");
        push(&mut doc, "## Existing banks");
        if report.seed_selection.existing.is_empty() {
            push(&mut doc, "None for this (group, mint).");
        }
        for bank in &report.seed_selection.existing {
            let seed = match bank.seed {
                SeedRecovery::Known(seed) => seed.to_string(),
                SeedRecovery::Unknown => "unknown".to_string(),
            };
            let reserve = bank
                .kamino_reserve
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            push(
                &mut doc,
                &format!("- `{}` seed {} reserve `{}`", bank.address, seed, reserve),
            );
        }

        push(&mut doc, "");
        push(&mut doc, "## Seed selection");
        push(
            &mut doc,
            &format!(
                "- selected seed: {}\n- bank address: `{}`",
                report.seed_selection.selected_seed, report.bank_address
            ),
        );
        for warning in &report.seed_selection.warnings {
            push(&mut doc, &format!("- warning: {warning}"));
        }

        push(&mut doc, "");
        push(&mut doc, "## On-chain verification");
        push(
            &mut doc,
            &format!(
                "- reserve market: `{}`\n- reserve mint: `{}` ({} decimals)\n- reserve oracle: `{}`\n- supply vault: `{}`\n- fee vault: `{}`",
                report.reserve.market,
                report.reserve.mint,
                report.reserve.mint_decimals,
                report.reserve.price_oracle,
                report.reserve.supply_vault,
                report.reserve.fee_vault
            ),
        );
        if let Some(farm) = report.reserve.farm_collateral {
            push(&mut doc, &format!("- collateral farm: `{farm}`"));
        }
        for error in &report.reserve_errors {
            push(&mut doc, &format!("- ERROR: {error}"));
        }

        push(&mut doc, "");
        push(&mut doc, "## Bank configuration");
        for (name, value) in config.display_fields() {
            push(&mut doc, &format!("- {name}: {value}"));
        }

        push(&mut doc, "");
        push(&mut doc, "## Oracle validation");
        match &report.oracle.skipped {
            Some(note) => push(&mut doc, &format!("Skipped: {note}")),
            None => {
                push(
                    &mut doc,
                    &format!(
                        "- feed: `{}` ({})\n- authority: {} {}\n- ticker: {}\n- price: {} vs reference {} (deviation {}, tolerance {}%)",
                        report.oracle.oracle,
                        report.oracle.name.as_deref().unwrap_or("unresolved"),
                        report
                            .oracle
                            .authority
                            .map(|a| format!("`{a}`"))
                            .unwrap_or_else(|| "unresolved".to_string()),
                        verdict(report.oracle.authority_valid),
                        verdict(report.oracle.ticker_valid),
                        report
                            .oracle
                            .oracle_price
                            .map(|p| format!("{p}"))
                            .unwrap_or_else(|| "-".to_string()),
                        report
                            .oracle
                            .reference_price
                            .map(|p| format!("{p}"))
                            .unwrap_or_else(|| "-".to_string()),
                        report
                            .oracle
                            .deviation_pct
                            .map(|d| format!("{d:.3}%"))
                            .unwrap_or_else(|| "-".to_string()),
                        report.oracle.tolerance_pct
                    ),
                );
                for error in &report.oracle.errors {
                    push(&mut doc, &format!("- ERROR: {error}"));
                }
            }
        }

        push(&mut doc, "");
        push(&mut doc, "## Simulation results");
        push(
            &mut doc,
            &format!(
                "- instruction found: {}\n- dry run succeeded: {}{}\n- compute units: {}",
                verdict(report.simulation.instruction_found),
                verdict(report.simulation.dry_run_succeeded),
                report
                    .simulation
                    .dry_run_error
                    .as_deref()
                    .map(|e| format!(" ({e})"))
                    .unwrap_or_default(),
                report.simulation.compute_units
            ),
        );
        push(&mut doc, "");
        push(&mut doc, "| parameter | expected | simulated | match |");
        push(&mut doc, "|---|---|---|---|");
        for check in &report.simulation.checks {
            push(
                &mut doc,
                &format!(
                    "| {} | {} | {} | {} |",
                    check.name,
                    check.expected,
                    check.actual,
                    verdict(check.matched)
                ),
            );
        }
        if !report.simulation.missing.is_empty() {
            push(&mut doc, "");
            push(
                &mut doc,
                &format!(
                    "WARNING: the trace never logged: {}. These fields were not verified.",
                    report.simulation.missing.join(", ")
                ),
            );
        }

        push(&mut doc, "");
        push(&mut doc, "## Unsigned transaction");
        push(
            &mut doc,
            &format!("{} bytes, base64(bincode):", report.tx_size),
        );
        push(&mut doc, "");
        push(&mut doc, "```");
        push(&mut doc, &report.encoded_tx);
        push(&mut doc, "```");

        push(&mut doc, "");
        push(&mut doc, "## Next steps");
        push(
            &mut doc,
            "1. Review every section above; anything marked FAIL must be resolved before signing.",
        );
        push(
            &mut doc,
            "2. Import the encoded transaction into the multisig and compare the decoded accounts against this document.",
        );
        push(
            &mut doc,
            "3. Collect the remaining signatures and execute. This tool never signs or submits.",
        );

        doc
    }

    /// Write the report document and rewrite the config artifact.
    pub fn persist(
        &self,
        report: &ListingReport,
        config: &ListingConfig,
        config_path: &Path,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;
        let report_path = self
            .out_dir
            .join(format!("{}_bank_listing.md", report.asset.to_lowercase()));
        std::fs::write(&report_path, self.render_markdown(report, config))
            .with_context(|| format!("failed to write report {}", report_path.display()))?;
        config.save(config_path)?;
        info!(
            "artifacts written: {} and {}",
            report_path.display(),
            config_path.display()
        );
        Ok(report_path)
    }
}

fn flag(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAIL"
    }
}

fn verdict(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}
