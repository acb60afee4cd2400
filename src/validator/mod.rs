//! Validation pipeline for proposed bank listings.
//!
//! Each submodule owns one stage: address derivation, reserve
//! cross-referencing, oracle validation, dry-run trace verification,
//! report generation, and the orchestrator that sequences them.

pub mod address;
pub mod data_sources;
pub mod oracle;
pub mod pipeline;
pub mod report;
pub mod reserve;
pub mod simulation;
pub mod types;

// Re-export the main entry points.
pub use data_sources::{
    ChainReader, DryRunOutcome, DryRunner, FeedExplorer, FeedMetadata, JupiterPriceSource,
    MemcmpFilter, OnDemandExplorer, RefPriceSource, RpcChainClient,
};
pub use oracle::OracleValidator;
pub use pipeline::{ListingPipeline, PipelineOutcome};
pub use report::ReportGenerator;
pub use types::{
    ExistingBank, ListingReport, OracleReport, ReserveData, SeedRecovery, SeedSelection,
    SimulationCheck, SimulationReport,
};
