//! listing-sentry - pre-multisig verification gate for new bank listings.
//!
//! Validates a proposed collateral/borrow market against chain state, the
//! partner protocol's reserve, the price oracle, and a dry run of the real
//! creation transaction, before anything is handed to the multisig.

pub mod txbuild;
pub mod types;
pub mod validator;

// Re-export main types for convenience
pub use types::{ListingConfig, ListingKeys, OracleKind};
