//! # sluice-core
//! Foundation types and traits for the Sluice escrow ledger.

pub mod bank;
pub mod config;
pub mod constants;
pub mod epoch;
pub mod error;
pub mod math;
pub mod traits;
pub mod types;
