//! Cross-crate test suite for Sluice.
//!
//! Integration tests in `tests/` drive the escrow through its public entry
//! points and check ledger-wide invariants: decay, conservation of locked
//! supply and rewards, atomicity, and resumable bounded loops.

pub mod helpers;
