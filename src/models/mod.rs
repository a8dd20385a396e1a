//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables.

/// Operator key authentication model
pub mod operator_key;
/// Seller and platform merchant accounts
pub mod merchant_account;
/// Unpaid balance ledger
pub mod balance;
/// Collection runs and their per-account outcomes
pub mod collection_run;
