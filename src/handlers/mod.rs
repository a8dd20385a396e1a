//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Reads or triggers collection runs
//! 3. Returns HTTP response (JSON, status code)

pub mod health;
/// Merchant account collection status
pub mod merchant_accounts;
/// Collection run trigger and history
pub mod runs;
