//! HTTP middleware components.

/// Operator key authentication middleware
pub mod auth;
