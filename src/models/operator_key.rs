//! Operator key model for authentication.
//!
//! Operator keys authenticate the people and tools allowed to trigger collections and
//! read run history. They are stored as SHA-256 hashes; revoked keys stay in the table
//! (`is_active = false`) so run history keeps its `triggered_by` reference.

use uuid::Uuid;

/// The part of an `operator_keys` row that authentication hands to handlers.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OperatorKey {
    pub id: Uuid,

    /// Who the key was issued to; recorded in logs for manual runs
    pub operator_name: String,
}
