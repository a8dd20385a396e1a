//! Operator key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the operator key from the Authorization header
//! 2. Hash it and verify it exists in the database
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401

use crate::{db::DbPool, error::AppError, models::operator_key::OperatorKey};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Recorded as `triggered_by` on manual runs
    pub operator_key_id: Uuid,

    pub operator_name: String,
}

/// SHA-256 hex digest of a bearer token, as stored in `operator_keys.key_hash`.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Operator key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Query database for matching hash where `is_active = true`
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    let key = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::InvalidApiKey)?;

    let key_hash = hash_key(key);

    let operator_key = sqlx::query_as::<_, OperatorKey>(
        "SELECT id, operator_name
         FROM operator_keys
         WHERE key_hash = $1 AND is_active = true",
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    request.extensions_mut().insert(AuthContext {
        operator_key_id: operator_key.id,
        operator_name: operator_key.operator_name,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_keys_as_lowercase_sha256_hex() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
