//! Merchant account collection status.

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        collection_run::CollectionOutcomeRecord,
        merchant_account::{MerchantAccount, MerchantAccountCollectionResponse},
    },
};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

/// Get whether a merchant account was collected, and every outcome recorded for it.
///
/// # Endpoint
///
/// `GET /api/v1/merchant-accounts/{id}/collection`
///
/// # Response
///
/// - **200 OK**: marker plus outcome history, newest first
/// - **404**: merchant account not found
pub async fn get_collection_status(
    State(pool): State<DbPool>,
    Path(merchant_account_id): Path<Uuid>,
) -> Result<Json<MerchantAccountCollectionResponse>, AppError> {
    let account =
        sqlx::query_as::<_, MerchantAccount>("SELECT * FROM merchant_accounts WHERE id = $1")
            .bind(merchant_account_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::MerchantAccountNotFound)?;

    let outcomes = sqlx::query_as::<_, CollectionOutcomeRecord>(
        r#"
        SELECT * FROM collection_outcomes
        WHERE merchant_account_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(merchant_account_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(MerchantAccountCollectionResponse::new(account, outcomes)))
}
