//! Merchant account data models.
//!
//! A merchant account ties a platform user to a sub-account at a charge processor.
//! Platform-owned merchant accounts have no user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::collection_run::CollectionOutcomeRecord;

/// Charge processor identifier for Stripe merchant accounts.
pub const STRIPE_PROCESSOR_ID: &str = "stripe";

/// Represents a merchant account record from the database.
///
/// # Database Table
///
/// Maps to the `merchant_accounts` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct MerchantAccount {
    pub id: Uuid,

    /// Owner of the account. `None` for the platform's own accounts.
    pub user_id: Option<Uuid>,

    /// Which processor holds the account (`stripe`, `paypal`, ...)
    pub charge_processor_id: String,

    /// The processor's identifier for the sub-account (e.g. `acct_...`)
    pub charge_processor_merchant_id: Option<String>,

    /// ISO 3166 alpha-2 country code
    pub country: String,

    pub currency: String,

    /// Accounts the seller connected themselves. Their funds are not the platform's to move.
    pub is_stripe_connect: bool,

    /// Transfer that collected this account's unclaimed balance.
    ///
    /// Once set it is never cleared, and the account is never examined again.
    pub unclaimed_balance_collection_transfer_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl MerchantAccount {
    pub fn is_collected(&self) -> bool {
        self.unclaimed_balance_collection_transfer_id.is_some()
    }
}

/// Response body for `GET /api/v1/merchant-accounts/{id}/collection`.
#[derive(Debug, Serialize)]
pub struct MerchantAccountCollectionResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub charge_processor_id: String,
    pub charge_processor_merchant_id: Option<String>,
    pub country: String,
    pub collected: bool,
    pub unclaimed_balance_collection_transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,

    /// Every outcome recorded for this account, newest first
    pub outcomes: Vec<CollectionOutcomeRecord>,
}

impl MerchantAccountCollectionResponse {
    pub fn new(account: MerchantAccount, outcomes: Vec<CollectionOutcomeRecord>) -> Self {
        Self {
            id: account.id,
            collected: account.is_collected(),
            user_id: account.user_id,
            charge_processor_id: account.charge_processor_id,
            charge_processor_merchant_id: account.charge_processor_merchant_id,
            country: account.country,
            unclaimed_balance_collection_transfer_id: account
                .unclaimed_balance_collection_transfer_id,
            created_at: account.created_at,
            outcomes,
        }
    }
}
