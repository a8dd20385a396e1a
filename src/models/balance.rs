//! Unpaid balance ledger rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// State of a balance that has not yet been paid out to its owner.
pub const UNPAID_STATE: &str = "unpaid";

/// Represents a row of the `balances` table.
///
/// A balance records funds owed to a seller for one day of sales. `merchant_account_id`
/// is the account currently *holding* the funds; collecting an inactive account moves
/// its unpaid rows onto the platform's merchant account.
///
/// Amounts are stored in cents. `holding_amount_cents` is denominated in `holding_currency`,
/// `amount_cents` is always in USD.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Balance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub merchant_account_id: Uuid,
    pub state: String,
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub holding_currency: String,
    pub holding_amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn is_unpaid(&self) -> bool {
        self.state == UNPAID_STATE
    }
}
