//! Payment processor abstraction.
//!
//! The collector only needs a handful of read operations on a connected sub-account
//! plus the ability to transfer its balance out. Everything goes through the
//! [`ChargeProcessor`] trait so the job can run against the real processor or a fake.

pub mod stripe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors returned by a payment processor client.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Request could not be sent, or the connection failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor answered with a non-success status.
    #[error("{kind} ({status}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    /// The processor answered successfully but the body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

/// Connected account type. Standard accounts are owned by the seller, not the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Standard,
    Express,
    Custom,
    #[serde(other)]
    Unknown,
}

/// A connected sub-account as seen by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorAccount {
    pub id: String,

    #[serde(rename = "type")]
    pub account_type: Option<AccountType>,

    /// Unix timestamp (seconds)
    #[serde(default)]
    pub created: Option<i64>,
}

impl ProcessorAccount {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn is_standard(&self) -> bool {
        self.account_type == Some(AccountType::Standard)
    }
}

/// Any timestamped object from a processor list endpoint (payouts, charges).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,

    /// Unix timestamp (seconds)
    pub created: i64,
}

impl ProcessorEvent {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAmount {
    /// Minor units; may be negative
    pub amount: i64,
    pub currency: String,
}

/// Funds held on a sub-account, split by availability and currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorBalance {
    #[serde(default)]
    pub available: Vec<BalanceAmount>,
    #[serde(default)]
    pub pending: Vec<BalanceAmount>,
}

impl ProcessorBalance {
    /// Available plus pending funds in `currency`, in minor units.
    ///
    /// Pending funds are included because a balance older than the inactivity window
    /// can no longer be refunded or disputed.
    pub fn total_in(&self, currency: &str) -> i64 {
        self.available
            .iter()
            .chain(self.pending.iter())
            .filter(|entry| entry.currency.eq_ignore_ascii_case(currency))
            .map(|entry| entry.amount)
            .sum()
    }
}

/// Parameters for moving funds out of a sub-account.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    /// Minor units, strictly positive
    pub amount: i64,
    pub currency: String,
    pub description: String,
    /// Receiving account (the platform)
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorTransfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub destination: Option<String>,
}

/// Operations the collector needs from a payment processor.
///
/// Every method except `retrieve_account` acts *on behalf of* the sub-account,
/// i.e. reads or moves that sub-account's own funds.
#[async_trait]
pub trait ChargeProcessor: Send + Sync {
    async fn retrieve_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorError>;

    /// Most recent payout from the sub-account to its bank, if any.
    async fn latest_payout(&self, account_id: &str)
    -> Result<Option<ProcessorEvent>, ProcessorError>;

    /// Most recent charge made on the sub-account, if any.
    async fn latest_charge(&self, account_id: &str)
    -> Result<Option<ProcessorEvent>, ProcessorError>;

    async fn retrieve_balance(&self, account_id: &str) -> Result<ProcessorBalance, ProcessorError>;

    /// Transfer funds from the sub-account. Requests with the same `idempotency_key`
    /// produce at most one transfer.
    async fn create_transfer(
        &self,
        account_id: &str,
        request: &TransferRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorTransfer, ProcessorError>;
}
