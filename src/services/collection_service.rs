//! Collection of unclaimed balances from inactive merchant accounts.
//!
//! The processor treats a connected account as abandoned after three years without
//! activity. Before that happens we move the remaining balance to the platform account
//! and re-attribute the seller's unpaid ledger rows to the platform merchant account.
//!
//! # Process
//!
//! 1. Page through candidate merchant accounts (old enough, not yet collected)
//! 2. Skip any account with a recent sale or payout in our own records
//! 3. Skip standard accounts and accounts with recent processor-side activity
//! 4. Transfer a positive balance to the platform account
//! 5. Persist the transfer ID and move the unpaid balances in one database transaction
//!
//! The transfer ID doubles as the idempotency marker: a collected account is filtered
//! out of every later run, so the job can be retried wholesale.

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        balance::Balance,
        collection_run::RunTrigger,
        merchant_account::MerchantAccount,
    },
    processor::{ChargeProcessor, TransferRequest},
};

pub const TRANSFER_DESCRIPTION: &str = "Collect unclaimed balance of inactive account";

/// Knobs for one collection pass.
#[derive(Debug, Clone)]
pub struct CollectionSettings {
    pub charge_processor_id: String,
    pub country: String,
    /// Lowercase ISO 4217 code; only balances in this currency are collected
    pub currency: String,
    /// Processor account receiving the collected funds
    pub platform_account_id: String,
    pub inactivity_window_months: u32,
    pub batch_size: i64,
    /// Evaluate every account but move no money
    pub dry_run: bool,
}

impl CollectionSettings {
    /// Activity at or before the cutoff counts as dormant.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        now.checked_sub_months(Months::new(self.inactivity_window_months))
            .ok_or_else(|| {
                AppError::InvalidRequest(format!(
                    "inactivity window of {} months is out of range",
                    self.inactivity_window_months
                ))
            })
    }
}

/// Which merchant accounts a page of candidates may contain.
#[derive(Debug, Clone)]
pub struct CandidateCriteria {
    pub charge_processor_id: String,
    pub country: String,
    pub created_before: DateTime<Utc>,
    /// Keyset cursor: only accounts with a greater id
    pub after_id: Option<Uuid>,
    pub limit: i64,
}

impl CandidateCriteria {
    /// In-memory form of the candidate filter.
    pub fn admits(&self, account: &MerchantAccount) -> bool {
        account.charge_processor_id == self.charge_processor_id
            && account.country == self.country
            && account.user_id.is_some()
            && account.charge_processor_merchant_id.is_some()
            && !account.is_stripe_connect
            && account.unclaimed_balance_collection_transfer_id.is_none()
            && account.created_at < self.created_before
            && self.after_id.is_none_or(|after| account.id > after)
    }
}

/// Persistence the collection job depends on.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// The platform's own merchant account at `charge_processor_id`.
    async fn platform_merchant_account(
        &self,
        charge_processor_id: &str,
    ) -> Result<Option<MerchantAccount>, AppError>;

    /// One page of candidates, ordered by id.
    async fn candidate_accounts(
        &self,
        criteria: &CandidateCriteria,
    ) -> Result<Vec<MerchantAccount>, AppError>;

    async fn last_successful_sale_at(&self, user_id: Uuid)
    -> Result<Option<DateTime<Utc>>, AppError>;

    async fn last_completed_payment_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Atomically set the account's collection marker and move its unpaid balances in
    /// `currency` onto `platform_merchant_account_id`. Returns the moved balances.
    ///
    /// Fails with `AlreadyCollected` if the marker was already set.
    async fn record_collection(
        &self,
        account: &MerchantAccount,
        transfer_id: &str,
        platform_merchant_account_id: Uuid,
        currency: &str,
    ) -> Result<Vec<Balance>, AppError>;

    async fn start_run(
        &self,
        trigger: RunTrigger,
        triggered_by: Option<Uuid>,
        dry_run: bool,
    ) -> Result<Uuid, AppError>;

    async fn record_outcome(&self, run_id: Uuid, report: &AccountReport) -> Result<(), AppError>;

    async fn complete_run(&self, run_id: Uuid, totals: &RunTotals) -> Result<(), AppError>;

    async fn fail_run(&self, run_id: Uuid, error: &str) -> Result<(), AppError>;
}

/// What happened to one merchant account during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccountOutcome {
    /// A sale or payout in our records is newer than the cutoff
    SkippedRecentLocalActivity { last_activity_at: DateTime<Utc> },
    /// The seller owns the processor account outright
    SkippedStandardAccount,
    /// The processor-side account itself is newer than the cutoff
    SkippedRecentlyCreated { created_at: DateTime<Utc> },
    SkippedRecentProcessorPayout {
        payout_id: String,
        created_at: DateTime<Utc>,
    },
    SkippedRecentProcessorCharge {
        charge_id: String,
        created_at: DateTime<Utc>,
    },
    SkippedNoBalance { balance_cents: i64 },
    /// Dry run: this account would have been collected
    WouldCollect { amount_cents: i64 },
    Collected {
        transfer_id: String,
        amount_cents: i64,
        balances_reassigned: usize,
    },
    /// The transfer went through but the ledger could not be updated.
    /// Needs manual reconciliation against `transfer_id`.
    TransferredUnrecorded {
        transfer_id: String,
        amount_cents: i64,
        error: String,
    },
    Failed { error: String },
}

impl AccountOutcome {
    /// Stable code persisted in `collection_outcomes.outcome`.
    pub fn code(&self) -> &'static str {
        match self {
            AccountOutcome::SkippedRecentLocalActivity { .. } => "skipped_recent_local_activity",
            AccountOutcome::SkippedStandardAccount => "skipped_standard_account",
            AccountOutcome::SkippedRecentlyCreated { .. } => "skipped_recently_created",
            AccountOutcome::SkippedRecentProcessorPayout { .. } => {
                "skipped_recent_processor_payout"
            }
            AccountOutcome::SkippedRecentProcessorCharge { .. } => {
                "skipped_recent_processor_charge"
            }
            AccountOutcome::SkippedNoBalance { .. } => "skipped_no_balance",
            AccountOutcome::WouldCollect { .. } => "would_collect",
            AccountOutcome::Collected { .. } => "collected",
            AccountOutcome::TransferredUnrecorded { .. } => "transferred_unrecorded",
            AccountOutcome::Failed { .. } => "failed",
        }
    }

    pub fn transfer_id(&self) -> Option<&str> {
        match self {
            AccountOutcome::Collected { transfer_id, .. }
            | AccountOutcome::TransferredUnrecorded { transfer_id, .. } => Some(transfer_id),
            _ => None,
        }
    }

    pub fn amount_cents(&self) -> Option<i64> {
        match self {
            AccountOutcome::Collected { amount_cents, .. }
            | AccountOutcome::TransferredUnrecorded { amount_cents, .. }
            | AccountOutcome::WouldCollect { amount_cents } => Some(*amount_cents),
            AccountOutcome::SkippedNoBalance { balance_cents } => Some(*balance_cents),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AccountOutcome::Failed { error }
            | AccountOutcome::TransferredUnrecorded { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub merchant_account_id: Uuid,
    pub charge_processor_merchant_id: String,
    #[serde(flatten)]
    pub outcome: AccountOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub accounts_examined: i64,
    /// Includes `WouldCollect` on dry runs
    pub accounts_collected: i64,
    pub accounts_skipped: i64,
    pub accounts_failed: i64,
    pub amount_collected_cents: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<AccountReport>,
}

impl RunReport {
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals::default();
        for report in &self.outcomes {
            totals.accounts_examined += 1;
            match &report.outcome {
                AccountOutcome::Collected { amount_cents, .. }
                | AccountOutcome::WouldCollect { amount_cents } => {
                    totals.accounts_collected += 1;
                    totals.amount_collected_cents += amount_cents;
                }
                AccountOutcome::Failed { .. } => totals.accounts_failed += 1,
                AccountOutcome::TransferredUnrecorded { amount_cents, .. } => {
                    totals.accounts_failed += 1;
                    totals.amount_collected_cents += amount_cents;
                }
                _ => totals.accounts_skipped += 1,
            }
        }
        totals
    }
}

/// Idempotency key for the collection transfer of one merchant account.
pub fn transfer_idempotency_key(merchant_account_id: Uuid) -> String {
    format!("unclaimed-balance-{merchant_account_id}")
}

/// Scan every candidate account once and collect the dormant ones.
///
/// Outcomes are recorded against `run_id` as they happen. A failure on one account
/// is recorded and the scan moves on; earlier transfers are never undone.
///
/// # Errors
///
/// - `PlatformAccountMissing`: no platform merchant account to attribute balances to
/// - `Database`: candidates could not be listed or an outcome could not be recorded
pub async fn collect_unclaimed_balances(
    store: &dyn CollectionStore,
    processor: &dyn ChargeProcessor,
    settings: &CollectionSettings,
    run_id: Uuid,
    now: DateTime<Utc>,
) -> Result<RunReport, AppError> {
    let cutoff = settings.cutoff(now)?;

    let platform_account = store
        .platform_merchant_account(&settings.charge_processor_id)
        .await?
        .ok_or_else(|| AppError::PlatformAccountMissing(settings.charge_processor_id.clone()))?;

    let mut report = RunReport::default();
    let mut after_id = None;

    loop {
        let criteria = CandidateCriteria {
            charge_processor_id: settings.charge_processor_id.clone(),
            country: settings.country.clone(),
            created_before: cutoff,
            after_id,
            limit: settings.batch_size,
        };
        let batch = store.candidate_accounts(&criteria).await?;
        let batch_len = batch.len() as i64;

        for account in batch {
            after_id = Some(account.id);

            let outcome =
                match process_account(store, processor, settings, &account, platform_account.id, cutoff)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(
                            merchant_account_id = %account.id,
                            error = %e,
                            "Failed to collect unclaimed balance"
                        );
                        AccountOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };

            let account_report = AccountReport {
                merchant_account_id: account.id,
                charge_processor_merchant_id: account
                    .charge_processor_merchant_id
                    .clone()
                    .unwrap_or_default(),
                outcome,
            };
            store.record_outcome(run_id, &account_report).await?;
            report.outcomes.push(account_report);
        }

        if batch_len < settings.batch_size {
            break;
        }
    }

    Ok(report)
}

/// Decide on, and if dormant collect, a single merchant account.
///
/// Checks run cheapest first and stop at the first sign of activity.
pub async fn process_account(
    store: &dyn CollectionStore,
    processor: &dyn ChargeProcessor,
    settings: &CollectionSettings,
    account: &MerchantAccount,
    platform_merchant_account_id: Uuid,
    cutoff: DateTime<Utc>,
) -> Result<AccountOutcome, AppError> {
    let Some(processor_account_id) = account.charge_processor_merchant_id.as_deref() else {
        return Err(AppError::InvalidRequest(format!(
            "merchant account {} has no processor account",
            account.id
        )));
    };

    if let Some(user_id) = account.user_id {
        let last_sale = store.last_successful_sale_at(user_id).await?;
        let last_payment = store.last_completed_payment_at(user_id).await?;
        if let Some(last_activity_at) = last_sale.max(last_payment) {
            if last_activity_at > cutoff {
                return Ok(AccountOutcome::SkippedRecentLocalActivity { last_activity_at });
            }
        }
    }

    let processor_account = processor.retrieve_account(processor_account_id).await?;
    if processor_account.is_standard() {
        return Ok(AccountOutcome::SkippedStandardAccount);
    }
    if let Some(created_at) = processor_account.created_at() {
        if created_at > cutoff {
            return Ok(AccountOutcome::SkippedRecentlyCreated { created_at });
        }
    }

    if let Some(payout) = processor.latest_payout(processor_account_id).await? {
        if let Some(created_at) = payout.created_at().filter(|at| *at > cutoff) {
            return Ok(AccountOutcome::SkippedRecentProcessorPayout {
                payout_id: payout.id,
                created_at,
            });
        }
    }

    if let Some(charge) = processor.latest_charge(processor_account_id).await? {
        if let Some(created_at) = charge.created_at().filter(|at| *at > cutoff) {
            return Ok(AccountOutcome::SkippedRecentProcessorCharge {
                charge_id: charge.id,
                created_at,
            });
        }
    }

    let balance = processor.retrieve_balance(processor_account_id).await?;
    let amount_cents = balance.total_in(&settings.currency);
    if amount_cents <= 0 {
        return Ok(AccountOutcome::SkippedNoBalance {
            balance_cents: amount_cents,
        });
    }

    if settings.dry_run {
        tracing::info!(
            merchant_account_id = %account.id,
            amount_cents,
            "Dry run: would collect unclaimed balance"
        );
        return Ok(AccountOutcome::WouldCollect { amount_cents });
    }

    let transfer = processor
        .create_transfer(
            processor_account_id,
            &TransferRequest {
                amount: amount_cents,
                currency: settings.currency.clone(),
                description: TRANSFER_DESCRIPTION.to_string(),
                destination: settings.platform_account_id.clone(),
            },
            &transfer_idempotency_key(account.id),
        )
        .await?;

    // Funds older than the window can no longer be refunded or disputed,
    // so the ledger rows can follow the money to the platform account.
    let moved = match store
        .record_collection(
            account,
            &transfer.id,
            platform_merchant_account_id,
            &settings.currency,
        )
        .await
    {
        Ok(moved) => moved,
        Err(e) => {
            tracing::error!(
                merchant_account_id = %account.id,
                transfer_id = %transfer.id,
                amount_cents,
                error = %e,
                "Transfer succeeded but the ledger was not updated"
            );
            return Ok(AccountOutcome::TransferredUnrecorded {
                transfer_id: transfer.id,
                amount_cents,
                error: e.to_string(),
            });
        }
    };

    tracing::info!(
        merchant_account_id = %account.id,
        transfer_id = %transfer.id,
        amount_cents,
        balances_reassigned = moved.len(),
        "Collected unclaimed balance"
    );

    Ok(AccountOutcome::Collected {
        transfer_id: transfer.id,
        amount_cents,
        balances_reassigned: moved.len(),
    })
}
