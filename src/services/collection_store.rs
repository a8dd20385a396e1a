//! PostgreSQL implementation of [`CollectionStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        balance::{Balance, UNPAID_STATE},
        collection_run::RunTrigger,
        merchant_account::MerchantAccount,
    },
    services::collection_service::{
        AccountReport, CandidateCriteria, CollectionStore, RunTotals,
    },
};

#[derive(Clone)]
pub struct PgCollectionStore {
    pool: DbPool,
}

impl PgCollectionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionStore for PgCollectionStore {
    async fn platform_merchant_account(
        &self,
        charge_processor_id: &str,
    ) -> Result<Option<MerchantAccount>, AppError> {
        let account = sqlx::query_as::<_, MerchantAccount>(
            r#"
            SELECT * FROM merchant_accounts
            WHERE user_id IS NULL AND charge_processor_id = $1
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(charge_processor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn candidate_accounts(
        &self,
        criteria: &CandidateCriteria,
    ) -> Result<Vec<MerchantAccount>, AppError> {
        // Keep in sync with CandidateCriteria::admits
        let accounts = sqlx::query_as::<_, MerchantAccount>(
            r#"
            SELECT * FROM merchant_accounts
            WHERE charge_processor_id = $1
              AND country = $2
              AND user_id IS NOT NULL
              AND charge_processor_merchant_id IS NOT NULL
              AND is_stripe_connect = false
              AND unclaimed_balance_collection_transfer_id IS NULL
              AND created_at < $3
              AND ($4::uuid IS NULL OR id > $4)
            ORDER BY id
            LIMIT $5
            "#,
        )
        .bind(&criteria.charge_processor_id)
        .bind(&criteria.country)
        .bind(criteria.created_before)
        .bind(criteria.after_id)
        .bind(criteria.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn last_successful_sale_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(created_at) FROM purchases WHERE seller_id = $1 AND purchase_state = 'successful'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    async fn last_completed_payment_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(created_at) FROM payments WHERE user_id = $1 AND state = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(last)
    }

    async fn record_collection(
        &self,
        account: &MerchantAccount,
        transfer_id: &str,
        platform_merchant_account_id: Uuid,
        currency: &str,
    ) -> Result<Vec<Balance>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Marker first: it is what keeps the account out of every later run
        let marked = sqlx::query(
            r#"
            UPDATE merchant_accounts
            SET unclaimed_balance_collection_transfer_id = $1,
                updated_at = NOW()
            WHERE id = $2 AND unclaimed_balance_collection_transfer_id IS NULL
            "#,
        )
        .bind(transfer_id)
        .bind(account.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if marked == 0 {
            tx.rollback().await?;
            return Err(AppError::AlreadyCollected(account.id));
        }

        let moved = sqlx::query_as::<_, Balance>(
            r#"
            UPDATE balances
            SET merchant_account_id = $1,
                updated_at = NOW()
            WHERE user_id = $2
              AND merchant_account_id = $3
              AND holding_currency = $4
              AND state = $5
            RETURNING *
            "#,
        )
        .bind(platform_merchant_account_id)
        .bind(account.user_id)
        .bind(account.id)
        .bind(currency)
        .bind(UNPAID_STATE)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(moved)
    }

    async fn start_run(
        &self,
        trigger: RunTrigger,
        triggered_by: Option<Uuid>,
        dry_run: bool,
    ) -> Result<Uuid, AppError> {
        let run_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO collection_runs (trigger, triggered_by, dry_run, status)
            VALUES ($1, $2, $3, 'running')
            RETURNING id
            "#,
        )
        .bind(trigger.as_str())
        .bind(triggered_by)
        .bind(dry_run)
        .fetch_one(&self.pool)
        .await?;

        Ok(run_id)
    }

    async fn record_outcome(&self, run_id: Uuid, report: &AccountReport) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO collection_outcomes (
                run_id,
                merchant_account_id,
                outcome,
                transfer_id,
                amount_cents,
                error
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run_id)
        .bind(report.merchant_account_id)
        .bind(report.outcome.code())
        .bind(report.outcome.transfer_id())
        .bind(report.outcome.amount_cents())
        .bind(report.outcome.error())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_run(&self, run_id: Uuid, totals: &RunTotals) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE collection_runs
            SET status = 'completed',
                accounts_examined = $2,
                accounts_collected = $3,
                accounts_skipped = $4,
                accounts_failed = $5,
                amount_collected_cents = $6,
                finished_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(totals.accounts_examined)
        .bind(totals.accounts_collected)
        .bind(totals.accounts_skipped)
        .bind(totals.accounts_failed)
        .bind(totals.amount_collected_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE collection_runs SET status = 'failed', error = $2, finished_at = NOW() WHERE id = $1",
        )
        .bind(run_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
