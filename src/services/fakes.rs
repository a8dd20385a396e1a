//! In-memory stand-ins for the database and the payment processor.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        balance::{Balance, UNPAID_STATE},
        collection_run::RunTrigger,
        merchant_account::{MerchantAccount, STRIPE_PROCESSOR_ID},
    },
    processor::{
        AccountType, BalanceAmount, ChargeProcessor, ProcessorAccount, ProcessorBalance,
        ProcessorError, ProcessorEvent, ProcessorTransfer, TransferRequest,
    },
    services::{
        collection_service::{
            AccountReport, CandidateCriteria, CollectionSettings, CollectionStore, RunTotals,
        },
        run_service::CollectionRunner,
    },
};

pub fn settings() -> CollectionSettings {
    CollectionSettings {
        charge_processor_id: STRIPE_PROCESSOR_ID.to_string(),
        country: "US".to_string(),
        currency: "usd".to_string(),
        platform_account_id: "acct_platform".to_string(),
        inactivity_window_months: 36,
        batch_size: 100,
        dry_run: false,
    }
}

/// A runner over one dormant US account (`acct_1`) holding $100.
pub fn runner_with_dormant_account()
-> (Arc<CollectionRunner>, Arc<FakeStore>, Arc<FakeProcessor>) {
    let long_ago = Utc::now().checked_sub_months(Months::new(60)).unwrap();
    let (store, _) = FakeStore::with_platform_account(long_ago);
    let store = Arc::new(store);
    let processor = Arc::new(FakeProcessor::default());

    let account = merchant_account(STRIPE_PROCESSOR_ID, "US", "acct_1", long_ago);
    store.add_account(account.clone());
    store.add_unpaid_balance(&account, "usd", 100_00);
    processor.add_account("acct_1", long_ago, 100_00);

    let runner = Arc::new(CollectionRunner::new(
        store.clone(),
        processor.clone(),
        settings(),
    ));
    (runner, store, processor)
}

pub fn merchant_account(
    charge_processor_id: &str,
    country: &str,
    charge_processor_merchant_id: &str,
    created_at: DateTime<Utc>,
) -> MerchantAccount {
    MerchantAccount {
        id: Uuid::new_v4(),
        user_id: Some(Uuid::new_v4()),
        charge_processor_id: charge_processor_id.to_string(),
        charge_processor_merchant_id: Some(charge_processor_merchant_id.to_string()),
        country: country.to_string(),
        currency: "usd".to_string(),
        is_stripe_connect: false,
        unclaimed_balance_collection_transfer_id: None,
        created_at,
        updated_at: created_at,
    }
}

#[derive(Debug, Clone)]
pub struct FakeRun {
    pub id: Uuid,
    pub trigger: RunTrigger,
    pub dry_run: bool,
    pub status: &'static str,
    pub totals: Option<RunTotals>,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct FakeStoreState {
    pub accounts: Vec<MerchantAccount>,
    pub last_sales: HashMap<Uuid, DateTime<Utc>>,
    pub last_payments: HashMap<Uuid, DateTime<Utc>>,
    pub balances: Vec<Balance>,
    pub runs: Vec<FakeRun>,
    pub outcomes: Vec<(Uuid, AccountReport)>,
    pub candidate_queries: usize,
    pub fail_record_collection: bool,
    /// Sleep before applying a collection to the ledger
    pub record_collection_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeStore {
    pub state: Mutex<FakeStoreState>,
}

impl FakeStore {
    /// A store that already holds the platform's Stripe merchant account.
    pub fn with_platform_account(created_at: DateTime<Utc>) -> (Self, Uuid) {
        let mut platform = merchant_account(STRIPE_PROCESSOR_ID, "US", "acct_platform", created_at);
        platform.user_id = None;
        let platform_id = platform.id;

        let store = Self::default();
        store.state.lock().unwrap().accounts.push(platform);
        (store, platform_id)
    }

    pub fn add_account(&self, account: MerchantAccount) {
        self.state.lock().unwrap().accounts.push(account);
    }

    pub fn add_unpaid_balance(&self, account: &MerchantAccount, holding_currency: &str, cents: i64) {
        let now = Utc::now();
        self.state.lock().unwrap().balances.push(Balance {
            id: Uuid::new_v4(),
            user_id: account.user_id.expect("seller account"),
            merchant_account_id: account.id,
            state: UNPAID_STATE.to_string(),
            date: now.date_naive(),
            amount_cents: cents,
            holding_currency: holding_currency.to_string(),
            holding_amount_cents: cents,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn set_last_sale(&self, account: &MerchantAccount, at: DateTime<Utc>) {
        let user_id = account.user_id.expect("seller account");
        self.state.lock().unwrap().last_sales.insert(user_id, at);
    }

    pub fn set_last_payment(&self, account: &MerchantAccount, at: DateTime<Utc>) {
        let user_id = account.user_id.expect("seller account");
        self.state.lock().unwrap().last_payments.insert(user_id, at);
    }

    pub fn account(&self, id: Uuid) -> MerchantAccount {
        self.state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .expect("account exists")
    }

    /// Sum of the unpaid balances held on `merchant_account_id`.
    pub fn held_cents(&self, merchant_account_id: Uuid) -> i64 {
        self.state
            .lock()
            .unwrap()
            .balances
            .iter()
            .filter(|b| b.merchant_account_id == merchant_account_id && b.is_unpaid())
            .map(|b| b.holding_amount_cents)
            .sum()
    }
}

#[async_trait]
impl CollectionStore for FakeStore {
    async fn platform_merchant_account(
        &self,
        charge_processor_id: &str,
    ) -> Result<Option<MerchantAccount>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.user_id.is_none() && a.charge_processor_id == charge_processor_id)
            .cloned())
    }

    async fn candidate_accounts(
        &self,
        criteria: &CandidateCriteria,
    ) -> Result<Vec<MerchantAccount>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.candidate_queries += 1;

        let mut accounts: Vec<MerchantAccount> = state
            .accounts
            .iter()
            .filter(|a| criteria.admits(a))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.id);
        accounts.truncate(criteria.limit as usize);
        Ok(accounts)
    }

    async fn last_successful_sale_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.state.lock().unwrap().last_sales.get(&user_id).copied())
    }

    async fn last_completed_payment_at(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.state.lock().unwrap().last_payments.get(&user_id).copied())
    }

    async fn record_collection(
        &self,
        account: &MerchantAccount,
        transfer_id: &str,
        platform_merchant_account_id: Uuid,
        currency: &str,
    ) -> Result<Vec<Balance>, AppError> {
        let delay = self.state.lock().unwrap().record_collection_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_record_collection {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let stored = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account.id)
            .ok_or(AppError::MerchantAccountNotFound)?;
        if stored.unclaimed_balance_collection_transfer_id.is_some() {
            return Err(AppError::AlreadyCollected(account.id));
        }
        stored.unclaimed_balance_collection_transfer_id = Some(transfer_id.to_string());

        let mut moved = Vec::new();
        for balance in state.balances.iter_mut() {
            if Some(balance.user_id) == account.user_id
                && balance.merchant_account_id == account.id
                && balance.holding_currency == currency
                && balance.is_unpaid()
            {
                balance.merchant_account_id = platform_merchant_account_id;
                moved.push(balance.clone());
            }
        }
        Ok(moved)
    }

    async fn start_run(
        &self,
        trigger: RunTrigger,
        _triggered_by: Option<Uuid>,
        dry_run: bool,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().runs.push(FakeRun {
            id,
            trigger,
            dry_run,
            status: "running",
            totals: None,
            error: None,
        });
        Ok(id)
    }

    async fn record_outcome(&self, run_id: Uuid, report: &AccountReport) -> Result<(), AppError> {
        self.state
            .lock()
            .unwrap()
            .outcomes
            .push((run_id, report.clone()));
        Ok(())
    }

    async fn complete_run(&self, run_id: Uuid, totals: &RunTotals) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = "completed";
            run.totals = Some(*totals);
        }
        Ok(())
    }

    async fn fail_run(&self, run_id: Uuid, error: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = "failed";
            run.error = Some(error.to_string());
        }
        Ok(())
    }
}

/// How many times each processor operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub retrieve_account: usize,
    pub latest_payout: usize,
    pub latest_charge: usize,
    pub retrieve_balance: usize,
    pub create_transfer: usize,
}

#[derive(Default)]
pub struct FakeProcessorState {
    pub accounts: HashMap<String, ProcessorAccount>,
    pub payouts: HashMap<String, ProcessorEvent>,
    pub charges: HashMap<String, ProcessorEvent>,
    pub balances: HashMap<String, ProcessorBalance>,
    /// Accounts whose balance lookups fail
    pub failing_balances: HashSet<String>,
    pub transfers: Vec<(String, TransferRequest, String)>,
    pub transfers_by_key: HashMap<String, ProcessorTransfer>,
    pub calls: CallCounts,
}

#[derive(Default)]
pub struct FakeProcessor {
    pub state: Mutex<FakeProcessorState>,
}

impl FakeProcessor {
    /// Register an express account created at `created` holding `usd_cents` available.
    pub fn add_account(&self, id: &str, created: DateTime<Utc>, usd_cents: i64) {
        self.add_typed_account(id, AccountType::Express, created, usd_cents);
    }

    pub fn add_typed_account(
        &self,
        id: &str,
        account_type: AccountType,
        created: DateTime<Utc>,
        usd_cents: i64,
    ) {
        let mut state = self.state.lock().unwrap();
        state.accounts.insert(
            id.to_string(),
            ProcessorAccount {
                id: id.to_string(),
                account_type: Some(account_type),
                created: Some(created.timestamp()),
            },
        );
        state.balances.insert(
            id.to_string(),
            ProcessorBalance {
                available: vec![BalanceAmount {
                    amount: usd_cents,
                    currency: "usd".to_string(),
                }],
                pending: vec![BalanceAmount {
                    amount: 0,
                    currency: "usd".to_string(),
                }],
            },
        );
    }

    pub fn set_balance(&self, id: &str, balance: ProcessorBalance) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(id.to_string(), balance);
    }

    pub fn set_latest_payout(&self, id: &str, created: DateTime<Utc>) {
        self.state.lock().unwrap().payouts.insert(
            id.to_string(),
            ProcessorEvent {
                id: format!("po_{id}"),
                created: created.timestamp(),
            },
        );
    }

    pub fn set_latest_charge(&self, id: &str, created: DateTime<Utc>) {
        self.state.lock().unwrap().charges.insert(
            id.to_string(),
            ProcessorEvent {
                id: format!("ch_{id}"),
                created: created.timestamp(),
            },
        );
    }

    pub fn fail_balance_for(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_balances
            .insert(id.to_string());
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().unwrap().transfers_by_key.len()
    }
}

fn no_such_account(id: &str) -> ProcessorError {
    ProcessorError::Api {
        status: 404,
        kind: "invalid_request_error".to_string(),
        message: format!("No such account: '{id}'"),
    }
}

#[async_trait]
impl ChargeProcessor for FakeProcessor {
    async fn retrieve_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.calls.retrieve_account += 1;
        state
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| no_such_account(account_id))
    }

    async fn latest_payout(
        &self,
        account_id: &str,
    ) -> Result<Option<ProcessorEvent>, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.calls.latest_payout += 1;
        Ok(state.payouts.get(account_id).cloned())
    }

    async fn latest_charge(
        &self,
        account_id: &str,
    ) -> Result<Option<ProcessorEvent>, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.calls.latest_charge += 1;
        Ok(state.charges.get(account_id).cloned())
    }

    async fn retrieve_balance(&self, account_id: &str) -> Result<ProcessorBalance, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.calls.retrieve_balance += 1;
        if state.failing_balances.contains(account_id) {
            return Err(ProcessorError::Api {
                status: 500,
                kind: "api_error".to_string(),
                message: "balance unavailable".to_string(),
            });
        }
        Ok(state.balances.get(account_id).cloned().unwrap_or_default())
    }

    async fn create_transfer(
        &self,
        account_id: &str,
        request: &TransferRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorTransfer, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_transfer += 1;
        if let Some(existing) = state.transfers_by_key.get(idempotency_key) {
            return Ok(existing.clone());
        }

        let transfer = ProcessorTransfer {
            id: format!("tr_{}", state.transfers_by_key.len() + 1),
            amount: request.amount,
            currency: request.currency.clone(),
            destination: Some(request.destination.clone()),
        };
        // The funds leave the sub-account
        state
            .balances
            .insert(account_id.to_string(), ProcessorBalance::default());
        state.transfers.push((
            account_id.to_string(),
            request.clone(),
            idempotency_key.to_string(),
        ));
        state
            .transfers_by_key
            .insert(idempotency_key.to_string(), transfer.clone());
        Ok(transfer)
    }
}
