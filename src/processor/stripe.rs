//! Stripe REST client.
//!
//! Requests authenticate with the platform secret key. Calls made on behalf of a
//! connected account carry the `Stripe-Account` header; transfers also carry an
//! `Idempotency-Key` so a retried request cannot move funds twice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use super::{
    ChargeProcessor, ProcessorAccount, ProcessorBalance, ProcessorError, ProcessorEvent,
    ProcessorTransfer, TransferRequest,
};

const STRIPE_ACCOUNT_HEADER: &str = "Stripe-Account";
const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Stripe list envelope (`{"object": "list", "data": [...]}`).
#[derive(Debug, Deserialize)]
struct List<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct StripeClient {
    http: reqwest::Client,
    base_url: Url,
    secret_key: String,
}

impl StripeClient {
    /// Build a client for the API at `base_url` (normally `https://api.stripe.com`).
    ///
    /// A path on `base_url` is kept as a prefix, so the API can sit behind a proxy at
    /// e.g. `https://proxy.internal/stripe`.
    pub fn new(
        base_url: &str,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProcessorError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ProcessorError::InvalidBaseUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            secret_key: secret_key.into(),
        })
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProcessorError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProcessorError::InvalidBaseUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send the request and decode a successful JSON body into `T`.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProcessorError> {
        let response = request.bearer_auth(&self.secret_key).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ProcessorError::Decode(e.to_string()))
    }

    /// Fetch the newest object of a list endpoint, scoped to `account_id`.
    async fn latest(
        &self,
        resource: &str,
        account_id: &str,
    ) -> Result<Option<ProcessorEvent>, ProcessorError> {
        let request = self
            .http
            .get(self.endpoint(&["v1", resource])?)
            .query(&[("limit", "1")])
            .header(STRIPE_ACCOUNT_HEADER, account_id);

        let list: List<ProcessorEvent> = self.send(request).await?;
        Ok(list.data.into_iter().next())
    }
}

/// Turn an error response into `ProcessorError::Api`, keeping Stripe's error type and message
/// when the body has the usual `{"error": {...}}` shape.
fn api_error(status: u16, body: &str) -> ProcessorError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => ProcessorError::Api {
            status,
            kind: envelope.error.kind.unwrap_or_else(|| "api_error".to_string()),
            message: envelope.error.message.unwrap_or_default(),
        },
        Err(_) => ProcessorError::Api {
            status,
            kind: "api_error".to_string(),
            message: body.chars().take(200).collect(),
        },
    }
}

#[async_trait]
impl ChargeProcessor for StripeClient {
    async fn retrieve_account(&self, account_id: &str) -> Result<ProcessorAccount, ProcessorError> {
        tracing::debug!(account_id, "Retrieving Stripe account");
        let request = self
            .http
            .get(self.endpoint(&["v1", "accounts", account_id])?);
        self.send(request).await
    }

    async fn latest_payout(
        &self,
        account_id: &str,
    ) -> Result<Option<ProcessorEvent>, ProcessorError> {
        tracing::debug!(account_id, "Listing latest Stripe payout");
        self.latest("payouts", account_id).await
    }

    async fn latest_charge(
        &self,
        account_id: &str,
    ) -> Result<Option<ProcessorEvent>, ProcessorError> {
        tracing::debug!(account_id, "Listing latest Stripe charge");
        self.latest("charges", account_id).await
    }

    async fn retrieve_balance(&self, account_id: &str) -> Result<ProcessorBalance, ProcessorError> {
        tracing::debug!(account_id, "Retrieving Stripe balance");
        let request = self
            .http
            .get(self.endpoint(&["v1", "balance"])?)
            .header(STRIPE_ACCOUNT_HEADER, account_id);
        self.send(request).await
    }

    async fn create_transfer(
        &self,
        account_id: &str,
        request: &TransferRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorTransfer, ProcessorError> {
        tracing::info!(
            account_id,
            amount = request.amount,
            currency = %request.currency,
            destination = %request.destination,
            "Creating Stripe transfer"
        );
        let http_request = self
            .http
            .post(self.endpoint(&["v1", "transfers"])?)
            .header(STRIPE_ACCOUNT_HEADER, account_id)
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .form(request);
        self.send(http_request).await
    }
}
