//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

use crate::services::collection_service::CollectionSettings;

/// How the binary should behave once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorMode {
    /// Serve the operator API and run collections on the configured interval.
    Server,
    /// Run a single collection pass and exit (for external job runners).
    Once,
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `STRIPE_SECRET_KEY` (required): platform secret key used for all processor calls
/// - `STRIPE_PLATFORM_ACCOUNT_ID` (required): destination of collected balances
/// - `STRIPE_API_BASE` (optional): defaults to `https://api.stripe.com`
/// - `STRIPE_TIMEOUT_SECS` (optional): per-request timeout, defaults to 30
/// - `COLLECTION_COUNTRY` / `COLLECTION_CURRENCY` (optional): default `US` / `usd`
/// - `INACTIVITY_WINDOW_MONTHS` (optional): defaults to 36
/// - `COLLECTION_BATCH_SIZE` (optional): defaults to 1000
/// - `DRY_RUN` (optional): defaults to false
/// - `JOB_INTERVAL_SECS` (optional): scheduler period, defaults to one day
/// - `RUN_ON_STARTUP` (optional): fire the first scheduled run immediately
/// - `COLLECTOR_MODE` (optional): `server` (default) or `once`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub stripe_secret_key: String,

    pub stripe_platform_account_id: String,

    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    #[serde(default = "default_stripe_timeout_secs")]
    pub stripe_timeout_secs: u64,

    #[serde(default = "default_country")]
    pub collection_country: String,

    #[serde(default = "default_currency")]
    pub collection_currency: String,

    #[serde(default = "default_inactivity_window_months")]
    pub inactivity_window_months: u32,

    #[serde(default = "default_batch_size")]
    pub collection_batch_size: i64,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_job_interval_secs")]
    pub job_interval_secs: u64,

    #[serde(default)]
    pub run_on_startup: bool,

    #[serde(default = "default_mode")]
    pub collector_mode: CollectorMode,
}

fn default_max_connections() -> u32 {
    5
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_stripe_timeout_secs() -> u64 {
    30
}

fn default_country() -> String {
    "US".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

/// Stripe treats connected accounts as inactive after three years, so we use the same window.
fn default_inactivity_window_months() -> u32 {
    36
}

fn default_batch_size() -> i64 {
    1000
}

fn default_job_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_mode() -> CollectorMode {
    CollectorMode::Server
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Job settings derived from this configuration.
    pub fn collection_settings(&self) -> CollectionSettings {
        CollectionSettings {
            charge_processor_id: crate::models::merchant_account::STRIPE_PROCESSOR_ID.to_string(),
            country: self.collection_country.clone(),
            currency: self.collection_currency.to_lowercase(),
            platform_account_id: self.stripe_platform_account_id.clone(),
            inactivity_window_months: self.inactivity_window_months,
            batch_size: self.collection_batch_size.max(1),
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, envy::Error> {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn applies_defaults_for_optional_variables() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/collector"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_PLATFORM_ACCOUNT_ID", "acct_platform"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.stripe_api_base, "https://api.stripe.com");
        assert_eq!(config.collection_country, "US");
        assert_eq!(config.collection_currency, "usd");
        assert_eq!(config.inactivity_window_months, 36);
        assert_eq!(config.job_interval_secs, 86_400);
        assert!(!config.dry_run);
        assert!(!config.run_on_startup);
        assert_eq!(config.collector_mode, CollectorMode::Server);
    }

    #[test]
    fn parses_overrides() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/collector"),
            ("STRIPE_SECRET_KEY", "sk_test_123"),
            ("STRIPE_PLATFORM_ACCOUNT_ID", "acct_platform"),
            ("COLLECTOR_MODE", "once"),
            ("DRY_RUN", "true"),
            ("COLLECTION_CURRENCY", "USD"),
            ("COLLECTION_BATCH_SIZE", "0"),
        ])
        .unwrap();

        assert_eq!(config.collector_mode, CollectorMode::Once);
        let settings = config.collection_settings();
        assert!(settings.dry_run);
        assert_eq!(settings.currency, "usd");
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.platform_account_id, "acct_platform");
    }

    #[test]
    fn requires_processor_credentials() {
        let result = from_pairs(&[("DATABASE_URL", "postgres://localhost/collector")]);
        assert!(result.is_err());
    }
}
