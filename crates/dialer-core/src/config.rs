//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use crate::error::AppError;
use crate::models::{PriceEntry, PricingTable, SafetyPolicy};
use crate::AppResult;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub dialer: DialerConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

/// Database configuration
///
/// Without a URL the process runs on the in-memory backend.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// Which provider client to build
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Twilio,
    /// Scripted in-process provider, never dials
    Fake,
}

/// Telephony provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    /// Caller ID presented on outbound calls
    #[serde(default)]
    pub from_number: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long the provider lets the destination ring
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u32,

    /// Public base URL the provider posts status callbacks to
    #[serde(default = "default_callback_base")]
    pub status_callback_base_url: String,
}

fn default_api_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_call_timeout() -> u32 {
    30
}

fn default_callback_base() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            call_timeout_secs: default_call_timeout(),
            status_callback_base_url: default_callback_base(),
        }
    }
}

/// Restricted deployment mode
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SafetyConfig {
    #[serde(default)]
    pub restricted: bool,

    #[serde(default)]
    pub allowed_prefixes: Vec<String>,

    #[serde(default)]
    pub allow_unsafe_override: bool,
}

impl SafetyConfig {
    pub fn policy(&self) -> SafetyPolicy {
        SafetyPolicy {
            restricted: self.restricted,
            allowed_prefixes: self.allowed_prefixes.clone(),
            allow_override: self.allow_unsafe_override,
        }
    }
}

/// Job execution settings
#[derive(Debug, Deserialize, Clone)]
pub struct DialerConfig {
    /// Total `PlaceCall` attempts per record, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Jobs allowed to run at the same time
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Stagger applied when a batch does not specify one
    #[serde(default)]
    pub default_inter_call_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_worker_concurrency() -> usize {
    8
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            worker_concurrency: default_worker_concurrency(),
            default_inter_call_delay_secs: 0,
        }
    }
}

/// Budget ledger seed values; zero means unlimited
#[derive(Debug, Deserialize, Clone)]
pub struct BudgetConfig {
    #[serde(default = "default_budget_name")]
    pub name: String,

    #[serde(default)]
    pub daily_limit: f64,

    #[serde(default)]
    pub monthly_limit: f64,
}

fn default_budget_name() -> String {
    crate::models::DEFAULT_LEDGER_NAME.to_string()
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            name: default_budget_name(),
            daily_limit: 0.0,
            monthly_limit: 0.0,
        }
    }
}

impl BudgetConfig {
    /// Limits as decimals `(daily, monthly)`
    pub fn limits(&self) -> AppResult<(Decimal, Decimal)> {
        Ok((
            to_decimal(self.daily_limit, "budget.daily_limit")?,
            to_decimal(self.monthly_limit, "budget.monthly_limit")?,
        ))
    }
}

/// One configured per-prefix rate
#[derive(Debug, Deserialize, Clone)]
pub struct RateConfig {
    pub prefix: String,
    pub rate_per_minute: f64,
    #[serde(default)]
    pub label: Option<String>,
}

/// Pricing table configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default = "default_domestic_prefixes")]
    pub domestic_prefixes: Vec<String>,

    #[serde(default = "default_domestic_rate")]
    pub domestic_rate_per_minute: f64,

    #[serde(default = "default_international_rate")]
    pub international_rate_per_minute: f64,

    /// Minutes assumed by the pre-flight estimate
    #[serde(default = "default_estimate_minutes")]
    pub estimate_minutes: u32,

    #[serde(default)]
    pub rates: Vec<RateConfig>,
}

fn default_domestic_prefixes() -> Vec<String> {
    vec!["+1".to_string()]
}

fn default_domestic_rate() -> f64 {
    0.013
}

fn default_international_rate() -> f64 {
    0.10
}

fn default_estimate_minutes() -> u32 {
    1
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            domestic_prefixes: default_domestic_prefixes(),
            domestic_rate_per_minute: default_domestic_rate(),
            international_rate_per_minute: default_international_rate(),
            estimate_minutes: default_estimate_minutes(),
            rates: Vec::new(),
        }
    }
}

impl PricingConfig {
    /// Build the pricing table
    pub fn table(&self) -> AppResult<PricingTable> {
        let entries = self
            .rates
            .iter()
            .map(|r| {
                Ok(PriceEntry {
                    prefix: r.prefix.clone(),
                    rate_per_minute: to_decimal(r.rate_per_minute, "pricing.rates")?,
                    label: r.label.clone(),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PricingTable::flat(
            self.domestic_prefixes.clone(),
            to_decimal(self.domestic_rate_per_minute, "pricing.domestic_rate_per_minute")?,
            to_decimal(
                self.international_rate_per_minute,
                "pricing.international_rate_per_minute",
            )?,
            Decimal::from(self.estimate_minutes),
        )
        .with_entries(entries))
    }
}

fn to_decimal(value: f64, field: &str) -> AppResult<Decimal> {
    let decimal = Decimal::from_f64(value)
        .ok_or_else(|| AppError::Config(format!("{} is not a valid amount: {}", field, value)))?;
    if decimal.is_sign_negative() {
        return Err(AppError::Config(format!("{} must not be negative", field)));
    }
    Ok(decimal)
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("provider.kind", "twilio")?
            .set_default("provider.call_timeout_secs", 30)?
            .set_default("dialer.max_attempts", 3)?
            .set_default("dialer.backoff_multiplier", 2.0)?
            .set_default("budget.name", crate::models::DEFAULT_LEDGER_NAME)?
            .set_default("pricing.domestic_rate_per_minute", 0.013)?
            .set_default("pricing.international_rate_per_minute", 0.10)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with DIALER_ prefix
            .add_source(
                Environment::with_prefix("DIALER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("safety.allowed_prefixes")
                    .with_list_parse_key("pricing.domestic_prefixes"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Startup checks; any failure here is fatal for the process
    pub fn validate(&self) -> AppResult<()> {
        if self.provider.kind == ProviderKind::Twilio {
            let missing: Vec<&str> = [
                ("provider.account_sid", &self.provider.account_sid),
                ("provider.auth_token", &self.provider.auth_token),
                ("provider.from_number", &self.provider.from_number),
            ]
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();

            if !missing.is_empty() {
                return Err(AppError::Config(format!(
                    "missing provider credentials: {}",
                    missing.join(", ")
                )));
            }
        }

        if self.provider.status_callback_base_url.trim().is_empty() {
            return Err(AppError::Config(
                "provider.status_callback_base_url must be set".to_string(),
            ));
        }

        if self.dialer.max_attempts == 0 {
            return Err(AppError::Config("dialer.max_attempts must be at least 1".to_string()));
        }

        if self.dialer.backoff_multiplier < 1.0 {
            return Err(AppError::Config(
                "dialer.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.dialer.worker_concurrency == 0 {
            return Err(AppError::Config(
                "dialer.worker_concurrency must be at least 1".to_string(),
            ));
        }

        if self.safety.restricted
            && !self.safety.allow_unsafe_override
            && self.safety.allowed_prefixes.is_empty()
        {
            return Err(AppError::Config(
                "safety.restricted requires safety.allowed_prefixes".to_string(),
            ));
        }

        self.budget.limits()?;
        self.pricing.table()?;
        Ok(())
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fake_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.provider.kind = ProviderKind::Fake;
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.dialer.max_attempts, 3);
        assert_eq!(config.budget.name, "default");
        assert!(config.database.url.is_none());
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_twilio_requires_credentials() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("provider.account_sid"));

        let mut config = AppConfig::default();
        config.provider.account_sid = "AC123".into();
        config.provider.auth_token = "secret".into();
        config.provider.from_number = "+15005550006".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fake_provider_needs_no_credentials() {
        assert!(fake_config().validate().is_ok());
    }

    #[test]
    fn test_restricted_without_prefixes_rejected() {
        let mut config = fake_config();
        config.safety.restricted = true;
        assert!(config.validate().is_err());

        config.safety.allowed_prefixes = vec!["+1500555".into()];
        assert!(config.validate().is_ok());
        assert!(!config.safety.policy().permits("+15551234567"));
    }

    #[test]
    fn test_negative_budget_rejected() {
        let mut config = fake_config();
        config.budget.daily_limit = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pricing_table_from_config() {
        let mut pricing = PricingConfig::default();
        pricing.rates.push(RateConfig {
            prefix: "+44".into(),
            rate_per_minute: 0.05,
            label: None,
        });
        let table = pricing.table().unwrap();
        assert_eq!(table.rate_per_minute("+15005550006"), dec!(0.013));
        assert_eq!(table.rate_per_minute("+442079460958"), dec!(0.05));
    }
}
