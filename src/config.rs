//! Gateway configuration.
//!
//! Every field has a default. `from_env` reads a `.env` file if present and
//! then applies `PAYGATE_*` overrides.

use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub fraud: FraudConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub refund: RefundConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    /// Redirect URLs are `<payment_page_url>/<transactionId>`.
    #[serde(default = "default_payment_page_url")]
    pub payment_page_url: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// Maximum number of background jobs running at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FraudConfig {
    /// Payments strictly above this amount go through the fraud gate.
    #[serde(default = "default_fraud_threshold")]
    pub threshold: Decimal,
    #[serde(default = "default_flag_probability")]
    pub flag_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_settlement_success_rate")]
    pub success_rate: f64,
    /// Simulated gateway latency before the transaction enters PROCESSING,
    /// drawn uniformly from `[min_delay_ms, max_delay_ms)`.
    #[serde(default = "default_settlement_min_delay")]
    pub min_delay_ms: u64,
    #[serde(default = "default_settlement_max_delay")]
    pub max_delay_ms: u64,
    /// Time spent in PROCESSING before the outcome is decided.
    #[serde(default = "default_settlement_processing_delay")]
    pub processing_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefundConfig {
    #[serde(default = "default_refund_success_rate")]
    pub success_rate: f64,
    #[serde(default = "default_refund_processing_delay")]
    pub processing_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_sweep_initial_delay")]
    pub sweep_initial_delay_ms: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
    /// How long a PENDING record may sit without an attempt before the sweep
    /// picks it up.
    #[serde(default = "default_pending_grace")]
    pub pending_grace_ms: u64,
}

fn default_payment_page_url() -> String {
    "http://localhost:8080/payment-page".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_workers() -> usize {
    64
}

fn default_fraud_threshold() -> Decimal {
    Decimal::from(100_000)
}

fn default_flag_probability() -> f64 {
    0.5
}

fn default_settlement_success_rate() -> f64 {
    0.9
}

fn default_settlement_min_delay() -> u64 {
    2_000
}

fn default_settlement_max_delay() -> u64 {
    5_000
}

fn default_settlement_processing_delay() -> u64 {
    1_000
}

fn default_refund_success_rate() -> f64 {
    0.95
}

fn default_refund_processing_delay() -> u64 {
    2_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    5_000
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_sweep_initial_delay() -> u64 {
    10_000
}

fn default_sweep_interval() -> u64 {
    30_000
}

fn default_pending_grace() -> u64 {
    30_000
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            threshold: default_fraud_threshold(),
            flag_probability: default_flag_probability(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            success_rate: default_settlement_success_rate(),
            min_delay_ms: default_settlement_min_delay(),
            max_delay_ms: default_settlement_max_delay(),
            processing_delay_ms: default_settlement_processing_delay(),
        }
    }
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            success_rate: default_refund_success_rate(),
            processing_delay_ms: default_refund_processing_delay(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            request_timeout_ms: default_request_timeout(),
            sweep_initial_delay_ms: default_sweep_initial_delay(),
            sweep_interval_ms: default_sweep_interval(),
            pending_grace_ms: default_pending_grace(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            fraud: FraudConfig::default(),
            settlement: SettlementConfig::default(),
            refund: RefundConfig::default(),
            webhook: WebhookConfig::default(),
            payment_page_url: default_payment_page_url(),
            default_currency: default_currency(),
            workers: default_workers(),
        }
    }
}

impl WebhookConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_initial_delay(&self) -> Duration {
        Duration::from_millis(self.sweep_initial_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn pending_grace(&self) -> Duration {
        Duration::from_millis(self.pending_grace_ms)
    }
}

impl GatewayConfig {
    /// Defaults with every simulated delay set to zero. Webhook backoff and
    /// sweep cadence are untouched.
    pub fn instant() -> Self {
        let mut config = Self::default();
        config.settlement.min_delay_ms = 0;
        config.settlement.max_delay_ms = 0;
        config.settlement.processing_delay_ms = 0;
        config.refund.processing_delay_ms = 0;
        config
    }

    /// Loads `.env` (if any) and applies `PAYGATE_*` overrides on top of the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a variable is set but does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        override_with(&lookup, "PAYGATE_FRAUD_THRESHOLD", &mut self.fraud.threshold)?;
        override_with(&lookup, "PAYGATE_FRAUD_FLAG_PROBABILITY", &mut self.fraud.flag_probability)?;
        override_with(
            &lookup,
            "PAYGATE_SETTLEMENT_SUCCESS_RATE",
            &mut self.settlement.success_rate,
        )?;
        override_with(
            &lookup,
            "PAYGATE_SETTLEMENT_MIN_DELAY_MS",
            &mut self.settlement.min_delay_ms,
        )?;
        override_with(
            &lookup,
            "PAYGATE_SETTLEMENT_MAX_DELAY_MS",
            &mut self.settlement.max_delay_ms,
        )?;
        override_with(
            &lookup,
            "PAYGATE_SETTLEMENT_PROCESSING_DELAY_MS",
            &mut self.settlement.processing_delay_ms,
        )?;
        override_with(&lookup, "PAYGATE_REFUND_SUCCESS_RATE", &mut self.refund.success_rate)?;
        override_with(
            &lookup,
            "PAYGATE_REFUND_PROCESSING_DELAY_MS",
            &mut self.refund.processing_delay_ms,
        )?;
        override_with(&lookup, "PAYGATE_WEBHOOK_MAX_RETRIES", &mut self.webhook.max_retries)?;
        override_with(&lookup, "PAYGATE_WEBHOOK_BASE_DELAY_MS", &mut self.webhook.base_delay_ms)?;
        override_with(&lookup, "PAYGATE_WEBHOOK_TIMEOUT_MS", &mut self.webhook.request_timeout_ms)?;
        override_with(
            &lookup,
            "PAYGATE_SWEEP_INITIAL_DELAY_MS",
            &mut self.webhook.sweep_initial_delay_ms,
        )?;
        override_with(&lookup, "PAYGATE_SWEEP_INTERVAL_MS", &mut self.webhook.sweep_interval_ms)?;
        override_with(&lookup, "PAYGATE_PENDING_GRACE_MS", &mut self.webhook.pending_grace_ms)?;
        override_with(&lookup, "PAYGATE_PAYMENT_PAGE_URL", &mut self.payment_page_url)?;
        override_with(&lookup, "PAYGATE_DEFAULT_CURRENCY", &mut self.default_currency)?;
        override_with(&lookup, "PAYGATE_WORKERS", &mut self.workers)?;
        Ok(self)
    }
}

fn override_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *field = raw
            .trim()
            .parse()
            .map_err(|e| PaymentError::InvalidArgument(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}
