use crate::application::retry::{Backoff, RetryPolicy};
use crate::domain::money::Money;
use crate::error::{LendingError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime tuning for the lending core.
///
/// Every field has a default, so a config file only needs to name what it
/// overrides:
///
/// ```json
/// { "lock": { "lease_ms": 10000 }, "retry": { "max_attempts": 5 } }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingConfig {
    pub lock: LockConfig,
    pub retry: RetryPolicy,
    pub pricing: PricingConfig,
}

/// Distributed lock timings used by the payment path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long a lock survives a holder that never releases it. Must exceed
    /// the longest expected critical section.
    pub lease_ms: u64,
    /// Upper bound on how long a caller waits to acquire a lock.
    pub acquire_timeout_ms: u64,
    /// Delay between acquisition attempts.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub admin_fee: Money,
    pub monthly_interest_rate: Decimal,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: 30_000,
            acquire_timeout_ms: 5_000,
            poll_interval_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            admin_fee: Money::new(dec!(100000)),
            monthly_interest_rate: dec!(0.0175),
        }
    }
}

impl LendingConfig {
    /// Loads a JSON config file and validates it.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: LendingConfig = serde_json::from_str(&raw)
            .map_err(|e| LendingError::ConfigError(format!("invalid config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock.lease_ms == 0 {
            return Err(LendingError::ConfigError(
                "lock.lease_ms must be positive".to_string(),
            ));
        }
        if self.lock.poll_interval_ms == 0 {
            return Err(LendingError::ConfigError(
                "lock.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.lock.lease_ms < self.lock.poll_interval_ms {
            return Err(LendingError::ConfigError(
                "lock.lease_ms must not be shorter than lock.poll_interval_ms".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(LendingError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if let Backoff::Exponential { base_ms, max_ms, .. } = self.retry.backoff
            && base_ms > max_ms
        {
            return Err(LendingError::ConfigError(
                "retry.backoff.base_ms must not exceed max_ms".to_string(),
            ));
        }
        if self.pricing.admin_fee.is_negative() || self.pricing.monthly_interest_rate < Decimal::ZERO
        {
            return Err(LendingError::ConfigError(
                "pricing values must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
