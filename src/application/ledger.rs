use super::retry::RetryPolicy;
use crate::domain::customer::{CreditLimit, Tenor};
use crate::domain::money::Amount;
use crate::domain::ports::RecordStoreRef;
use crate::domain::record::RecordId;
use crate::error::{LendingError, Result};
use chrono::Utc;
use tracing::{debug, info};

/// Computes available credit and consumes it per (customer, tenor).
///
/// The ledger is the only writer of `CreditLimit::used_amount`. It holds no
/// lock of its own: every reservation is a read-validate-write cycle committed
/// through the store's compare-and-increment, which is what keeps the sum of
/// reservations under the granted amount across any number of processes.
pub struct CreditLedger {
    limits: RecordStoreRef<CreditLimit>,
}

impl CreditLedger {
    pub fn new(limits: RecordStoreRef<CreditLimit>) -> Self {
        Self { limits }
    }

    /// Loads the customer's limits and picks the one for `tenor`.
    pub async fn limit_for(&self, customer_id: RecordId, tenor: Tenor) -> Result<CreditLimit> {
        self.limits
            .list_by_owner(customer_id)
            .await?
            .into_iter()
            .find(|limit| limit.tenor == tenor)
            .ok_or(LendingError::NoLimitForTenor { customer_id, tenor })
    }

    /// Point-in-time check, reserves nothing. `reserve` is the authoritative
    /// rejection point and must follow promptly.
    pub async fn check_available(
        &self,
        customer_id: RecordId,
        tenor: Tenor,
        amount: Amount,
    ) -> Result<bool> {
        let limit = self.limit_for(customer_id, tenor).await?;
        debug!(
            customer_id,
            tenor,
            available = %limit.available(),
            requested = %amount.value(),
            "checked credit availability"
        );
        Ok(limit.covers(amount))
    }

    /// Re-reads the limit, re-validates it, and commits `used_amount += amount`
    /// with a version check.
    ///
    /// Returns `VersionConflict` untouched when another writer got there first;
    /// callers decide whether to retry (see [`CreditLedger::reserve_with_retry`]).
    pub async fn reserve(
        &self,
        customer_id: RecordId,
        tenor: Tenor,
        amount: Amount,
    ) -> Result<CreditLimit> {
        let mut limit = self.limit_for(customer_id, tenor).await?;
        limit.consume(amount, Utc::now())?;
        limit.version = self.limits.update(&limit).await?;
        info!(
            customer_id,
            tenor,
            reserved = %amount.value(),
            used = %limit.used_amount,
            version = limit.version,
            "credit reserved"
        );
        Ok(limit)
    }

    /// Runs [`CreditLedger::reserve`] under `policy`, repeating the whole cycle
    /// on retryable errors only (version conflicts, storage contention).
    pub async fn reserve_with_retry(
        &self,
        customer_id: RecordId,
        tenor: Tenor,
        amount: Amount,
        policy: &RetryPolicy,
    ) -> Result<CreditLimit> {
        policy
            .run("reserve_credit", move |_| {
                self.reserve(customer_id, tenor, amount)
            })
            .await
    }
}
