use super::lock::DistributedLock;
use super::retry::RetryPolicy;
use crate::config::LockConfig;
use crate::domain::contract::{Contract, ContractStatus, Installment};
use crate::domain::ports::RecordStoreRef;
use crate::domain::record::RecordId;
use crate::error::{LendingError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Where a payment attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentPhase {
    LockPending,
    Locked,
    Validating,
    Committing,
    Retrying,
    Done,
    Failed,
}

/// Applies installment payments exactly once under contention.
///
/// Same-installment payments are serialized by a distributed lock around the
/// read-decide-write window; the version-checked update underneath still
/// rejects any writer that bypassed the lock or outlived its lease.
///
/// Installments of a cancelled or rejected contract are not payable.
pub struct PaymentOrchestrator {
    installments: RecordStoreRef<Installment>,
    contracts: RecordStoreRef<Contract>,
    lock: DistributedLock,
    lock_config: LockConfig,
    retry: RetryPolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        installments: RecordStoreRef<Installment>,
        contracts: RecordStoreRef<Contract>,
        lock: DistributedLock,
        lock_config: LockConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            installments,
            contracts,
            lock,
            lock_config,
            retry,
        }
    }

    pub fn lock_key_for(id: RecordId) -> String {
        DistributedLock::key_for(&format!("installment:{id}"))
    }

    /// Marks installment `id` as paid.
    ///
    /// Blocks at most `acquire_timeout` for the lock plus
    /// `max_attempts × backoff` for the optimistic retries.
    pub async fn pay_installment(&self, id: RecordId) -> Result<Installment> {
        self.pay(id, None).await
    }

    /// Like [`PaymentOrchestrator::pay_installment`], bounded by an overall
    /// `deadline`. The lock is released even when the deadline fires in the
    /// middle of the retry loop.
    pub async fn pay_installment_within(
        &self,
        id: RecordId,
        deadline: Duration,
    ) -> Result<Installment> {
        self.pay(id, Some(deadline)).await
    }

    async fn pay(&self, id: RecordId, deadline: Option<Duration>) -> Result<Installment> {
        let started = Instant::now();
        let key = Self::lock_key_for(id);
        trace_phase(id, PaymentPhase::LockPending);

        let acquire_timeout = match deadline {
            Some(d) => self.lock_config.acquire_timeout().min(d),
            None => self.lock_config.acquire_timeout(),
        };
        let guard = self
            .lock
            .acquire_with_retry(&key, self.lock_config.lease(), acquire_timeout)
            .await
            .map_err(|e| {
                trace_phase(id, PaymentPhase::Failed);
                match e {
                    LendingError::LockTimeout { .. } => LendingError::LockAcquisitionFailed {
                        key: key.clone(),
                        source: Box::new(e),
                    },
                    other => other,
                }
            })?;
        trace_phase(id, PaymentPhase::Locked);

        let result = match deadline {
            Some(d) => {
                let remaining = d.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, self.commit_payment(id)).await {
                    Ok(result) => result,
                    Err(_) => Err(LendingError::DeadlineExceeded(d)),
                }
            }
            None => self.commit_payment(id).await,
        };

        guard.release_quietly().await;

        match &result {
            Ok(installment) => {
                trace_phase(id, PaymentPhase::Done);
                info!(
                    installment_id = id,
                    contract_id = installment.contract_id,
                    version = installment.version,
                    "installment paid"
                );
            }
            Err(e) => {
                trace_phase(id, PaymentPhase::Failed);
                warn!(installment_id = id, error = %e, "installment payment failed");
            }
        }
        result
    }

    /// The fetch-validate-write loop, run while holding the lock.
    async fn commit_payment(&self, id: RecordId) -> Result<Installment> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_conflict = None;

        for attempt in 1..=max_attempts {
            trace_phase(id, PaymentPhase::Validating);
            let mut installment = match self.installments.get(id).await {
                Ok(installment) => installment,
                Err(LendingError::NotFound { .. }) => {
                    return Err(LendingError::InstallmentNotFound(id));
                }
                Err(e) => return Err(e),
            };
            self.ensure_payable(installment.contract_id).await?;
            installment.mark_paid(Utc::now())?;

            trace_phase(id, PaymentPhase::Committing);
            match self.installments.update(&installment).await {
                Ok(version) => {
                    installment.version = version;
                    return Ok(installment);
                }
                Err(e) if e.is_retryable() => {
                    trace_phase(id, PaymentPhase::Retrying);
                    debug!(installment_id = id, attempt, error = %e, "payment conflicted");
                    last_conflict = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff.delay(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(LendingError::PaymentRetriesExhausted {
            id,
            attempts: max_attempts,
            source: Box::new(last_conflict.unwrap_or_else(|| {
                LendingError::InternalError(Box::new(std::io::Error::other(
                    "retry loop ended without a recorded conflict",
                )))
            })),
        })
    }

    async fn ensure_payable(&self, contract_id: RecordId) -> Result<()> {
        let contract = self.contracts.get(contract_id).await?;
        match contract.status {
            ContractStatus::Cancelled | ContractStatus::Rejected => {
                Err(LendingError::ContractNotPayable {
                    contract_id,
                    status: contract.status.as_str(),
                })
            }
            ContractStatus::Pending | ContractStatus::Approved => Ok(()),
        }
    }
}

fn trace_phase(id: RecordId, phase: PaymentPhase) {
    debug!(installment_id = id, ?phase, "payment phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::Backoff;
    use crate::domain::contract::{ContractSource, InstallmentStatus, NewContract};
    use crate::domain::money::{Amount, Money};
    use crate::domain::ports::RecordStore;
    use crate::domain::record::{RecordId, Version};
    use crate::infrastructure::coordination::InMemoryCoordinationStore;
    use crate::infrastructure::in_memory::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn installment() -> Installment {
        Installment {
            id: 0,
            contract_id: 1,
            sequence: 1,
            amount: Money::new(dec!(916667)),
            due_date: Utc::now(),
            status: InstallmentStatus::Unpaid,
            paid_at: None,
            version: 1,
        }
    }

    /// Stores the contract every `installment()` points at, as id 1.
    async fn contract_with_status(store: &InMemoryStore, status: ContractStatus) -> Contract {
        let mut contract = NewContract {
            customer_id: 1,
            source: ContractSource::Website,
            asset_name: "Sofa".to_string(),
            tenor: 12,
            otr_amount: Amount::new(dec!(10000000)).unwrap(),
            admin_fee: Money::new(dec!(100000)),
            installment_amount: Amount::new(dec!(916667)).unwrap(),
            interest_amount: Money::ZERO,
        }
        .into_contract("CTR-1-TEST".to_string(), Utc::now());
        contract.status = status;
        let contract = RecordStore::create(store, contract).await.unwrap();
        assert_eq!(contract.id, 1);
        contract
    }

    /// Always reports a conflict on update, as if another writer kept winning.
    struct AlwaysConflicting {
        inner: InMemoryStore,
        updates: AtomicU32,
    }

    #[async_trait]
    impl RecordStore<Installment> for AlwaysConflicting {
        async fn create(&self, record: Installment) -> Result<Installment> {
            RecordStore::create(&self.inner, record).await
        }

        async fn get(&self, id: RecordId) -> Result<Installment> {
            RecordStore::get(&self.inner, id).await
        }

        async fn find_by_key(&self, key: &str) -> Result<Option<Installment>> {
            RecordStore::find_by_key(&self.inner, key).await
        }

        async fn list_by_owner(&self, owner: RecordId) -> Result<Vec<Installment>> {
            RecordStore::list_by_owner(&self.inner, owner).await
        }

        async fn update(&self, record: &Installment) -> Result<Version> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Err(LendingError::VersionConflict {
                collection: "installments",
                id: record.id,
                expected: record.version,
                actual: record.version + 1,
            })
        }
    }

    fn orchestrator(
        installments: RecordStoreRef<Installment>,
        contracts: &InMemoryStore,
        coordination: InMemoryCoordinationStore,
    ) -> PaymentOrchestrator {
        let lock_config = LockConfig {
            lease_ms: 5_000,
            acquire_timeout_ms: 200,
            poll_interval_ms: 5,
        };
        PaymentOrchestrator::new(
            installments,
            Arc::new(contracts.clone()),
            DistributedLock::new(Arc::new(coordination), lock_config.poll_interval()),
            lock_config,
            RetryPolicy::new(3, Backoff::Fixed { interval_ms: 1 }),
        )
    }

    #[tokio::test]
    async fn test_exhausted_retries_carry_last_conflict_and_release_lock() {
        let inner = InMemoryStore::new();
        contract_with_status(&inner, ContractStatus::Approved).await;
        let store = Arc::new(AlwaysConflicting {
            inner: inner.clone(),
            updates: AtomicU32::new(0),
        });
        let created = store.create(installment()).await.unwrap();
        let coordination = InMemoryCoordinationStore::new();
        let payments = orchestrator(store.clone(), &inner, coordination.clone());

        let err = payments.pay_installment(created.id).await.unwrap_err();
        match &err {
            LendingError::PaymentRetriesExhausted { attempts, source, .. } => {
                assert_eq!(*attempts, 3);
                assert!(source.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.updates.load(Ordering::SeqCst), 3);

        let key = PaymentOrchestrator::lock_key_for(created.id);
        use crate::domain::ports::CoordinationStore;
        assert!(coordination.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_contract_installment_is_not_payable() {
        let inner = InMemoryStore::new();
        contract_with_status(&inner, ContractStatus::Cancelled).await;
        let store = Arc::new(AlwaysConflicting {
            inner: inner.clone(),
            updates: AtomicU32::new(0),
        });
        let created = store.create(installment()).await.unwrap();
        let coordination = InMemoryCoordinationStore::new();
        let payments = orchestrator(store.clone(), &inner, coordination.clone());

        let err = payments.pay_installment(created.id).await.unwrap_err();
        assert!(matches!(
            err,
            LendingError::ContractNotPayable {
                contract_id: 1,
                status: "cancelled"
            }
        ));
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);

        let stored = store.get(created.id).await.unwrap();
        assert_eq!(stored.status, InstallmentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_missing_installment() {
        let store = InMemoryStore::new();
        let payments = orchestrator(
            Arc::new(store.clone()),
            &store,
            InMemoryCoordinationStore::new(),
        );
        assert!(matches!(
            payments.pay_installment(404).await,
            Err(LendingError::InstallmentNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_lock_timeout_becomes_acquisition_failure() {
        let store = InMemoryStore::new();
        let created = RecordStore::create(&store, installment()).await.unwrap();
        let coordination = InMemoryCoordinationStore::new();
        let payments = orchestrator(Arc::new(store.clone()), &store, coordination.clone());

        let other_process = DistributedLock::new(Arc::new(coordination), Duration::from_millis(5));
        let _held = other_process
            .acquire(
                &PaymentOrchestrator::lock_key_for(created.id),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let err = payments.pay_installment(created.id).await.unwrap_err();
        match err {
            LendingError::LockAcquisitionFailed { source, .. } => {
                assert!(matches!(*source, LendingError::LockTimeout { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
