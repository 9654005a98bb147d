use super::contract::{Contract, Installment};
use super::record::{Record, RecordId, Version};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Optimistic-concurrency persistence for one record type.
///
/// `update` is a compare-and-increment: it writes only if the stored version
/// still equals `record.version()`, and the comparison and the write happen as
/// one atomic step inside the backend.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Inserts `record` with a fresh id and version 1.
    async fn create(&self, record: R) -> Result<R>;

    async fn get(&self, id: RecordId) -> Result<R>;

    /// Point read by the record's secondary unique key.
    async fn find_by_key(&self, key: &str) -> Result<Option<R>>;

    /// All records whose `owner()` is `owner`, in id order.
    async fn list_by_owner(&self, owner: RecordId) -> Result<Vec<R>>;

    /// Returns the new version on success, `VersionConflict` when stale.
    async fn update(&self, record: &R) -> Result<Version>;
}

/// Creates a contract together with its repayment schedule as one unit.
#[async_trait]
pub trait ContractWriter: Send + Sync {
    async fn create_contract(
        &self,
        contract: Contract,
        installments: Vec<Installment>,
    ) -> Result<(Contract, Vec<Installment>)>;
}

/// Shared key-value store used to arbitrate locks between processes.
///
/// Both conditional operations must be atomic on the server side.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Sets `key` to `value` with the given time to live, only if absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
}

pub type RecordStoreRef<R> = Arc<dyn RecordStore<R>>;
pub type ContractWriterRef = Arc<dyn ContractWriter>;
pub type CoordinationStoreRef = Arc<dyn CoordinationStore>;
