use crate::domain::money::Money;
use crate::domain::record::{RecordId, Version};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LendingError {
    #[error("{collection} {id} not found")]
    NotFound {
        collection: &'static str,
        id: RecordId,
    },
    #[error("version conflict on {collection} {id}: expected {expected}, stored {actual}")]
    VersionConflict {
        collection: &'static str,
        id: RecordId,
        expected: Version,
        actual: Version,
    },
    #[error("{collection} with key {key} already exists")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },
    #[error("customer {customer_id} has no credit limit for a {tenor} month tenor")]
    NoLimitForTenor { customer_id: RecordId, tenor: u32 },
    #[error(
        "insufficient credit limit for customer {customer_id} ({tenor} months): available {available}, requested {requested}"
    )]
    InsufficientLimit {
        customer_id: RecordId,
        tenor: u32,
        available: Money,
        requested: Money,
    },
    #[error("lock {key} is held by another owner")]
    LockHeld { key: String },
    #[error("timed out after {waited:?} waiting for lock {key}")]
    LockTimeout { key: String, waited: Duration },
    #[error("lock {key} is not held by this token")]
    LockNotHeld { key: String },
    #[error("failed to acquire lock {key}")]
    LockAcquisitionFailed {
        key: String,
        #[source]
        source: Box<LendingError>,
    },
    #[error("installment {0} not found")]
    InstallmentNotFound(RecordId),
    #[error("installment {0} is already paid")]
    AlreadyPaid(RecordId),
    #[error("installment {id} could not be paid after {attempts} attempts")]
    PaymentRetriesExhausted {
        id: RecordId,
        attempts: u32,
        #[source]
        source: Box<LendingError>,
    },
    #[error("installment of contract {contract_id} cannot be paid while it is {status}")]
    ContractNotPayable {
        contract_id: RecordId,
        status: &'static str,
    },
    #[error(
        "contract {contract_id} could not be cancelled after a failed reservation: {reservation}"
    )]
    CompensationFailed {
        contract_id: RecordId,
        reservation: Box<LendingError>,
        #[source]
        source: Box<LendingError>,
    },
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("customer with NIK {0} already exists")]
    CustomerExists(String),
    #[error("customer {customer_id} already has a {tenor} month credit limit")]
    LimitAlreadyGranted { customer_id: RecordId, tenor: u32 },
    #[error("contract {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: RecordId,
        from: &'static str,
        to: &'static str,
    },
    #[error("storage busy: {0}")]
    StorageBusy(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl LendingError {
    /// Version conflicts and transient storage contention are worth retrying;
    /// everything else is either a business rejection or a coordination failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LendingError::VersionConflict { .. } | LendingError::StorageBusy(_)
        )
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LendingError {
    fn from(e: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match e.kind() {
            ErrorKind::Busy | ErrorKind::TimedOut | ErrorKind::TryAgain => {
                LendingError::StorageBusy(e.into_string())
            }
            _ => LendingError::InternalError(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for LendingError {
    fn from(e: serde_json::Error) -> Self {
        LendingError::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;
