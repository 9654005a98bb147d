use super::customer::CustomerService;
use super::ledger::CreditLedger;
use super::lock::DistributedLock;
use super::origination::ContractService;
use super::payment::PaymentOrchestrator;
use crate::config::LendingConfig;
use crate::domain::contract::{Contract, Installment};
use crate::domain::customer::{CreditLimit, Customer};
use crate::domain::ports::{ContractWriter, CoordinationStoreRef, RecordStore};
use std::sync::Arc;

/// The services of one lending node, wired to a shared record store and a
/// shared coordination store.
///
/// Several cores built over clones of the same stores behave like separate
/// API instances in front of one database.
pub struct LendingCore {
    pub customers: CustomerService,
    pub contracts: ContractService,
    pub ledger: CreditLedger,
    pub payments: PaymentOrchestrator,
}

impl LendingCore {
    pub fn new<S>(store: S, coordination: CoordinationStoreRef, config: &LendingConfig) -> Self
    where
        S: RecordStore<Customer>
            + RecordStore<CreditLimit>
            + RecordStore<Contract>
            + RecordStore<Installment>
            + ContractWriter
            + 'static,
    {
        let store = Arc::new(store);
        let lock = DistributedLock::new(coordination, config.lock.poll_interval());

        Self {
            customers: CustomerService::new(store.clone(), store.clone(), config.retry),
            contracts: ContractService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                CreditLedger::new(store.clone()),
                config.retry,
                config.pricing.clone(),
            ),
            ledger: CreditLedger::new(store.clone()),
            payments: PaymentOrchestrator::new(
                store.clone(),
                store,
                lock,
                config.lock.clone(),
                config.retry,
            ),
        }
    }
}
