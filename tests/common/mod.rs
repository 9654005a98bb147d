#![allow(dead_code)]

use chrono::NaiveDate;
use lending_core::application::lending::LendingCore;
use lending_core::application::retry::{Backoff, RetryPolicy};
use lending_core::config::{LendingConfig, LockConfig};
use lending_core::domain::contract::{Contract, ContractSource, Installment, NewContract};
use lending_core::domain::customer::{CreditLimit, Customer, NewCustomer, Tenor};
use lending_core::domain::money::{Amount, Money};
use lending_core::infrastructure::coordination::InMemoryCoordinationStore;
use lending_core::infrastructure::in_memory::InMemoryStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

/// Short timings so contention tests finish quickly.
pub fn fast_config() -> LendingConfig {
    LendingConfig {
        lock: LockConfig {
            lease_ms: 5_000,
            acquire_timeout_ms: 2_000,
            poll_interval_ms: 2,
        },
        retry: RetryPolicy::new(
            5,
            Backoff::Exponential {
                base_ms: 1,
                max_ms: 8,
                jitter: true,
            },
        ),
        ..LendingConfig::default()
    }
}

/// A set of lending nodes sharing one record store and one coordination store.
pub struct Cluster {
    pub store: InMemoryStore,
    pub coordination: InMemoryCoordinationStore,
    pub nodes: Vec<Arc<LendingCore>>,
}

impl Cluster {
    pub fn new(nodes: usize, config: &LendingConfig) -> Self {
        let store = InMemoryStore::new();
        let coordination = InMemoryCoordinationStore::new();
        let nodes = (0..nodes)
            .map(|_| {
                Arc::new(LendingCore::new(
                    store.clone(),
                    Arc::new(coordination.clone()),
                    config,
                ))
            })
            .collect();
        Self {
            store,
            coordination,
            nodes,
        }
    }

    pub fn node(&self, i: usize) -> Arc<LendingCore> {
        self.nodes[i % self.nodes.len()].clone()
    }
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn new_customer(nik: &str) -> NewCustomer {
    NewCustomer {
        nik: nik.to_string(),
        full_name: "Budi Santoso".to_string(),
        legal_name: "Budi Santoso".to_string(),
        place_of_birth: "Bandung".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1988, 8, 17).unwrap(),
        salary: Money::new(dec!(12000000)),
        ktp_photo: "ktp.jpg".to_string(),
        selfie_photo: "selfie.jpg".to_string(),
    }
}

pub fn new_contract(customer_id: u64, tenor: Tenor, otr: Decimal, admin_fee: Decimal) -> NewContract {
    NewContract {
        customer_id,
        source: ContractSource::Website,
        asset_name: "Yamaha NMAX".to_string(),
        tenor,
        otr_amount: amount(otr),
        admin_fee: Money::new(admin_fee),
        installment_amount: amount(dec!(1000000)),
        interest_amount: Money::ZERO,
    }
}

/// Registers a customer and grants one limit.
pub async fn customer_with_limit(
    core: &LendingCore,
    nik: &str,
    tenor: Tenor,
    limit: Decimal,
) -> (Customer, CreditLimit) {
    let customer = core.customers.register(new_customer(nik)).await.unwrap();
    let limit = core
        .customers
        .grant_limit(customer.id, tenor, amount(limit))
        .await
        .unwrap();
    (customer, limit)
}

/// Customer, limit and a contract, returning the contract and its schedule.
pub async fn contract_with_schedule(core: &LendingCore, tenor: Tenor) -> (Contract, Vec<Installment>) {
    let (customer, _) = customer_with_limit(core, "3273011708880001", tenor, dec!(50000000)).await;
    core.contracts
        .create(new_contract(customer.id, tenor, dec!(6000000), dec!(0)))
        .await
        .unwrap()
}

pub fn write_operations(path: &Path, rows: &[[&str; 7]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["op", "customer", "tenor", "amount", "installment", "reference", "name"])?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
