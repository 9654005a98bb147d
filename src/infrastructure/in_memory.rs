use crate::domain::contract::{Contract, Installment};
use crate::domain::ports::{ContractWriter, RecordStore};
use crate::domain::record::{INITIAL_VERSION, Record, RecordId, Version};
use crate::error::{LendingError, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

type Row = Box<dyn Any + Send + Sync>;

#[derive(Default)]
struct Collection {
    last_id: RecordId,
    rows: BTreeMap<RecordId, Row>,
    unique: HashMap<String, RecordId>,
}

impl Collection {
    fn read<R: Record>(&self, id: RecordId) -> Result<Option<R>> {
        self.rows.get(&id).map(downcast::<R>).transpose()
    }

    fn insert<R: Record>(&mut self, mut record: R) -> Result<R> {
        let key = record.unique_key();
        if let Some(key) = &key
            && self.unique.contains_key(key)
        {
            return Err(LendingError::DuplicateKey {
                collection: R::COLLECTION,
                key: key.clone(),
            });
        }

        self.last_id += 1;
        let id = self.last_id;
        record.assign_id(id);
        record.set_version(INITIAL_VERSION);
        if let Some(key) = key {
            self.unique.insert(key, id);
        }
        self.rows.insert(id, Box::new(record.clone()));
        Ok(record)
    }
}

#[derive(Default)]
struct Tables {
    collections: HashMap<&'static str, Collection>,
}

impl Tables {
    fn collection<R: Record>(&self) -> Option<&Collection> {
        self.collections.get(R::COLLECTION)
    }

    fn collection_mut<R: Record>(&mut self) -> &mut Collection {
        self.collections.entry(R::COLLECTION).or_default()
    }
}

fn downcast<R: Record>(row: &Row) -> Result<R> {
    row.downcast_ref::<R>().cloned().ok_or_else(|| {
        LendingError::InternalError(Box::new(std::io::Error::other(format!(
            "row in {} has an unexpected type",
            R::COLLECTION
        ))))
    })
}

/// A thread-safe in-memory store for every record type.
///
/// All collections live behind one `Arc<RwLock<..>>`, so a version check and
/// the write it guards happen under the same write guard, and multi-record
/// units such as a contract with its installments are all-or-nothing.
/// Cloning shares the same tables, the way several API instances would share
/// one database.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryStore {
    async fn create(&self, record: R) -> Result<R> {
        let mut tables = self.tables.write().await;
        tables.collection_mut::<R>().insert(record)
    }

    async fn get(&self, id: RecordId) -> Result<R> {
        let tables = self.tables.read().await;
        tables
            .collection::<R>()
            .map(|c| c.read::<R>(id))
            .transpose()?
            .flatten()
            .ok_or(LendingError::NotFound {
                collection: R::COLLECTION,
                id,
            })
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<R>> {
        let tables = self.tables.read().await;
        let Some(collection) = tables.collection::<R>() else {
            return Ok(None);
        };
        match collection.unique.get(key) {
            Some(id) => collection.read::<R>(*id),
            None => Ok(None),
        }
    }

    async fn list_by_owner(&self, owner: RecordId) -> Result<Vec<R>> {
        let tables = self.tables.read().await;
        let Some(collection) = tables.collection::<R>() else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for row in collection.rows.values() {
            let record = downcast::<R>(row)?;
            if record.owner() == Some(owner) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn update(&self, record: &R) -> Result<Version> {
        let id = record.id();
        let not_found = || LendingError::NotFound {
            collection: R::COLLECTION,
            id,
        };

        let mut tables = self.tables.write().await;
        let collection = tables.collection_mut::<R>();
        let stored: R = collection.read(id)?.ok_or_else(not_found)?;

        if stored.version() != record.version() {
            debug!(
                collection = R::COLLECTION,
                id,
                expected = record.version(),
                actual = stored.version(),
                "rejecting stale write"
            );
            return Err(LendingError::VersionConflict {
                collection: R::COLLECTION,
                id,
                expected: record.version(),
                actual: stored.version(),
            });
        }

        let old_key = stored.unique_key();
        let new_key = record.unique_key();
        if old_key != new_key {
            if let Some(key) = &new_key
                && collection.unique.contains_key(key)
            {
                return Err(LendingError::DuplicateKey {
                    collection: R::COLLECTION,
                    key: key.clone(),
                });
            }
            if let Some(key) = old_key {
                collection.unique.remove(&key);
            }
            if let Some(key) = new_key {
                collection.unique.insert(key, id);
            }
        }

        let next = stored.version() + 1;
        let mut committed = record.clone();
        committed.set_version(next);
        collection.rows.insert(id, Box::new(committed));
        Ok(next)
    }
}

#[async_trait]
impl ContractWriter for InMemoryStore {
    async fn create_contract(
        &self,
        contract: Contract,
        installments: Vec<Installment>,
    ) -> Result<(Contract, Vec<Installment>)> {
        let mut tables = self.tables.write().await;

        // The contract insert is the only step that can fail, so nothing is
        // written unless it succeeds.
        let contract = tables.collection_mut::<Contract>().insert(contract)?;
        let schedule = tables.collection_mut::<Installment>();
        let mut stored = Vec::with_capacity(installments.len());
        for mut installment in installments {
            installment.contract_id = contract.id;
            stored.push(schedule.insert(installment)?);
        }
        Ok((contract, stored))
    }
}
