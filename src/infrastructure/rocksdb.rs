use crate::domain::contract::{Contract, Installment};
use crate::domain::customer::{CreditLimit, Customer};
use crate::domain::ports::{ContractWriter, RecordStore};
use crate::domain::record::{INITIAL_VERSION, Record, RecordId, Version};
use crate::error::{LendingError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, Transaction, TransactionDB,
    TransactionDBOptions,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Column Family mapping a `collection/unique key` pair to a record id.
pub const CF_UNIQUE_KEYS: &str = "unique_keys";
/// Column Family holding the last id handed out per collection.
pub const CF_SEQUENCES: &str = "sequences";

const RECORD_FAMILIES: [&str; 4] = [
    Customer::COLLECTION,
    CreditLimit::COLLECTION,
    Contract::COLLECTION,
    Installment::COLLECTION,
];

type Txn<'a> = Transaction<'a, TransactionDB>;

/// A persistent store implementation using RocksDB.
///
/// Each record type gets its own Column Family, keyed by big-endian id so
/// iteration follows id order. Every write runs in a RocksDB transaction that
/// first takes `get_for_update` on the rows it checks, which makes the version
/// comparison and the write a single atomic step, even against writers in
/// other threads sharing this handle.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the record, unique key and sequence column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = RECORD_FAMILIES
            .iter()
            .chain([CF_UNIQUE_KEYS, CF_SEQUENCES].iter())
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            families,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LendingError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn unique_key(collection: &str, key: &str) -> Vec<u8> {
        format!("{collection}/{key}").into_bytes()
    }

    fn decode_id(bytes: &[u8]) -> Result<RecordId> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| {
            LendingError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "stored id is not 8 bytes",
            )))
        })?;
        Ok(RecordId::from_be_bytes(raw))
    }

    fn read<R: Record>(&self, id: RecordId) -> Result<Option<R>> {
        let cf = self.cf(R::COLLECTION)?;
        match self.db.get_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Inserts `record` inside `txn`, locking the sequence and unique key rows.
    fn insert<R: Record>(&self, txn: &Txn<'_>, mut record: R) -> Result<R> {
        let records = self.cf(R::COLLECTION)?;
        let unique = self.cf(CF_UNIQUE_KEYS)?;
        let sequences = self.cf(CF_SEQUENCES)?;

        let key = record.unique_key();
        if let Some(key) = &key
            && txn
                .get_for_update_cf(unique, Self::unique_key(R::COLLECTION, key), true)?
                .is_some()
        {
            return Err(LendingError::DuplicateKey {
                collection: R::COLLECTION,
                key: key.clone(),
            });
        }

        let last = match txn.get_for_update_cf(sequences, R::COLLECTION, true)? {
            Some(bytes) => Self::decode_id(&bytes)?,
            None => 0,
        };
        let id = last + 1;
        record.assign_id(id);
        record.set_version(INITIAL_VERSION);

        txn.put_cf(sequences, R::COLLECTION, id.to_be_bytes())?;
        if let Some(key) = &key {
            txn.put_cf(
                unique,
                Self::unique_key(R::COLLECTION, key),
                id.to_be_bytes(),
            )?;
        }
        txn.put_cf(records, id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        Ok(record)
    }

    fn create_sync<R: Record>(&self, record: R) -> Result<R> {
        let txn = self.db.transaction();
        let record = self.insert(&txn, record)?;
        txn.commit()?;
        Ok(record)
    }

    fn update_sync<R: Record>(&self, record: &R) -> Result<Version> {
        let id = record.id();
        let records = self.cf(R::COLLECTION)?;
        let unique = self.cf(CF_UNIQUE_KEYS)?;

        let txn = self.db.transaction();
        let stored: R = match txn.get_for_update_cf(records, id.to_be_bytes(), true)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => {
                return Err(LendingError::NotFound {
                    collection: R::COLLECTION,
                    id,
                });
            }
        };

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
            if let Some(key) = &new_key {
                let index_key = Self::unique_key(R::COLLECTION, key);
                if txn.get_for_update_cf(unique, &index_key, true)?.is_some() {
                    return Err(LendingError::DuplicateKey {
                        collection: R::COLLECTION,
                        key: key.clone(),
                    });
                }
                txn.put_cf(unique, index_key, id.to_be_bytes())?;
            }
            if let Some(key) = &old_key {
                txn.delete_cf(unique, Self::unique_key(R::COLLECTION, key))?;
            }
        }

        let next = stored.version() + 1;
        let mut committed = record.clone();
        committed.set_version(next);
        txn.put_cf(records, id.to_be_bytes(), serde_json::to_vec(&committed)?)?;
        txn.commit()?;
        Ok(next)
    }

    fn find_by_key_sync<R: Record>(&self, key: &str) -> Result<Option<R>> {
        let unique = self.cf(CF_UNIQUE_KEYS)?;
        match self.db.get_cf(unique, Self::unique_key(R::COLLECTION, key))? {
            Some(bytes) => self.read(Self::decode_id(&bytes)?),
            None => Ok(None),
        }
    }

    fn list_by_owner_sync<R: Record>(&self, owner: RecordId) -> Result<Vec<R>> {
        let cf = self.cf(R::COLLECTION)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let record: R = serde_json::from_slice(&value)?;
            if record.owner() == Some(owner) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn create_contract_sync(
        &self,
        contract: Contract,
        installments: Vec<Installment>,
    ) -> Result<(Contract, Vec<Installment>)> {
        let txn = self.db.transaction();
        let contract = self.insert(&txn, contract)?;
        let mut stored = Vec::with_capacity(installments.len());
        for mut installment in installments {
            installment.contract_id = contract.id;
            stored.push(self.insert(&txn, installment)?);
        }
        txn.commit()?;
        Ok((contract, stored))
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for RocksDBStore {
    async fn create(&self, record: R) -> Result<R> {
        self.create_sync(record)
    }

    async fn get(&self, id: RecordId) -> Result<R> {
        self.read(id)?.ok_or(LendingError::NotFound {
            collection: R::COLLECTION,
            id,
        })
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<R>> {
        self.find_by_key_sync(key)
    }

    async fn list_by_owner(&self, owner: RecordId) -> Result<Vec<R>> {
        self.list_by_owner_sync(owner)
    }

    async fn update(&self, record: &R) -> Result<Version> {
        self.update_sync(record)
    }
}

#[async_trait]
impl ContractWriter for RocksDBStore {
    async fn create_contract(
        &self,
        contract: Contract,
        installments: Vec<Installment>,
    ) -> Result<(Contract, Vec<Installment>)> {
        self.create_contract_sync(contract, installments)
    }
}
