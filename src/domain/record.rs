//! Versioned records: the unit of optimistic concurrency control.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Store-assigned identity of a record within its collection.
pub type RecordId = u64;

/// Monotonic counter stamped on every committed write.
pub type Version = u64;

/// Version assigned by the store on creation.
pub const INITIAL_VERSION: Version = 1;

/// A mutable entity persisted through a [`RecordStore`](super::ports::RecordStore).
///
/// Relations between records are expressed by id (`owner`), never by pointer,
/// so customers, limits, contracts and installments are resolved through the
/// store on demand.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the collection (table, column family) holding this record type.
    const COLLECTION: &'static str;

    fn id(&self) -> RecordId;

    fn assign_id(&mut self, id: RecordId);

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Secondary key that must be unique across the collection.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Id of the record this one belongs to, used by `list_by_owner`.
    fn owner(&self) -> Option<RecordId> {
        None
    }
}
