//! Storage backends for the domain ports.
//!
//! `in_memory` and `coordination` are always available; `rocksdb` is compiled
//! with the `storage-rocksdb` feature.

pub mod coordination;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
