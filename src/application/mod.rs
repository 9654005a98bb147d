//! Application layer: the services that coordinate domain records through
//! the storage and coordination ports.
//!
//! Writes to shared records are optimistic. `retry` bounds how often a
//! version conflict is retried, `lock` serializes work on a single resource
//! across processes, and `payment` combines both to apply an installment
//! payment exactly once.

pub mod customer;
pub mod ledger;
pub mod lending;
pub mod lock;
pub mod origination;
pub mod payment;
pub mod retry;
