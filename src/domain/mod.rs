//! Domain model: customers, credit limits, contracts, installments, and the
//! ports through which they are persisted and coordinated.

pub mod contract;
pub mod customer;
pub mod money;
pub mod ports;
pub mod record;
