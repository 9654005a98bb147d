//! Inbound and outbound adapters of the replay binary.

pub mod csv;
pub mod replay;
