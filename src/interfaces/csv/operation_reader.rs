use crate::domain::customer::Tenor;
use crate::domain::record::RecordId;
use crate::error::{LendingError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Register,
    Grant,
    Contract,
    Pay,
}

/// One row of a replay file. Which columns are required depends on `op`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Operation {
    pub op: OperationKind,
    pub customer: Option<RecordId>,
    pub tenor: Option<Tenor>,
    pub amount: Option<Decimal>,
    pub installment: Option<RecordId>,
    pub reference: Option<String>,
    pub name: Option<String>,
}

impl Operation {
    pub fn customer(&self) -> Result<RecordId> {
        self.customer.ok_or_else(|| self.missing("customer"))
    }

    pub fn tenor(&self) -> Result<Tenor> {
        self.tenor.ok_or_else(|| self.missing("tenor"))
    }

    pub fn amount(&self) -> Result<Decimal> {
        self.amount.ok_or_else(|| self.missing("amount"))
    }

    pub fn installment(&self) -> Result<RecordId> {
        self.installment.ok_or_else(|| self.missing("installment"))
    }

    pub fn reference(&self) -> Result<&str> {
        self.reference
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.missing("reference"))
    }

    fn missing(&self, column: &str) -> LendingError {
        LendingError::ValidationError(format!("{:?} operation requires {column}", self.op))
    }
}

/// Reads replay operations from a CSV source.
///
/// Fields are trimmed and rows may omit trailing columns.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows, one `Result` per row.
    pub fn operations(self) -> impl Iterator<Item = Result<Operation>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LendingError::from))
    }
}
