use super::customer::Tenor;
use super::money::{Amount, Money};
use super::record::{INITIAL_VERSION, Record, RecordId, Version};
use crate::config::PricingConfig;
use crate::error::{LendingError, Result};
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Channel through which a contract was originated.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum ContractSource {
    ECommerce,
    Website,
    Dealer,
}

impl FromStr for ContractSource {
    type Err = LendingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e-commerce" | "ecommerce" => Ok(ContractSource::ECommerce),
            "website" => Ok(ContractSource::Website),
            "dealer" => Ok(ContractSource::Dealer),
            other => Err(LendingError::ValidationError(format!(
                "unknown contract source '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Pending => "pending",
            ContractStatus::Approved => "approved",
            ContractStatus::Rejected => "rejected",
            ContractStatus::Cancelled => "cancelled",
        }
    }

    /// Rejected and cancelled contracts are terminal.
    pub fn can_transition_to(&self, next: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) | (Approved, Cancelled)
        )
    }
}

/// An installment contract originated against a customer's credit limit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Contract {
    pub id: RecordId,
    pub contract_number: String,
    pub customer_id: RecordId,
    pub source: ContractSource,
    pub asset_name: String,
    pub tenor: Tenor,
    /// On-the-road price of the financed asset.
    pub otr_amount: Money,
    pub admin_fee: Money,
    pub installment_amount: Money,
    pub interest_amount: Money,
    pub status: ContractStatus,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// The amount charged against the customer's credit limit.
    pub fn financed_amount(&self) -> Money {
        self.otr_amount + self.admin_fee
    }

    pub fn transition(&mut self, next: ContractStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::InvalidStatusTransition {
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Builds the repayment schedule: one installment per month of tenor,
    /// the first falling due one month after origination.
    pub fn schedule(&self) -> Result<Vec<Installment>> {
        (1..=self.tenor)
            .map(|sequence| {
                let due_date = self
                    .created_at
                    .checked_add_months(Months::new(sequence))
                    .ok_or_else(|| {
                        LendingError::ValidationError(format!(
                            "due date out of range for installment {sequence}"
                        ))
                    })?;
                Ok(Installment {
                    id: 0,
                    contract_id: self.id,
                    sequence,
                    amount: self.installment_amount,
                    due_date,
                    status: InstallmentStatus::Unpaid,
                    paid_at: None,
                    version: INITIAL_VERSION,
                })
            })
            .collect()
    }
}

impl Record for Contract {
    const COLLECTION: &'static str = "contracts";

    fn id(&self) -> RecordId {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.contract_number.clone())
    }

    fn owner(&self) -> Option<RecordId> {
        Some(self.customer_id)
    }
}

/// Origination request for a new contract.
#[derive(Debug, Deserialize, Clone)]
pub struct NewContract {
    pub customer_id: RecordId,
    pub source: ContractSource,
    pub asset_name: String,
    pub tenor: Tenor,
    pub otr_amount: Amount,
    pub admin_fee: Money,
    pub installment_amount: Amount,
    pub interest_amount: Money,
}

impl NewContract {
    pub fn validate(&self) -> Result<()> {
        if self.tenor == 0 {
            return Err(LendingError::ValidationError(
                "tenor must be at least one month".to_string(),
            ));
        }
        if self.asset_name.trim().is_empty() {
            return Err(LendingError::ValidationError(
                "asset_name must not be empty".to_string(),
            ));
        }
        if self.admin_fee.is_negative() || self.interest_amount.is_negative() {
            return Err(LendingError::ValidationError(
                "fees must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// OTR plus admin fee; the amount checked and reserved against the limit.
    pub fn financed_amount(&self) -> Result<Amount> {
        let total = self
            .otr_amount
            .value()
            .checked_add(self.admin_fee.value())
            .ok_or_else(|| overflow("financed amount"))?;
        Amount::new(total)
    }

    pub fn into_contract(self, contract_number: String, now: DateTime<Utc>) -> Contract {
        Contract {
            id: 0,
            contract_number,
            customer_id: self.customer_id,
            source: self.source,
            asset_name: self.asset_name,
            tenor: self.tenor,
            otr_amount: self.otr_amount.into(),
            admin_fee: self.admin_fee,
            installment_amount: self.installment_amount.into(),
            interest_amount: self.interest_amount,
            status: ContractStatus::Pending,
            version: INITIAL_VERSION,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fee and repayment figures derived from an OTR price and tenor.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ContractTerms {
    pub admin_fee: Money,
    pub interest_amount: Money,
    pub installment_amount: Amount,
}

impl ContractTerms {
    /// Flat-rate quote: interest accrues on the OTR price for the whole tenor,
    /// and OTR, fee and interest are spread evenly over the installments.
    pub fn quote(otr: Amount, tenor: Tenor, pricing: &PricingConfig) -> Result<Self> {
        if tenor == 0 {
            return Err(LendingError::ValidationError(
                "tenor must be at least one month".to_string(),
            ));
        }
        let months = Decimal::from(tenor);
        let interest = otr
            .value()
            .checked_mul(pricing.monthly_interest_rate)
            .and_then(|monthly| monthly.checked_mul(months))
            .ok_or_else(|| overflow("interest"))?
            .round_dp(2);
        let total = otr
            .value()
            .checked_add(pricing.admin_fee.value())
            .and_then(|sum| sum.checked_add(interest))
            .ok_or_else(|| overflow("financed total"))?;
        let installment = total
            .checked_div(months)
            .ok_or_else(|| overflow("installment amount"))?
            .round_dp(2);
        Ok(Self {
            admin_fee: pricing.admin_fee,
            interest_amount: Money::new(interest),
            installment_amount: Amount::new(installment)?,
        })
    }
}

fn overflow(what: &str) -> LendingError {
    LendingError::ValidationError(format!("{what} exceeds the representable range"))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Unpaid,
    Paid,
    Overdue,
}

/// One scheduled repayment of a contract.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Installment {
    pub id: RecordId,
    pub contract_id: RecordId,
    /// Position in the schedule, starting at 1.
    pub sequence: u32,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl Installment {
    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    /// Marks this local copy as paid. Callers commit it with a version check.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.is_paid() {
            return Err(LendingError::AlreadyPaid(self.id));
        }
        self.status = InstallmentStatus::Paid;
        self.paid_at = Some(now);
        Ok(())
    }
}

impl Record for Installment {
    const COLLECTION: &'static str = "installments";

    fn id(&self) -> RecordId {
        self.id
    }

    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn owner(&self) -> Option<RecordId> {
        Some(self.contract_id)
    }
}
