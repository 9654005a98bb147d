use super::money::{Amount, Money};
use super::record::{INITIAL_VERSION, Record, RecordId, Version};
use crate::error::{LendingError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Installment term length in months. Credit limits are partitioned per tenor.
pub type Tenor = u32;

/// A registered borrower.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Customer {
    pub id: RecordId,
    /// National identity number, unique across customers.
    pub nik: String,
    pub full_name: String,
    pub legal_name: String,
    pub place_of_birth: String,
    pub date_of_birth: NaiveDate,
    pub salary: Money,
    /// Opaque references to the identity documents; storage lives elsewhere.
    pub ktp_photo: String,
    pub selfie_photo: String,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration request for a new customer.
#[derive(Debug, Deserialize, Clone)]
pub struct NewCustomer {
    pub nik: String,
    pub full_name: String,
    pub legal_name: String,
    pub place_of_birth: String,
    pub date_of_birth: NaiveDate,
    pub salary: Money,
    pub ktp_photo: String,
    pub selfie_photo: String,
}

/// The profile fields a customer may change after registration.
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub legal_name: String,
    pub salary: Money,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("nik", &self.nik),
            ("full_name", &self.full_name),
            ("legal_name", &self.legal_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(LendingError::ValidationError(format!(
                    "{field} must not be empty"
                )));
            }
        }
        if self.salary.is_negative() {
            return Err(LendingError::ValidationError(
                "salary must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_customer(self, now: DateTime<Utc>) -> Customer {
        Customer {
            id: 0,
            nik: self.nik,
            full_name: self.full_name,
            legal_name: self.legal_name,
            place_of_birth: self.place_of_birth,
            date_of_birth: self.date_of_birth,
            salary: self.salary,
            ktp_photo: self.ktp_photo,
            selfie_photo: self.selfie_photo,
            version: INITIAL_VERSION,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Customer {
    pub fn apply(&mut self, update: &ProfileUpdate, now: DateTime<Utc>) {
        self.full_name = update.full_name.clone();
        self.legal_name = update.legal_name.clone();
        self.salary = update.salary;
        self.updated_at = now;
    }
}

impl Record for Customer {
    const COLLECTION: &'static str = "customers";

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
        Some(self.nik.clone())
    }
}

/// The credit ceiling granted to a customer for one tenor.
///
/// `used_amount` only ever grows, through the credit ledger, and never
/// exceeds `amount` in any committed state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CreditLimit {
    pub id: RecordId,
    pub customer_id: RecordId,
    pub tenor: Tenor,
    pub amount: Money,
    pub used_amount: Money,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditLimit {
    pub fn new(customer_id: RecordId, tenor: Tenor, amount: Amount, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            customer_id,
            tenor,
            amount: amount.into(),
            used_amount: Money::ZERO,
            version: INITIAL_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(customer_id: RecordId, tenor: Tenor) -> String {
        format!("{customer_id}:{tenor}")
    }

    /// Granted amount minus what has already been reserved.
    pub fn available(&self) -> Money {
        self.amount - self.used_amount
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.available() >= Money::from(amount)
    }

    /// Consumes `amount` of the limit in this local copy.
    ///
    /// The change only becomes real once committed through a version-checked
    /// store update.
    pub fn consume(&mut self, amount: Amount, now: DateTime<Utc>) -> Result<()> {
        if !self.covers(amount) {
            return Err(LendingError::InsufficientLimit {
                customer_id: self.customer_id,
                tenor: self.tenor,
                available: self.available(),
                requested: amount.into(),
            });
        }
        self.used_amount += Money::from(amount);
        self.updated_at = now;
        Ok(())
    }
}

impl Record for CreditLimit {
    const COLLECTION: &'static str = "credit_limits";

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
        Some(Self::key(self.customer_id, self.tenor))
    }

    fn owner(&self) -> Option<RecordId> {
        Some(self.customer_id)
    }
}
