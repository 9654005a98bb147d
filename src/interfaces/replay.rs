use super::csv::operation_reader::{Operation, OperationKind};
use crate::application::lending::LendingCore;
use crate::domain::contract::{ContractSource, NewContract};
use crate::domain::customer::{CreditLimit, NewCustomer};
use crate::domain::money::{Amount, Money};
use crate::error::{LendingError, Result};
use chrono::NaiveDate;
use tracing::debug;

/// Applies replay operations to a [`LendingCore`], one at a time.
pub struct Replay<'a> {
    core: &'a LendingCore,
}

impl<'a> Replay<'a> {
    pub fn new(core: &'a LendingCore) -> Self {
        Self { core }
    }

    pub async fn apply(&self, op: Operation) -> Result<()> {
        debug!(?op, "applying operation");
        match op.op {
            OperationKind::Register => {
                let name = op.name.clone().unwrap_or_default();
                self.core
                    .customers
                    .register(NewCustomer {
                        nik: op.reference()?.to_string(),
                        full_name: name.clone(),
                        legal_name: name,
                        place_of_birth: String::new(),
                        // Replay rows carry no birth date.
                        date_of_birth: NaiveDate::default(),
                        salary: Money::new(op.amount.unwrap_or_default()),
                        ktp_photo: String::new(),
                        selfie_photo: String::new(),
                    })
                    .await?;
            }
            OperationKind::Grant => {
                self.core
                    .customers
                    .grant_limit(op.customer()?, op.tenor()?, Amount::new(op.amount()?)?)
                    .await?;
            }
            OperationKind::Contract => {
                let otr = Amount::new(op.amount()?)?;
                let tenor = op.tenor()?;
                let terms = self.core.contracts.quote(otr, tenor)?;
                let source = match op.name.as_deref().filter(|s| !s.is_empty()) {
                    Some(name) => name.parse()?,
                    None => ContractSource::Dealer,
                };
                self.core
                    .contracts
                    .create(NewContract {
                        customer_id: op.customer()?,
                        source,
                        asset_name: op.reference()?.to_string(),
                        tenor,
                        otr_amount: otr,
                        admin_fee: terms.admin_fee,
                        installment_amount: terms.installment_amount,
                        interest_amount: terms.interest_amount,
                    })
                    .await?;
            }
            OperationKind::Pay => {
                self.core.payments.pay_installment(op.installment()?).await?;
            }
        }
        Ok(())
    }

    /// Every credit limit of every customer, in customer then tenor order.
    ///
    /// Customer ids are dense and records are never deleted, so the walk
    /// stops at the first id that is not found.
    pub async fn limits(&self) -> Result<Vec<CreditLimit>> {
        let mut limits = Vec::new();
        let mut id = 1;
        loop {
            match self.core.customers.profile(id).await {
                Ok(customer) => {
                    limits.extend(self.core.customers.credit_limits(customer.id).await?);
                    id += 1;
                }
                Err(LendingError::NotFound { .. }) => return Ok(limits),
                Err(e) => return Err(e),
            }
        }
    }
}
