use super::ledger::CreditLedger;
use super::retry::RetryPolicy;
use crate::config::PricingConfig;
use crate::domain::contract::{Contract, ContractStatus, ContractTerms, Installment, NewContract};
use crate::domain::customer::Tenor;
use crate::domain::money::Amount;
use crate::domain::ports::{ContractWriterRef, RecordStoreRef};
use crate::domain::record::RecordId;
use crate::error::{LendingError, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Originates installment contracts against per-tenor credit limits.
pub struct ContractService {
    contracts: RecordStoreRef<Contract>,
    installments: RecordStoreRef<Installment>,
    writer: ContractWriterRef,
    ledger: CreditLedger,
    retry: RetryPolicy,
    pricing: PricingConfig,
}

impl ContractService {
    pub fn new(
        contracts: RecordStoreRef<Contract>,
        installments: RecordStoreRef<Installment>,
        writer: ContractWriterRef,
        ledger: CreditLedger,
        retry: RetryPolicy,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            contracts,
            installments,
            writer,
            ledger,
            retry,
            pricing,
        }
    }

    /// Terms for financing `otr` over `tenor` months at the configured pricing.
    pub fn quote(&self, otr: Amount, tenor: Tenor) -> Result<ContractTerms> {
        ContractTerms::quote(otr, tenor, &self.pricing)
    }

    /// Creates a pending contract with its full schedule and charges OTR plus
    /// admin fee to the customer's limit for the contract's tenor.
    ///
    /// The availability check is only advisory. If the reservation that
    /// follows the insert fails (limit consumed in the meantime, retries
    /// exhausted), the new contract is cancelled and the reservation error is
    /// returned. If the cancel fails as well, `CompensationFailed` carries
    /// both errors.
    pub async fn create(&self, new_contract: NewContract) -> Result<(Contract, Vec<Installment>)> {
        new_contract.validate()?;
        let customer_id = new_contract.customer_id;
        let tenor = new_contract.tenor;
        let total = new_contract.financed_amount()?;

        if !self.ledger.check_available(customer_id, tenor, total).await? {
            let limit = self.ledger.limit_for(customer_id, tenor).await?;
            return Err(LendingError::InsufficientLimit {
                customer_id,
                tenor,
                available: limit.available(),
                requested: total.into(),
            });
        }

        let number = format!("CTR-{customer_id}-{}", Uuid::new_v4().simple());
        let contract = new_contract.into_contract(number, Utc::now());
        let schedule = contract.schedule()?;
        let (contract, installments) = self.writer.create_contract(contract, schedule).await?;

        match self
            .ledger
            .reserve_with_retry(customer_id, tenor, total, &self.retry)
            .await
        {
            Ok(_) => {
                info!(
                    contract_id = contract.id,
                    contract_number = %contract.contract_number,
                    customer_id,
                    tenor,
                    "contract originated"
                );
                Ok((contract, installments))
            }
            Err(e) => {
                warn!(contract_id = contract.id, error = %e, "reservation failed, cancelling contract");
                match self
                    .update_status(contract.id, ContractStatus::Cancelled)
                    .await
                {
                    Ok(_) => Err(e),
                    Err(cancel_error) => {
                        error!(
                            contract_id = contract.id,
                            error = %cancel_error,
                            "compensating cancel failed, contract left pending without a reservation"
                        );
                        Err(LendingError::CompensationFailed {
                            contract_id: contract.id,
                            reservation: Box::new(e),
                            source: Box::new(cancel_error),
                        })
                    }
                }
            }
        }
    }

    pub async fn get(&self, id: RecordId) -> Result<Contract> {
        self.contracts.get(id).await
    }

    pub async fn get_by_contract_number(&self, number: &str) -> Result<Option<Contract>> {
        self.contracts.find_by_key(number).await
    }

    pub async fn list_for_customer(&self, customer_id: RecordId) -> Result<Vec<Contract>> {
        self.contracts.list_by_owner(customer_id).await
    }

    /// The repayment schedule of a contract, in due order.
    pub async fn installments(&self, contract_id: RecordId) -> Result<Vec<Installment>> {
        let mut installments = self.installments.list_by_owner(contract_id).await?;
        installments.sort_by_key(|installment| installment.sequence);
        Ok(installments)
    }

    pub async fn update_status(&self, id: RecordId, status: ContractStatus) -> Result<Contract> {
        self.retry
            .run("update_contract_status", move |_| self.transition(id, status))
            .await
    }

    async fn transition(&self, id: RecordId, status: ContractStatus) -> Result<Contract> {
        let mut contract = self.contracts.get(id).await?;
        contract.transition(status, Utc::now())?;
        contract.version = self.contracts.update(&contract).await?;
        info!(contract_id = id, status = status.as_str(), "contract status changed");
        Ok(contract)
    }
}
