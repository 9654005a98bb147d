use super::retry::RetryPolicy;
use crate::domain::customer::{CreditLimit, Customer, NewCustomer, ProfileUpdate, Tenor};
use crate::domain::money::Amount;
use crate::domain::ports::RecordStoreRef;
use crate::domain::record::RecordId;
use crate::error::{LendingError, Result};
use chrono::Utc;
use tracing::info;

/// Customer registration, profile maintenance and limit grants.
pub struct CustomerService {
    customers: RecordStoreRef<Customer>,
    limits: RecordStoreRef<CreditLimit>,
    retry: RetryPolicy,
}

impl CustomerService {
    pub fn new(
        customers: RecordStoreRef<Customer>,
        limits: RecordStoreRef<CreditLimit>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            customers,
            limits,
            retry,
        }
    }

    /// Registers a new customer. The NIK must not be taken.
    pub async fn register(&self, new_customer: NewCustomer) -> Result<Customer> {
        new_customer.validate()?;
        if self.customers.find_by_key(&new_customer.nik).await?.is_some() {
            return Err(LendingError::CustomerExists(new_customer.nik));
        }

        let nik = new_customer.nik.clone();
        let customer = self
            .customers
            .create(new_customer.into_customer(Utc::now()))
            .await
            .map_err(|e| match e {
                // Lost a race against a concurrent registration.
                LendingError::DuplicateKey { .. } => LendingError::CustomerExists(nik),
                other => other,
            })?;
        info!(customer_id = customer.id, "customer registered");
        Ok(customer)
    }

    pub async fn profile(&self, id: RecordId) -> Result<Customer> {
        self.customers.get(id).await
    }

    pub async fn profile_by_nik(&self, nik: &str) -> Result<Option<Customer>> {
        self.customers.find_by_key(nik).await
    }

    pub async fn update_profile(&self, id: RecordId, update: ProfileUpdate) -> Result<Customer> {
        if update.full_name.trim().is_empty() || update.legal_name.trim().is_empty() {
            return Err(LendingError::ValidationError(
                "names must not be empty".to_string(),
            ));
        }
        if update.salary.is_negative() {
            return Err(LendingError::ValidationError(
                "salary must not be negative".to_string(),
            ));
        }
        let update = &update;
        self.retry
            .run("update_profile", move |_| self.apply_profile(id, update))
            .await
    }

    async fn apply_profile(&self, id: RecordId, update: &ProfileUpdate) -> Result<Customer> {
        let mut customer = self.customers.get(id).await?;
        customer.apply(update, Utc::now());
        customer.version = self.customers.update(&customer).await?;
        Ok(customer)
    }

    /// Grants a credit limit for one tenor. A customer holds at most one
    /// limit per tenor.
    pub async fn grant_limit(
        &self,
        customer_id: RecordId,
        tenor: Tenor,
        amount: Amount,
    ) -> Result<CreditLimit> {
        if tenor == 0 {
            return Err(LendingError::ValidationError(
                "tenor must be at least one month".to_string(),
            ));
        }
        self.customers.get(customer_id).await?;

        let limit = self
            .limits
            .create(CreditLimit::new(customer_id, tenor, amount, Utc::now()))
            .await
            .map_err(|e| match e {
                LendingError::DuplicateKey { .. } => {
                    LendingError::LimitAlreadyGranted { customer_id, tenor }
                }
                other => other,
            })?;
        info!(customer_id, tenor, amount = %limit.amount, "credit limit granted");
        Ok(limit)
    }

    /// All limits of a customer, shortest tenor first.
    pub async fn credit_limits(&self, customer_id: RecordId) -> Result<Vec<CreditLimit>> {
        let mut limits = self.limits.list_by_owner(customer_id).await?;
        limits.sort_by_key(|limit| limit.tenor);
        Ok(limits)
    }
}
