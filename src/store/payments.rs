use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment::Payment;

/// Payment rows keyed by their business key, the transaction id.
#[derive(Default)]
pub struct PaymentStore {
    payments: DashMap<String, Payment>,
}

impl PaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    pub fn get(&self, transaction_id: &str) -> Option<Payment> {
        self.payments
            .get(transaction_id)
            .map(|entry| entry.value().clone())
    }

    pub fn for_ride(&self, ride_id: &Uuid) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .iter()
            .filter(|entry| entry.ride_id == *ride_id)
            .map(|entry| entry.value().clone())
            .collect();
        payments.sort_by_key(|payment| payment.created_at);
        payments
    }

    pub fn insert_new(&self, payment: Payment) -> Result<Payment, AppError> {
        match self.payments.entry(payment.transaction_id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "transaction {} already exists",
                payment.transaction_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
                Ok(payment)
            }
        }
    }

    /// Runs `apply` against the locked row and returns its result with the row's new state.
    pub fn update<F, T>(&self, transaction_id: &str, apply: F) -> Result<(Payment, T), AppError>
    where
        F: FnOnce(&mut Payment) -> T,
    {
        let mut row = self.payments.get_mut(transaction_id).ok_or_else(|| {
            AppError::NotFound(format!("payment {transaction_id} not found"))
        })?;

        let outcome = apply(row.value_mut());
        Ok((row.value().clone(), outcome))
    }
}
