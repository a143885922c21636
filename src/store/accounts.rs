use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::account::{Account, Role};

#[derive(Default)]
pub struct AccountStore {
    accounts: DashMap<Uuid, Account>,
    by_email: DashMap<String, Uuid>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<Account> {
        self.accounts.get(id).map(|entry| entry.value().clone())
    }

    pub fn find_by_email(&self, email: &str) -> Option<Account> {
        let id = self
            .by_email
            .get(&email.trim().to_lowercase())
            .map(|entry| *entry.value())?;
        self.get(&id)
    }

    pub fn list(&self, role: Option<Role>) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .accounts
            .iter()
            .filter(|entry| role.is_none_or(|role| entry.role == role))
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        accounts
    }

    /// Emails are unique, compared case-insensitively.
    pub fn insert(&self, account: Account) -> Result<Account, AppError> {
        match self.by_email.entry(account.email.trim().to_lowercase()) {
            Entry::Occupied(_) => {
                return Err(AppError::invalid_field(
                    "email",
                    "the email has already been taken",
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(account.id);
            }
        }

        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    pub fn update<F>(&self, id: &Uuid, apply: F) -> Result<Account, AppError>
    where
        F: FnOnce(&mut Account) -> Result<(), AppError>,
    {
        let mut row = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("account {id} not found")))?;

        apply(row.value_mut())?;
        Ok(row.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Account> {
        let (_, account) = self.accounts.remove(id)?;
        self.by_email
            .remove_if(&account.email.trim().to_lowercase(), |_, owner| owner == id);
        Some(account)
    }
}
