//! Account store boundary.
//!
//! The core consumes this minimal interface; real deployments back it with
//! whatever storage they like. [`MemoryStore`] is the in-process default
//! and the test double.

use crate::account::Account;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}

pub trait AccountStore: Send {
    fn get_account(&self, id: &str) -> Option<Account>;
    fn put_account(&mut self, account: &Account) -> Result<(), StoreError>;
    fn find_account(&self, id: &str) -> bool;
}

#[derive(Default)]
pub struct MemoryStore {
    accounts: HashMap<String, Account>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.insert(account.id.clone(), account);
        self
    }
}

impl AccountStore for MemoryStore {
    fn get_account(&self, id: &str) -> Option<Account> {
        self.accounts.get(id).cloned()
    }

    fn put_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn find_account(&self, id: &str) -> bool {
        self.accounts.contains_key(id)
    }
}
