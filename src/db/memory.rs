//! In-memory [`Repository`] used by unit tests.

use chrono::Utc;
use rust_decimal::Decimal;

use super::{Repository, StoreError};
use crate::models::{Deposit, NewTransaction, Transaction, User, UserId};

#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    users: Vec<User>,
    transactions: Vec<Transaction>,
    deposits: Vec<Deposit>,
}

impl MemoryRepository {
    pub fn with_user(username: &str, starting_cash: Decimal) -> (Self, UserId) {
        let mut repo = Self::default();
        let user = repo
            .insert_user(username, "unused", starting_cash)
            .expect("fresh repository accepts any username");
        (repo, user.id)
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut User, StoreError> {
        self.users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::UserNotFound(user_id))
    }
}

impl Repository for MemoryRepository {
    fn insert_user(
        &mut self,
        username: &str,
        password_hash: &str,
        starting_cash: Decimal,
    ) -> Result<User, StoreError> {
        if self.users.iter().any(|u| u.username == username) {
            return Err(StoreError::DuplicateUsername);
        }
        let user = User {
            id: self.users.len() as UserId + 1,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            cash: starting_cash,
            starting_cash,
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.iter().find(|u| u.username == username).cloned())
    }

    fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.iter().find(|u| u.id == user_id).cloned())
    }

    fn get_balance(&self, user_id: UserId) -> Result<Decimal, StoreError> {
        self.get_user(user_id)?
            .map(|u| u.cash)
            .ok_or(StoreError::UserNotFound(user_id))
    }

    fn set_balance(&mut self, user_id: UserId, cash: Decimal) -> Result<(), StoreError> {
        self.user_mut(user_id)?.cash = cash;
        Ok(())
    }

    fn append_transaction(
        &mut self,
        user_id: UserId,
        entry: &NewTransaction,
    ) -> Result<Transaction, StoreError> {
        self.user_mut(user_id)?;
        let transaction = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            symbol: entry.symbol.clone(),
            shares: entry.shares,
            price: entry.price,
            transacted_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        Ok(transaction)
    }

    fn list_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    fn append_deposit(&mut self, user_id: UserId, amount: Decimal) -> Result<Deposit, StoreError> {
        self.user_mut(user_id)?;
        let deposit = Deposit {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            amount,
            deposited_at: Utc::now(),
        };
        self.deposits.push(deposit.clone());
        Ok(deposit)
    }

    fn list_deposits(&self, user_id: UserId) -> Result<Vec<Deposit>, StoreError> {
        Ok(self
            .deposits
            .iter()
            .rev()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }
}
