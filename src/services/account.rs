//! Synchronous account operations: withdrawals, balance and history.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{luhn, Balance, Order, User, Withdrawal};
use crate::error::{Result, TallyError};
use crate::storage::Store;

pub struct AccountService {
    store: Arc<dyn Store>,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a user. The password hash is produced by the caller and
    /// stored opaquely.
    pub async fn register_user(&self, login: &str, password_hash: &str) -> Result<User> {
        if login.is_empty() {
            return Err(TallyError::Validation("login must not be empty".to_string()));
        }
        self.store.create_user(login, password_hash).await
    }

    pub async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        self.store.user_by_login(login).await
    }

    /// Withdraw points against a Luhn-valid withdrawal number. Atomic:
    /// either the balance is debited and the withdrawal recorded, or
    /// nothing changes.
    pub async fn withdraw(&self, uid: Uuid, number: &str, amount: i64) -> Result<Withdrawal> {
        luhn::validate(number)?;
        if amount <= 0 {
            return Err(TallyError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        self.store.debit(uid, number, amount).await
    }

    pub async fn balance(&self, uid: Uuid) -> Result<Balance> {
        self.store.balance(uid).await
    }

    /// Orders for a user, oldest upload first.
    pub async fn orders(&self, uid: Uuid) -> Result<Vec<Order>> {
        self.store.orders_for_user(uid).await
    }

    /// Withdrawals for a user, oldest first.
    pub async fn withdrawals(&self, uid: Uuid) -> Result<Vec<Withdrawal>> {
        self.store.withdrawals_for_user(uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;

    async fn service_with_credit(amount: i64) -> (AccountService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let service = AccountService::new(store.clone());
        let user = service.register_user("alice", "hash").await.unwrap();
        store.register_order(user.uid, "12345678903").await.unwrap();
        store.credit("12345678903", amount).await.unwrap();
        (service, user.uid)
    }

    #[tokio::test]
    async fn withdraw_debits_and_records() {
        let (service, uid) = service_with_credit(50_000).await;

        let withdrawal = service.withdraw(uid, "79927398713", 30_000).await.unwrap();
        assert_eq!(withdrawal.amount, 30_000);

        let balance = service.balance(uid).await.unwrap();
        assert_eq!(balance.current, 20_000);
        assert_eq!(balance.withdrawn, 30_000);

        let history = service.withdrawals(uid).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].number, "79927398713");
    }

    #[tokio::test]
    async fn withdraw_more_than_available_fails_cleanly() {
        let (service, uid) = service_with_credit(1_000).await;

        let err = service.withdraw(uid, "79927398713", 5_000).await.unwrap_err();
        assert!(matches!(err, TallyError::InsufficientFunds { .. }));

        let balance = service.balance(uid).await.unwrap();
        assert_eq!(balance.current, 1_000);
        assert_eq!(balance.withdrawn, 0);
        assert!(service.withdrawals(uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn withdraw_validates_number_and_amount() {
        let (service, uid) = service_with_credit(1_000).await;

        assert!(matches!(
            service.withdraw(uid, "79927398710", 100).await.unwrap_err(),
            TallyError::InvalidNumber(_)
        ));
        assert!(matches!(
            service.withdraw(uid, "79927398713", 0).await.unwrap_err(),
            TallyError::Validation(_)
        ));
        assert!(matches!(
            service.withdraw(uid, "79927398713", -5).await.unwrap_err(),
            TallyError::Validation(_)
        ));

        assert_eq!(service.balance(uid).await.unwrap().current, 1_000);
    }

    #[tokio::test]
    async fn duplicate_login_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = AccountService::new(store);
        service.register_user("alice", "hash").await.unwrap();

        let err = service.register_user("alice", "other").await.unwrap_err();
        assert!(matches!(err, TallyError::LoginTaken(_)));
    }

    #[tokio::test]
    async fn fresh_user_reads_zero_balance() {
        let store = Arc::new(MemoryStore::new());
        let service = AccountService::new(store);
        let user = service.register_user("bob", "hash").await.unwrap();

        let balance = service.balance(user.uid).await.unwrap();
        assert_eq!(balance.current, 0);
        assert_eq!(balance.withdrawn, 0);
        assert!(service.orders(user.uid).await.unwrap().is_empty());
    }
}
