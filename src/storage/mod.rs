//! Persistent store seam.
//!
//! Every mutating operation is atomic in the implementation: one call, one
//! transaction, committed or rolled back on every exit path. The ledger
//! operations (`credit`, `debit`) carry the consistency guards the pipeline
//! relies on for redelivery safety.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Balance, Order, OrderStatus, User, Withdrawal};
use crate::error::Result;

/// Outcome of a first-claim order registration.
#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    /// Number was unclaimed; a NEW order row now exists.
    Created(Order),
    /// Number already claimed by the same user; nothing changed.
    AlreadyOwned(Order),
}

impl RegisterOutcome {
    pub fn order(&self) -> &Order {
        match self {
            RegisterOutcome::Created(order) | RegisterOutcome::AlreadyOwned(order) => order,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, RegisterOutcome::Created(_))
    }
}

/// Durable storage for users, orders, balances and withdrawals.
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Users ====================

    /// Insert a new user; `LoginTaken` if the login is claimed.
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User>;

    async fn user_by_login(&self, login: &str) -> Result<Option<User>>;

    // ==================== Orders ====================

    /// First claim wins: insert the order at NEW if the number is free,
    /// otherwise resolve ownership. `OrderConflict` when another user holds
    /// the number.
    async fn register_order(&self, uid: Uuid, number: &str) -> Result<RegisterOutcome>;

    async fn order(&self, number: &str) -> Result<Option<Order>>;

    /// Orders in a given status, oldest first. Used by the bootstrapper.
    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;

    /// A user's orders ordered by upload time.
    async fn orders_for_user(&self, uid: Uuid) -> Result<Vec<Order>>;

    /// Compare-and-set NEW -> PROCESSING. Returns false (no-op) when the
    /// stored status already moved on; redelivery-safe.
    async fn mark_processing(&self, number: &str) -> Result<bool>;

    /// Move a non-terminal order to INVALID. Returns false when the order
    /// is already terminal.
    async fn mark_invalid(&self, number: &str) -> Result<bool>;

    // ==================== Ledger ====================

    /// Atomically set the order PROCESSED with `amount` and increment the
    /// owner's balance, creating the balance row on first credit. Applies
    /// only if the stored status is not already PROCESSED; returns false
    /// when the credit was a redelivery and nothing changed.
    async fn credit(&self, number: &str, amount: i64) -> Result<bool>;

    /// Atomically decrement the balance and insert the immutable withdrawal
    /// row. `InsufficientFunds` when the balance cannot cover `amount`;
    /// `DuplicateWithdrawal` when the number collides. Either the whole
    /// debit applies or nothing does.
    async fn debit(&self, uid: Uuid, number: &str, amount: i64) -> Result<Withdrawal>;

    // ==================== Queries ====================

    /// Current balance; a user with no credits yet reads as zeros.
    async fn balance(&self, uid: Uuid) -> Result<Balance>;

    /// A user's withdrawals ordered by processing time.
    async fn withdrawals_for_user(&self, uid: Uuid) -> Result<Vec<Withdrawal>>;
}
