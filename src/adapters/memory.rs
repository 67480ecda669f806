//! In-process store used for dry runs and tests.
//!
//! Mirrors the guards of the PostgreSQL adapter: first-claim order
//! registration, compare-and-set status transitions, idempotent credit and
//! the non-negative balance invariant. One lock per store stands in for the
//! database's row-level serialization.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Balance, Order, OrderStatus, User, Withdrawal};
use crate::error::{Result, TallyError};
use crate::storage::{RegisterOutcome, Store};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    logins: HashMap<String, Uuid>,
    orders: HashMap<String, Order>,
    balances: HashMap<Uuid, Balance>,
    withdrawals: HashMap<String, Withdrawal>,
}

/// In-memory storage adapter
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User> {
        let mut inner = self.inner.lock().await;
        if inner.logins.contains_key(login) {
            return Err(TallyError::LoginTaken(login.to_string()));
        }

        let user = User {
            uid: Uuid::new_v4(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        inner.logins.insert(login.to_string(), user.uid);
        inner.users.insert(user.uid, user.clone());
        Ok(user)
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logins
            .get(login)
            .and_then(|uid| inner.users.get(uid))
            .cloned())
    }

    async fn register_order(&self, uid: Uuid, number: &str) -> Result<RegisterOutcome> {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.orders.get(number) {
            if existing.uid == uid {
                return Ok(RegisterOutcome::AlreadyOwned(existing.clone()));
            }
            return Err(TallyError::OrderConflict {
                number: number.to_string(),
            });
        }

        let order = Order {
            number: number.to_string(),
            uid,
            amount: 0,
            status: OrderStatus::New,
            uploaded_at: Utc::now(),
            processed_at: None,
        };
        inner.orders.insert(number.to_string(), order.clone());
        Ok(RegisterOutcome::Created(order))
    }

    async fn order(&self, number: &str) -> Result<Option<Order>> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(number).cloned())
    }

    async fn orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.uploaded_at);
        Ok(orders)
    }

    async fn orders_for_user(&self, uid: Uuid) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.uid == uid)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.uploaded_at);
        Ok(orders)
    }

    async fn mark_processing(&self, number: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(number) {
            Some(order) if order.status == OrderStatus::New => {
                order.status = OrderStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_invalid(&self, number: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(number) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Invalid;
                order.processed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit(&self, number: &str, amount: i64) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let uid = {
            let order = inner
                .orders
                .get_mut(number)
                .ok_or_else(|| TallyError::NotFound(format!("order {}", number)))?;
            if order.status == OrderStatus::Processed {
                return Ok(false);
            }
            order.status = OrderStatus::Processed;
            order.amount = amount;
            order.processed_at = Some(Utc::now());
            order.uid
        };

        let balance = inner.balances.entry(uid).or_default();
        balance.current += amount;
        Ok(true)
    }

    async fn debit(&self, uid: Uuid, number: &str, amount: i64) -> Result<Withdrawal> {
        let mut inner = self.inner.lock().await;

        if inner.withdrawals.contains_key(number) {
            return Err(TallyError::DuplicateWithdrawal {
                number: number.to_string(),
            });
        }

        let available = inner.balances.get(&uid).map(|b| b.current).unwrap_or(0);
        if available < amount {
            return Err(TallyError::InsufficientFunds {
                requested: amount,
                available,
            });
        }

        let balance = inner.balances.entry(uid).or_default();
        balance.current -= amount;
        balance.withdrawn += amount;

        let withdrawal = Withdrawal {
            number: number.to_string(),
            uid,
            amount,
            processed_at: Utc::now(),
        };
        inner
            .withdrawals
            .insert(number.to_string(), withdrawal.clone());
        Ok(withdrawal)
    }

    async fn balance(&self, uid: Uuid) -> Result<Balance> {
        let inner = self.inner.lock().await;
        Ok(inner.balances.get(&uid).copied().unwrap_or_default())
    }

    async fn withdrawals_for_user(&self, uid: Uuid) -> Result<Vec<Withdrawal>> {
        let inner = self.inner.lock().await;
        let mut withdrawals: Vec<Withdrawal> = inner
            .withdrawals
            .values()
            .filter(|w| w.uid == uid)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.processed_at);
        Ok(withdrawals)
    }
}
