use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order accrual status state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Registered locally, not yet submitted to the accrual engine
    New,
    /// Accepted by the accrual engine, awaiting a terminal result
    Processing,
    /// Accrual computed and credited
    Processed,
    /// Rejected by the accrual engine, never credits
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    /// Check if this status can transition to another status.
    /// Statuses only move forward; terminal statuses never leave.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            (New, Processing) => true,
            // The engine can permanently reject an order at submission
            (New, Invalid) => true,
            (Processing, Processed) => true,
            (Processing, Invalid) => true,
            _ => false,
        }
    }

    /// Is this a terminal status (no further transition occurs)?
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// A registered user. Immutable after creation except the password hash,
/// which the core stores opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uid: Uuid,
    pub login: String,
    pub password_hash: String,
}

/// A purchase order submitted for accrual. `amount` is in integer minor
/// units and stays 0 until the order is credited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub number: String,
    pub uid: Uuid,
    pub amount: i64,
    pub status: OrderStatus,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Per-user points balance in minor units. `current >= 0` always.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub current: i64,
    pub withdrawn: i64,
}

/// An executed withdrawal. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub number: String,
    pub uid: Uuid,
    pub amount: i64,
    pub processed_at: DateTime<Utc>,
}
