pub mod luhn;
pub mod money;
pub mod order;

pub use money::accrual_to_minor_units;
pub use order::{Balance, Order, OrderStatus, User, Withdrawal};
