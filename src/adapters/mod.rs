pub mod accrual;
pub mod memory;
pub mod postgres;

pub use accrual::{AccrualClient, StatusReply, SubmitReply};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
