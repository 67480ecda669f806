pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod storage;

pub use adapters::{AccrualClient, MemoryStore, PostgresStore, StatusReply, SubmitReply};
pub use config::AppConfig;
pub use domain::{Balance, Order, OrderStatus, User, Withdrawal};
pub use error::{Result, TallyError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineHandle, RetryPolicy};
pub use services::{AccountService, OrderIntake};
pub use storage::{RegisterOutcome, Store};
