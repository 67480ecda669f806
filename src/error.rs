use thiserror::Error;

/// Main error type for the loyalty service
#[derive(Error, Debug)]
pub enum TallyError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Accrual engine rate limited: {0}")]
    RateLimited(String),

    #[error("Accrual engine unavailable: status {0}")]
    Upstream(u16),

    #[error("Accrual engine rejected request: status {0}")]
    UpstreamRejected(u16),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Business-rule rejections
    #[error("Order {number} already uploaded by another user")]
    OrderConflict { number: String },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("Withdrawal {number} already exists")]
    DuplicateWithdrawal { number: String },

    #[error("Login already taken: {0}")]
    LoginTaken(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TallyError {
    /// Transient upstream failures are retried inside the pipeline with
    /// backoff and never surfaced synchronously.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TallyError::Http(_) | TallyError::RateLimited(_) | TallyError::Upstream(_)
        )
    }
}

/// Result type alias for TallyError
pub type Result<T> = std::result::Result<T, TallyError>;
