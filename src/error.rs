use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    /// Business-logic storage errors (unwritable state, backup I/O, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raw database errors from rusqlite (analytics store)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),
}

pub type GuardResult<T> = Result<T, GuardError>;

/// Error raised inside a policy body. Never crosses the Policy Runner
/// boundary as a blocking verdict — the runner maps it to `Verdict::Allow`
/// with the description stored in `ExecutionResult::error`.
#[derive(Error, Debug, Clone)]
pub enum PolicyError {
    #[error("timeout")]
    Timeout,

    #[error("panic: {0}")]
    Panic(String),

    #[error("{0}")]
    Internal(String),
}

impl PolicyError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
