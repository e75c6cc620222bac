//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum ShuttleError {
    /// Invalid or incomplete configuration (unsupported dialect, missing
    /// required field, bad chunk size). Fatal for that connection, no retry.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A database handle could not be opened at job start. Fatal for the
    /// whole job.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// No columns could be resolved for a table. Fatal for that table pair
    /// only; the job skips to the next pair.
    #[error("Schema error: no columns resolvable for {table}")]
    Schema { table: String },

    /// A single row failed to decode during extraction. Isolated per row.
    #[error("Extraction error at row {row_index}: {message}")]
    Extraction { row_index: u64, message: String },

    /// A single row failed its individual insert after the chunk-level
    /// fallback. Isolated per row.
    #[error("Load error at row {row_index}: {message}")]
    Load { row_index: u64, message: String },

    /// Oracle driver error.
    #[error("Oracle error: {0}")]
    Oracle(#[from] oracle::Error),

    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error with context about where it occurred.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShuttleError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        ShuttleError::Config(message.into())
    }

    /// Create a Connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        ShuttleError::Connectivity(message.into())
    }

    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        ShuttleError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShuttleError::Config(_) => 2,
            ShuttleError::Connectivity(_) => 3,
            _ => 1,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, ShuttleError>;
