use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("A database backup file is required for restore")]
    MissingDbFile,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid state transition for archive {name}: {from} -> {to}")]
    InvalidStateTransition {
        name: String,
        from: String,
        to: String,
    },

    /// Dump subprocess failed. `detail` holds a bounded stderr tail for
    /// operators; it must never contain credentials.
    #[error("Database dump failed: {detail}")]
    DumpFailed { detail: String },

    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    #[error("A restore is already in progress")]
    RestoreInProgress,

    /// Download path escaped the archive root. Treated as a security event.
    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
