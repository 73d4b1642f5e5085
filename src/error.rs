use thiserror::Error;

use crate::schema::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Browsing engine unavailable or initial navigation failed. Fatal to
    /// that `initiate` call; no session is registered.
    #[error("session init failed: {0}")]
    SessionInit(String),

    /// Status/close on an account with no registered session.
    #[error("no active session for account {0}")]
    NoSession(i64),

    /// Browsing context closed while a capture window was in flight.
    #[error("capture aborted: {0}")]
    CaptureAborted(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// One profile in a batch file failed to parse or validate. The whole
    /// batch is aborted; nothing is persisted.
    #[error("profile at index {index}: {message}")]
    BatchItem { index: usize, message: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
