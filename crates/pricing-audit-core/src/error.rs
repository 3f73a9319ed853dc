// crates/pricing-audit-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(
        "A checkpoint for {existing} is still open; \
         refusing to start {requested} without overwriting it"
    )]
    ScopeConflict { existing: String, requested: String },

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("State file {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to obtain a bearer credential. Always fatal for the run.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("No cached credential: {reason}. Run 'source set_jwt.sh' first to cache credentials")]
    Missing { reason: String },

    #[error(
        "Credential command '{command}' timed out (possible password prompt). \
         Run 'source set_jwt.sh' first to cache credentials"
    )]
    TimedOut { command: String },
}

/// A single call to the device manager failed. Never fatal for a scan.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("credential unavailable: {0}")]
    Credential(#[from] AuthError),
}

pub type Result<T> = std::result::Result<T, AuditError>;
