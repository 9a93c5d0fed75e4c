// src/error.rs
//
// Error taxonomy shared by every layer of the store.

use thiserror::Error;
use anyhow::Error as AnyError;

use crate::object_store::BackendKind;

/// Errors surfaced by credential resolution, connection setup and the façade.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Missing or contradictory connection parameters. Raised before any network call.
    #[error("configuration error: missing {}", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no credentials: set OS_PASSWORD or OS_AUTH_TOKEN, or authenticate once to populate the token cache")]
    NoCredentials,

    /// Authentication or network failure while connecting.
    #[error("connection error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Connection { status: Option<u16>, message: String },

    /// The handle never connected; carries the original connect failure.
    #[error("store handle is not connected: {reason}")]
    NotConnected { reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} backend is not implemented")]
    Unimplemented(BackendKind),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Backend(#[from] AnyError),
}

impl StoreError {
    pub fn connection(status: Option<u16>, message: impl Into<String>) -> Self {
        StoreError::Connection { status, message: message.into() }
    }

    /// True for missing objects, folders, and handles that never connected.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::NotConnected { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(format!("json: {e}"))
    }
}

impl From<csv::Error> for StoreError {
    fn from(e: csv::Error) -> Self {
        StoreError::Codec(format!("csv: {e}"))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Codec(format!("blob: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
