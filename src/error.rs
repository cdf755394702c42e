use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not decode records from {origin}: {reason}")]
    Decode { origin: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl FetchError {
    pub fn status(endpoint: impl Into<String>, status: u16) -> Self {
        let endpoint = endpoint.into();
        warn!(target: "fieldforge::fetch", %endpoint, status, "non-success response");
        FetchError::Status { endpoint, status }
    }

    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        let endpoint = endpoint.into();
        error!(target: "fieldforge::fetch", %endpoint, error = %source, "request failed");
        FetchError::Transport { endpoint, source }
    }

    pub fn decode(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        let origin = origin.into();
        let reason = reason.into();
        warn!(target: "fieldforge::fetch", %origin, %reason, "undecodable payload");
        FetchError::Decode { origin, reason }
    }

    /// Auth failures are worth a distinct message at the CLI edge.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Status { status: 401 | 403, .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--api-url (or FIELDFORGE_API_URL) is required for the http source")]
    MissingApiUrl,

    #[error("--database-url (or DATABASE_URL) is required for the postgres source")]
    MissingDatabaseUrl,

    #[error("--file is required for the file source")]
    MissingFile,

    #[error("realtime channels need the postgres source")]
    RealtimeNeedsPostgres,

    #[error("could not read rules from {path}: {reason}")]
    Rules { path: PathBuf, reason: String },

    #[error("could not read checklist from {path}: {reason}")]
    Checklist { path: PathBuf, reason: String },
}
