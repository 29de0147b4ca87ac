//! Error types for a backup run.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bad or missing input. Raised before any network activity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("API key not provided. Use --api-key, --api-key-file, or TRUENAS_API_KEY env.")]
    MissingApiKey,

    #[error("Failed to read API key file {}: {source}", .path.display())]
    ApiKeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Host must not be empty")]
    EmptyHost,

    #[error("Retention must be a positive integer, got {0}")]
    InvalidRetention(usize),

    #[error("Output directory {} is not usable: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure talking to the appliance. No file is produced.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Invalid host URL {url}: {reason}")]
    InvalidHost { url: String, reason: String },

    #[error("Connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{method} rejected with status {status}: {body}")]
    Rejected {
        method: String,
        status: u16,
        body: String,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Session is closed")]
    Closed,

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

/// Fatal error for a whole run.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::Config(_) => 2,
            BackupError::Remote(_) => 1,
            BackupError::Io { .. } => 3,
        }
    }
}

/// Result type alias for a backup run.
pub type Result<T> = std::result::Result<T, BackupError>;
