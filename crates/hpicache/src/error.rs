use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors produced by cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to initialize cache store at {path}: {source}")]
    StoreInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("another cache operation is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no mirrors configured")]
    NoMirrors,

    #[error("all mirrors failed for {name} after {attempts} attempts: {last_error}")]
    MirrorsExhausted {
        name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("downloaded file for {name} is implausibly small ({size} bytes)")]
    Undersized { name: String, size: u64 },

    #[error("checksum mismatch for {name}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("cache is empty, nothing to export")]
    EmptyCache,

    #[error("snapshot import failed: {0}")]
    Import(String),

    #[error("invalid plugin manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}
