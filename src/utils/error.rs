//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Errors that can occur while validating a mode configuration string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Mode configuration '{0}' is ambiguous. Remove duplicates.")]
    AmbiguousModes(String),

    #[error("Unknown option: '{0}'")]
    UnknownMode(char),
}

/// Errors that can occur while resolving or running a profile target
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Target not found: {0}")]
    NotFound(String),

    #[error("Target run failed: {0}")]
    RunFailed(String),

    #[error("Telemetry source failed: {0}")]
    Source(String),

    #[error("Telemetry dump has no '{0}' stream")]
    MissingStream(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while assembling a report
#[derive(Error, Debug)]
pub enum AssembleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Aggregator for mode '{mode}' failed: {source}")]
    Aggregator {
        mode: char,
        #[source]
        source: TargetError,
    },
}

/// Errors that can occur while reading or writing persisted reports
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read or write report file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report file is not a JSON object")]
    NotAnObject,

    #[error("Report file has no version tag")]
    MissingVersion,

    #[error("Report version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

/// Errors that can occur while submitting a report to a stats server
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Server rejected report: HTTP {0}")]
    Rejected(u16),

    #[error("Failed to compress report: {0}")]
    Compress(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
