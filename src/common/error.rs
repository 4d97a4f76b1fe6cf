//! Error types for kubestep
//!
//! Errors are grouped by where they surface: building a step (fatal before
//! anything runs), executing an operation (recorded against the operation)
//! and talking to the cluster (propagated immediately).

use std::io;
use thiserror::Error;

use crate::client::ClientError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kubestep
#[derive(Error, Debug)]
pub enum Error {
    // === Build Errors ===
    #[error("no operation found")]
    NoOperation,

    #[error("multiple operations found in a single entry: {0}")]
    MultipleOperations(String),

    #[error("file or resource must be set")]
    MissingResource,

    #[error("invalid collector: {0}")]
    InvalidCollector(String),

    #[error("failed to load resources from '{source_name}': {reason}")]
    ResourceLoad { source_name: String, reason: String },

    #[error("found no resource in {0}")]
    NoResource(String),

    #[error("invalid resource: {0}")]
    InvalidResource(String),

    // === Execution Errors ===
    #[error("{}", .0.join("; "))]
    Mismatch(Vec<String>),

    #[error("the resource already exists in the cluster")]
    AlreadyExists,

    #[error("command '{command}' failed: {status}")]
    ExitStatus { command: String, status: String },

    #[error("failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("context cancelled")]
    Cancelled,

    #[error("check failed: {0}")]
    Check(String),

    #[error("{0} test(s) failed")]
    TestsFailed(usize),

    #[error("{0} test file(s) are invalid")]
    InvalidTests(usize),

    // === Cluster Errors ===
    #[error(transparent)]
    Client(#[from] ClientError),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create a resource load error naming the source
    pub fn resource_load(source_name: &str, reason: impl ToString) -> Self {
        Self::ResourceLoad {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an exit status error for a process
    pub fn exit_status(command: &str, status: impl ToString) -> Self {
        Self::ExitStatus {
            command: command.to_string(),
            status: status.to_string(),
        }
    }

    /// Create an error for a duration string that could not be parsed
    pub fn invalid_duration(value: &str, reason: &str) -> Self {
        Self::InvalidDuration {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error wraps a "not found" answer from the cluster
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Client(e) if e.is_not_found())
    }

    /// Whether the error came from the enclosing context ending
    pub fn is_context_error(&self) -> bool {
        matches!(self, Error::DeadlineExceeded | Error::Cancelled)
    }
}
