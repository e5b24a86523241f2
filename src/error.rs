//! Error types for insight-rs.
//!
//! A single top-level [`Error`] wraps the error domains of each layer:
//! agents and their collaborators, persistence, and CLI commands.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Agent, provider, or tool collaborator failure.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// CLI command failure.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by agents, LLM providers, and tool collaborators.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Provider name not recognised by the factory.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Requested provider name.
        name: String,
    },

    /// The provider has no model behind it (offline strategy).
    #[error("provider '{name}' has no model available")]
    ProviderUnavailable {
        /// Provider name.
        name: String,
    },

    /// Remote API call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error description.
        message: String,
        /// HTTP status when available.
        status: Option<u16>,
    },

    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Name of the guarded operation.
        operation: String,
        /// Budget that was exceeded.
        timeout: Duration,
    },

    /// Model output could not be interpreted.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Parse failure description.
        message: String,
        /// Raw content that failed to parse.
        content: String,
    },

    /// A tool collaborator failed.
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Tool category name.
        tool: String,
        /// Failure description.
        message: String,
    },

    /// The incoming query was rejected before the pipeline started.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Rejection reason.
        message: String,
    },

    /// Unrecoverable pipeline failure.
    #[error("orchestration failed: {message}")]
    Orchestration {
        /// Failure description.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the invalid setting.
        message: String,
    },
}

impl AgentError {
    /// Whether the call that produced this error may be repeated.
    ///
    /// Transport failures and timeouts are transient; malformed output,
    /// bad input, and configuration problems are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ApiRequest { status, .. } => match status {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            Self::Timeout { .. } | Self::ToolExecution { .. } => true,
            Self::UnsupportedProvider { .. }
            | Self::ProviderUnavailable { .. }
            | Self::ResponseParse { .. }
            | Self::InvalidQuery { .. }
            | Self::Orchestration { .. }
            | Self::Configuration { .. } => false,
        }
    }
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON column (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema has not been created yet.
    #[error("database not initialized; run `insight-rs init` first")]
    NotInitialized,

    /// A connection mutex was poisoned by a panicking holder.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// The blocking database task could not complete.
    #[error("storage task failed: {0}")]
    Task(String),

    /// Database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested record does not exist.
    #[error("{kind} not found: {identifier}")]
    NotFound {
        /// Record kind (e.g. `"profile"`).
        kind: &'static str,
        /// Lookup key.
        identifier: String,
    },
}

/// CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command could not complete.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Argument value was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
