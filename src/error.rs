//! Error Types
//!
//! Errors are split by the boundary they cross:
//!
//! - [`TaskError`]: returned by a task capability; the engine turns it into
//!   a failed audit record and a failed instance, never into a caller error.
//! - [`StoreError`]: instance, audit and appeal persistence.
//! - [`TemplateError`]: loading, parsing and validating templates.
//! - [`ConfigError`]: reading and checking the engine configuration.
//! - [`EngineError`]: what [`Engine::execute`](crate::execution::Engine::execute)
//!   returns when no instance could be run at all.

use thiserror::Error;

/// Failure of a single task capability invocation.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Unknown task type: '{0}'")]
    UnknownTaskType(String),

    #[error("Missing required context key: '{0}'")]
    MissingKey(String),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid step config '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    #[error("{0}")]
    Validation(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

impl TaskError {
    /// Shorthand for an invalid context value.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Workflow instance already exists: {0}")]
    DuplicateInstance(String),

    #[error("Workflow instance '{0}' already reached a terminal status")]
    AlreadyTerminal(String),

    #[error("Terminal status must be completed or failed, got '{0}'")]
    InvalidTerminalStatus(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Template loading and validation failures.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: '{0}'")]
    NotFound(String),

    #[error("Failed to read template '{id}': {source}")]
    Read {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse template '{id}': {reason}")]
    Parse { id: String, reason: String },

    #[error("Invalid template '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

/// Errors surfaced to the caller of the engine.
///
/// Task failures are not in here: they terminate the instance with status
/// `failed` and the caller still receives the instance id.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Workflow instance {instance_id} has no outputs (status: {status})")]
    NotCompleted { instance_id: String, status: String },
}

/// Engine configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid config value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
