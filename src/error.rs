//! Error types for SKE
//!
//! Errors are structured with fields to aid debugging. Validation errors carry
//! the offending option, convergence errors carry the host, service and the
//! hosts that had already been converged when the plane stopped.

use thiserror::Error;

use crate::cluster::Role;
use crate::hosts::AgentError;
use crate::services::{Action, ServiceName};

/// Main error type for SKE operations
#[derive(Debug, Error)]
pub enum Error {
    /// The cluster description is malformed or contradictory
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The invalid option path (e.g., "services.kubelet.image")
        field: Option<String>,
    },

    /// A host agent call failed while converging or tearing down a plane
    #[error(transparent)]
    Convergence(Box<ConvergenceError>),

    /// A plane operation stopped because its cancellation token fired
    #[error("[{plane}] plane operation cancelled")]
    Cancelled {
        /// Plane that was being converged
        plane: Role,
    },

    /// Addon manifest rendering failed
    #[error("template error: {message}")]
    Template {
        /// Description of what failed
        message: String,
        /// Template being rendered (if known)
        template: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The document kind being processed (if known)
        kind: Option<String>,
    },

    /// The cluster description could not be read
    #[error("failed to read cluster config {path}: {message}")]
    Config {
        /// Path of the config file
        path: String,
        /// Description of what failed
        message: String,
    },
}

/// Failure of a single host operation inside a plane
///
/// The orchestrator does not roll back: hosts listed in `completed` had
/// every step of their stage applied before the failure.
#[derive(Debug, Error)]
#[error("[{plane}] failed to {action} {service} on host [{host}]: {source}")]
pub struct ConvergenceError {
    /// Plane being converged or torn down
    pub plane: Role,
    /// Address of the failing host
    pub host: String,
    /// Service whose operation failed
    pub service: ServiceName,
    /// Operation that failed
    pub action: Action,
    /// Hosts fully processed before the failure, in completion order
    pub completed: Vec<String>,
    /// Error returned by the host agent
    #[source]
    pub source: AgentError,
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific option
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Wrap a convergence failure
    pub fn convergence(err: ConvergenceError) -> Self {
        Self::Convergence(Box::new(err))
    }

    /// Create a cancellation error for a plane
    pub fn cancelled(plane: Role) -> Self {
        Self::Cancelled { plane }
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
            template: None,
        }
    }

    /// Create a template error for a named template
    pub fn template_for(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
            template: Some(template.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with document kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a config read error
    pub fn config(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// The host agent error behind a convergence failure, if any
    pub fn agent_error(&self) -> Option<&AgentError> {
        match self {
            Self::Convergence(err) => Some(&err.source),
            _ => None,
        }
    }

    /// Whether re-running the same operation could succeed
    ///
    /// Validation and config errors are deterministic. Convergence errors are
    /// retryable when the agent says so, relying on agent idempotence.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Convergence(err) => err.source.is_retryable(),
            Self::Cancelled { .. } => true,
            Self::Validation { .. }
            | Self::Template { .. }
            | Self::Serialization { .. }
            | Self::Config { .. } => false,
        }
    }
}
