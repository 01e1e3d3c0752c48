//! Host agents: the capability that actually runs services on machines
//!
//! The orchestrator only speaks [`HostAgent`]. How a container gets started
//! (SSH plus a container runtime, a local socket, nothing at all) is the
//! agent's business.

mod dry_run;
mod retrying;

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

pub use dry_run::{DryRunAgent, DryRunOperation};
pub use retrying::RetryingAgent;

use crate::cluster::Host;
use crate::services::{ContainerSpec, ServiceName};

/// Failure reported by a host agent
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AgentError {
    message: String,
    retryable: bool,
}

impl AgentError {
    /// Transient failure (connection dropped, runtime busy)
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Failure that won't go away by trying again
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Error text
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Runs and removes service containers on hosts
///
/// Both operations are idempotent: running a service that already matches
/// `spec` and removing a service that isn't there both succeed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HostAgent: Send + Sync {
    /// Converge `service` on `host` to the container described by `spec`
    ///
    /// `primary` is set for hosts converged as part of the control plane.
    async fn run_service(
        &self,
        host: &Host,
        service: ServiceName,
        spec: &ContainerSpec,
        primary: bool,
    ) -> Result<(), AgentError>;

    /// Stop and delete `service` on `host`
    async fn remove_service(&self, host: &Host, service: ServiceName) -> Result<(), AgentError>;
}

#[async_trait]
impl<T: HostAgent + ?Sized> HostAgent for Arc<T> {
    async fn run_service(
        &self,
        host: &Host,
        service: ServiceName,
        spec: &ContainerSpec,
        primary: bool,
    ) -> Result<(), AgentError> {
        (**self).run_service(host, service, spec, primary).await
    }

    async fn remove_service(&self, host: &Host, service: ServiceName) -> Result<(), AgentError> {
        (**self).remove_service(host, service).await
    }
}
