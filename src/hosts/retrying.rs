//! Agent wrapper that retries transient failures

use async_trait::async_trait;

use super::{AgentError, HostAgent};
use crate::cluster::Host;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::services::{ContainerSpec, ServiceName};

/// Retries retryable [`AgentError`]s of the wrapped agent with backoff
///
/// Permanent errors pass through on the first attempt. Once the budget is
/// spent the last error is returned and the plane fails as usual.
#[derive(Clone, Debug)]
pub struct RetryingAgent<A> {
    inner: A,
    config: RetryConfig,
}

impl<A: HostAgent> RetryingAgent<A> {
    /// Wrap `inner`, retrying with `config`
    pub fn new(inner: A, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped agent
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: HostAgent> HostAgent for RetryingAgent<A> {
    async fn run_service(
        &self,
        host: &Host,
        service: ServiceName,
        spec: &ContainerSpec,
        primary: bool,
    ) -> Result<(), AgentError> {
        let name = format!("start {service} on {}", host.address);
        retry_with_backoff(&self.config, &name, AgentError::is_retryable, move || {
            self.inner.run_service(host, service, spec, primary)
        })
        .await
    }

    async fn remove_service(&self, host: &Host, service: ServiceName) -> Result<(), AgentError> {
        let name = format!("remove {service} on {}", host.address);
        retry_with_backoff(&self.config, &name, AgentError::is_retryable, move || {
            self.inner.remove_service(host, service)
        })
        .await
    }
}
