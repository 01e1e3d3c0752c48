//! Agent that records operations instead of performing them

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{AgentError, HostAgent};
use crate::cluster::Host;
use crate::services::{Action, ContainerSpec, ServiceName};
use crate::{Error, Result};

/// One recorded agent call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DryRunOperation {
    /// Host address
    pub host: String,
    /// Service touched
    pub service: ServiceName,
    /// Operation requested
    pub action: Action,
    /// Host was converged as a control plane node
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub primary: bool,
    /// Desired container, for run operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerSpec>,
}

/// Records every call and always succeeds
///
/// Clones share the same record, so a clone handed to the orchestrator can
/// be inspected afterwards.
#[derive(Clone, Debug, Default)]
pub struct DryRunAgent {
    operations: Arc<Mutex<Vec<DryRunOperation>>>,
}

impl DryRunAgent {
    /// Agent with an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded operations, in call order
    pub fn operations(&self) -> Vec<DryRunOperation> {
        self.lock().clone()
    }

    /// Recorded operations as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&*self.lock())
            .map_err(|e| Error::serialization_for_kind("yaml", e.to_string()))
    }

    /// One line per recorded operation
    pub fn render_plan(&self) -> String {
        self.lock()
            .iter()
            .map(|op| {
                let marker = if op.primary { " (control plane)" } else { "" };
                format!("{} {} on [{}]{marker}\n", op.action, op.service, op.host)
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DryRunOperation>> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: DryRunOperation) {
        info!(
            host = %operation.host,
            service = %operation.service,
            action = %operation.action,
            "dry run"
        );
        self.lock().push(operation);
    }
}

#[async_trait]
impl HostAgent for DryRunAgent {
    async fn run_service(
        &self,
        host: &Host,
        service: ServiceName,
        spec: &ContainerSpec,
        primary: bool,
    ) -> std::result::Result<(), AgentError> {
        self.record(DryRunOperation {
            host: host.address.clone(),
            service,
            action: Action::Run,
            primary,
            container: Some(spec.clone()),
        });
        Ok(())
    }

    async fn remove_service(
        &self,
        host: &Host,
        service: ServiceName,
    ) -> std::result::Result<(), AgentError> {
        self.record(DryRunOperation {
            host: host.address.clone(),
            service,
            action: Action::Remove,
            primary: false,
            container: None,
        });
        Ok(())
    }
}
