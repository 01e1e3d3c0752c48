//! Fail-fast plane sequencer
//!
//! A plan is a list of stages; a stage is a host list plus the steps applied
//! to each of those hosts. Stages run in order. Within a stage every step of
//! one host completes before that host counts as done. By default hosts are
//! processed one at a time, in order; [`PlaneOrchestrator::with_concurrency`]
//! lets several hosts of a stage proceed at once.
//!
//! The first failing agent call ends the plan. Nothing is rolled back.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::container::ServiceTemplate;
use super::{Action, ServiceName};
use crate::cluster::{Host, Role};
use crate::error::ConvergenceError;
use crate::hosts::{AgentError, HostAgent};
use crate::logger::{PlaneLogger, TracingLogger};
use crate::{Error, Result};

/// Whether a plan brings a plane up or tears it down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Converge services to running
    Up,
    /// Remove services
    Down,
}

/// One service operation applied to every host of a stage
#[derive(Clone)]
pub enum Step {
    /// Converge the service built by `template`
    Run {
        /// Builds the per-host container
        template: Arc<dyn ServiceTemplate>,
        /// Register hosts of this stage as control plane nodes
        primary: bool,
    },
    /// Remove the service
    Remove(ServiceName),
}

impl Step {
    /// Run step for a template
    pub fn run(template: impl ServiceTemplate + 'static, primary: bool) -> Self {
        Self::Run {
            template: Arc::new(template),
            primary,
        }
    }

    /// Service touched by this step
    pub fn service(&self) -> ServiceName {
        match self {
            Self::Run { template, .. } => template.service(),
            Self::Remove(service) => *service,
        }
    }

    /// Operation performed by this step
    pub fn action(&self) -> Action {
        match self {
            Self::Run { .. } => Action::Run,
            Self::Remove(_) => Action::Remove,
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run { template, primary } => f
                .debug_struct("Run")
                .field("service", &template.service())
                .field("primary", primary)
                .finish(),
            Self::Remove(service) => f.debug_tuple("Remove").field(service).finish(),
        }
    }
}

/// Hosts and the steps each of them goes through
#[derive(Clone, Debug)]
pub struct Stage<'a> {
    /// Hosts of the stage, in processing order
    pub hosts: &'a [Host],
    /// Steps applied to every host, in order
    pub steps: Vec<Step>,
}

impl<'a> Stage<'a> {
    /// Stage over `hosts`
    pub fn new(hosts: &'a [Host], steps: Vec<Step>) -> Self {
        Self { hosts, steps }
    }
}

/// Ordered stages that converge or tear down one plane
#[derive(Clone, Debug)]
pub struct PlanePlan<'a> {
    /// Plane the plan belongs to
    pub role: Role,
    /// Bring-up or teardown
    pub direction: Direction,
    /// Stages, in order
    pub stages: Vec<Stage<'a>>,
}

impl<'a> PlanePlan<'a> {
    /// Empty plan
    pub fn new(role: Role, direction: Direction) -> Self {
        Self {
            role,
            direction,
            stages: Vec::new(),
        }
    }

    /// Append a stage
    pub fn stage(mut self, hosts: &'a [Host], steps: Vec<Step>) -> Self {
        self.stages.push(Stage::new(hosts, steps));
        self
    }

    /// Number of agent calls the plan makes when nothing fails
    pub fn call_count(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.hosts.len() * s.steps.len())
            .sum()
    }

    fn start_message(&self) -> String {
        let verb = match self.direction {
            Direction::Up => "Building up",
            Direction::Down => "Tearing down",
        };
        format!("[{}] {verb} {}..", self.role, self.role.plane_name())
    }

    fn success_message(&self) -> String {
        let verb = match self.direction {
            Direction::Up => "started",
            Direction::Down => "torn down",
        };
        format!(
            "[{}] Successfully {verb} {}..",
            self.role,
            self.role.plane_name()
        )
    }
}

/// Outcome of a plan that ran to completion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaneReport {
    /// Plane that was processed
    pub role: Role,
    /// Bring-up or teardown
    pub direction: Direction,
    /// Host addresses per stage completion, in completion order
    pub hosts: Vec<String>,
}

enum HostFailure {
    Cancelled,
    Agent {
        host: String,
        service: ServiceName,
        action: Action,
        source: AgentError,
    },
}

/// Executes plane plans against a host agent
pub struct PlaneOrchestrator<A> {
    agent: A,
    logger: Arc<dyn PlaneLogger>,
    concurrency: usize,
}

impl<A: HostAgent> PlaneOrchestrator<A> {
    /// Sequential orchestrator logging through `tracing`
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            logger: Arc::new(TracingLogger),
            concurrency: 1,
        }
    }

    /// Route plane progress messages to `logger`
    pub fn with_logger(mut self, logger: Arc<dyn PlaneLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Let up to `hosts` hosts of a stage converge at once (minimum 1)
    pub fn with_concurrency(mut self, hosts: usize) -> Self {
        self.concurrency = hosts.max(1);
        self
    }

    /// The host agent
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// The progress logger
    pub fn logger(&self) -> &dyn PlaneLogger {
        self.logger.as_ref()
    }

    /// Execute a plan
    ///
    /// Logs the plane banner, runs every stage, then logs the success line.
    /// On failure nothing further is logged; the returned error names the
    /// host, service and the hosts completed before it. The token is checked
    /// before every agent call.
    pub async fn execute(
        &self,
        plan: &PlanePlan<'_>,
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        self.logger.info(&plan.start_message());

        let mut completed = Vec::new();
        for stage in &plan.stages {
            if let Err(failure) = self.run_stage(stage, cancel, &mut completed).await {
                return Err(match failure {
                    HostFailure::Cancelled => Error::cancelled(plan.role),
                    HostFailure::Agent {
                        host,
                        service,
                        action,
                        source,
                    } => Error::convergence(ConvergenceError {
                        plane: plan.role,
                        host,
                        service,
                        action,
                        completed,
                        source,
                    }),
                });
            }
        }

        self.logger.info(&plan.success_message());
        Ok(PlaneReport {
            role: plan.role,
            direction: plan.direction,
            hosts: completed,
        })
    }

    async fn run_stage(
        &self,
        stage: &Stage<'_>,
        cancel: &CancellationToken,
        completed: &mut Vec<String>,
    ) -> std::result::Result<(), HostFailure> {
        if stage.steps.is_empty() {
            return Ok(());
        }
        let mut hosts = stream::iter(stage.hosts)
            .map(|host| self.converge_host(host, &stage.steps, cancel))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = hosts.next().await {
            completed.push(outcome?);
        }
        Ok(())
    }

    async fn converge_host(
        &self,
        host: &Host,
        steps: &[Step],
        cancel: &CancellationToken,
    ) -> std::result::Result<String, HostFailure> {
        for step in steps {
            if cancel.is_cancelled() {
                return Err(HostFailure::Cancelled);
            }
            let service = step.service();
            debug!(host = %host.address, %service, action = %step.action(), "Applying step");

            let result = match step {
                Step::Run { template, primary } => {
                    let spec = template.container(host, *primary);
                    self.agent.run_service(host, service, &spec, *primary).await
                }
                Step::Remove(_) => self.agent.remove_service(host, service).await,
            };
            result.map_err(|source| HostFailure::Agent {
                host: host.address.clone(),
                service,
                action: step.action(),
                source,
            })?;
        }
        Ok(host.address.clone())
    }
}
