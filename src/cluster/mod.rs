//! Cluster description, role topology and validation
//!
//! A [`Cluster`] can only be built from a description that passed
//! [`validate_cluster`], so every plane operation runs against a legal
//! topology.

mod host;
mod topology;
mod types;
mod validation;

pub use host::{Host, Role, RoleSet};
pub use topology::RoleTopology;
pub use types::{
    AuthConfig, ClusterConfig, EtcdService, IngressConfig, KubeApiService,
    KubeControllerService, KubeletService, KubeproxyService, NetworkConfig, SchedulerService,
    ServiceMeshConfig, ServicesConfig, SystemImages, DEFAULT_ETCD_IMAGE,
    DEFAULT_INFRA_CONTAINER_IMAGE, DEFAULT_K8S_IMAGE, DEFAULT_NGINX_PROXY_IMAGE,
};
pub use validation::{
    dns1123_subdomain_errors, validate_cluster, ISTIO_SERVICE_MESH_PROVIDER,
    SUPPORTED_NETWORK_PLUGINS,
};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::hosts::HostAgent;
use crate::services::{PlaneOrchestrator, PlaneReport};
use crate::Result;

/// A validated cluster: its description plus the derived role topology
#[derive(Clone, Debug)]
pub struct Cluster {
    config: ClusterConfig,
    topology: RoleTopology,
}

impl Cluster {
    /// Derive the topology and validate the description
    ///
    /// Host reachability must be recorded (see
    /// [`ClusterConfig::mark_unreachable`]) before calling this.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let topology = validate_cluster(&config)?;
        info!(
            etcd = topology.etcd_hosts().len(),
            control = topology.control_hosts().len(),
            worker = topology.worker_hosts().len(),
            inactive = topology.inactive_hosts().len(),
            "Cluster description validated"
        );
        Ok(Self { config, topology })
    }

    /// The cluster description
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The role topology
    pub fn topology(&self) -> &RoleTopology {
        &self.topology
    }

    /// Bring up every plane: etcd, then control, then worker
    ///
    /// Stops at the first failing plane; planes already brought up stay up.
    pub async fn deploy<A: HostAgent>(
        &self,
        orchestrator: &PlaneOrchestrator<A>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaneReport>> {
        self.warn_inactive_hosts(orchestrator);
        let topology = &self.topology;
        let services = &self.config.services;

        let etcd = orchestrator
            .run_etcd_plane(topology.etcd_hosts(), &services.etcd, cancel)
            .await?;
        let control = orchestrator
            .run_control_plane(
                topology.control_hosts(),
                topology.etcd_hosts(),
                services,
                cancel,
            )
            .await?;
        let worker = orchestrator
            .run_worker_plane(
                topology.control_hosts(),
                topology.worker_hosts(),
                services,
                &self.config.system_images,
                cancel,
            )
            .await?;
        Ok(vec![etcd, control, worker])
    }

    /// Tear down every plane: worker, then control, then etcd
    pub async fn remove<A: HostAgent>(
        &self,
        orchestrator: &PlaneOrchestrator<A>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaneReport>> {
        self.warn_inactive_hosts(orchestrator);
        let topology = &self.topology;

        let worker = orchestrator
            .remove_worker_plane(topology.control_hosts(), topology.worker_hosts(), cancel)
            .await?;
        let control = orchestrator
            .remove_control_plane(topology.control_hosts(), cancel)
            .await?;
        let etcd = orchestrator
            .remove_etcd_plane(topology.etcd_hosts(), cancel)
            .await?;
        Ok(vec![worker, control, etcd])
    }

    fn warn_inactive_hosts<A: HostAgent>(&self, orchestrator: &PlaneOrchestrator<A>) {
        for host in self.topology.inactive_hosts() {
            orchestrator.logger().warn(&format!(
                "Skipping host [{}]: failed connectivity check",
                host.address
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::DryRunAgent;
    use crate::services::{Action, Direction, ServiceName};

    fn sample_config() -> ClusterConfig {
        ClusterConfig {
            nodes: vec![
                Host::new("10.0.0.1", "ubuntu", &[Role::Etcd, Role::Control]),
                Host::new("10.0.0.2", "ubuntu", &[Role::Worker]),
            ],
            ..Default::default()
        }
    }

    /// Story: an invalid description never yields a Cluster
    #[test]
    fn story_invalid_config_is_rejected_before_any_plane_runs() {
        let mut config = sample_config();
        config.network.plugin = "cilium".to_string();
        assert!(Cluster::new(config).is_err());
    }

    /// Story: a full deploy brings the planes up in dependency order
    #[tokio::test]
    async fn story_deploy_runs_etcd_then_control_then_worker() {
        let cluster = Cluster::new(sample_config()).unwrap();
        let orchestrator = PlaneOrchestrator::new(DryRunAgent::new());

        let reports = cluster
            .deploy(&orchestrator, &CancellationToken::new())
            .await
            .unwrap();
        let roles: Vec<Role> = reports.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::Etcd, Role::Control, Role::Worker]);
        assert!(reports.iter().all(|r| r.direction == Direction::Up));

        let ops = orchestrator.agent().operations();
        let services: Vec<ServiceName> = ops.iter().map(|op| op.service).collect();
        assert_eq!(
            services,
            vec![
                ServiceName::Etcd,
                ServiceName::KubeApi,
                ServiceName::KubeController,
                ServiceName::Scheduler,
                ServiceName::Kubelet,
                ServiceName::Kubeproxy,
                ServiceName::NginxProxy,
                ServiceName::Kubelet,
                ServiceName::Kubeproxy,
            ]
        );
        assert!(ops.iter().all(|op| op.action == Action::Run));
    }

    /// Story: removal walks the planes in reverse
    #[tokio::test]
    async fn story_remove_runs_worker_then_control_then_etcd() {
        let cluster = Cluster::new(sample_config()).unwrap();
        let orchestrator = PlaneOrchestrator::new(DryRunAgent::new());

        let reports = cluster
            .remove(&orchestrator, &CancellationToken::new())
            .await
            .unwrap();
        let roles: Vec<Role> = reports.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::Worker, Role::Control, Role::Etcd]);

        let ops = orchestrator.agent().operations();
        assert!(ops.iter().all(|op| op.action == Action::Remove));
        assert_eq!(ops.last().map(|op| op.service), Some(ServiceName::Etcd));
    }

    /// Story: unreachable hosts are skipped but reported
    #[tokio::test]
    async fn story_unreachable_hosts_are_not_converged() {
        let mut config = sample_config();
        config
            .nodes
            .push(Host::new("10.0.0.3", "ubuntu", &[Role::Worker]));
        config.mark_unreachable(&["10.0.0.3"]);
        let cluster = Cluster::new(config).unwrap();
        let orchestrator = PlaneOrchestrator::new(DryRunAgent::new());

        cluster
            .deploy(&orchestrator, &CancellationToken::new())
            .await
            .unwrap();
        assert!(orchestrator
            .agent()
            .operations()
            .iter()
            .all(|op| op.host != "10.0.0.3"));
    }
}
