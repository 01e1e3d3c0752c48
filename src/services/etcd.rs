//! etcd plane: one member per etcd host

use tokio_util::sync::CancellationToken;

use super::container::{ContainerSpec, ServiceTemplate};
use super::plane::{Direction, PlaneOrchestrator, PlanePlan, PlaneReport, Step};
use super::{ServiceName, ETCD_CLIENT_PORT, ETCD_PEER_PORT};
use crate::cluster::{EtcdService, Host, Role};
use crate::hosts::HostAgent;
use crate::Result;

const ETCD_DATA_DIR: &str = "/var/lib/etcd";
const ETCD_CLUSTER_TOKEN: &str = "etcd-cluster-1";

/// etcd member bootstrapped into a fixed initial cluster
#[derive(Clone, Debug)]
pub struct EtcdTemplate {
    image: String,
    extra_args: std::collections::BTreeMap<String, String>,
    initial_cluster: String,
}

impl EtcdTemplate {
    /// Member template for a cluster made of `etcd_hosts`
    pub fn new(service: &EtcdService, etcd_hosts: &[Host]) -> Self {
        let initial_cluster = etcd_hosts
            .iter()
            .map(|h| {
                format!(
                    "{}=http://{}:{ETCD_PEER_PORT}",
                    member_name(h),
                    h.internal_address()
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        Self {
            image: service.image.clone(),
            extra_args: service.extra_args.clone(),
            initial_cluster,
        }
    }

    /// `--initial-cluster` value shared by every member
    pub fn initial_cluster(&self) -> &str {
        &self.initial_cluster
    }
}

fn member_name(host: &Host) -> String {
    format!("etcd-{}", host.node_name())
}

impl ServiceTemplate for EtcdTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::Etcd
    }

    fn container(&self, host: &Host, _primary: bool) -> ContainerSpec {
        let address = host.internal_address();
        ContainerSpec::new(&self.image)
            .command(["/usr/local/bin/etcd"])
            .flag("name", member_name(host))
            .flag("data-dir", "/etcd-data")
            .flag(
                "advertise-client-urls",
                format!("http://{address}:{ETCD_CLIENT_PORT}"),
            )
            .flag(
                "listen-client-urls",
                format!("http://0.0.0.0:{ETCD_CLIENT_PORT}"),
            )
            .flag(
                "initial-advertise-peer-urls",
                format!("http://{address}:{ETCD_PEER_PORT}"),
            )
            .flag("listen-peer-urls", format!("http://0.0.0.0:{ETCD_PEER_PORT}"))
            .flag("initial-cluster-token", ETCD_CLUSTER_TOKEN)
            .flag("initial-cluster", &self.initial_cluster)
            .flag("initial-cluster-state", "new")
            .extra_args(&self.extra_args)
            .bind(format!("{ETCD_DATA_DIR}:/etcd-data"))
            .host_network()
    }
}

/// Bring-up plan for the etcd plane
///
/// Empty when the cluster uses external etcd.
pub fn etcd_plane_up<'a>(etcd_hosts: &'a [Host], etcd: &EtcdService) -> PlanePlan<'a> {
    let plan = PlanePlan::new(Role::Etcd, Direction::Up);
    if !etcd.external_urls.is_empty() {
        return plan;
    }
    plan.stage(
        etcd_hosts,
        vec![Step::run(EtcdTemplate::new(etcd, etcd_hosts), false)],
    )
}

/// Teardown plan for the etcd plane
pub fn etcd_plane_down(etcd_hosts: &[Host]) -> PlanePlan<'_> {
    PlanePlan::new(Role::Etcd, Direction::Down)
        .stage(etcd_hosts, vec![Step::Remove(ServiceName::Etcd)])
}

impl<A: HostAgent> PlaneOrchestrator<A> {
    /// Start an etcd member on every etcd host
    pub async fn run_etcd_plane(
        &self,
        etcd_hosts: &[Host],
        etcd: &EtcdService,
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        self.execute(&etcd_plane_up(etcd_hosts, etcd), cancel).await
    }

    /// Remove etcd from every etcd host
    pub async fn remove_etcd_plane(
        &self,
        etcd_hosts: &[Host],
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        self.execute(&etcd_plane_down(etcd_hosts), cancel).await
    }
}
