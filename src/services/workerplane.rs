//! Worker plane: kubelet and kube-proxy everywhere, nginx-proxy on workers
//!
//! Control hosts also act as nodes, so they are brought up first. That way
//! the worker nginx-proxy has live API servers to forward to.

use tokio_util::sync::CancellationToken;

use super::container::{ContainerSpec, ServiceTemplate};
use super::plane::{Direction, PlaneOrchestrator, PlanePlan, PlaneReport, Step};
use super::{
    ServiceName, KUBE_API_PORT, KUBE_CONFIG_DIR, KUBE_NODE_KUBECONFIG, KUBE_PROXY_KUBECONFIG,
};
use crate::cluster::{Host, KubeletService, KubeproxyService, Role, ServicesConfig, SystemImages};
use crate::hosts::HostAgent;
use crate::Result;

const MASTER_ROLE_LABEL: &str = "node-role.kubernetes.io/master";

/// kubelet, registered as a master when `primary` is set
#[derive(Clone, Debug)]
pub struct KubeletTemplate {
    service: KubeletService,
}

impl KubeletTemplate {
    /// Template for the configured kubelet
    pub fn new(service: &KubeletService) -> Self {
        Self {
            service: service.clone(),
        }
    }
}

impl ServiceTemplate for KubeletTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::Kubelet
    }

    fn container(&self, host: &Host, primary: bool) -> ContainerSpec {
        let kubelet = &self.service;
        let mut spec = ContainerSpec::new(&kubelet.image)
            .command(["kubelet"])
            .flag("v", 2)
            .flag("address", "0.0.0.0")
            .flag("cluster-domain", &kubelet.cluster_domain)
            .flag("cluster-dns", &kubelet.cluster_dns_server)
            .flag("pod-infra-container-image", &kubelet.infra_container_image)
            .flag("hostname-override", host.node_name())
            .flag("network-plugin", "cni")
            .flag("cni-conf-dir", "/etc/cni/net.d")
            .flag("cni-bin-dir", "/opt/cni/bin")
            .flag("resolv-conf", "/etc/resolv.conf")
            .flag("allow-privileged", true)
            .flag("kubeconfig", KUBE_NODE_KUBECONFIG)
            .flag("require-kubeconfig", true);
        if primary {
            spec = spec
                .flag("register-with-taints", format!("{MASTER_ROLE_LABEL}=:NoSchedule"))
                .flag("node-labels", format!("{MASTER_ROLE_LABEL}=true"));
        }
        spec.extra_args(&kubelet.extra_args)
            .bind(format!("{KUBE_CONFIG_DIR}:{KUBE_CONFIG_DIR}"))
            .bind("/etc/cni:/etc/cni:ro")
            .bind("/opt/cni:/opt/cni:ro")
            .bind("/etc/resolv.conf:/etc/resolv.conf")
            .bind("/sys:/sys")
            .bind("/var/lib/docker:/var/lib/docker:rw")
            .bind("/var/lib/kubelet:/var/lib/kubelet:shared")
            .bind("/var/run:/var/run:rw")
            .bind("/dev:/host/dev")
            .host_network()
            .host_pid()
            .privileged()
    }
}

/// kube-proxy
#[derive(Clone, Debug)]
pub struct KubeproxyTemplate {
    service: KubeproxyService,
}

impl KubeproxyTemplate {
    /// Template for the configured kube-proxy
    pub fn new(service: &KubeproxyService) -> Self {
        Self {
            service: service.clone(),
        }
    }
}

impl ServiceTemplate for KubeproxyTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::Kubeproxy
    }

    fn container(&self, host: &Host, _primary: bool) -> ContainerSpec {
        ContainerSpec::new(&self.service.image)
            .command(["kube-proxy"])
            .flag("v", 2)
            .flag("healthz-bind-address", "0.0.0.0")
            .flag("hostname-override", host.node_name())
            .flag("kubeconfig", KUBE_PROXY_KUBECONFIG)
            .extra_args(&self.service.extra_args)
            .bind(format!("{KUBE_CONFIG_DIR}:{KUBE_CONFIG_DIR}"))
            .host_network()
            .privileged()
    }
}

/// Local nginx forwarding API traffic to every control host
#[derive(Clone, Debug)]
pub struct NginxProxyTemplate {
    image: String,
    control_addresses: Vec<String>,
}

impl NginxProxyTemplate {
    /// Proxy in front of `control_hosts`, by internal address
    pub fn new(image: impl Into<String>, control_hosts: &[Host]) -> Self {
        Self {
            image: image.into(),
            control_addresses: control_hosts
                .iter()
                .map(|h| h.internal_address().to_string())
                .collect(),
        }
    }

    /// Upstream addresses, in control host order
    pub fn upstreams(&self) -> &[String] {
        &self.control_addresses
    }
}

impl ServiceTemplate for NginxProxyTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::NginxProxy
    }

    fn container(&self, _host: &Host, _primary: bool) -> ContainerSpec {
        ContainerSpec::new(&self.image)
            .env("CP_HOSTS", self.control_addresses.join(","))
            .env("CP_PORT", KUBE_API_PORT)
            .host_network()
    }
}

/// Bring-up plan for the worker plane
pub fn worker_plane_up<'a>(
    control_hosts: &'a [Host],
    worker_hosts: &'a [Host],
    services: &ServicesConfig,
    images: &SystemImages,
) -> PlanePlan<'a> {
    let kubelet = KubeletTemplate::new(&services.kubelet);
    let kubeproxy = KubeproxyTemplate::new(&services.kubeproxy);
    let proxy = NginxProxyTemplate::new(&images.nginx_proxy, control_hosts);

    PlanePlan::new(Role::Worker, Direction::Up)
        .stage(
            control_hosts,
            vec![
                Step::run(kubelet.clone(), true),
                Step::run(kubeproxy.clone(), false),
            ],
        )
        .stage(
            worker_hosts,
            vec![
                Step::run(proxy, false),
                Step::run(kubelet, false),
                Step::run(kubeproxy, false),
            ],
        )
}

/// Teardown plan for the worker plane
pub fn worker_plane_down<'a>(control_hosts: &'a [Host], worker_hosts: &'a [Host]) -> PlanePlan<'a> {
    PlanePlan::new(Role::Worker, Direction::Down)
        .stage(
            control_hosts,
            vec![
                Step::Remove(ServiceName::Kubelet),
                Step::Remove(ServiceName::Kubeproxy),
            ],
        )
        .stage(
            worker_hosts,
            vec![
                Step::Remove(ServiceName::Kubelet),
                Step::Remove(ServiceName::Kubeproxy),
                Step::Remove(ServiceName::NginxProxy),
            ],
        )
}

impl<A: HostAgent> PlaneOrchestrator<A> {
    /// Start kubelet and kube-proxy on control hosts, then nginx-proxy,
    /// kubelet and kube-proxy on worker hosts
    pub async fn run_worker_plane(
        &self,
        control_hosts: &[Host],
        worker_hosts: &[Host],
        services: &ServicesConfig,
        images: &SystemImages,
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        let plan = worker_plane_up(control_hosts, worker_hosts, services, images);
        self.execute(&plan, cancel).await
    }

    /// Remove the worker plane services from control and worker hosts
    pub async fn remove_worker_plane(
        &self,
        control_hosts: &[Host],
        worker_hosts: &[Host],
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        self.execute(&worker_plane_down(control_hosts, worker_hosts), cancel)
            .await
    }
}
