//! Kubernetes service definitions and the plane orchestrator
//!
//! Each plane is described as a [`PlanePlan`]: ordered stages of hosts, each
//! applying an ordered list of service steps. [`PlaneOrchestrator`] executes
//! plans against a [`HostAgent`](crate::hosts::HostAgent), stopping at the
//! first failure.

mod container;
mod controlplane;
mod etcd;
mod plane;
mod workerplane;

use std::fmt;

use serde::Serialize;

pub use container::{ContainerSpec, ServiceTemplate};
pub use controlplane::{
    control_plane_down, control_plane_up, KubeApiTemplate, KubeControllerTemplate,
    SchedulerTemplate,
};
pub use etcd::{etcd_plane_down, etcd_plane_up, EtcdTemplate};
pub use plane::{Direction, PlaneOrchestrator, PlanePlan, PlaneReport, Stage, Step};
pub use workerplane::{
    worker_plane_down, worker_plane_up, KubeletTemplate, KubeproxyTemplate, NginxProxyTemplate,
};

/// Directory holding certificates and kubeconfigs on every host
pub const KUBE_CONFIG_DIR: &str = "/etc/kubernetes";
/// Cluster CA certificate
pub const KUBE_CA_CERT_PATH: &str = "/etc/kubernetes/ssl/kube-ca.pem";
/// API server serving certificate
pub const KUBE_API_CERT_PATH: &str = "/etc/kubernetes/ssl/kube-apiserver.pem";
/// API server serving key
pub const KUBE_API_KEY_PATH: &str = "/etc/kubernetes/ssl/kube-apiserver-key.pem";
/// Kubeconfig used by kubelet
pub const KUBE_NODE_KUBECONFIG: &str = "/etc/kubernetes/ssl/kubecfg-kube-node.yaml";
/// Kubeconfig used by kube-proxy
pub const KUBE_PROXY_KUBECONFIG: &str = "/etc/kubernetes/ssl/kubecfg-kube-proxy.yaml";
/// Kubeconfig used by the controller manager
pub const KUBE_CONTROLLER_KUBECONFIG: &str =
    "/etc/kubernetes/ssl/kubecfg-kube-controller-manager.yaml";
/// Kubeconfig used by the scheduler
pub const KUBE_SCHEDULER_KUBECONFIG: &str = "/etc/kubernetes/ssl/kubecfg-kube-scheduler.yaml";
/// CA certificate for an external etcd, as written to the control hosts
pub const EXTERNAL_ETCD_CA_PATH: &str = "/etc/kubernetes/ssl/external-etcd-ca.pem";
/// Client certificate for an external etcd
pub const EXTERNAL_ETCD_CERT_PATH: &str = "/etc/kubernetes/ssl/external-etcd.pem";
/// Client key for an external etcd
pub const EXTERNAL_ETCD_KEY_PATH: &str = "/etc/kubernetes/ssl/external-etcd-key.pem";

/// Port the API server listens on
pub const KUBE_API_PORT: u16 = 6443;
/// etcd client port
pub const ETCD_CLIENT_PORT: u16 = 2379;
/// etcd peer port
pub const ETCD_PEER_PORT: u16 = 2380;

/// A Kubernetes component run as a container on a host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceName {
    /// etcd member
    Etcd,
    /// kube-apiserver
    #[serde(rename = "kube-apiserver")]
    KubeApi,
    /// kube-controller-manager
    #[serde(rename = "kube-controller-manager")]
    KubeController,
    /// kube-scheduler
    #[serde(rename = "kube-scheduler")]
    Scheduler,
    /// kubelet
    Kubelet,
    /// kube-proxy
    #[serde(rename = "kube-proxy")]
    Kubeproxy,
    /// Local load balancer in front of the API servers
    NginxProxy,
}

impl ServiceName {
    /// Container name of the service
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Etcd => "etcd",
            Self::KubeApi => "kube-apiserver",
            Self::KubeController => "kube-controller-manager",
            Self::Scheduler => "kube-scheduler",
            Self::Kubelet => "kubelet",
            Self::Kubeproxy => "kube-proxy",
            Self::NginxProxy => "nginx-proxy",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step does to a service on a host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Converge the service to running with its desired definition
    Run,
    /// Stop and delete the service
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Run => "start",
            Self::Remove => "remove",
        })
    }
}
