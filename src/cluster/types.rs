//! Cluster description types
//!
//! The cluster description is a YAML document listing hosts and per-service
//! settings. Absent fields get defaults; fields present but empty are kept as
//! written so validation can reject them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::host::Host;
use crate::{Error, Result};

/// Default etcd image
pub const DEFAULT_ETCD_IMAGE: &str = "rancher/coreos-etcd:v3.0.17";

/// Default image for the Kubernetes components (hyperkube style)
pub const DEFAULT_K8S_IMAGE: &str = "rancher/k8s:v1.8.5-rancher4";

/// Default pod infrastructure container image
pub const DEFAULT_INFRA_CONTAINER_IMAGE: &str = "rancher/pause-amd64:3.0";

/// Default image of the worker-side reverse proxy to the control plane
pub const DEFAULT_NGINX_PROXY_IMAGE: &str = "rancher/rke-nginx-proxy:v0.1.1";

/// Full provisioning request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ClusterConfig {
    /// Hosts under management
    #[serde(default)]
    pub nodes: Vec<Host>,

    /// Per-service settings
    #[serde(default)]
    pub services: ServicesConfig,

    /// Pod network plugin
    #[serde(default)]
    pub network: NetworkConfig,

    /// Authentication strategy
    #[serde(default)]
    pub authentication: AuthConfig,

    /// Ingress controller
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Service mesh addon
    #[serde(default)]
    pub service_mesh: ServiceMeshConfig,

    /// Images of SKE's own helper containers
    #[serde(default)]
    pub system_images: SystemImages,
}

impl ClusterConfig {
    /// Parse a cluster description from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::serialization_for_kind("ClusterConfig", e.to_string()))
    }

    /// Read and parse a cluster description file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Serialize the cluster description to YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::serialization_for_kind("ClusterConfig", e.to_string()))
    }

    /// Returns true if etcd is provided by an external endpoint set
    pub fn uses_external_etcd(&self) -> bool {
        !self.services.etcd.external_urls.is_empty()
    }

    /// Mark hosts that failed their connectivity check
    ///
    /// Must be called before the role topology is derived.
    pub fn mark_unreachable<S: AsRef<str>>(&mut self, addresses: &[S]) {
        for host in &mut self.nodes {
            if addresses.iter().any(|a| a.as_ref() == host.address) {
                host.active = false;
            }
        }
    }
}

/// Settings for every Kubernetes component SKE runs
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServicesConfig {
    /// etcd settings (internal or external)
    #[serde(default)]
    pub etcd: EtcdService,

    /// kube-apiserver settings
    #[serde(default, rename = "kube-api")]
    pub kube_api: KubeApiService,

    /// kube-controller-manager settings
    #[serde(default, rename = "kube-controller")]
    pub kube_controller: KubeControllerService,

    /// kube-scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerService,

    /// kubelet settings
    #[serde(default)]
    pub kubelet: KubeletService,

    /// kube-proxy settings
    #[serde(default)]
    pub kubeproxy: KubeproxyService,
}

/// etcd settings
///
/// When `external_urls` is set, etcd isn't run on any host and the TLS
/// material is used by the API server to reach the external endpoints.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EtcdService {
    /// etcd image
    pub image: String,
    /// Extra command line arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
    /// External etcd endpoints
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_urls: Vec<String>,
    /// External etcd CA certificate (PEM)
    pub ca_cert: String,
    /// External etcd client certificate (PEM)
    pub cert: String,
    /// External etcd client key (PEM)
    pub key: String,
    /// Key prefix used by the API server in external etcd
    pub path: String,
}

impl Default for EtcdService {
    fn default() -> Self {
        Self {
            image: DEFAULT_ETCD_IMAGE.to_string(),
            extra_args: BTreeMap::new(),
            external_urls: Vec::new(),
            ca_cert: String::new(),
            cert: String::new(),
            key: String::new(),
            path: "/registry".to_string(),
        }
    }
}

/// kube-apiserver settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KubeApiService {
    /// Image
    pub image: String,
    /// Extra command line arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
    /// Range for service cluster IPs
    pub service_cluster_ip_range: String,
}

impl Default for KubeApiService {
    fn default() -> Self {
        Self {
            image: DEFAULT_K8S_IMAGE.to_string(),
            extra_args: BTreeMap::new(),
            service_cluster_ip_range: crate::DEFAULT_SERVICE_CLUSTER_IP_RANGE.to_string(),
        }
    }
}

/// kube-controller-manager settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KubeControllerService {
    /// Image
    pub image: String,
    /// Extra command line arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
    /// Pod network CIDR
    pub cluster_cidr: String,
    /// Range for service cluster IPs
    pub service_cluster_ip_range: String,
}

impl Default for KubeControllerService {
    fn default() -> Self {
        Self {
            image: DEFAULT_K8S_IMAGE.to_string(),
            extra_args: BTreeMap::new(),
            cluster_cidr: crate::DEFAULT_CLUSTER_CIDR.to_string(),
            service_cluster_ip_range: crate::DEFAULT_SERVICE_CLUSTER_IP_RANGE.to_string(),
        }
    }
}

/// kube-scheduler settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SchedulerService {
    /// Image
    pub image: String,
    /// Extra command line arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

impl Default for SchedulerService {
    fn default() -> Self {
        Self {
            image: DEFAULT_K8S_IMAGE.to_string(),
            extra_args: BTreeMap::new(),
        }
    }
}

/// kubelet settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KubeletService {
    /// Image
    pub image: String,
    /// Extra command line arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
    /// Cluster DNS domain
    pub cluster_domain: String,
    /// Pod infrastructure (pause) container image
    pub infra_container_image: String,
    /// Address of the cluster DNS service
    pub cluster_dns_server: String,
}

impl Default for KubeletService {
    fn default() -> Self {
        Self {
            image: DEFAULT_K8S_IMAGE.to_string(),
            extra_args: BTreeMap::new(),
            cluster_domain: crate::DEFAULT_CLUSTER_DOMAIN.to_string(),
            infra_container_image: DEFAULT_INFRA_CONTAINER_IMAGE.to_string(),
            cluster_dns_server: crate::DEFAULT_CLUSTER_DNS_SERVER.to_string(),
        }
    }
}

/// kube-proxy settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KubeproxyService {
    /// Image
    pub image: String,
    /// Extra command line arguments
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

impl Default for KubeproxyService {
    fn default() -> Self {
        Self {
            image: DEFAULT_K8S_IMAGE.to_string(),
            extra_args: BTreeMap::new(),
        }
    }
}

/// Pod network plugin selection
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Plugin name (flannel, calico, canal, weave)
    pub plugin: String,
    /// Plugin specific options
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            plugin: crate::DEFAULT_NETWORK_PLUGIN.to_string(),
            options: BTreeMap::new(),
        }
    }
}

/// Authentication strategy selection
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Strategy name
    pub strategy: String,
    /// Strategy specific options
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: crate::DEFAULT_AUTH_STRATEGY.to_string(),
            options: BTreeMap::new(),
        }
    }
}

/// Ingress controller selection
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IngressConfig {
    /// Provider name, or `none` to disable ingress
    pub provider: String,
    /// Provider specific options
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Labels selecting the nodes that run the controller
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            provider: crate::DEFAULT_INGRESS_CONTROLLER.to_string(),
            options: BTreeMap::new(),
            node_selector: BTreeMap::new(),
        }
    }
}

/// Service mesh addon selection
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceMeshConfig {
    /// Provider name (`none` or `istio`)
    pub provider: String,
    /// Provider specific options passed to the addon template
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl Default for ServiceMeshConfig {
    fn default() -> Self {
        Self {
            provider: crate::DEFAULT_SERVICE_MESH_PROVIDER.to_string(),
            options: BTreeMap::new(),
        }
    }
}

/// Images of helper containers SKE runs on hosts
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SystemImages {
    /// Reverse proxy workers use to reach the control plane
    pub nginx_proxy: String,
}

impl Default for SystemImages {
    fn default() -> Self {
        Self {
            nginx_proxy: DEFAULT_NGINX_PROXY_IMAGE.to_string(),
        }
    }
}
