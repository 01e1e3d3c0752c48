//! Control plane: kube-apiserver, kube-controller-manager and kube-scheduler

use tokio_util::sync::CancellationToken;

use super::container::{ContainerSpec, ServiceTemplate};
use super::plane::{Direction, PlaneOrchestrator, PlanePlan, PlaneReport, Step};
use super::{
    ServiceName, ETCD_CLIENT_PORT, EXTERNAL_ETCD_CA_PATH, EXTERNAL_ETCD_CERT_PATH,
    EXTERNAL_ETCD_KEY_PATH, KUBE_API_CERT_PATH, KUBE_API_KEY_PATH, KUBE_API_PORT,
    KUBE_CA_CERT_PATH, KUBE_CONFIG_DIR, KUBE_CONTROLLER_KUBECONFIG, KUBE_SCHEDULER_KUBECONFIG,
};
use crate::cluster::{
    EtcdService, Host, KubeApiService, KubeControllerService, Role, SchedulerService,
    ServicesConfig,
};
use crate::hosts::HostAgent;
use crate::Result;

const SERVICE_ACCOUNT_KEY_PATH: &str = "/etc/kubernetes/ssl/kube-service-account-token-key.pem";
const ADMISSION_CONTROL: &str = "ServiceAccount,NamespaceLifecycle,LimitRanger,\
PersistentVolumeLabel,DefaultStorageClass,ResourceQuota,DefaultTolerationSeconds";

/// Where the API servers find etcd
#[derive(Clone, Debug, PartialEq, Eq)]
enum EtcdBackend {
    Internal {
        servers: String,
    },
    External {
        servers: String,
        prefix: String,
    },
}

impl EtcdBackend {
    fn new(etcd_hosts: &[Host], etcd: &EtcdService) -> Self {
        if etcd.external_urls.is_empty() {
            let servers = etcd_hosts
                .iter()
                .map(|h| format!("http://{}:{ETCD_CLIENT_PORT}", h.internal_address()))
                .collect::<Vec<_>>()
                .join(",");
            Self::Internal { servers }
        } else {
            Self::External {
                servers: etcd.external_urls.join(","),
                prefix: etcd.path.clone(),
            }
        }
    }
}

/// kube-apiserver
#[derive(Clone, Debug)]
pub struct KubeApiTemplate {
    service: KubeApiService,
    backend: EtcdBackend,
}

impl KubeApiTemplate {
    /// API server backed by the internal etcd hosts, or by the external
    /// endpoints when `etcd` lists any
    pub fn new(service: &KubeApiService, etcd_hosts: &[Host], etcd: &EtcdService) -> Self {
        Self {
            service: service.clone(),
            backend: EtcdBackend::new(etcd_hosts, etcd),
        }
    }
}

impl ServiceTemplate for KubeApiTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::KubeApi
    }

    fn container(&self, host: &Host, _primary: bool) -> ContainerSpec {
        let mut spec = ContainerSpec::new(&self.service.image)
            .command(["kube-apiserver"])
            .flag("insecure-bind-address", "127.0.0.1")
            .flag("bind-address", "0.0.0.0")
            .flag("insecure-port", 0)
            .flag("secure-port", KUBE_API_PORT)
            .flag("advertise-address", host.internal_address())
            .flag("allow-privileged", true)
            .flag("service-cluster-ip-range", &self.service.service_cluster_ip_range)
            .flag("admission-control", ADMISSION_CONTROL)
            .flag("storage-backend", "etcd3")
            .flag("client-ca-file", KUBE_CA_CERT_PATH)
            .flag("tls-cert-file", KUBE_API_CERT_PATH)
            .flag("tls-private-key-file", KUBE_API_KEY_PATH)
            .flag("service-account-key-file", SERVICE_ACCOUNT_KEY_PATH);
        spec = match &self.backend {
            EtcdBackend::Internal { servers } => spec.flag("etcd-servers", servers),
            EtcdBackend::External { servers, prefix } => spec
                .flag("etcd-servers", servers)
                .flag("etcd-cafile", EXTERNAL_ETCD_CA_PATH)
                .flag("etcd-certfile", EXTERNAL_ETCD_CERT_PATH)
                .flag("etcd-keyfile", EXTERNAL_ETCD_KEY_PATH)
                .flag("etcd-prefix", prefix),
        };
        spec.extra_args(&self.service.extra_args)
            .bind(format!("{KUBE_CONFIG_DIR}:{KUBE_CONFIG_DIR}"))
            .host_network()
    }
}

/// kube-controller-manager
#[derive(Clone, Debug)]
pub struct KubeControllerTemplate {
    service: KubeControllerService,
}

impl KubeControllerTemplate {
    /// Template for the configured controller manager
    pub fn new(service: &KubeControllerService) -> Self {
        Self {
            service: service.clone(),
        }
    }
}

impl ServiceTemplate for KubeControllerTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::KubeController
    }

    fn container(&self, _host: &Host, _primary: bool) -> ContainerSpec {
        ContainerSpec::new(&self.service.image)
            .command(["kube-controller-manager"])
            .flag("address", "0.0.0.0")
            .flag("leader-elect", true)
            .flag("kubeconfig", KUBE_CONTROLLER_KUBECONFIG)
            .flag("enable-hostpath-provisioner", false)
            .flag("node-monitor-grace-period", "40s")
            .flag("pod-eviction-timeout", "5m0s")
            .flag("v", 2)
            .flag("allocate-node-cidrs", true)
            .flag("cluster-cidr", &self.service.cluster_cidr)
            .flag("service-cluster-ip-range", &self.service.service_cluster_ip_range)
            .flag("service-account-private-key-file", SERVICE_ACCOUNT_KEY_PATH)
            .flag("root-ca-file", KUBE_CA_CERT_PATH)
            .extra_args(&self.service.extra_args)
            .bind(format!("{KUBE_CONFIG_DIR}:{KUBE_CONFIG_DIR}"))
            .host_network()
    }
}

/// kube-scheduler
#[derive(Clone, Debug)]
pub struct SchedulerTemplate {
    service: SchedulerService,
}

impl SchedulerTemplate {
    /// Template for the configured scheduler
    pub fn new(service: &SchedulerService) -> Self {
        Self {
            service: service.clone(),
        }
    }
}

impl ServiceTemplate for SchedulerTemplate {
    fn service(&self) -> ServiceName {
        ServiceName::Scheduler
    }

    fn container(&self, _host: &Host, _primary: bool) -> ContainerSpec {
        ContainerSpec::new(&self.service.image)
            .command(["kube-scheduler"])
            .flag("leader-elect", true)
            .flag("v", 2)
            .flag("address", "0.0.0.0")
            .flag("kubeconfig", KUBE_SCHEDULER_KUBECONFIG)
            .extra_args(&self.service.extra_args)
            .bind(format!("{KUBE_CONFIG_DIR}:{KUBE_CONFIG_DIR}"))
            .host_network()
    }
}

/// Bring-up plan for the control plane
pub fn control_plane_up<'a>(
    control_hosts: &'a [Host],
    etcd_hosts: &[Host],
    services: &ServicesConfig,
) -> PlanePlan<'a> {
    PlanePlan::new(Role::Control, Direction::Up).stage(
        control_hosts,
        vec![
            Step::run(
                KubeApiTemplate::new(&services.kube_api, etcd_hosts, &services.etcd),
                true,
            ),
            Step::run(KubeControllerTemplate::new(&services.kube_controller), true),
            Step::run(SchedulerTemplate::new(&services.scheduler), true),
        ],
    )
}

/// Teardown plan for the control plane
pub fn control_plane_down(control_hosts: &[Host]) -> PlanePlan<'_> {
    PlanePlan::new(Role::Control, Direction::Down).stage(
        control_hosts,
        vec![
            Step::Remove(ServiceName::KubeApi),
            Step::Remove(ServiceName::KubeController),
            Step::Remove(ServiceName::Scheduler),
        ],
    )
}

impl<A: HostAgent> PlaneOrchestrator<A> {
    /// Start kube-apiserver, kube-controller-manager and kube-scheduler on
    /// every control host
    pub async fn run_control_plane(
        &self,
        control_hosts: &[Host],
        etcd_hosts: &[Host],
        services: &ServicesConfig,
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        let plan = control_plane_up(control_hosts, etcd_hosts, services);
        self.execute(&plan, cancel).await
    }

    /// Remove the control plane services from every control host
    pub async fn remove_control_plane(
        &self,
        control_hosts: &[Host],
        cancel: &CancellationToken,
    ) -> Result<PlaneReport> {
        self.execute(&control_plane_down(control_hosts), cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::{AgentError, MockHostAgent};
    use crate::Error;
    use mockall::Sequence;

    fn etcd_hosts() -> Vec<Host> {
        vec![
            Host::new("10.0.0.1", "ubuntu", &[Role::Etcd]),
            Host::new("10.0.0.2", "ubuntu", &[Role::Etcd]).with_internal_address("192.168.0.2"),
        ]
    }

    fn control_hosts() -> Vec<Host> {
        vec![
            Host::new("10.0.1.1", "ubuntu", &[Role::Control]),
            Host::new("10.0.1.2", "ubuntu", &[Role::Control]),
        ]
    }

    #[test]
    fn api_server_points_at_internal_etcd() {
        let services = ServicesConfig::default();
        let template = KubeApiTemplate::new(&services.kube_api, &etcd_hosts(), &services.etcd);
        let spec = template.container(&control_hosts()[0], true);

        assert_eq!(
            spec.flag_value("etcd-servers"),
            Some("http://10.0.0.1:2379,http://192.168.0.2:2379")
        );
        assert_eq!(spec.flag_value("etcd-cafile"), None);
        assert_eq!(spec.flag_value("advertise-address"), Some("10.0.1.1"));
        assert_eq!(
            spec.flag_value("service-cluster-ip-range"),
            Some(crate::DEFAULT_SERVICE_CLUSTER_IP_RANGE)
        );
    }

    #[test]
    fn api_server_uses_external_etcd_with_tls() {
        let mut services = ServicesConfig::default();
        services.etcd.external_urls = vec![
            "https://etcd-a:2379".to_string(),
            "https://etcd-b:2379".to_string(),
        ];
        services.etcd.path = "/ske".to_string();
        let template = KubeApiTemplate::new(&services.kube_api, &[], &services.etcd);
        let spec = template.container(&control_hosts()[0], true);

        assert_eq!(
            spec.flag_value("etcd-servers"),
            Some("https://etcd-a:2379,https://etcd-b:2379")
        );
        assert_eq!(spec.flag_value("etcd-cafile"), Some(EXTERNAL_ETCD_CA_PATH));
        assert_eq!(spec.flag_value("etcd-prefix"), Some("/ske"));
    }

    #[test]
    fn controller_manager_carries_network_ranges() {
        let spec = KubeControllerTemplate::new(&KubeControllerService::default())
            .container(&control_hosts()[0], true);
        assert_eq!(spec.flag_value("cluster-cidr"), Some(crate::DEFAULT_CLUSTER_CIDR));
        assert_eq!(spec.flag_value("leader-elect"), Some("true"));
    }

    /// Story: every control host runs the three services in order
    #[tokio::test]
    async fn story_control_plane_comes_up_host_by_host() {
        let mut mock = MockHostAgent::new();
        let mut seq = Sequence::new();
        for address in ["10.0.1.1", "10.0.1.2"] {
            for service in [
                ServiceName::KubeApi,
                ServiceName::KubeController,
                ServiceName::Scheduler,
            ] {
                mock.expect_run_service()
                    .withf(move |h, s, _, primary| {
                        h.address == address && *s == service && *primary
                    })
                    .times(1)
                    .in_sequence(&mut seq)
                    .returning(|_, _, _, _| Ok(()));
            }
        }

        let report = PlaneOrchestrator::new(mock)
            .run_control_plane(
                &control_hosts(),
                &etcd_hosts(),
                &ServicesConfig::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.role, Role::Control);
        assert_eq!(report.hosts.len(), 2);
    }

    /// Story: a failed scheduler on the second host reports the first as done
    #[tokio::test]
    async fn story_failure_on_second_host_keeps_first_converged() {
        let mut mock = MockHostAgent::new();
        mock.expect_run_service()
            .withf(|h, s, _, _| !(h.address == "10.0.1.2" && *s == ServiceName::Scheduler))
            .times(5)
            .returning(|_, _, _, _| Ok(()));
        mock.expect_run_service()
            .withf(|h, s, _, _| h.address == "10.0.1.2" && *s == ServiceName::Scheduler)
            .times(1)
            .returning(|_, _, _, _| Err(AgentError::new("port 10251 in use")));

        let err = PlaneOrchestrator::new(mock)
            .run_control_plane(
                &control_hosts(),
                &etcd_hosts(),
                &ServicesConfig::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        let Error::Convergence(failure) = err else {
            panic!("expected convergence error");
        };
        assert_eq!(failure.host, "10.0.1.2");
        assert_eq!(failure.service, ServiceName::Scheduler);
        assert_eq!(failure.completed, vec!["10.0.1.1"]);
        assert_eq!(
            failure.to_string(),
            "[controlplane] failed to start kube-scheduler on host [10.0.1.2]: port 10251 in use"
        );
    }

    #[tokio::test]
    async fn teardown_removes_all_three_services() {
        let mut mock = MockHostAgent::new();
        let mut seq = Sequence::new();
        for service in [
            ServiceName::KubeApi,
            ServiceName::KubeController,
            ServiceName::Scheduler,
        ] {
            mock.expect_remove_service()
                .withf(move |_, s| *s == service)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _| Ok(()));
        }

        PlaneOrchestrator::new(mock)
            .remove_control_plane(&control_hosts()[..1], &CancellationToken::new())
            .await
            .unwrap();
    }
}
