//! Cluster description validation
//!
//! Validation is a pure predicate over a [`ClusterConfig`] and its derived
//! [`RoleTopology`]. Checks run in a fixed order and the first violation is
//! returned: structural checks (etcd source, duplicate hosts) come before
//! per-host and per-service field checks.

use super::host::Host;
use super::topology::RoleTopology;
use super::types::ClusterConfig;
use crate::{Error, Result};

/// Network plugins SKE knows how to deploy
pub const SUPPORTED_NETWORK_PLUGINS: [&str; 4] = ["flannel", "calico", "canal", "weave"];

/// Istio service mesh provider
pub const ISTIO_SERVICE_MESH_PROVIDER: &str = "istio";

/// Maximum length of a DNS-1123 subdomain
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

/// Validate a cluster description and return the role topology it derives
///
/// # Errors
///
/// Returns [`Error::Validation`] describing the first violated rule.
pub fn validate_cluster(config: &ClusterConfig) -> Result<RoleTopology> {
    let topology = RoleTopology::from_config(config);
    validate_host_count(config, &topology)?;
    validate_duplicate_nodes(&config.nodes)?;
    validate_hosts_options(&config.nodes)?;
    validate_auth_options(config)?;
    validate_network_options(config)?;
    validate_ingress_options(config)?;
    validate_service_mesh_options(config)?;
    validate_services_options(config)?;
    Ok(topology)
}

/// Exactly one etcd source: internal hosts or external endpoints
fn validate_host_count(config: &ClusterConfig, topology: &RoleTopology) -> Result<()> {
    let internal = !topology.etcd_hosts().is_empty();
    let external = config.uses_external_etcd();

    if !internal && !external {
        let failed = topology.inactive_etcd_candidates();
        if !failed.is_empty() {
            return Err(Error::validation_for_field(
                "nodes",
                format!(
                    "cluster must have at least one etcd plane host: failed to connect to the following etcd host(s) [{}]",
                    failed.join(", ")
                ),
            ));
        }
        return Err(Error::validation_for_field(
            "nodes",
            "cluster must have at least one etcd plane host: please specify one or more etcd in cluster config",
        ));
    }
    if internal && external {
        return Err(Error::validation_for_field(
            "services.etcd.external_urls",
            "cluster can't have both internal and external etcd",
        ));
    }
    Ok(())
}

fn validate_duplicate_nodes(nodes: &[Host]) -> Result<()> {
    for (i, a) in nodes.iter().enumerate() {
        for b in &nodes[i + 1..] {
            if a.address == b.address {
                return Err(Error::validation_for_field(
                    "nodes",
                    format!("cluster can't have duplicate node: {}", a.address),
                ));
            }
            if let (Some(name_a), Some(name_b)) = (a.hostname_override(), b.hostname_override()) {
                if name_a == name_b {
                    return Err(Error::validation_for_field(
                        "nodes",
                        format!("cluster can't have duplicate node: {name_a}"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_hosts_options(nodes: &[Host]) -> Result<()> {
    for (i, host) in nodes.iter().enumerate() {
        let index = i + 1;
        if host.address.is_empty() {
            return Err(Error::validation_for_field(
                format!("nodes[{i}].address"),
                format!("address for host ({index}) is not provided"),
            ));
        }
        if host.user.is_empty() {
            return Err(Error::validation_for_field(
                format!("nodes[{i}].user"),
                format!("user for host ({index}) is not provided"),
            ));
        }
        if host.role.is_empty() {
            return Err(Error::validation_for_field(
                format!("nodes[{i}].role"),
                format!("role for host ({index}) is not provided"),
            ));
        }
        if let Some(name) = host.hostname_override() {
            let errs = dns1123_subdomain_errors(name);
            if !errs.is_empty() {
                return Err(Error::validation_for_field(
                    format!("nodes[{i}].hostname_override"),
                    format!(
                        "hostname_override [{name}] for host ({index}) is not valid: {}",
                        errs.join("; ")
                    ),
                ));
            }
        }
        if let Some(role) = host.unrecognized_roles().next() {
            return Err(Error::validation_for_field(
                format!("nodes[{i}].role"),
                format!("role [{role}] for host ({index}) is not recognized"),
            ));
        }
    }
    Ok(())
}

fn validate_auth_options(config: &ClusterConfig) -> Result<()> {
    let strategy = &config.authentication.strategy;
    if strategy != crate::DEFAULT_AUTH_STRATEGY {
        return Err(Error::validation_for_field(
            "authentication.strategy",
            format!("authentication strategy [{strategy}] is not supported"),
        ));
    }
    Ok(())
}

fn validate_network_options(config: &ClusterConfig) -> Result<()> {
    let plugin = config.network.plugin.as_str();
    if !SUPPORTED_NETWORK_PLUGINS.contains(&plugin) {
        return Err(Error::validation_for_field(
            "network.plugin",
            format!("network plugin [{plugin}] is not supported"),
        ));
    }
    Ok(())
}

fn validate_ingress_options(config: &ClusterConfig) -> Result<()> {
    let provider = config.ingress.provider.as_str();
    // Extend when more ingress controllers are supported
    if provider != crate::DEFAULT_INGRESS_CONTROLLER && provider != crate::NONE_PROVIDER {
        return Err(Error::validation_for_field(
            "ingress.provider",
            format!("ingress controller [{provider}] is incorrect"),
        ));
    }
    Ok(())
}

fn validate_service_mesh_options(config: &ClusterConfig) -> Result<()> {
    let provider = config.service_mesh.provider.as_str();
    if provider == crate::DEFAULT_SERVICE_MESH_PROVIDER || provider == ISTIO_SERVICE_MESH_PROVIDER
    {
        return Ok(());
    }
    Err(Error::validation_for_field(
        "service_mesh.provider",
        format!("service mesh implementation [{provider}] is incorrect"),
    ))
}

fn validate_services_options(config: &ClusterConfig) -> Result<()> {
    let services = &config.services;
    // Checked in declaration order so the reported option is deterministic
    let required: [(&str, &str, &str); 12] = [
        ("etcd_image", "services.etcd.image", services.etcd.image.as_str()),
        ("kube_api_image", "services.kube-api.image", services.kube_api.image.as_str()),
        (
            "kube_api_service_cluster_ip_range",
            "services.kube-api.service_cluster_ip_range",
            services.kube_api.service_cluster_ip_range.as_str(),
        ),
        (
            "kube_controller_image",
            "services.kube-controller.image",
            services.kube_controller.image.as_str(),
        ),
        (
            "kube_controller_service_cluster_ip_range",
            "services.kube-controller.service_cluster_ip_range",
            services.kube_controller.service_cluster_ip_range.as_str(),
        ),
        (
            "kube_controller_cluster_cidr",
            "services.kube-controller.cluster_cidr",
            services.kube_controller.cluster_cidr.as_str(),
        ),
        ("scheduler_image", "services.scheduler.image", services.scheduler.image.as_str()),
        ("kubelet_image", "services.kubelet.image", services.kubelet.image.as_str()),
        (
            "kubelet_cluster_dns_service",
            "services.kubelet.cluster_dns_server",
            services.kubelet.cluster_dns_server.as_str(),
        ),
        (
            "kubelet_cluster_domain",
            "services.kubelet.cluster_domain",
            services.kubelet.cluster_domain.as_str(),
        ),
        (
            "kubelet_infra_container_image",
            "services.kubelet.infra_container_image",
            services.kubelet.infra_container_image.as_str(),
        ),
        ("kubeproxy_image", "services.kubeproxy.image", services.kubeproxy.image.as_str()),
    ];

    for (option, field, value) in required {
        if value.is_empty() {
            return Err(Error::validation_for_field(
                field,
                format!("{} can't be empty", option.replace('_', " ")),
            ));
        }
    }

    if config.uses_external_etcd() {
        let etcd = &services.etcd;
        let tls: [(&str, &str, &str); 4] = [
            ("services.etcd.ca_cert", "external CA certificate for etcd", etcd.ca_cert.as_str()),
            ("services.etcd.cert", "external client certificate for etcd", etcd.cert.as_str()),
            ("services.etcd.key", "external client key for etcd", etcd.key.as_str()),
            ("services.etcd.path", "external etcd path", etcd.path.as_str()),
        ];
        for (field, what, value) in tls {
            if value.is_empty() {
                return Err(Error::validation_for_field(
                    field,
                    format!("{what} can't be empty"),
                ));
            }
        }
    }
    Ok(())
}

/// Problems that keep `value` from being a DNS-1123 subdomain
///
/// A subdomain is at most 253 characters of dot separated labels, each made
/// of lowercase alphanumerics and '-', starting and ending with an
/// alphanumeric.
pub fn dns1123_subdomain_errors(value: &str) -> Vec<String> {
    let mut errs = Vec::new();
    if value.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errs.push(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LENGTH} characters"
        ));
    }
    let valid_label = |label: &str| {
        let bytes = label.as_bytes();
        let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                alnum(first) && alnum(last) && bytes.iter().all(|b| alnum(b) || *b == b'-')
            }
            _ => false,
        }
    };
    if !value.split('.').all(valid_label) {
        errs.push(
            "a DNS-1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', \
             and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Role;

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn host(address: &str, roles: &[Role]) -> Host {
        Host::new(address, "ubuntu", roles)
    }

    fn config_with(nodes: Vec<Host>) -> ClusterConfig {
        ClusterConfig {
            nodes,
            ..Default::default()
        }
    }

    fn three_node_config() -> ClusterConfig {
        config_with(vec![
            host("10.0.0.1", &[Role::Etcd]),
            host("10.0.0.2", &[Role::Control]),
            host("10.0.0.3", &[Role::Worker]),
        ])
    }

    fn external_etcd(config: &mut ClusterConfig) {
        let etcd = &mut config.services.etcd;
        etcd.external_urls = vec!["https://etcd.example.com:2379".to_string()];
        etcd.ca_cert = "ca-pem".to_string();
        etcd.cert = "cert-pem".to_string();
        etcd.key = "key-pem".to_string();
    }

    fn validate(config: &ClusterConfig) -> Result<()> {
        validate_cluster(config).map(drop)
    }

    fn message(result: Result<()>) -> String {
        result.unwrap_err().to_string()
    }

    // =========================================================================
    // Etcd Topology Stories
    // =========================================================================

    /// Story: a cluster with one etcd, control and worker host is legal
    #[test]
    fn story_valid_cluster_passes() {
        assert!(validate(&three_node_config()).is_ok());
    }

    /// Story: the returned topology is the one derived from the validated description
    #[test]
    fn story_valid_cluster_yields_its_own_topology() {
        let mut config = three_node_config();
        config.nodes.push(host("10.0.0.4", &[Role::Worker]));
        config.mark_unreachable(&["10.0.0.4"]);

        let topology = validate_cluster(&config).unwrap();
        assert_eq!(topology, RoleTopology::from_config(&config));
        assert_eq!(topology.worker_hosts().len(), 1);
        assert_eq!(topology.inactive_hosts()[0].address, "10.0.0.4");
    }

    /// Story: validation is a pure function of its input
    #[test]
    fn story_validation_is_deterministic() {
        let mut config = three_node_config();
        config.network.plugin = "cilium".to_string();
        let first = message(validate(&config));
        for _ in 0..5 {
            assert_eq!(message(validate(&config)), first);
        }
    }

    /// Story: a cluster without any etcd source is rejected
    #[test]
    fn story_no_etcd_source_fails() {
        let config = config_with(vec![host("10.0.0.2", &[Role::Control, Role::Worker])]);
        let msg = message(validate(&config));
        assert!(msg.contains("at least one etcd plane host"));
        assert!(msg.contains("please specify one or more etcd"));
    }

    /// Story: unreachable etcd candidates are named to aid diagnosis
    #[test]
    fn story_unreachable_etcd_hosts_are_listed() {
        let mut config = config_with(vec![
            host("10.0.0.1", &[Role::Etcd]),
            host("10.0.0.2", &[Role::Control, Role::Worker]),
            host("10.0.0.3", &[Role::Etcd]),
            host("10.0.0.4", &[Role::Worker]),
        ]);
        config.mark_unreachable(&["10.0.0.1", "10.0.0.3", "10.0.0.4"]);

        let msg = message(validate(&config));
        assert!(msg.contains("failed to connect"));
        assert!(msg.contains("10.0.0.1"));
        assert!(msg.contains("10.0.0.3"));
        assert!(!msg.contains("10.0.0.4"), "non-etcd hosts aren't candidates");
    }

    /// Story: an unreachable worker alone doesn't change the generic message
    #[test]
    fn story_unreachable_non_etcd_host_gives_generic_error() {
        let mut config = config_with(vec![host("10.0.0.4", &[Role::Worker])]);
        config.mark_unreachable(&["10.0.0.4"]);
        assert!(message(validate(&config)).contains("please specify one or more etcd"));
    }

    /// Story: internal and external etcd can't be mixed
    #[test]
    fn story_internal_and_external_etcd_conflict() {
        let mut config = three_node_config();
        external_etcd(&mut config);
        assert!(message(validate(&config)).contains("both internal and external etcd"));
    }

    /// Story: external etcd alone satisfies the etcd topology check
    #[test]
    fn story_external_etcd_only_passes() {
        let mut config = config_with(vec![host("10.0.0.2", &[Role::Control, Role::Worker])]);
        external_etcd(&mut config);
        assert!(validate(&config).is_ok());
    }

    /// Story: external etcd requires all of its TLS material
    #[test]
    fn story_external_etcd_requires_tls_material() {
        let cases: [(fn(&mut ClusterConfig), &str); 4] = [
            (|c: &mut ClusterConfig| c.services.etcd.ca_cert.clear(), "external CA certificate"),
            (|c: &mut ClusterConfig| c.services.etcd.cert.clear(), "external client certificate"),
            (|c: &mut ClusterConfig| c.services.etcd.key.clear(), "external client key"),
            (|c: &mut ClusterConfig| c.services.etcd.path.clear(), "external etcd path"),
        ];
        for (break_it, expected) in cases {
            let mut config = config_with(vec![host("10.0.0.2", &[Role::Control])]);
            external_etcd(&mut config);
            break_it(&mut config);
            let msg = message(validate(&config));
            assert!(msg.contains(expected), "expected '{expected}' in '{msg}'");
        }
    }

    // =========================================================================
    // Duplicate Node Stories
    // =========================================================================

    /// Story: duplicate addresses are rejected regardless of position
    #[test]
    fn story_duplicate_address_fails_in_any_order() {
        for nodes in [
            vec![
                host("10.0.0.1", &[Role::Etcd]),
                host("10.0.0.1", &[Role::Worker]),
                host("10.0.0.2", &[Role::Control]),
            ],
            vec![
                host("10.0.0.2", &[Role::Control]),
                host("10.0.0.1", &[Role::Worker]),
                host("10.0.0.1", &[Role::Etcd]),
            ],
        ] {
            let msg = message(validate(&config_with(nodes)));
            assert!(msg.contains("duplicate node: 10.0.0.1"), "{msg}");
        }
    }

    /// Story: duplicate hostname overrides are rejected
    #[test]
    fn story_duplicate_hostname_override_fails() {
        let config = config_with(vec![
            host("10.0.0.1", &[Role::Etcd]).with_hostname_override("node-a"),
            host("10.0.0.2", &[Role::Control]).with_hostname_override("node-a"),
        ]);
        assert!(message(validate(&config)).contains("duplicate node: node-a"));
    }

    /// Story: hosts without an override never collide with each other
    #[test]
    fn story_missing_hostname_overrides_are_not_duplicates() {
        let config = config_with(vec![
            host("10.0.0.1", &[Role::Etcd]),
            host("10.0.0.2", &[Role::Control]).with_hostname_override(""),
            host("10.0.0.3", &[Role::Worker]).with_hostname_override("node-c"),
        ]);
        assert!(validate(&config).is_ok());
    }

    /// Story: duplicates are reported before per-host field problems
    #[test]
    fn story_duplicates_are_checked_before_host_fields() {
        let mut config = config_with(vec![
            host("10.0.0.1", &[Role::Etcd]),
            host("10.0.0.1", &[Role::Worker]),
        ]);
        config.nodes[1].user.clear();
        assert!(message(validate(&config)).contains("duplicate node"));
    }

    // =========================================================================
    // Host Option Stories
    // =========================================================================

    #[test]
    fn test_missing_user_names_host_index() {
        let mut config = three_node_config();
        config.nodes[2].user.clear();
        assert!(message(validate(&config)).contains("user for host (3) is not provided"));
    }

    #[test]
    fn test_missing_address_fails() {
        let mut config = three_node_config();
        config.nodes.push(host("", &[Role::Worker]));
        assert!(message(validate(&config)).contains("address for host (4) is not provided"));
    }

    #[test]
    fn test_missing_roles_fail() {
        let mut config = three_node_config();
        config.nodes.push(host("10.0.0.4", &[]));
        assert!(message(validate(&config)).contains("role for host (4) is not provided"));
    }

    /// Story: a single unknown role string fails the whole cluster
    #[test]
    fn story_unrecognized_role_fails() {
        let mut config = three_node_config();
        config.nodes[1].role.push("master".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("role [master] for host (2) is not recognized"));
        match err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("nodes[1].role")),
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: any combination of the canonical roles is legal on one host
    #[test]
    fn story_canonical_role_combinations_pass() {
        let combos: [&[Role]; 4] = [
            &[Role::Etcd],
            &[Role::Etcd, Role::Control],
            &[Role::Etcd, Role::Worker],
            &[Role::Etcd, Role::Control, Role::Worker],
        ];
        for roles in combos {
            assert!(validate(&config_with(vec![host("10.0.0.1", roles)])).is_ok());
        }
    }

    #[test]
    fn test_invalid_hostname_override_fails() {
        let mut config = three_node_config();
        config.nodes[0] = host("10.0.0.1", &[Role::Etcd]).with_hostname_override("Node_1");
        let msg = message(validate(&config));
        assert!(msg.contains("hostname_override [Node_1] for host (1) is not valid"));
    }

    #[test]
    fn test_dns1123_subdomain_rules() {
        assert!(dns1123_subdomain_errors("node-1").is_empty());
        assert!(dns1123_subdomain_errors("node-1.example.com").is_empty());
        assert!(dns1123_subdomain_errors("1node").is_empty());
        assert!(!dns1123_subdomain_errors("-node").is_empty());
        assert!(!dns1123_subdomain_errors("node-").is_empty());
        assert!(!dns1123_subdomain_errors("Node").is_empty());
        assert!(!dns1123_subdomain_errors("node..example").is_empty());
        assert!(!dns1123_subdomain_errors("node_1").is_empty());
        assert!(!dns1123_subdomain_errors(&"a".repeat(254)).is_empty());
    }

    // =========================================================================
    // Provider Option Stories
    // =========================================================================

    #[test]
    fn test_unsupported_auth_strategy_is_named() {
        let mut config = three_node_config();
        config.authentication.strategy = "oidc".to_string();
        assert!(message(validate(&config)).contains("authentication strategy [oidc] is not supported"));
    }

    #[test]
    fn test_supported_network_plugins_pass() {
        for plugin in SUPPORTED_NETWORK_PLUGINS {
            let mut config = three_node_config();
            config.network.plugin = plugin.to_string();
            assert!(validate(&config).is_ok(), "{plugin} should be supported");
        }
    }

    #[test]
    fn test_unsupported_network_plugin_is_named() {
        let mut config = three_node_config();
        config.network.plugin = "cilium".to_string();
        assert!(message(validate(&config)).contains("network plugin [cilium] is not supported"));
    }

    #[test]
    fn test_ingress_provider_whitelist() {
        let mut config = three_node_config();
        config.ingress.provider = "none".to_string();
        assert!(validate(&config).is_ok());
        config.ingress.provider = "traefik".to_string();
        assert!(message(validate(&config)).contains("ingress controller [traefik] is incorrect"));
    }

    #[test]
    fn test_service_mesh_provider_whitelist() {
        let mut config = three_node_config();
        config.service_mesh.provider = "istio".to_string();
        assert!(validate(&config).is_ok());
        config.service_mesh.provider = "linkerd".to_string();
        assert!(message(validate(&config))
            .contains("service mesh implementation [linkerd] is incorrect"));
    }

    /// Story: checks run in order, so auth is reported before network
    #[test]
    fn story_first_violation_wins() {
        let mut config = three_node_config();
        config.authentication.strategy = "oidc".to_string();
        config.network.plugin = "cilium".to_string();
        config.service_mesh.provider = "linkerd".to_string();
        assert!(message(validate(&config)).contains("authentication strategy"));
    }

    // =========================================================================
    // Service Option Stories
    // =========================================================================

    #[test]
    fn test_empty_service_option_is_named() {
        let mut config = three_node_config();
        config.services.kube_api.service_cluster_ip_range.clear();
        let err = validate(&config).unwrap_err();
        assert!(err
            .to_string()
            .contains("kube api service cluster ip range can't be empty"));
        match err {
            Error::Validation { field, .. } => assert_eq!(
                field.as_deref(),
                Some("services.kube-api.service_cluster_ip_range")
            ),
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_every_required_service_option_is_checked() {
        let cases: [(fn(&mut ClusterConfig), &str); 12] = [
            (|c: &mut ClusterConfig| c.services.etcd.image.clear(), "etcd image"),
            (|c: &mut ClusterConfig| c.services.kube_api.image.clear(), "kube api image"),
            (
                |c: &mut ClusterConfig| c.services.kube_api.service_cluster_ip_range.clear(),
                "kube api service cluster ip range",
            ),
            (|c: &mut ClusterConfig| c.services.kube_controller.image.clear(), "kube controller image"),
            (
                |c: &mut ClusterConfig| c.services.kube_controller.service_cluster_ip_range.clear(),
                "kube controller service cluster ip range",
            ),
            (
                |c: &mut ClusterConfig| c.services.kube_controller.cluster_cidr.clear(),
                "kube controller cluster cidr",
            ),
            (|c: &mut ClusterConfig| c.services.scheduler.image.clear(), "scheduler image"),
            (|c: &mut ClusterConfig| c.services.kubelet.image.clear(), "kubelet image"),
            (
                |c: &mut ClusterConfig| c.services.kubelet.cluster_dns_server.clear(),
                "kubelet cluster dns service",
            ),
            (|c: &mut ClusterConfig| c.services.kubelet.cluster_domain.clear(), "kubelet cluster domain"),
            (
                |c: &mut ClusterConfig| c.services.kubelet.infra_container_image.clear(),
                "kubelet infra container image",
            ),
            (|c: &mut ClusterConfig| c.services.kubeproxy.image.clear(), "kubeproxy image"),
        ];
        for (break_it, expected) in cases {
            let mut config = three_node_config();
            break_it(&mut config);
            let msg = message(validate(&config));
            assert!(msg.contains(&format!("{expected} can't be empty")), "{msg}");
        }
    }

    #[test]
    fn test_internal_etcd_ignores_external_tls_fields() {
        let mut config = three_node_config();
        config.services.etcd.path.clear();
        assert!(validate(&config).is_ok());
    }
}
