//! Role topology derived from a cluster description

use super::host::{Host, Role};
use super::types::ClusterConfig;

/// Partition of a cluster's hosts by role
///
/// Only active hosts appear in the role lists; a host with several roles
/// appears in each matching list. Unreachable hosts are kept separately so
/// errors can name them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoleTopology {
    etcd_hosts: Vec<Host>,
    control_hosts: Vec<Host>,
    worker_hosts: Vec<Host>,
    inactive_hosts: Vec<Host>,
}

impl RoleTopology {
    /// Derive the topology from the hosts of a cluster description
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::from_hosts(&config.nodes)
    }

    /// Derive the topology from a host list, preserving its order
    pub fn from_hosts(hosts: &[Host]) -> Self {
        let mut topology = Self::default();
        for host in hosts {
            if !host.active {
                topology.inactive_hosts.push(host.clone());
                continue;
            }
            let roles = host.roles();
            if roles.contains(Role::Etcd) {
                topology.etcd_hosts.push(host.clone());
            }
            if roles.contains(Role::Control) {
                topology.control_hosts.push(host.clone());
            }
            if roles.contains(Role::Worker) {
                topology.worker_hosts.push(host.clone());
            }
        }
        topology
    }

    /// Active hosts running etcd
    pub fn etcd_hosts(&self) -> &[Host] {
        &self.etcd_hosts
    }

    /// Active hosts running the control plane
    pub fn control_hosts(&self) -> &[Host] {
        &self.control_hosts
    }

    /// Active hosts running workloads
    pub fn worker_hosts(&self) -> &[Host] {
        &self.worker_hosts
    }

    /// Hosts that failed their connectivity check
    pub fn inactive_hosts(&self) -> &[Host] {
        &self.inactive_hosts
    }

    /// Active hosts for a role
    pub fn hosts_for(&self, role: Role) -> &[Host] {
        match role {
            Role::Etcd => &self.etcd_hosts,
            Role::Control => &self.control_hosts,
            Role::Worker => &self.worker_hosts,
        }
    }

    /// Addresses of unreachable hosts that were meant to run etcd
    pub fn inactive_etcd_candidates(&self) -> Vec<&str> {
        self.inactive_hosts
            .iter()
            .filter(|h| h.has_role(Role::Etcd))
            .map(|h| h.address.as_str())
            .collect()
    }
}
