//! Hosts and the roles they carry

use serde::{Deserialize, Serialize};

/// Role a host plays in the cluster
///
/// Serialized with the names used in the cluster description:
/// `etcd`, `controlplane`, `worker`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Role {
    /// Runs an etcd member
    #[serde(rename = "etcd")]
    Etcd,
    /// Runs the Kubernetes control plane (and also acts as a node)
    #[serde(rename = "controlplane")]
    Control,
    /// Runs application workloads
    #[serde(rename = "worker")]
    Worker,
}

impl Role {
    /// Every recognized role, in plane bring-up order
    pub const ALL: [Role; 3] = [Role::Etcd, Role::Control, Role::Worker];

    /// Name of the role as written in the cluster description
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Etcd => "etcd",
            Self::Control => "controlplane",
            Self::Worker => "worker",
        }
    }

    /// Human readable plane name used in log messages
    pub fn plane_name(&self) -> &'static str {
        match self {
            Self::Etcd => "etcd Plane",
            Self::Control => "Control Plane",
            Self::Worker => "Worker Plane",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Etcd => 0b001,
            Self::Control => 0b010,
            Self::Worker => 0b100,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "etcd" => Ok(Self::Etcd),
            "controlplane" => Ok(Self::Control),
            "worker" => Ok(Self::Worker),
            _ => Err(crate::Error::validation(format!(
                "role [{s}] is not recognized, expected one of: etcd, controlplane, worker"
            ))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of roles held by a single host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u8);

impl RoleSet {
    /// Empty role set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Add a role to the set
    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    /// Returns true if the set holds the role
    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    /// Returns true if no role is held
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Roles in the set, in plane order
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|r| self.contains(*r))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = Self::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

fn active_by_default() -> bool {
    true
}

/// A machine under management
///
/// Role strings are kept exactly as written in the cluster description so that
/// validation can report names it doesn't recognize. Use [`Host::roles`] for
/// the typed view.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Host {
    /// Address used to reach the host
    #[serde(default)]
    pub address: String,

    /// Address used for intra-cluster traffic (defaults to `address`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_address: Option<String>,

    /// Remote user
    #[serde(default)]
    pub user: String,

    /// Roles assigned to the host
    #[serde(default)]
    pub role: Vec<String>,

    /// Name the host registers with inside the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname_override: Option<String>,

    /// SSH private key used by transport-level agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<String>,

    /// Whether the host answered the last connectivity check
    #[serde(skip, default = "active_by_default")]
    pub active: bool,
}

impl Host {
    /// Create an active host with the given roles
    pub fn new(address: impl Into<String>, user: impl Into<String>, roles: &[Role]) -> Self {
        Self {
            address: address.into(),
            internal_address: None,
            user: user.into(),
            role: roles.iter().map(|r| r.as_str().to_string()).collect(),
            hostname_override: None,
            ssh_key_path: None,
            active: true,
        }
    }

    /// Set the hostname override
    pub fn with_hostname_override(mut self, name: impl Into<String>) -> Self {
        self.hostname_override = Some(name.into());
        self
    }

    /// Set the internal address
    pub fn with_internal_address(mut self, address: impl Into<String>) -> Self {
        self.internal_address = Some(address.into());
        self
    }

    /// Recognized roles of this host; unrecognized strings are skipped
    pub fn roles(&self) -> RoleSet {
        self.role.iter().filter_map(|r| r.parse().ok()).collect()
    }

    /// Returns true if the host carries the role
    pub fn has_role(&self, role: Role) -> bool {
        self.roles().contains(role)
    }

    /// Role strings that aren't one of the recognized roles
    pub fn unrecognized_roles(&self) -> impl Iterator<Item = &str> {
        self.role
            .iter()
            .map(String::as_str)
            .filter(|r| r.parse::<Role>().is_err())
    }

    /// Hostname override, if set to a non-empty value
    pub fn hostname_override(&self) -> Option<&str> {
        self.hostname_override.as_deref().filter(|h| !h.is_empty())
    }

    /// Name the host is known by inside the cluster
    pub fn node_name(&self) -> &str {
        self.hostname_override().unwrap_or(&self.address)
    }

    /// Address used for intra-cluster traffic
    pub fn internal_address(&self) -> &str {
        self.internal_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.address)
    }
}
