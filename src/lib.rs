//! SKE - Kubernetes engine for host-based clusters
//!
//! SKE takes a cluster description (a list of hosts, each tagged with one or more
//! roles) and turns it into running Kubernetes components on those hosts.
//!
//! # Architecture
//!
//! Provisioning happens in two phases:
//! - The cluster description is validated as a whole before any host is touched
//! - Each role plane (etcd, control, worker) is converged through the same
//!   fail-fast sequencer, one stage of hosts at a time
//!
//! # Modules
//!
//! - [`cluster`] - Cluster description, role topology and validation
//! - [`hosts`] - The [`hosts::HostAgent`] capability and the agents shipped with SKE
//! - [`services`] - Service definitions and the plane orchestrator
//! - [`addons`] - Addon manifest rendering (service mesh)
//! - [`logger`] - Logging capability injected into the orchestrator
//! - [`retry`] - Exponential backoff for transient host failures
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod addons;
pub mod cluster;
pub mod error;
pub mod hosts;
pub mod logger;
pub mod retry;
pub mod services;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Defaults applied to absent fields of the cluster description. Explicitly
// empty values are kept so validation can reject them.

/// The only authentication strategy currently supported
pub const DEFAULT_AUTH_STRATEGY: &str = "x509";

/// Network plugin used when the cluster description doesn't choose one
pub const DEFAULT_NETWORK_PLUGIN: &str = "canal";

/// Ingress controller deployed by default
pub const DEFAULT_INGRESS_CONTROLLER: &str = "nginx";

/// Sentinel used to disable the ingress controller or the service mesh
pub const NONE_PROVIDER: &str = "none";

/// Service mesh provider used when the cluster description doesn't choose one
pub const DEFAULT_SERVICE_MESH_PROVIDER: &str = NONE_PROVIDER;

/// Default range for Kubernetes service cluster IPs
pub const DEFAULT_SERVICE_CLUSTER_IP_RANGE: &str = "10.43.0.0/16";

/// Default pod network CIDR
pub const DEFAULT_CLUSTER_CIDR: &str = "10.42.0.0/16";

/// Default address of the cluster DNS service
pub const DEFAULT_CLUSTER_DNS_SERVER: &str = "10.43.0.10";

/// Default cluster DNS domain
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
