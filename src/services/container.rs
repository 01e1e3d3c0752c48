//! Container definitions produced for each service on each host

use std::collections::BTreeMap;

use serde::Serialize;

use super::ServiceName;
use crate::cluster::Host;

/// Desired container for a service on one host
///
/// Agents compare this against what is running and recreate the container
/// when they differ.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    /// Image reference
    pub image: String,
    /// Entrypoint override
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment as `KEY=value`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Bind mounts as `host:container[:mode]`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    /// Share the host network namespace
    pub host_network: bool,
    /// Share the host PID namespace
    pub host_pid: bool,
    /// Run privileged
    pub privileged: bool,
}

impl ContainerSpec {
    /// Container running `image` with nothing else set
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the entrypoint
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `--name=value`
    pub fn flag(self, name: &str, value: impl std::fmt::Display) -> Self {
        self.arg(format!("--{name}={value}"))
    }

    /// Append an environment variable
    pub fn env(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    /// Append a bind mount
    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.binds.push(bind.into());
        self
    }

    /// Use the host network namespace
    pub fn host_network(mut self) -> Self {
        self.host_network = true;
        self
    }

    /// Use the host PID namespace
    pub fn host_pid(mut self) -> Self {
        self.host_pid = true;
        self
    }

    /// Run privileged
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Apply user supplied `extra_args`
    ///
    /// An extra arg replaces a generated `--key=...` flag of the same name;
    /// unknown keys are appended in key order.
    pub fn extra_args(mut self, extra: &BTreeMap<String, String>) -> Self {
        for (key, value) in extra {
            let prefix = format!("--{key}=");
            let flag = format!("{prefix}{value}");
            match self.args.iter_mut().find(|a| a.starts_with(&prefix)) {
                Some(existing) => *existing = flag,
                None => self.args.push(flag),
            }
        }
        self
    }

    /// Value of a `--name=value` argument
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{name}=");
        self.args.iter().find_map(|a| a.strip_prefix(&prefix))
    }
}

/// Builds the desired container of one service for a given host
///
/// `primary` is true when the host is converged as part of the control plane
/// stage, so node components can register it as a master.
pub trait ServiceTemplate: Send + Sync {
    /// Service this template builds
    fn service(&self) -> ServiceName;

    /// Desired container on `host`
    fn container(&self, host: &Host, primary: bool) -> ContainerSpec;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_args_override_generated_flags_in_place() {
        let extra = BTreeMap::from([
            ("v".to_string(), "4".to_string()),
            ("allow-privileged".to_string(), "false".to_string()),
        ]);
        let spec = ContainerSpec::new("img")
            .flag("allow-privileged", true)
            .flag("v", 2)
            .arg("--anonymous-auth")
            .extra_args(&extra);

        assert_eq!(
            spec.args,
            vec!["--allow-privileged=false", "--v=4", "--anonymous-auth"]
        );
    }

    #[test]
    fn extra_args_append_unknown_flags() {
        let extra = BTreeMap::from([("feature-gates".to_string(), "A=true".to_string())]);
        let spec = ContainerSpec::new("img").flag("v", 2).extra_args(&extra);
        assert_eq!(spec.flag_value("feature-gates"), Some("A=true"));
        assert_eq!(spec.args.len(), 2);
    }

    #[test]
    fn flag_value_matches_whole_name() {
        let spec = ContainerSpec::new("img").flag("service-cluster-ip-range", "10.43.0.0/16");
        assert_eq!(spec.flag_value("service-cluster-ip-range"), Some("10.43.0.0/16"));
        assert_eq!(spec.flag_value("service"), None);
    }
}
