//! Istio service mesh addon

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AddonRenderer, AddonTemplate};
use crate::cluster::{ClusterConfig, ISTIO_SERVICE_MESH_PROVIDER};
use crate::{Error, Result, NONE_PROVIDER};

const DEFAULT_NAMESPACE: &str = "istio-system";
const DEFAULT_VERSION: &str = "0.8.0";
const DEFAULT_HUB: &str = "docker.io/istio";

/// Mutual TLS mode applied mesh-wide
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MtlsMode {
    /// Only mTLS traffic is accepted
    Strict,
    /// Plaintext and mTLS are both accepted
    #[default]
    Permissive,
    /// mTLS is off
    Disable,
}

impl std::str::FromStr for MtlsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" | "true" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            "disable" | "disabled" | "false" => Ok(Self::Disable),
            other => Err(Error::validation_for_field(
                "service_mesh.options.mtls",
                format!("mtls mode [{other}] is not supported"),
            )),
        }
    }
}

/// Settings rendered into the Istio manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IstioConfig {
    /// Namespace of the mesh control plane
    pub namespace: String,
    /// Istio release
    pub version: String,
    /// Image registry prefix
    pub hub: String,
    /// Mesh-wide mutual TLS
    pub mtls: MtlsMode,
    /// Pilot replicas
    pub pilot_replicas: u32,
}

impl Default for IstioConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            hub: DEFAULT_HUB.to_string(),
            mtls: MtlsMode::default(),
            pilot_replicas: 1,
        }
    }
}

impl IstioConfig {
    /// Build from `service_mesh.options`; unknown keys are ignored
    pub fn from_options(options: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "namespace" => config.namespace = value.clone(),
                "version" => config.version = value.clone(),
                "hub" => config.hub = value.trim_end_matches('/').to_string(),
                "mtls" => config.mtls = value.parse()?,
                "pilot_replicas" => {
                    config.pilot_replicas = value.parse().map_err(|_| {
                        Error::validation_for_field(
                            "service_mesh.options.pilot_replicas",
                            format!("pilot replicas [{value}] is not a number"),
                        )
                    })?
                }
                _ => {}
            }
        }
        Ok(config)
    }
}

/// Istio manifest for `config`, or `None` when no mesh is enabled
pub fn istio_manifest(config: &ClusterConfig) -> Result<Option<String>> {
    let mesh = &config.service_mesh;
    match mesh.provider.as_str() {
        NONE_PROVIDER => Ok(None),
        ISTIO_SERVICE_MESH_PROVIDER => {
            let istio = IstioConfig::from_options(&mesh.options)?;
            AddonRenderer::new()?
                .render(AddonTemplate::Istio, &istio)
                .map(Some)
        }
        other => Err(Error::validation_for_field(
            "service_mesh.provider",
            format!("service mesh provider [{other}] is not supported"),
        )),
    }
}
