//! Addon manifest rendering
//!
//! Addons are Kubernetes manifests rendered from built-in minijinja templates.
//! Undefined variables fail rendering instead of producing empty strings.

mod istio;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

pub use istio::{istio_manifest, IstioConfig, MtlsMode};

use crate::cluster::ClusterConfig;
use crate::{Error, Result};

/// Built-in addon templates
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddonTemplate {
    /// Istio service mesh control plane
    Istio,
}

impl AddonTemplate {
    /// Every built-in template
    pub const ALL: [AddonTemplate; 1] = [AddonTemplate::Istio];

    /// Template name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Istio => "istio",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Istio => include_str!("templates/istio.yaml.j2"),
        }
    }
}

/// Renders built-in addon templates
pub struct AddonRenderer {
    env: Environment<'static>,
}

impl AddonRenderer {
    /// Renderer with every built-in template loaded
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for template in AddonTemplate::ALL {
            env.add_template(template.name(), template.source())
                .map_err(|e| Error::template_for(template.name(), e.to_string()))?;
        }
        Ok(Self { env })
    }

    /// Render `template` with `config` as its context
    pub fn render(&self, template: AddonTemplate, config: &impl Serialize) -> Result<String> {
        let name = template.name();
        self.env
            .get_template(name)
            .and_then(|t| t.render(config))
            .map_err(|e| Error::template_for(name, e.to_string()))
    }
}

/// Manifests of every addon enabled in `config`, as (name, manifest) pairs
pub fn enabled_addons(config: &ClusterConfig) -> Result<Vec<(&'static str, String)>> {
    let mut manifests = Vec::new();
    if let Some(manifest) = istio_manifest(config)? {
        manifests.push((AddonTemplate::Istio.name(), manifest));
    }
    Ok(manifests)
}
