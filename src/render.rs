//! Offline rendering of the desired model
//!
//! Reads Service, Endpoints and Node manifests from a directory and prints
//! the load balancer model the controller would converge to. Nothing talks
//! to a cluster or to the cloud.

use std::path::Path;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use kube::ResourceExt;
use serde::Deserialize;
use tracing::debug;

use crate::builder::ModelBuilder;
use crate::cloud::MemoryCloud;
use crate::config::CloudConfig;
use crate::controller::FamilyKind;
use crate::error::{Error, Result};
use crate::manager::{Clb, Nlb};
use crate::model::BuildMode;

/// Objects read from manifest files
#[derive(Clone, Debug, Default)]
pub struct Manifests {
    pub services: Vec<Service>,
    pub endpoints: Vec<Endpoints>,
    pub nodes: Vec<Node>,
}

impl Manifests {
    /// Load every `.yaml`, `.yml` and `.json` file of `dir`
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let read_err =
            |e: std::io::Error| Error::ConfigError(format!("cannot read {}: {}", dir.display(), e));

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            let manifest = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e, "yaml" | "yml" | "json"))
                .unwrap_or(false);
            if manifest {
                paths.push(path);
            }
        }
        paths.sort();

        let mut manifests = Manifests::default();
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
            })?;
            manifests.parse(&raw).map_err(|e| {
                Error::ConfigError(format!("{}: {}", path.display(), e))
            })?;
        }
        Ok(manifests)
    }

    /// Add the objects of a (multi-document) YAML string; unknown kinds are skipped
    pub fn parse(&mut self, raw: &str) -> Result<()> {
        for doc in serde_yaml::Deserializer::from_str(raw) {
            let value = serde_yaml::Value::deserialize(doc).map_err(yaml_err)?;
            let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or_default();
            match kind {
                "Service" => self.services.push(serde_yaml::from_value(value).map_err(yaml_err)?),
                "Endpoints" => {
                    self.endpoints.push(serde_yaml::from_value(value).map_err(yaml_err)?)
                }
                "Node" => self.nodes.push(serde_yaml::from_value(value).map_err(yaml_err)?),
                "" => {}
                other => debug!("skipping manifest of kind {}", other),
            }
        }
        Ok(())
    }

    fn service(&self, namespace: &str, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| {
            s.name_any() == name && s.namespace().as_deref().unwrap_or("default") == namespace
        })
    }

    fn endpoints(&self, namespace: &str, name: &str) -> Option<&Endpoints> {
        self.endpoints.iter().find(|e| {
            e.name_any() == name && e.namespace().as_deref().unwrap_or("default") == namespace
        })
    }
}

fn yaml_err(e: serde_yaml::Error) -> Error {
    Error::ConfigError(format!("invalid manifest: {}", e))
}

/// Desired model of `namespace/name` as YAML
pub async fn render(
    manifests: &Manifests,
    namespace: &str,
    name: &str,
    config: Arc<CloudConfig>,
) -> Result<String> {
    let svc = manifests
        .service(namespace, name)
        .ok_or_else(|| {
            Error::ConfigError(format!("no Service {}/{} in manifests", namespace, name))
        })?;
    let kind = FamilyKind::of(svc).ok_or_else(|| {
        Error::ConfigError(format!(
            "Service {}/{} is not a LoadBalancer served by this controller",
            namespace, name
        ))
    })?;

    let svc = Arc::new(svc.clone());
    let endpoints = manifests.endpoints(namespace, name).cloned();
    let nodes = manifests.nodes.clone();
    // local builds never reach the cloud
    let cloud = Arc::new(MemoryCloud::new(config.region_id.clone(), config.vpc_id.clone()));

    let yaml = match kind {
        FamilyKind::Clb => {
            let builder = ModelBuilder::new(Clb::new(cloud), config);
            let ctx = builder.context(svc, endpoints, nodes);
            serde_yaml::to_string(&builder.build(&ctx, BuildMode::Local).await?)
        }
        FamilyKind::Nlb => {
            let builder = ModelBuilder::new(Nlb::new(cloud), config);
            let ctx = builder.context(svc, endpoints, nodes);
            serde_yaml::to_string(&builder.build(&ctx, BuildMode::Local).await?)
        }
    };
    yaml.map_err(yaml_err)
}
