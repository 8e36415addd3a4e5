//! Controller configuration
//!
//! [`CloudConfig`] describes the cluster and its cloud account. It is loaded
//! once at startup and handed to the model builders explicitly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AddressType, TrafficPolicy};

fn default_spec() -> String {
    "slb.s1.small".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Cluster-wide cloud settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    /// May be left out of the file and given on the command line
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub region_id: String,
    pub vpc_id: String,

    /// Default vswitch for intranet load balancers
    #[serde(default)]
    pub vswitch_id: String,

    #[serde(default)]
    pub zone_id: Option<String>,

    #[serde(default)]
    pub default_address_type: AddressType,

    #[serde(default = "default_spec")]
    pub default_spec: String,

    /// Pods are registered directly when the cluster network gives them
    /// VPC addresses
    #[serde(default)]
    pub eni_backends: bool,

    #[serde(default)]
    pub resource_group_id: Option<String>,

    /// Base URL of the cloud RPC gateway
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl CloudConfig {
    /// Load from a YAML (or JSON) file; [`validate`](Self::validate) once
    /// command-line overrides are applied
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: CloudConfig = serde_yaml::from_str(&raw).map_err(|e| {
            Error::ConfigError(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.is_empty() {
            return Err(Error::ConfigError("clusterId must be set".to_string()));
        }
        if self.cluster_id.contains('.') {
            return Err(Error::ConfigError(format!(
                "clusterId [{}] must not contain '.'",
                self.cluster_id
            )));
        }
        if self.region_id.is_empty() {
            return Err(Error::ConfigError("regionId must be set".to_string()));
        }
        if self.vpc_id.is_empty() {
            return Err(Error::ConfigError("vpcId must be set".to_string()));
        }
        Ok(())
    }

    /// Backend enumeration used when a Service does not pick one itself
    pub fn default_backend_policy(&self) -> Option<TrafficPolicy> {
        self.eni_backends.then_some(TrafficPolicy::Eni)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            region_id: String::new(),
            vpc_id: String::new(),
            vswitch_id: String::new(),
            zone_id: None,
            default_address_type: AddressType::default(),
            default_spec: default_spec(),
            eni_backends: false,
            resource_group_id: None,
            endpoint: String::new(),
            access_token: None,
            request_timeout_secs: default_timeout_secs(),
        }
    }
}
