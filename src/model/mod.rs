//! Desired/observed load balancer models
//!
//! A model is built twice per reconcile pass: once from the Service (local)
//! and once from the cloud (remote). Both have the same shape so the
//! reconciler can compare them field by field.

pub mod clb;
mod named_key;
pub mod nlb;
pub mod types;

use serde::{Deserialize, Serialize};

pub use clb::{HealthCheck, ListenerAttribute, LoadBalancer, LoadBalancerAttribute, VServerGroup};
pub use named_key::{KeyPort, NamedKey, DEFAULT_PREFIX};
pub use nlb::{
    NetworkLoadBalancer, NlbAttribute, NlbHealthCheck, NlbListener, ServerGroup, ServerGroupType,
    ZoneMapping,
};
pub use types::*;

/// Default weight of a backend when no weight annotation is set
pub const DEFAULT_SERVER_WEIGHT: i32 = 100;

/// A server registered in a vserver group (CLB) or server group (NLB)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Backend {
    /// ECS instance id or ENI id; empty for ENI backends not yet resolved
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub server_ip: String,
    pub port: i32,
    pub weight: i32,
    #[serde(rename = "Type")]
    pub backend_type: BackendType,
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    pub node_name: Option<String>,
}

impl Backend {
    /// Identity of a backend inside a group, ignoring weight
    pub fn identity(&self) -> (String, i32) {
        let server = match self.backend_type {
            BackendType::Ecs => self.server_id.clone(),
            BackendType::Eni | BackendType::Eci => self.server_ip.clone(),
        };
        (server, self.port)
    }
}

/// Whether a model is built from the Service or read from the cloud
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Local,
    Remote,
}
