//! Per-reconcile request context

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Node, Service, ServicePort};
use kube::ResourceExt;

use crate::annotation::{keys, AnnotationRequest};
use crate::config::CloudConfig;
use crate::error::Result;
use crate::model::{KeyPort, NamedKey};

/// One Service plus its parsed annotations, read-only for one pass
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub service: Arc<Service>,
    pub anno: AnnotationRequest,
    pub config: Arc<CloudConfig>,
    /// Endpoints of the Service, if any exist yet
    pub endpoints: Option<Endpoints>,
    /// Every node of the cluster, before exclusion rules
    pub nodes: Vec<Node>,
}

impl RequestContext {
    pub fn new(service: Arc<Service>, config: Arc<CloudConfig>) -> Self {
        let anno = AnnotationRequest::new(&service);
        Self {
            service,
            anno,
            config,
            endpoints: None,
            nodes: Vec::new(),
        }
    }

    /// Attach the backend inputs observed for this pass
    pub fn with_backends(mut self, endpoints: Option<Endpoints>, nodes: Vec<Node>) -> Self {
        self.endpoints = endpoints;
        self.nodes = nodes;
        self
    }

    pub fn ports(&self) -> Vec<ServicePort> {
        self.service
            .spec
            .as_ref()
            .and_then(|s| s.ports.clone())
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.service.name_any()
    }

    pub fn namespace(&self) -> String {
        self.service.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// `namespace/name`, used in log lines and model identity
    pub fn namespaced_name(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }

    pub fn cluster_id(&self) -> &str {
        &self.config.cluster_id
    }

    /// Ownership key of this Service for the given port
    pub fn named_key(&self, port: impl Into<KeyPort>) -> NamedKey {
        NamedKey::new(self.cluster_id(), self.namespace(), self.name(), port)
    }

    /// The load balancer was referenced by id instead of created
    pub fn is_reused(&self) -> bool {
        self.anno.has(keys::LOAD_BALANCER_ID)
    }

    /// Listeners on a reused load balancer may be overwritten
    pub fn override_listeners(&self) -> Result<bool> {
        Ok(self
            .anno
            .parse::<bool>(keys::OVERRIDE_LISTENER)?
            .unwrap_or(false))
    }
}
