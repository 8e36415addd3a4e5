//! Node eligibility rules
//!
//! A node is a load balancer backend only if none of the exclusion rules
//! apply. Virtual-kubelet nodes are kept: their pods are registered by IP,
//! so readiness of the virtual node itself does not matter.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

use crate::error::{Error, Result};

pub const LABEL_NODE_ROLE_MASTER: &str = "node-role.kubernetes.io/master";
pub const LABEL_NODE_ROLE_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";
pub const LABEL_EXCLUDE_BALANCER: &str = "alpha.service-controller.kubernetes.io/exclude-balancer";
pub const LABEL_EXCLUDE_FROM_EXTERNAL_LB: &str =
    "node.kubernetes.io/exclude-from-external-load-balancers";
pub const LABEL_NODE_TYPE: &str = "type";
pub const NODE_TYPE_VIRTUAL_KUBELET: &str = "virtual-kubelet";
pub const TAINT_TO_BE_DELETED: &str = "ToBeDeletedByClusterAutoscaler";

/// Service-level switches that narrow the node set
#[derive(Clone, Debug, Default)]
pub struct NodeFilter {
    pub remove_unscheduled: bool,
    pub backend_label: BTreeMap<String, String>,
}

impl NodeFilter {
    /// Why `node` must not receive traffic, or `None` if it is eligible
    pub fn exclusion_reason(&self, node: &Node) -> Option<&'static str> {
        let labels = node.labels();
        if labels.contains_key(LABEL_NODE_ROLE_MASTER)
            || labels.contains_key(LABEL_NODE_ROLE_CONTROL_PLANE)
        {
            return Some("master node");
        }
        if labels.contains_key(LABEL_EXCLUDE_BALANCER)
            || labels.contains_key(LABEL_EXCLUDE_FROM_EXTERNAL_LB)
        {
            return Some("exclude-balancer label");
        }
        if self.remove_unscheduled && is_unschedulable(node) {
            return Some("unschedulable");
        }
        if has_taint(node, TAINT_TO_BE_DELETED) {
            return Some("to be deleted by cluster autoscaler");
        }
        if !self
            .backend_label
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
        {
            return Some("backend-label mismatch");
        }
        if is_virtual_node(node) {
            return None;
        }
        if !is_ready(node) {
            return Some("not ready");
        }
        None
    }
}

pub fn is_virtual_node(node: &Node) -> bool {
    node.labels().get(LABEL_NODE_TYPE).map(String::as_str) == Some(NODE_TYPE_VIRTUAL_KUBELET)
}

pub fn is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

pub fn has_taint(node: &Node, key: &str) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| taints.iter().any(|t| t.key == key))
        .unwrap_or(false)
}

pub fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// ECS instance id from a `<region>.<instance-id>` provider id
pub fn instance_id(node: &Node) -> Result<String> {
    let provider_id = node
        .spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .unwrap_or_default();
    let trimmed = provider_id
        .rsplit_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(provider_id);
    match trimmed.split_once('.') {
        Some((region, id)) if !region.is_empty() && !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::Consistency(format!(
            "node {}: provider id [{}] is not <region>.<instance-id>",
            node.name_any(),
            provider_id
        ))),
    }
}
