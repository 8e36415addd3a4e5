//! Backend Builder
//!
//! Computes the servers of one backend group from the Service's traffic
//! policy, its `Endpoints` and the cluster's nodes. The result depends only
//! on those inputs; nothing is cached between calls.

pub mod node;
pub mod weight;

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointSubset, Endpoints, Node, Service, ServicePort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::annotation::keys;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::model::{Backend, BackendType, TrafficPolicy};

pub use node::NodeFilter;

/// Choose how backends are enumerated for a Service
pub fn traffic_policy(ctx: &RequestContext) -> Result<TrafficPolicy> {
    match ctx.anno.parse::<BackendType>(keys::BACKEND_TYPE)? {
        Some(BackendType::Eni) => return Ok(TrafficPolicy::Eni),
        Some(BackendType::Ecs) => {}
        Some(BackendType::Eci) => {
            return Err(Error::annotation(
                keys::BACKEND_TYPE,
                BackendType::Eci.as_str(),
                "backend type must be eni or ecs",
            ))
        }
        None => {
            if let Some(policy) = ctx.config.default_backend_policy() {
                return Ok(policy);
            }
        }
    }
    if is_local_traffic(&ctx.service) {
        Ok(TrafficPolicy::Local)
    } else {
        Ok(TrafficPolicy::Cluster)
    }
}

fn is_local_traffic(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|s| s.external_traffic_policy.as_deref())
        .map(|p| p.eq_ignore_ascii_case("Local"))
        .unwrap_or(false)
}

/// Inputs shared by every group of one Service
#[derive(Clone, Debug)]
pub struct BackendCandidates {
    pub policy: TrafficPolicy,
    pub endpoints: Option<Endpoints>,
    /// Nodes that passed the exclusion rules
    pub nodes: Vec<Node>,
}

impl BackendCandidates {
    pub fn new(
        ctx: &RequestContext,
        endpoints: Option<Endpoints>,
        nodes: Vec<Node>,
    ) -> Result<Self> {
        let policy = traffic_policy(ctx)?;
        let filter = NodeFilter {
            remove_unscheduled: ctx.anno.is_on(keys::REMOVE_UNSCHEDULED)?,
            backend_label: ctx.anno.backend_label()?,
        };
        let nodes = nodes
            .into_iter()
            .filter(|n| match filter.exclusion_reason(n) {
                Some(reason) => {
                    debug!("excluding node {} from backends: {}", n.name_any(), reason);
                    false
                }
                None => true,
            })
            .collect();

        Ok(Self {
            policy,
            endpoints,
            nodes,
        })
    }

    fn subsets(&self) -> &[EndpointSubset] {
        self.endpoints
            .as_ref()
            .and_then(|e| e.subsets.as_deref())
            .unwrap_or_default()
    }

    fn has_virtual_nodes(&self) -> bool {
        self.nodes.iter().any(node::is_virtual_node)
    }
}

/// The group a backend list is built for
#[derive(Clone, Copy, Debug)]
pub struct BackendTarget<'a> {
    pub service_port: &'a ServicePort,
    pub weight: Option<i32>,
    /// Written to every backend, normally the group name
    pub description: &'a str,
}

/// Build the weighted backend list of one group
pub fn build_backends(
    ctx: &RequestContext,
    candidates: &BackendCandidates,
    target: &BackendTarget<'_>,
) -> Result<Vec<Backend>> {
    let backends = match candidates.policy {
        TrafficPolicy::Eni => {
            let eni = eni_backends(candidates.subsets(), target, |_| true);
            weight::apply(TrafficPolicy::Eni, &eni, target.weight)
        }
        TrafficPolicy::Local => local_backends(ctx, candidates, target)?,
        TrafficPolicy::Cluster => cluster_backends(ctx, candidates, target)?,
    };
    debug!(
        "built {} backends for {} port {} ({})",
        backends.len(),
        ctx.namespaced_name(),
        target.service_port.port,
        candidates.policy
    );
    Ok(backends)
}

/// One backend per ready endpoint address accepted by `keep`
fn eni_backends(
    subsets: &[EndpointSubset],
    target: &BackendTarget<'_>,
    keep: impl Fn(&EndpointAddress) -> bool,
) -> Vec<Backend> {
    let mut backends = Vec::new();
    for subset in subsets {
        let Some(port) = resolve_target_port(subset, target.service_port) else {
            warn!(
                "named port {:?} not found in endpoint subset, skipping",
                target.service_port.target_port
            );
            continue;
        };
        for addr in subset.addresses.iter().flatten().filter(|a| keep(a)) {
            backends.push(Backend {
                server_id: String::new(),
                server_ip: addr.ip.clone(),
                port,
                weight: 0,
                backend_type: BackendType::Eni,
                description: target.description.to_string(),
                node_name: addr.node_name.clone(),
            });
        }
    }
    backends
}

fn resolve_target_port(subset: &EndpointSubset, sp: &ServicePort) -> Option<i32> {
    match &sp.target_port {
        None => Some(sp.port),
        Some(IntOrString::Int(p)) => Some(*p),
        Some(IntOrString::String(_)) => subset
            .ports
            .iter()
            .flatten()
            .find(|p| p.name == sp.name)
            .map(|p| p.port),
    }
}

fn node_port(ctx: &RequestContext, sp: &ServicePort) -> Result<i32> {
    match sp.node_port {
        Some(p) if p > 0 => Ok(p),
        _ => Err(Error::Consistency(format!(
            "service {} port {} has no node port",
            ctx.namespaced_name(),
            sp.port
        ))),
    }
}

fn ecs_backend(node: &Node, port: i32, description: &str) -> Result<Backend> {
    Ok(Backend {
        server_id: node::instance_id(node)?,
        server_ip: String::new(),
        port,
        weight: 0,
        backend_type: BackendType::Ecs,
        description: description.to_string(),
        node_name: Some(node.name_any()),
    })
}

fn local_backends(
    ctx: &RequestContext,
    candidates: &BackendCandidates,
    target: &BackendTarget<'_>,
) -> Result<Vec<Backend>> {
    let nodes: HashMap<String, &Node> = candidates
        .nodes
        .iter()
        .map(|n| (n.name_any(), n))
        .collect();

    let mut per_pod = Vec::new();
    let mut virtual_node_names = Vec::new();
    for subset in candidates.subsets() {
        for addr in subset.addresses.iter().flatten() {
            let Some(node_name) = addr.node_name.as_deref() else {
                return Err(Error::MissingNodeName {
                    service: ctx.namespaced_name(),
                    ip: addr.ip.clone(),
                });
            };
            let Some(node) = nodes.get(node_name) else {
                debug!("node {} of endpoint {} is not a candidate", node_name, addr.ip);
                continue;
            };
            if node::is_virtual_node(node) {
                virtual_node_names.push(node_name.to_string());
                continue;
            }
            per_pod.push(ecs_backend(
                node,
                node_port(ctx, target.service_port)?,
                target.description,
            )?);
        }
    }

    // Pods on virtual nodes are registered by IP and share the weight pool
    per_pod.extend(eni_backends(candidates.subsets(), target, |addr| {
        addr.node_name
            .as_ref()
            .map(|n| virtual_node_names.contains(n))
            .unwrap_or(false)
    }));

    Ok(weight::dedup(weight::apply(
        TrafficPolicy::Local,
        &per_pod,
        target.weight,
    )))
}

fn cluster_backends(
    ctx: &RequestContext,
    candidates: &BackendCandidates,
    target: &BackendTarget<'_>,
) -> Result<Vec<Backend>> {
    let mut backends = Vec::new();
    let virtual_nodes: Vec<String> = candidates
        .nodes
        .iter()
        .filter(|n| node::is_virtual_node(n))
        .map(|n| n.name_any())
        .collect();

    let real_nodes: Vec<&Node> = candidates
        .nodes
        .iter()
        .filter(|n| !node::is_virtual_node(n))
        .collect();
    if !real_nodes.is_empty() {
        let port = node_port(ctx, target.service_port)?;
        for n in real_nodes {
            backends.push(ecs_backend(n, port, target.description)?);
        }
    }

    if candidates.has_virtual_nodes() {
        backends.extend(eni_backends(candidates.subsets(), target, |addr| {
            addr.node_name
                .as_ref()
                .map(|n| virtual_nodes.contains(n))
                .unwrap_or(false)
        }));
    }

    Ok(weight::apply(
        TrafficPolicy::Cluster,
        &backends,
        target.weight,
    ))
}
