//! Shared fixtures for unit tests

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Node, NodeCondition, NodeSpec,
    NodeStatus, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::annotation::annotation;
use crate::backend::node::{LABEL_NODE_TYPE, NODE_TYPE_VIRTUAL_KUBELET};
use crate::config::CloudConfig;
use crate::context::RequestContext;

pub const CLUSTER_ID: &str = "c1a2b3";
pub const VPC_ID: &str = "vpc-test";

pub fn config() -> CloudConfig {
    CloudConfig {
        cluster_id: CLUSTER_ID.to_string(),
        region_id: "cn-hangzhou".to_string(),
        vpc_id: VPC_ID.to_string(),
        vswitch_id: "vsw-default".to_string(),
        zone_id: Some("cn-hangzhou-k".to_string()),
        ..Default::default()
    }
}

pub fn service_port(name: &str, port: i32, target: i32, node_port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(target)),
        node_port: Some(node_port),
        ..Default::default()
    }
}

/// A Service serving DNS over 53/TCP (node port 30053) and 53/UDP (30054)
pub fn dns_service(annotations: &[(&str, &str)]) -> Service {
    let tcp = service_port("dns-tcp", 53, 53, 30053);
    let mut udp = service_port("dns-udp", 53, 53, 30054);
    udp.protocol = Some("UDP".to_string());
    service("dns", vec![tcp, udp], annotations)
}

/// A LoadBalancer Service in `default`
pub fn service(name: &str, ports: Vec<ServicePort>, annotations: &[(&str, &str)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some("5f1c2a9e-1b2c-4d3e-8f90-a1b2c3d4e5f6".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (annotation(k), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn with_local_policy(mut svc: Service) -> Service {
    if let Some(spec) = svc.spec.as_mut() {
        spec.external_traffic_policy = Some("Local".to_string());
    }
    svc
}

pub fn context(svc: Service) -> RequestContext {
    RequestContext::new(Arc::new(svc), Arc::new(config()))
}

pub fn node(name: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(format!("cn-hangzhou.i-{}", name)),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

pub fn virtual_node(name: &str) -> Node {
    let mut n = node(name);
    n.metadata.labels = Some(
        [(LABEL_NODE_TYPE.to_string(), NODE_TYPE_VIRTUAL_KUBELET.to_string())].into(),
    );
    n.spec = Some(NodeSpec::default());
    n
}

/// `Endpoints` with one subset; each address is `(ip, node)`
pub fn endpoints(
    name: &str,
    addresses: &[(&str, Option<&str>)],
    ports: &[(&str, i32)],
) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                addresses
                    .iter()
                    .map(|(ip, node)| EndpointAddress {
                        ip: ip.to_string(),
                        node_name: node.map(String::from),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| EndpointPort {
                        name: Some(name.to_string()),
                        port: *port,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }]),
    }
}
