//! Network load balancer (NLB) model

use k8s_openapi::api::core::v1::ServicePort;
use serde::{Deserialize, Serialize};

use super::{
    AddressType, Backend, Flag, HealthCheckType, IpVersion, NamedKey, Protocol, Scheduler, Tag,
};

/// One zone the NLB is deployed into
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneMapping {
    pub zone_id: String,
    #[serde(rename = "VSwitchId")]
    pub vswitch_id: String,
    #[serde(default)]
    pub allocation_id: Option<String>,
    #[serde(default)]
    pub ipv4_address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NlbAttribute {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    #[serde(rename = "DNSName")]
    pub dns_name: String,
    pub address_type: Option<AddressType>,
    pub address_ip_version: Option<IpVersion>,
    pub vpc_id: String,
    pub zone_mappings: Vec<ZoneMapping>,
    pub security_group_ids: Vec<String>,
    pub resource_group_id: Option<String>,
    pub deletion_protection: Option<Flag>,
    pub modification_protection: Option<Flag>,
    pub tags: Vec<Tag>,
    #[serde(skip)]
    pub is_user_managed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NlbHealthCheck {
    #[serde(rename = "HealthCheckEnabled")]
    pub enabled: Option<bool>,
    #[serde(rename = "HealthCheckType")]
    pub check_type: Option<HealthCheckType>,
    #[serde(rename = "HealthCheckConnectPort")]
    pub connect_port: Option<i32>,
    pub healthy_threshold: Option<i32>,
    pub unhealthy_threshold: Option<i32>,
    #[serde(rename = "HealthCheckConnectTimeout")]
    pub connect_timeout: Option<i32>,
    #[serde(rename = "HealthCheckInterval")]
    pub interval: Option<i32>,
    #[serde(rename = "HealthCheckDomain")]
    pub domain: Option<String>,
    #[serde(rename = "HealthCheckUrl")]
    pub url: Option<String>,
    #[serde(rename = "HealthCheckHttpCode")]
    pub http_code: Vec<String>,
}

/// Registration mode of a server group
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerGroupType {
    #[default]
    Instance,
    Ip,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerGroup {
    #[serde(skip)]
    pub named_key: Option<NamedKey>,
    #[serde(default)]
    pub server_group_id: String,
    #[serde(default)]
    pub server_group_name: String,
    #[serde(default)]
    pub server_group_type: ServerGroupType,
    #[serde(default)]
    pub protocol: Option<Protocol>,
    #[serde(default)]
    pub scheduler: Option<Scheduler>,
    #[serde(default)]
    pub connection_drain_enabled: Option<bool>,
    #[serde(default)]
    pub connection_drain_timeout: Option<i32>,
    #[serde(default)]
    pub preserve_client_ip_enabled: Option<bool>,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub resource_group_id: Option<String>,
    #[serde(default, rename = "HealthCheckConfig")]
    pub health_check: NlbHealthCheck,
    #[serde(skip)]
    pub is_user_managed: bool,
    #[serde(skip)]
    pub service_port: Option<ServicePort>,
    #[serde(skip)]
    pub weight: Option<i32>,
    #[serde(default)]
    pub servers: Vec<Backend>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NlbListener {
    #[serde(skip)]
    pub named_key: Option<NamedKey>,
    #[serde(default)]
    pub listener_id: String,
    #[serde(default)]
    pub listener_description: String,
    pub listener_port: i32,
    pub listener_protocol: Protocol,
    #[serde(default)]
    pub listener_status: Option<String>,
    #[serde(default)]
    pub server_group_id: String,
    /// Name of the server group this listener should forward to
    #[serde(skip)]
    pub server_group_name: String,
    /// Service port the listener was built from; local models only
    #[serde(skip)]
    pub service_port: Option<ServicePort>,
    #[serde(default)]
    pub idle_timeout: Option<i32>,
    #[serde(default)]
    pub proxy_protocol_enabled: Option<bool>,
    #[serde(default)]
    pub cps: Option<i32>,
    #[serde(default)]
    pub security_policy_id: Option<String>,
    #[serde(default)]
    pub certificate_ids: Vec<String>,
    #[serde(default)]
    pub ca_enabled: Option<bool>,
    #[serde(default)]
    pub ca_certificate_ids: Vec<String>,
    #[serde(default)]
    pub alpn_enabled: Option<bool>,
    #[serde(default)]
    pub alpn_policy: Option<String>,
}

impl NlbListener {
    pub fn new(port: i32, protocol: Protocol) -> Self {
        Self {
            named_key: None,
            listener_id: String::new(),
            listener_description: String::new(),
            listener_port: port,
            listener_protocol: protocol,
            listener_status: None,
            server_group_id: String::new(),
            server_group_name: String::new(),
            service_port: None,
            idle_timeout: None,
            proxy_protocol_enabled: None,
            cps: None,
            security_policy_id: None,
            certificate_ids: Vec::new(),
            ca_enabled: None,
            ca_certificate_ids: Vec::new(),
            alpn_enabled: None,
            alpn_policy: None,
        }
    }

    pub fn is_owned_by(&self, key: &NamedKey) -> bool {
        key.owns(&self.listener_description)
    }
}

/// Aggregate NLB model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkLoadBalancer {
    pub namespaced_name: String,
    pub attribute: NlbAttribute,
    pub listeners: Vec<NlbListener>,
    pub server_groups: Vec<ServerGroup>,
}

impl NetworkLoadBalancer {
    pub fn new(namespaced_name: impl Into<String>) -> Self {
        Self {
            namespaced_name: namespaced_name.into(),
            ..Default::default()
        }
    }

    pub fn listener(&self, port: i32, protocol: Protocol) -> Option<&NlbListener> {
        self.listeners
            .iter()
            .find(|l| l.listener_port == port && l.listener_protocol == protocol)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&ServerGroup> {
        self.server_groups
            .iter()
            .find(|g| g.server_group_name == name)
    }

    pub fn group_by_id(&self, id: &str) -> Option<&ServerGroup> {
        self.server_groups.iter().find(|g| g.server_group_id == id)
    }
}
