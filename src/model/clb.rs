//! Classic load balancer (CLB) model

use k8s_openapi::api::core::v1::ServicePort;
use serde::{Deserialize, Serialize};

use super::{
    AddressType, AclType, Backend, ChargeType, Flag, HealthCheckMethod, HealthCheckType,
    InstanceChargeType, IpVersion, NamedKey, Protocol, Scheduler, StickySessionType, Tag,
};

/// Load balancer level attributes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancerAttribute {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    pub address: String,
    pub address_type: Option<AddressType>,
    #[serde(rename = "AddressIPVersion")]
    pub address_ip_version: Option<IpVersion>,
    pub load_balancer_spec: Option<String>,
    pub instance_charge_type: Option<InstanceChargeType>,
    pub internet_charge_type: Option<ChargeType>,
    pub bandwidth: Option<i32>,
    pub region_id: String,
    pub vpc_id: String,
    #[serde(rename = "VSwitchId")]
    pub vswitch_id: String,
    pub master_zone_id: Option<String>,
    pub slave_zone_id: Option<String>,
    pub delete_protection: Option<Flag>,
    pub modification_protection: Option<Flag>,
    pub resource_group_id: Option<String>,
    pub tags: Vec<Tag>,
    /// Set when the load balancer was referenced by id rather than created
    #[serde(skip)]
    pub is_user_managed: bool,
}

/// Health check knobs. TCP/UDP listeners always check; HTTP/HTTPS listeners
/// only when `flag` is on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HealthCheck {
    #[serde(rename = "HealthCheck")]
    pub flag: Option<Flag>,
    #[serde(rename = "HealthCheckType")]
    pub check_type: Option<HealthCheckType>,
    #[serde(rename = "HealthCheckConnectPort")]
    pub connect_port: Option<i32>,
    pub healthy_threshold: Option<i32>,
    pub unhealthy_threshold: Option<i32>,
    #[serde(rename = "HealthCheckInterval")]
    pub interval: Option<i32>,
    #[serde(rename = "HealthCheckConnectTimeout")]
    pub connect_timeout: Option<i32>,
    #[serde(rename = "HealthCheckTimeout")]
    pub timeout: Option<i32>,
    #[serde(rename = "HealthCheckURI")]
    pub uri: Option<String>,
    #[serde(rename = "HealthCheckDomain")]
    pub domain: Option<String>,
    #[serde(rename = "HealthCheckHttpCode")]
    pub http_code: Option<String>,
    #[serde(rename = "HealthCheckMethod")]
    pub method: Option<HealthCheckMethod>,
}

/// One listener on a CLB
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerAttribute {
    #[serde(skip)]
    pub named_key: Option<NamedKey>,
    #[serde(default)]
    pub description: String,
    pub listener_port: i32,
    #[serde(rename = "ListenerProtocol")]
    pub protocol: Protocol,
    #[serde(default)]
    pub status: Option<String>,
    /// Bound vserver group; empty until groups are resolved
    #[serde(default)]
    pub v_server_group_id: String,
    /// Name of the group this listener should forward to
    #[serde(skip)]
    pub v_group_name: String,
    /// Service port the listener was built from; local models only
    #[serde(skip)]
    pub service_port: Option<ServicePort>,
    #[serde(default)]
    pub scheduler: Option<Scheduler>,
    #[serde(default)]
    pub persistence_timeout: Option<i32>,
    #[serde(default)]
    pub established_timeout: Option<i32>,
    #[serde(default)]
    pub proxy_protocol_v2_enabled: Option<bool>,
    #[serde(default)]
    pub connection_drain: Option<Flag>,
    #[serde(default)]
    pub connection_drain_timeout: Option<i32>,
    #[serde(default)]
    pub acl_status: Option<Flag>,
    #[serde(default)]
    pub acl_id: Option<String>,
    #[serde(default)]
    pub acl_type: Option<AclType>,
    #[serde(default, flatten)]
    pub health_check: HealthCheck,
    #[serde(default)]
    pub sticky_session: Option<Flag>,
    #[serde(default)]
    pub sticky_session_type: Option<StickySessionType>,
    #[serde(default)]
    pub cookie_timeout: Option<i32>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default, rename = "XForwardedFor_proto")]
    pub x_forwarded_for_proto: Option<Flag>,
    #[serde(default, rename = "XForwardedFor_SLBIP")]
    pub x_forwarded_for_slb_ip: Option<Flag>,
    #[serde(default, rename = "XForwardedFor_SLBID")]
    pub x_forwarded_for_slb_id: Option<Flag>,
    #[serde(default, rename = "XForwardedFor_SLBPORT")]
    pub x_forwarded_for_slb_port: Option<Flag>,
    #[serde(default, rename = "XForwardedFor_ClientSrcPort")]
    pub x_forwarded_for_client_src_port: Option<Flag>,
    #[serde(default)]
    pub idle_timeout: Option<i32>,
    #[serde(default)]
    pub request_timeout: Option<i32>,
    #[serde(default)]
    pub listener_forward: Option<Flag>,
    #[serde(default)]
    pub forward_port: Option<i32>,
    #[serde(default, rename = "ServerCertificateId")]
    pub cert_id: Option<String>,
    /// Client certificates are verified against this CA when set
    #[serde(default, rename = "CACertificateId")]
    pub ca_certificate_id: Option<String>,
    #[serde(default, rename = "TLSCipherPolicy")]
    pub tls_cipher_policy: Option<String>,
    #[serde(default, rename = "EnableHttp2")]
    pub enable_http2: Option<Flag>,
}

impl ListenerAttribute {
    pub fn new(port: i32, protocol: Protocol) -> Self {
        Self {
            named_key: None,
            description: String::new(),
            listener_port: port,
            protocol,
            status: None,
            v_server_group_id: String::new(),
            v_group_name: String::new(),
            service_port: None,
            scheduler: None,
            persistence_timeout: None,
            established_timeout: None,
            proxy_protocol_v2_enabled: None,
            connection_drain: None,
            connection_drain_timeout: None,
            acl_status: None,
            acl_id: None,
            acl_type: None,
            health_check: HealthCheck::default(),
            sticky_session: None,
            sticky_session_type: None,
            cookie_timeout: None,
            cookie: None,
            x_forwarded_for_proto: None,
            x_forwarded_for_slb_ip: None,
            x_forwarded_for_slb_id: None,
            x_forwarded_for_slb_port: None,
            x_forwarded_for_client_src_port: None,
            idle_timeout: None,
            request_timeout: None,
            listener_forward: None,
            forward_port: None,
            cert_id: None,
            ca_certificate_id: None,
            tls_cipher_policy: None,
            enable_http2: None,
        }
    }

    /// True when the listener description carries a key of the given Service
    pub fn is_owned_by(&self, key: &NamedKey) -> bool {
        key.owns(&self.description)
    }
}

/// A vserver group: the backend pool of one or more CLB listeners
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VServerGroup {
    #[serde(skip)]
    pub named_key: Option<NamedKey>,
    #[serde(default)]
    pub v_server_group_id: String,
    #[serde(default)]
    pub v_server_group_name: String,
    /// Referenced through the vgroup-port annotation, not created by us
    #[serde(skip)]
    pub is_user_managed: bool,
    #[serde(skip)]
    pub service_port: Option<ServicePort>,
    #[serde(skip)]
    pub weight: Option<i32>,
    #[serde(default, rename = "BackendServers")]
    pub backends: Vec<Backend>,
}

/// Aggregate CLB model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    /// `namespace/name` of the Service the model was built for
    pub namespaced_name: String,
    pub attribute: LoadBalancerAttribute,
    pub listeners: Vec<ListenerAttribute>,
    pub vserver_groups: Vec<VServerGroup>,
}

impl LoadBalancer {
    pub fn new(namespaced_name: impl Into<String>) -> Self {
        Self {
            namespaced_name: namespaced_name.into(),
            ..Default::default()
        }
    }

    pub fn listener(&self, port: i32, protocol: Protocol) -> Option<&ListenerAttribute> {
        self.listeners
            .iter()
            .find(|l| l.listener_port == port && l.protocol == protocol)
    }

    pub fn group_by_name(&self, name: &str) -> Option<&VServerGroup> {
        self.vserver_groups
            .iter()
            .find(|g| g.v_server_group_name == name)
    }

    pub fn group_by_id(&self, id: &str) -> Option<&VServerGroup> {
        self.vserver_groups.iter().find(|g| g.v_server_group_id == id)
    }
}
