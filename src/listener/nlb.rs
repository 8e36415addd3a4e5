//! NLB listeners and the server group attributes derived from annotations

use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{parse_in_range, resolve_protocol};
use crate::annotation::keys;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::model::{
    Flag, HealthCheckType, KeyPort, NamedKey, NlbHealthCheck, NlbListener, Protocol,
    TrafficPolicy,
};

/// Protocols an NLB listener can carry
pub const NLB_PROTOCOLS: &[Protocol] = &[Protocol::Tcp, Protocol::Udp, Protocol::TcpSsl];

/// Server groups speak plain TCP behind a TLS listener
pub fn server_group_protocol(listener_protocol: Protocol) -> Protocol {
    match listener_protocol {
        Protocol::TcpSsl => Protocol::Tcp,
        p => p,
    }
}

/// Key of the server group a Service port forwards to
///
/// ENI backends are addressed on the target port and all other backends on
/// the node port, so two Service ports with the same backend port and
/// protocol share one group.
pub fn server_group_key(
    ctx: &RequestContext,
    port: &ServicePort,
    protocol: Protocol,
    policy: TrafficPolicy,
) -> Result<NamedKey> {
    let key_port = match policy {
        TrafficPolicy::Eni => match &port.target_port {
            Some(IntOrString::Int(p)) => KeyPort::Number(*p),
            Some(IntOrString::String(name)) => KeyPort::Name(name.clone()),
            None => KeyPort::Number(port.port),
        },
        TrafficPolicy::Local | TrafficPolicy::Cluster => match port.node_port {
            Some(p) if p > 0 => KeyPort::Number(p),
            _ => {
                return Err(Error::Consistency(format!(
                    "service {} port {} has no node port",
                    ctx.namespaced_name(),
                    port.port
                )))
            }
        },
    };
    Ok(ctx
        .named_key(key_port)
        .with_protocol(server_group_protocol(protocol)))
}

/// Build the NLB listener for one Service port
pub fn build_nlb_listener(
    ctx: &RequestContext,
    port: &ServicePort,
    policy: TrafficPolicy,
) -> Result<NlbListener> {
    let anno = &ctx.anno;
    let protocol = resolve_protocol(anno, port, NLB_PROTOCOLS)?;
    let key = ctx.named_key(port.port).with_protocol(protocol);

    let mut listener = NlbListener::new(port.port, protocol);
    listener.listener_description = key.encode();
    listener.server_group_name = server_group_key(ctx, port, protocol, policy)?.encode();
    listener.named_key = Some(key);
    listener.service_port = Some(port.clone());

    listener.idle_timeout = parse_in_range(anno, keys::IDLE_TIMEOUT, 1..=900)?;
    listener.proxy_protocol_enabled = anno.flag(keys::PROXY_PROTOCOL)?.map(|f| f.is_on());
    listener.cps = parse_in_range(anno, keys::CPS, 0..=1_000_000)?;

    if protocol == Protocol::TcpSsl {
        listener.certificate_ids = anno.list(keys::CERT_ID);
        if listener.certificate_ids.is_empty() {
            return Err(Error::annotation(
                keys::CERT_ID,
                "",
                format!("tcpssl listener on port {} requires a certificate id", port.port),
            ));
        }
        listener.security_policy_id = anno.get(keys::TLS_CIPHER_POLICY).map(String::from);

        listener.ca_enabled = anno.flag(keys::CA_CERT)?.map(|f| f.is_on());
        listener.ca_certificate_ids = anno.list(keys::CA_CERT_ID);
        if listener.ca_enabled == Some(true) && listener.ca_certificate_ids.is_empty() {
            return Err(Error::annotation(
                keys::CA_CERT,
                "on",
                "cacert-id is required when mutual authentication is on",
            ));
        }

        listener.alpn_enabled = anno.flag(keys::ALPN)?.map(|f| f.is_on());
        listener.alpn_policy = anno.get(keys::ALPN_POLICY).map(String::from);
        if listener.alpn_enabled == Some(true) && listener.alpn_policy.is_none() {
            return Err(Error::annotation(
                keys::ALPN,
                "on",
                "alpn-policy is required when alpn is on",
            ));
        }
    } else if anno.has(keys::ALPN) || anno.has(keys::CA_CERT) {
        return Err(Error::annotation(
            if anno.has(keys::ALPN) { keys::ALPN } else { keys::CA_CERT },
            "on",
            format!(
                "only tcpssl listeners support tls options, port {} is {}",
                port.port, protocol
            ),
        ));
    }
    Ok(listener)
}

/// Health check of an NLB server group, enabled unless switched off
pub fn health_check(ctx: &RequestContext) -> Result<NlbHealthCheck> {
    let anno = &ctx.anno;
    let enabled = anno.flag(keys::HEALTH_CHECK_FLAG)?.unwrap_or(Flag::On).is_on();
    if !enabled {
        return Ok(NlbHealthCheck {
            enabled: Some(false),
            ..Default::default()
        });
    }

    let mut hc = NlbHealthCheck {
        enabled: Some(true),
        check_type: anno.parse(keys::HEALTH_CHECK_TYPE)?,
        connect_port: parse_in_range(anno, keys::HEALTH_CHECK_CONNECT_PORT, 0..=65535)?,
        healthy_threshold: parse_in_range(anno, keys::HEALTHY_THRESHOLD, 2..=10)?,
        unhealthy_threshold: parse_in_range(anno, keys::UNHEALTHY_THRESHOLD, 2..=10)?,
        connect_timeout: parse_in_range(anno, keys::HEALTH_CHECK_CONNECT_TIMEOUT, 1..=300)?,
        interval: parse_in_range(anno, keys::HEALTH_CHECK_INTERVAL, 1..=50)?,
        ..Default::default()
    };
    if hc.check_type == Some(HealthCheckType::Http) {
        hc.domain = anno.get(keys::HEALTH_CHECK_DOMAIN).map(String::from);
        hc.url = anno.get(keys::HEALTH_CHECK_URI).map(String::from);
        hc.http_code = anno.list(keys::HEALTH_CHECK_HTTP_CODE);
    }
    Ok(hc)
}
