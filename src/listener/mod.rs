//! Listener Builder
//!
//! Derives listener attributes from a `ServicePort` and the annotations.
//! Only the fields legal for the resolved protocol are populated; a value
//! that is present but malformed fails the listener instead of being
//! replaced by a default.

pub mod nlb;

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;

use k8s_openapi::api::core::v1::ServicePort;

use crate::annotation::{keys, AnnotationRequest};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::model::{
    Flag, HealthCheck, HealthCheckType, ListenerAttribute, Protocol, StickySessionType,
};

/// Protocols a CLB listener can carry
pub const CLB_PROTOCOLS: &[Protocol] =
    &[Protocol::Tcp, Protocol::Udp, Protocol::Http, Protocol::Https];

/// Effective protocol of a Service port
///
/// An entry of the `protocol-port` annotation for this port wins; otherwise
/// the Kubernetes port protocol is used. Every annotation entry must name a
/// protocol from `allowed`, even entries for other ports.
pub fn resolve_protocol(
    anno: &AnnotationRequest,
    port: &ServicePort,
    allowed: &[Protocol],
) -> Result<Protocol> {
    let entries = anno.protocol_port()?;
    for (protocol, _) in &entries {
        if !allowed.contains(protocol) {
            return Err(Error::annotation(
                keys::PROTOCOL_PORT,
                anno.get(keys::PROTOCOL_PORT).unwrap_or_default(),
                format!(
                    "protocol {} not supported, expected one of [{}]",
                    protocol,
                    allowed
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join("|")
                ),
            ));
        }
    }
    if let Some((protocol, _)) = entries.iter().find(|(_, p)| *p == port.port) {
        return Ok(*protocol);
    }

    let raw = port.protocol.as_deref().unwrap_or("TCP");
    match raw.parse::<Protocol>() {
        Ok(p @ (Protocol::Tcp | Protocol::Udp)) => Ok(p),
        _ => Err(Error::Consistency(format!(
            "port {} uses unsupported protocol {}",
            port.port, raw
        ))),
    }
}

/// Parse an integer annotation and check it lies in `range`
pub(crate) fn parse_in_range<T>(
    anno: &AnnotationRequest,
    key: &str,
    range: RangeInclusive<T>,
) -> Result<Option<T>>
where
    T: FromStr + PartialOrd + Display + Copy,
    T::Err: Display,
{
    let value = anno.parse::<T>(key)?;
    if let Some(v) = value {
        if !range.contains(&v) {
            return Err(Error::annotation(
                key,
                &v.to_string(),
                format!("must be in range [{}, {}]", range.start(), range.end()),
            ));
        }
    }
    Ok(value)
}

/// Build the CLB listener for one Service port
pub fn build_clb_listener(
    ctx: &RequestContext,
    port: &ServicePort,
) -> Result<ListenerAttribute> {
    let anno = &ctx.anno;
    let protocol = resolve_protocol(anno, port, CLB_PROTOCOLS)?;
    // TCP and UDP listeners may share a port number
    let key = ctx.named_key(port.port).with_protocol(protocol);

    let mut listener = ListenerAttribute::new(port.port, protocol);
    listener.description = key.encode();
    listener.v_group_name = key.encode();
    listener.named_key = Some(key);
    listener.service_port = Some(port.clone());

    listener.scheduler = anno.parse(keys::SCHEDULER)?;
    listener.acl_status = anno.flag(keys::ACL_STATUS)?;
    listener.acl_id = anno.get(keys::ACL_ID).map(String::from);
    listener.acl_type = anno.parse(keys::ACL_TYPE)?;
    if listener.acl_status == Some(Flag::On) && listener.acl_id.is_none() {
        return Err(Error::annotation(
            keys::ACL_STATUS,
            "on",
            "acl-id is required when acl-status is on",
        ));
    }

    match protocol {
        Protocol::Tcp | Protocol::Udp => layer4(ctx, &mut listener)?,
        Protocol::Http | Protocol::Https => layer7(ctx, port, &mut listener)?,
        Protocol::TcpSsl => unreachable!("filtered by resolve_protocol"),
    }
    Ok(listener)
}

fn layer4(ctx: &RequestContext, listener: &mut ListenerAttribute) -> Result<()> {
    let anno = &ctx.anno;
    if listener.protocol == Protocol::Tcp {
        listener.persistence_timeout =
            parse_in_range(anno, keys::PERSISTENCE_TIMEOUT, 0..=3600)?;
        listener.established_timeout =
            parse_in_range(anno, keys::ESTABLISHED_TIMEOUT, 10..=900)?;
    }
    listener.proxy_protocol_v2_enabled = anno.flag(keys::PROXY_PROTOCOL)?.map(|f| f.is_on());

    listener.connection_drain = anno.flag(keys::CONNECTION_DRAIN)?;
    listener.connection_drain_timeout =
        parse_in_range(anno, keys::CONNECTION_DRAIN_TIMEOUT, 10..=900)?;
    if listener.connection_drain == Some(Flag::On)
        && listener.connection_drain_timeout.is_none()
    {
        return Err(Error::annotation(
            keys::CONNECTION_DRAIN,
            "on",
            "connection-drain-timeout is required when connection drain is on",
        ));
    }

    if anno.flag(keys::HEALTH_CHECK_FLAG)? == Some(Flag::Off) {
        return Err(Error::annotation(
            keys::HEALTH_CHECK_FLAG,
            "off",
            format!("health check cannot be disabled on {} listeners", listener.protocol),
        ));
    }

    let mut hc = common_health_check(anno)?;
    hc.connect_timeout = parse_in_range(anno, keys::HEALTH_CHECK_CONNECT_TIMEOUT, 1..=300)?;
    if listener.protocol == Protocol::Tcp {
        hc.check_type = anno.parse(keys::HEALTH_CHECK_TYPE)?;
        if hc.check_type == Some(HealthCheckType::Http) {
            hc.uri = anno.get(keys::HEALTH_CHECK_URI).map(String::from);
            hc.domain = anno.get(keys::HEALTH_CHECK_DOMAIN).map(String::from);
            hc.http_code = anno.get(keys::HEALTH_CHECK_HTTP_CODE).map(String::from);
        }
    }
    listener.health_check = hc;
    Ok(())
}

fn layer7(
    ctx: &RequestContext,
    port: &ServicePort,
    listener: &mut ListenerAttribute,
) -> Result<()> {
    let anno = &ctx.anno;

    let flag = anno.flag(keys::HEALTH_CHECK_FLAG)?.unwrap_or(Flag::Off);
    listener.health_check = if flag.is_on() {
        let mut hc = common_health_check(anno)?;
        hc.timeout = parse_in_range(anno, keys::HEALTH_CHECK_TIMEOUT, 1..=300)?;
        hc.uri = anno.get(keys::HEALTH_CHECK_URI).map(String::from);
        hc.domain = anno.get(keys::HEALTH_CHECK_DOMAIN).map(String::from);
        hc.http_code = anno.get(keys::HEALTH_CHECK_HTTP_CODE).map(String::from);
        hc.method = anno.parse(keys::HEALTH_CHECK_METHOD)?;
        hc.flag = Some(Flag::On);
        hc
    } else {
        HealthCheck {
            flag: Some(Flag::Off),
            ..Default::default()
        }
    };

    listener.sticky_session = anno.flag(keys::STICKY_SESSION)?;
    if listener.sticky_session == Some(Flag::On) {
        let session_type = anno
            .parse::<StickySessionType>(keys::STICKY_SESSION_TYPE)?
            .ok_or_else(|| {
                Error::annotation(
                    keys::STICKY_SESSION,
                    "on",
                    "sticky-session-type is required when sticky session is on",
                )
            })?;
        match session_type {
            StickySessionType::Insert => {
                listener.cookie_timeout =
                    parse_in_range(anno, keys::COOKIE_TIMEOUT, 1..=86400)?;
                if listener.cookie_timeout.is_none() {
                    return Err(Error::annotation(
                        keys::STICKY_SESSION_TYPE,
                        "insert",
                        "cookie-timeout is required for insert cookies",
                    ));
                }
            }
            StickySessionType::Server => {
                listener.cookie = anno.get(keys::COOKIE).map(String::from);
                if listener.cookie.is_none() {
                    return Err(Error::annotation(
                        keys::STICKY_SESSION_TYPE,
                        "server",
                        "cookie is required for server cookies",
                    ));
                }
            }
        }
        listener.sticky_session_type = Some(session_type);
    }

    listener.x_forwarded_for_proto = anno.flag(keys::X_FORWARDED_FOR_PROTO)?;
    listener.x_forwarded_for_slb_ip = anno.flag(keys::X_FORWARDED_FOR_SLB_IP)?;
    listener.x_forwarded_for_slb_id = anno.flag(keys::X_FORWARDED_FOR_SLB_ID)?;
    listener.x_forwarded_for_slb_port = anno.flag(keys::X_FORWARDED_FOR_SLB_PORT)?;
    listener.x_forwarded_for_client_src_port =
        anno.flag(keys::X_FORWARDED_FOR_CLIENT_SRC_PORT)?;
    listener.idle_timeout = parse_in_range(anno, keys::IDLE_TIMEOUT, 1..=60)?;
    listener.request_timeout = parse_in_range(anno, keys::REQUEST_TIMEOUT, 1..=180)?;

    if listener.protocol == Protocol::Http {
        if let Some((_, to)) = anno
            .forward_port()?
            .into_iter()
            .find(|(from, _)| *from == port.port)
        {
            if !ctx.ports().iter().any(|p| p.port == to) {
                return Err(Error::annotation(
                    keys::FORWARD_PORT,
                    anno.get(keys::FORWARD_PORT).unwrap_or_default(),
                    format!("forward target port {} is not a port of the service", to),
                ));
            }
            listener.listener_forward = Some(Flag::On);
            listener.forward_port = Some(to);
            // a forwarding listener has no backends of its own
            listener.v_group_name.clear();
        }
    }

    if listener.protocol == Protocol::Https {
        listener.cert_id = anno.get(keys::CERT_ID).map(String::from);
        if listener.cert_id.is_none() {
            return Err(Error::annotation(
                keys::CERT_ID,
                "",
                format!("https listener on port {} requires a certificate id", port.port),
            ));
        }
        listener.tls_cipher_policy = anno.get(keys::TLS_CIPHER_POLICY).map(String::from);
        listener.enable_http2 = anno.flag(keys::ENABLE_HTTP2)?;
        listener.ca_certificate_id = ca_certificate(anno)?;
    }
    Ok(())
}

/// CA used to verify client certificates on an HTTPS listener
///
/// A `cacert-id` alone turns verification on; `cacert=off` turns it off.
fn ca_certificate(anno: &AnnotationRequest) -> Result<Option<String>> {
    let id = anno.get(keys::CA_CERT_ID).map(String::from);
    match anno.flag(keys::CA_CERT)? {
        Some(Flag::Off) => Ok(None),
        Some(Flag::On) if id.is_none() => Err(Error::annotation(
            keys::CA_CERT,
            "on",
            "cacert-id is required when client certificate verification is on",
        )),
        _ => Ok(id),
    }
}

fn common_health_check(anno: &AnnotationRequest) -> Result<HealthCheck> {
    Ok(HealthCheck {
        connect_port: parse_in_range(anno, keys::HEALTH_CHECK_CONNECT_PORT, 1..=65535)?,
        healthy_threshold: parse_in_range(anno, keys::HEALTHY_THRESHOLD, 2..=10)?,
        unhealthy_threshold: parse_in_range(anno, keys::UNHEALTHY_THRESHOLD, 2..=10)?,
        interval: parse_in_range(anno, keys::HEALTH_CHECK_INTERVAL, 1..=50)?,
        ..Default::default()
    })
}

/// Whether the remote health check must be modified to match the local one
///
/// Layer-4 checks are always on, so only the knobs set locally are compared.
/// Layer-7 checks are off unless enabled; an enabled remote check is turned
/// off when the Service does not ask for one.
pub fn health_check_changed(
    protocol: Protocol,
    local: &HealthCheck,
    remote: &HealthCheck,
) -> bool {
    if protocol.is_layer7() {
        let local_on = local.flag == Some(Flag::On);
        let remote_on = remote.flag == Some(Flag::On);
        if local_on != remote_on {
            return true;
        }
        if !local_on {
            return false;
        }
    }
    set_and_differs(&local.check_type, &remote.check_type)
        || set_and_differs(&local.connect_port, &remote.connect_port)
        || set_and_differs(&local.healthy_threshold, &remote.healthy_threshold)
        || set_and_differs(&local.unhealthy_threshold, &remote.unhealthy_threshold)
        || set_and_differs(&local.interval, &remote.interval)
        || set_and_differs(&local.connect_timeout, &remote.connect_timeout)
        || set_and_differs(&local.timeout, &remote.timeout)
        || set_and_differs(&local.uri, &remote.uri)
        || set_and_differs(&local.domain, &remote.domain)
        || set_and_differs(&local.http_code, &remote.http_code)
        || set_and_differs(&local.method, &remote.method)
}

/// A locally configured value that the remote side does not carry yet
pub(crate) fn set_and_differs<T: PartialEq>(local: &Option<T>, remote: &Option<T>) -> bool {
    local.is_some() && local != remote
}

#[cfg(test)]
mod listener_test;
