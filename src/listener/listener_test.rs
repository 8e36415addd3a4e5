//! Unit tests for the CLB listener builder

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ServicePort;

    use crate::annotation::keys;
    use crate::context::RequestContext;
    use crate::error::Error;
    use crate::listener::*;
    use crate::model::{Flag, HealthCheck, HealthCheckType, Protocol, StickySessionType};
    use crate::test_fixtures::{context, dns_service, service, service_port};

    fn ports(ctx: &RequestContext) -> Vec<ServicePort> {
        ctx.ports()
    }

    fn web(annotations: &[(&str, &str)]) -> RequestContext {
        context(service(
            "web",
            vec![
                service_port("http", 80, 8080, 30080),
                service_port("https", 443, 8443, 30443),
            ],
            annotations,
        ))
    }

    // ── protocol resolution ──

    #[test]
    fn test_protocol_port_annotation() {
        let ctx = web(&[
            (keys::PROTOCOL_PORT, "https:443,http:80"),
            (keys::CERT_ID, "cert-1"),
        ]);
        let ports = ports(&ctx);
        let http = build_clb_listener(&ctx, &ports[0]).unwrap();
        let https = build_clb_listener(&ctx, &ports[1]).unwrap();
        assert_eq!(http.protocol, Protocol::Http);
        assert_eq!(https.protocol, Protocol::Https);
        assert_eq!(https.cert_id.as_deref(), Some("cert-1"));
    }

    #[test]
    fn test_port_protocol_fallback() {
        let mut sp = service_port("dns", 53, 53, 30053);
        sp.protocol = Some("UDP".to_string());
        let ctx = context(service("dns", vec![sp.clone()], &[]));
        assert_eq!(build_clb_listener(&ctx, &sp).unwrap().protocol, Protocol::Udp);

        sp.protocol = Some("SCTP".to_string());
        let ctx = context(service("dns", vec![sp.clone()], &[]));
        assert!(matches!(build_clb_listener(&ctx, &sp), Err(Error::Consistency(_))));
    }

    #[test]
    fn test_tcpssl_rejected_on_clb() {
        let ctx = web(&[(keys::PROTOCOL_PORT, "tcpssl:443")]);
        let err = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap_err();
        assert!(matches!(err, Error::Annotation { .. }));
    }

    #[test]
    fn test_listener_carries_named_key() {
        let ctx = web(&[]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.description, "k8s.80.tcp.web.default.c1a2b3");
        assert_eq!(listener.v_group_name, listener.description);
        assert!(listener.is_owned_by(&ctx.named_key(443)));
        assert_eq!(listener.service_port.as_ref().map(|p| p.port), Some(80));
    }

    #[test]
    fn test_same_port_number_different_protocols() {
        let ctx = context(dns_service(&[]));
        let ports = ports(&ctx);
        let tcp = build_clb_listener(&ctx, &ports[0]).unwrap();
        let udp = build_clb_listener(&ctx, &ports[1]).unwrap();
        assert_eq!(tcp.protocol, Protocol::Tcp);
        assert_eq!(udp.protocol, Protocol::Udp);
        assert_eq!(udp.v_group_name, "k8s.53.udp.dns.default.c1a2b3");
        assert_ne!(tcp.v_group_name, udp.v_group_name);
        assert_ne!(tcp.description, udp.description);
    }

    // ── layer 4 ──

    #[test]
    fn test_tcp_fields() {
        let ctx = web(&[
            (keys::PERSISTENCE_TIMEOUT, "600"),
            (keys::PROXY_PROTOCOL, "on"),
            (keys::SCHEDULER, "wlc"),
            (keys::HEALTH_CHECK_TYPE, "http"),
            (keys::HEALTH_CHECK_URI, "/ping"),
            (keys::STICKY_SESSION, "on"),
        ]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.protocol, Protocol::Tcp);
        assert_eq!(listener.persistence_timeout, Some(600));
        assert_eq!(listener.proxy_protocol_v2_enabled, Some(true));
        assert_eq!(listener.health_check.check_type, Some(HealthCheckType::Http));
        assert_eq!(listener.health_check.uri.as_deref(), Some("/ping"));
        // layer-7 only knobs are ignored
        assert_eq!(listener.sticky_session, None);
    }

    #[test]
    fn test_tcp_health_check_cannot_be_disabled() {
        let ctx = web(&[(keys::HEALTH_CHECK_FLAG, "off")]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_err());
    }

    #[test]
    fn test_connection_drain_needs_timeout() {
        let ctx = web(&[(keys::CONNECTION_DRAIN, "on")]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_err());

        let ctx = web(&[
            (keys::CONNECTION_DRAIN, "on"),
            (keys::CONNECTION_DRAIN_TIMEOUT, "30"),
        ]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.connection_drain, Some(Flag::On));
        assert_eq!(listener.connection_drain_timeout, Some(30));
    }

    #[test]
    fn test_out_of_range_value() {
        let ctx = web(&[(keys::PERSISTENCE_TIMEOUT, "7200")]);
        let err = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap_err();
        assert!(err.to_string().contains("persistence-timeout"), "{}", err);

        let ctx = web(&[(keys::PERSISTENCE_TIMEOUT, "ten")]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_err());
    }

    // ── layer 7 ──

    #[test]
    fn test_http_health_check_off_by_default() {
        let ctx = web(&[(keys::PROTOCOL_PORT, "http:80")]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.health_check.flag, Some(Flag::Off));
        assert_eq!(listener.health_check.uri, None);

        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80"),
            (keys::HEALTH_CHECK_FLAG, "on"),
            (keys::HEALTH_CHECK_URI, "/healthz"),
            (keys::HEALTH_CHECK_METHOD, "get"),
        ]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.health_check.flag, Some(Flag::On));
        assert_eq!(listener.health_check.uri.as_deref(), Some("/healthz"));
    }

    #[test]
    fn test_sticky_session() {
        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80"),
            (keys::STICKY_SESSION, "on"),
            (keys::STICKY_SESSION_TYPE, "insert"),
            (keys::COOKIE_TIMEOUT, "1800"),
        ]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.sticky_session_type, Some(StickySessionType::Insert));
        assert_eq!(listener.cookie_timeout, Some(1800));

        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80"),
            (keys::STICKY_SESSION, "on"),
            (keys::STICKY_SESSION_TYPE, "server"),
        ]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_err());
    }

    #[test]
    fn test_forward_port() {
        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80,https:443"),
            (keys::CERT_ID, "cert-1"),
            (keys::FORWARD_PORT, "80:443"),
        ]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.listener_forward, Some(Flag::On));
        assert_eq!(listener.forward_port, Some(443));
        assert!(listener.v_group_name.is_empty());

        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80"),
            (keys::FORWARD_PORT, "80:8443"),
        ]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_err());
    }

    #[test]
    fn test_https_requires_certificate() {
        let ctx = web(&[(keys::PROTOCOL_PORT, "https:443")]);
        let err = build_clb_listener(&ctx, &ports(&ctx)[1]).unwrap_err();
        assert!(err.to_string().contains("certificate"), "{}", err);
    }

    #[test]
    fn test_x_forwarded_for_variants() {
        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80"),
            (keys::X_FORWARDED_FOR_PROTO, "on"),
            (keys::X_FORWARDED_FOR_SLB_IP, "on"),
            (keys::X_FORWARDED_FOR_SLB_ID, "off"),
            (keys::X_FORWARDED_FOR_SLB_PORT, "on"),
            (keys::X_FORWARDED_FOR_CLIENT_SRC_PORT, "on"),
        ]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.x_forwarded_for_proto, Some(Flag::On));
        assert_eq!(listener.x_forwarded_for_slb_ip, Some(Flag::On));
        assert_eq!(listener.x_forwarded_for_slb_id, Some(Flag::Off));
        assert_eq!(listener.x_forwarded_for_slb_port, Some(Flag::On));
        assert_eq!(listener.x_forwarded_for_client_src_port, Some(Flag::On));

        let ctx = web(&[
            (keys::PROTOCOL_PORT, "http:80"),
            (keys::X_FORWARDED_FOR_SLB_IP, "yes"),
        ]);
        let err = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap_err();
        assert!(matches!(err, Error::Annotation { .. }), "{}", err);

        // layer-4 listeners carry no headers
        let ctx = web(&[(keys::X_FORWARDED_FOR_SLB_IP, "on")]);
        let listener = build_clb_listener(&ctx, &ports(&ctx)[0]).unwrap();
        assert_eq!(listener.x_forwarded_for_slb_ip, None);
    }

    #[test]
    fn test_https_client_certificate_verification() {
        let https = |extra: &[(&'static str, &'static str)]| {
            let mut annotations =
                vec![(keys::PROTOCOL_PORT, "https:443"), (keys::CERT_ID, "cert-1")];
            annotations.extend_from_slice(extra);
            let ctx = web(&annotations);
            build_clb_listener(&ctx, &ports(&ctx)[1])
        };

        let listener = https(&[(keys::CA_CERT, "on"), (keys::CA_CERT_ID, "ca-1")]).unwrap();
        assert_eq!(listener.ca_certificate_id.as_deref(), Some("ca-1"));

        let listener = https(&[(keys::CA_CERT_ID, "ca-1")]).unwrap();
        assert_eq!(listener.ca_certificate_id.as_deref(), Some("ca-1"));

        let listener = https(&[(keys::CA_CERT, "off"), (keys::CA_CERT_ID, "ca-1")]).unwrap();
        assert_eq!(listener.ca_certificate_id, None);

        let err = https(&[(keys::CA_CERT, "on")]).unwrap_err();
        assert!(err.to_string().contains("cacert-id"), "{}", err);
    }

    #[test]
    fn test_acl_requires_id() {
        let ctx = web(&[(keys::ACL_STATUS, "on")]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_err());
        let ctx = web(&[
            (keys::ACL_STATUS, "on"),
            (keys::ACL_ID, "acl-1"),
            (keys::ACL_TYPE, "white"),
        ]);
        assert!(build_clb_listener(&ctx, &ports(&ctx)[0]).is_ok());
    }

    // ── health check comparison ──

    #[test]
    fn test_health_check_changed() {
        let remote = HealthCheck {
            flag: Some(Flag::On),
            uri: Some("/".to_string()),
            interval: Some(2),
            ..Default::default()
        };
        let off = HealthCheck {
            flag: Some(Flag::Off),
            ..Default::default()
        };
        assert!(health_check_changed(Protocol::Http, &off, &remote));
        assert!(!health_check_changed(Protocol::Http, &off, &off));

        let unset = HealthCheck::default();
        assert!(!health_check_changed(Protocol::Tcp, &unset, &remote));

        let tuned = HealthCheck {
            interval: Some(5),
            ..Default::default()
        };
        assert!(health_check_changed(Protocol::Tcp, &tuned, &remote));
    }
}
