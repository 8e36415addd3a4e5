//! Reconcile tests for the CLB family against the in-memory cloud

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::annotation::keys;
    use crate::cloud::{MemoryCloud, SlbApi};
    use crate::context::RequestContext;
    use crate::error::Error;
    use crate::manager::{Clb, LoadBalancerFamily};
    use crate::model::{
        Backend, BackendType, ListenerAttribute, LoadBalancer, LoadBalancerAttribute, Protocol,
        VServerGroup,
    };
    use crate::test_fixtures::{
        context, dns_service, endpoints, node, service, service_port, with_local_policy, VPC_ID,
    };

    fn cloud() -> Arc<MemoryCloud> {
        Arc::new(MemoryCloud::new("cn-hangzhou", VPC_ID))
    }

    fn web(ports: &[i32], annotations: &[(&str, &str)]) -> RequestContext {
        let ports = ports
            .iter()
            .map(|p| service_port(&format!("p{}", p), *p, p + 8000, p + 30000))
            .collect();
        context(service("web", ports, annotations)).with_backends(
            Some(endpoints("web", &[("10.0.0.1", Some("n1"))], &[("p80", 8080)])),
            vec![node("n1"), node("n2")],
        )
    }

    async fn reconcile(clb: &Clb, ctx: &RequestContext) -> crate::Result<LoadBalancer> {
        let local = clb.build_local(ctx)?;
        let remote = clb.build_remote(ctx).await?;
        clb.apply(ctx, &local, remote).await
    }

    fn foreign_backend() -> Backend {
        Backend {
            server_id: "i-manual".to_string(),
            server_ip: String::new(),
            port: 9000,
            weight: 100,
            backend_type: BackendType::Ecs,
            description: "manual".to_string(),
            node_name: None,
        }
    }

    // ── owned load balancer ──

    #[tokio::test]
    async fn test_create_then_converged() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let ctx = web(&[80, 443], &[]);

        let mdl = reconcile(&clb, &ctx).await.unwrap();
        assert!(!mdl.attribute.load_balancer_id.is_empty());
        assert!(clb.ingress_address(&mdl).is_some());
        assert_eq!(mdl.listeners.len(), 2);
        assert_eq!(mdl.vserver_groups.len(), 2);
        for group in &mdl.vserver_groups {
            assert_eq!(group.backends.len(), 2);
            assert!(group.backends.iter().all(|b| b.weight == 100));
        }
        let calls = cloud.calls().await;
        assert_eq!(calls[0], "CreateLoadBalancer");
        assert_eq!(
            calls.iter().filter(|c| *c == "CreateLoadBalancerTCPListener").count(),
            2
        );

        cloud.clear_calls().await;
        reconcile(&clb, &ctx).await.unwrap();
        assert!(cloud.calls().await.is_empty(), "{:?}", cloud.calls().await);
    }

    #[tokio::test]
    async fn test_local_policy_weights_follow_pods() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let svc = with_local_policy(service(
            "web",
            vec![
                service_port("http", 80, 8080, 30080),
                service_port("https", 443, 8443, 30443),
            ],
            &[],
        ));
        let ctx = context(svc).with_backends(
            Some(endpoints(
                "web",
                &[("10.0.0.1", Some("n1")), ("10.0.0.2", Some("n1"))],
                &[("http", 8080), ("https", 8443)],
            )),
            vec![node("n1"), node("n2")],
        );

        let mdl = reconcile(&clb, &ctx).await.unwrap();
        for (port, node_port) in [(80, 30080), (443, 30443)] {
            let name = ctx.named_key(port).with_protocol(Protocol::Tcp).encode();
            let group = mdl.group_by_name(&name).unwrap();
            assert_eq!(group.backends.len(), 1);
            assert_eq!(group.backends[0].server_id, "i-n1");
            assert_eq!(group.backends[0].port, node_port);
            assert_eq!(group.backends[0].weight, 2);
        }
    }

    #[tokio::test]
    async fn test_annotation_change_patches_listeners_only() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        reconcile(&clb, &web(&[80], &[])).await.unwrap();
        cloud.clear_calls().await;

        let ctx = web(&[80], &[(keys::SCHEDULER, "wlc")]);
        reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(cloud.calls().await, vec!["SetLoadBalancerTCPListenerAttribute"]);
    }

    #[tokio::test]
    async fn test_removed_port_releases_listener_and_group() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        reconcile(&clb, &web(&[80, 443], &[])).await.unwrap();
        cloud.clear_calls().await;

        let mdl = reconcile(&clb, &web(&[80], &[])).await.unwrap();
        assert_eq!(mdl.listeners.len(), 1);
        assert_eq!(mdl.vserver_groups.len(), 1);
        assert_eq!(
            cloud.calls().await,
            vec!["DeleteLoadBalancerListener", "DeleteVServerGroup"]
        );
    }

    #[tokio::test]
    async fn test_protocol_change_recreates_listener() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        reconcile(&clb, &web(&[80], &[])).await.unwrap();

        let ctx = web(&[80], &[(keys::PROTOCOL_PORT, "http:80")]);
        let mdl = reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(mdl.listeners.len(), 1);
        assert_eq!(mdl.listeners[0].protocol, Protocol::Http);
    }

    #[tokio::test]
    async fn test_foreign_listener_port_conflict() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let mdl = reconcile(&clb, &web(&[80], &[])).await.unwrap();
        let mut manual = ListenerAttribute::new(443, Protocol::Tcp);
        manual.description = "added by hand".to_string();
        cloud
            .seed_listener(&mdl.attribute.load_balancer_id, manual)
            .await;

        let err = reconcile(&clb, &web(&[80, 443], &[])).await.unwrap_err();
        assert!(matches!(err, Error::Consistency(_)), "{}", err);
        assert!(err.to_string().contains("port 443"));
    }

    #[tokio::test]
    async fn test_tcp_and_udp_on_one_port() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let ctx = context(dns_service(&[])).with_backends(None, vec![node("n1")]);

        let mdl = reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(mdl.listeners.len(), 2);
        assert_eq!(mdl.vserver_groups.len(), 2);
        for (protocol, node_port) in [(Protocol::Tcp, 30053), (Protocol::Udp, 30054)] {
            let listener = mdl.listener(53, protocol).unwrap();
            let group = mdl.group_by_id(&listener.v_server_group_id).unwrap();
            assert_eq!(
                group.v_server_group_name,
                ctx.named_key(53).with_protocol(protocol).encode()
            );
            let ports: Vec<i32> = group.backends.iter().map(|b| b.port).collect();
            assert_eq!(ports, vec![node_port]);
        }

        cloud.clear_calls().await;
        reconcile(&clb, &ctx).await.unwrap();
        assert!(cloud.calls().await.is_empty(), "{:?}", cloud.calls().await);
    }

    #[tokio::test]
    async fn test_untagged_load_balancer_found_by_name() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let ctx = web(&[80], &[]);
        let lb = cloud
            .seed_load_balancer(LoadBalancerAttribute {
                load_balancer_name: ctx.anno.default_load_balancer_name(),
                address: "47.1.2.4".to_string(),
                ..Default::default()
            })
            .await;

        let remote = clb.build_remote(&ctx).await.unwrap();
        assert_eq!(remote.attribute.load_balancer_id, lb);

        let mdl = reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(mdl.attribute.load_balancer_id, lb);
        assert_eq!(cloud.load_balancer_count().await, 1);
        assert!(!cloud.calls().await.contains(&"CreateLoadBalancer".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_owned_load_balancer() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let ctx = web(&[80], &[]);
        reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(cloud.load_balancer_count().await, 1);

        let remote = clb.build_remote(&ctx).await.unwrap();
        clb.cleanup(&ctx, remote).await.unwrap();
        assert_eq!(cloud.load_balancer_count().await, 0);

        // nothing left to find on the next pass
        let remote = clb.build_remote(&ctx).await.unwrap();
        clb.cleanup(&ctx, remote).await.unwrap();
    }

    // ── reused load balancer ──

    async fn shared_lb(cloud: &MemoryCloud) -> (String, String, String) {
        let lb = cloud
            .seed_load_balancer(LoadBalancerAttribute {
                load_balancer_name: "shared".to_string(),
                address: "47.1.2.3".to_string(),
                ..Default::default()
            })
            .await;
        let a = cloud
            .seed_vserver_group(
                &lb,
                VServerGroup {
                    v_server_group_name: "user-a".to_string(),
                    ..Default::default()
                },
            )
            .await;
        let b = cloud
            .seed_vserver_group(
                &lb,
                VServerGroup {
                    v_server_group_name: "user-b".to_string(),
                    backends: vec![foreign_backend()],
                    ..Default::default()
                },
            )
            .await;
        let mut listener = ListenerAttribute::new(80, Protocol::Tcp);
        listener.description = "user-listener".to_string();
        listener.v_server_group_id = a.clone();
        cloud.seed_listener(&lb, listener).await;
        (lb, a, b)
    }

    #[tokio::test]
    async fn test_reused_missing_load_balancer() {
        let clb = Clb::new(cloud());
        let ctx = web(&[80], &[(keys::LOAD_BALANCER_ID, "lb-missing")]);
        let err = clb.build_remote(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Reference(_)));
    }

    #[tokio::test]
    async fn test_reused_in_other_vpc() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let lb = cloud
            .seed_load_balancer(LoadBalancerAttribute {
                load_balancer_name: "elsewhere".to_string(),
                vpc_id: "vpc-other".to_string(),
                ..Default::default()
            })
            .await;

        let ctx = web(&[80], &[(keys::LOAD_BALANCER_ID, lb.as_str())]);
        let err = reconcile(&clb, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Reference(_)), "{}", err);
        assert!(err.to_string().contains("vpc-other"), "{}", err);
        assert!(cloud.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_reused_keep_converges_owned_groups() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let (lb, _, _) = shared_lb(&cloud).await;
        let pass = |override_listeners: &str, nodes: &[&str]| {
            let svc = service(
                "web",
                vec![service_port("p80", 80, 8080, 30080)],
                &[
                    (keys::LOAD_BALANCER_ID, lb.as_str()),
                    (keys::OVERRIDE_LISTENER, override_listeners),
                ],
            );
            context(svc).with_backends(None, nodes.iter().map(|n| node(n)).collect())
        };

        let ctx = pass("true", &["n1"]);
        reconcile(&clb, &ctx).await.unwrap();
        let name = ctx.named_key(80).with_protocol(Protocol::Tcp).encode();

        // listeners are left alone, the group we own still follows the nodes
        let ctx = pass("false", &["n1", "n2"]);
        cloud.clear_calls().await;
        let mdl = reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(mdl.group_by_name(&name).unwrap().backends.len(), 2);
        assert_eq!(cloud.calls().await, vec!["AddVServerGroupBackendServers"]);
    }

    #[tokio::test]
    async fn test_reused_keep_requires_bound_vgroup() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let (lb, a, b) = shared_lb(&cloud).await;

        let vgroup = format!("{}:80", b);
        let ctx = web(&[80], &[(keys::LOAD_BALANCER_ID, &lb), (keys::VGROUP_PORT, &vgroup)]);
        let err = reconcile(&clb, &ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("consistency error: port 80 does not use vgroup id {}", b)
        );
        assert!(cloud.calls().await.is_empty());

        let vgroup = format!("{}:80", a);
        let ctx = web(&[80], &[(keys::LOAD_BALANCER_ID, &lb), (keys::VGROUP_PORT, &vgroup)]);
        reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(cloud.calls().await, vec!["AddVServerGroupBackendServers"]);
        assert_eq!(cloud.clb_listeners(&lb).await[0].description, "user-listener");
    }

    #[tokio::test]
    async fn test_reused_override_takes_over_listener() {
        let cloud = cloud();
        let clb = Clb::new(cloud.clone());
        let (lb, _, b) = shared_lb(&cloud).await;

        let vgroup = format!("{}:80", b);
        let ctx = web(
            &[80],
            &[
                (keys::LOAD_BALANCER_ID, &lb),
                (keys::OVERRIDE_LISTENER, "true"),
                (keys::VGROUP_PORT, &vgroup),
            ],
        );
        let mdl = reconcile(&clb, &ctx).await.unwrap();
        assert_eq!(clb.ingress_address(&mdl).as_deref(), Some("47.1.2.3"));
        let listener = &cloud.clb_listeners(&lb).await[0];
        assert_eq!(listener.v_server_group_id, b);
        assert_eq!(
            listener.description,
            ctx.named_key(80).with_protocol(Protocol::Tcp).encode()
        );
        assert!(!cloud.calls().await.contains(&"CreateLoadBalancer".to_string()));

        let group = mdl.group_by_id(&b).unwrap();
        assert_eq!(group.backends.len(), 3);

        // cleanup releases the port and withdraws only our backends
        let remote = clb.build_remote(&ctx).await.unwrap();
        clb.cleanup(&ctx, remote).await.unwrap();
        assert_eq!(cloud.load_balancer_count().await, 1);
        assert!(cloud.clb_listeners(&lb).await.is_empty());
        let groups = cloud.describe_vserver_groups(&lb).await.unwrap();
        let b_group = groups.iter().find(|g| g.v_server_group_id == b).unwrap();
        assert_eq!(b_group.backends, vec![foreign_backend()]);
    }
}
