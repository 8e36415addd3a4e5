//! Reconcile tests for the NLB family against the in-memory cloud

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::annotation::keys;
    use crate::cloud::{MemoryCloud, NlbApi};
    use crate::config::CloudConfig;
    use crate::context::RequestContext;
    use crate::error::Error;
    use crate::manager::{LoadBalancerFamily, Nlb};
    use crate::model::{
        Backend, BackendType, NetworkLoadBalancer, NlbAttribute, NlbListener, Protocol,
        ServerGroup, ServerGroupType,
    };
    use crate::test_fixtures::{
        config, context, dns_service, endpoints, node, service, service_port, VPC_ID,
    };

    fn cloud() -> Arc<MemoryCloud> {
        Arc::new(MemoryCloud::new("cn-hangzhou", VPC_ID))
    }

    fn web(annotations: &[(&str, &str)]) -> RequestContext {
        context(service(
            "web",
            vec![
                service_port("http", 80, 8080, 30080),
                service_port("alt", 8080, 8080, 30081),
            ],
            annotations,
        ))
        .with_backends(
            Some(endpoints(
                "web",
                &[("10.0.0.1", Some("n1")), ("10.0.0.2", Some("n2"))],
                &[("http", 8080)],
            )),
            vec![node("n1"), node("n2")],
        )
    }

    async fn reconcile(nlb: &Nlb, ctx: &RequestContext) -> crate::Result<NetworkLoadBalancer> {
        let local = nlb.build_local(ctx)?;
        let remote = nlb.build_remote(ctx).await?;
        nlb.apply(ctx, &local, remote).await
    }

    fn manual_server() -> Backend {
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

    #[tokio::test]
    async fn test_create_then_converged() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let ctx = web(&[]);

        let mdl = reconcile(&nlb, &ctx).await.unwrap();
        assert!(nlb.ingress_address(&mdl).unwrap().ends_with(".nlb.aliyuncsslb.com"));
        assert_eq!(mdl.attribute.zone_mappings[0].vswitch_id, "vsw-default");
        assert_eq!(mdl.listeners.len(), 2);
        // node ports differ, so each port has its own group
        assert_eq!(mdl.server_groups.len(), 2);
        let group = mdl.group_by_name("k8s.30080.tcp.web.default.c1a2b3").unwrap();
        assert_eq!(group.server_group_type, ServerGroupType::Instance);
        assert_eq!(group.servers.len(), 2);
        let listener = mdl.listener(80, Protocol::Tcp).unwrap();
        assert_eq!(listener.server_group_id, group.server_group_id);

        cloud.clear_calls().await;
        reconcile(&nlb, &ctx).await.unwrap();
        assert!(cloud.calls().await.is_empty(), "{:?}", cloud.calls().await);
    }

    #[tokio::test]
    async fn test_eni_ports_share_a_group() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let ctx = web(&[(keys::BACKEND_TYPE, "eni")]);

        let mdl = reconcile(&nlb, &ctx).await.unwrap();
        assert_eq!(mdl.server_groups.len(), 1);
        let group = &mdl.server_groups[0];
        assert_eq!(group.server_group_type, ServerGroupType::Ip);
        assert_eq!(group.server_group_name, "k8s.8080.tcp.web.default.c1a2b3");
        let mut ids: Vec<_> = group.servers.iter().map(|s| s.server_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(mdl
            .listeners
            .iter()
            .all(|l| l.server_group_id == group.server_group_id));
    }

    #[tokio::test]
    async fn test_tcp_and_udp_on_one_port() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let ctx = context(dns_service(&[])).with_backends(None, vec![node("n1")]);

        let mdl = reconcile(&nlb, &ctx).await.unwrap();
        assert_eq!(mdl.listeners.len(), 2);
        assert_eq!(mdl.server_groups.len(), 2);
        for (protocol, node_port) in [(Protocol::Tcp, 30053), (Protocol::Udp, 30054)] {
            let listener = mdl.listener(53, protocol).unwrap();
            let group = mdl.group_by_id(&listener.server_group_id).unwrap();
            assert_eq!(
                group.server_group_name,
                format!("k8s.{}.{}.dns.default.c1a2b3", node_port, protocol)
            );
            let ports: Vec<i32> = group.servers.iter().map(|s| s.port).collect();
            assert_eq!(ports, vec![node_port]);
        }

        cloud.clear_calls().await;
        reconcile(&nlb, &ctx).await.unwrap();
        assert!(cloud.calls().await.is_empty(), "{:?}", cloud.calls().await);
    }

    #[tokio::test]
    async fn test_untagged_load_balancer_found_by_name() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let ctx = web(&[]);
        let lb = cloud
            .seed_nlb(NlbAttribute {
                load_balancer_name: ctx.anno.default_load_balancer_name(),
                dns_name: "found.nlb.aliyuncsslb.com".to_string(),
                ..Default::default()
            })
            .await;

        let remote = nlb.build_remote(&ctx).await.unwrap();
        assert_eq!(remote.attribute.load_balancer_id, lb);

        let mdl = reconcile(&nlb, &ctx).await.unwrap();
        assert_eq!(mdl.attribute.load_balancer_id, lb);
        assert_eq!(cloud.load_balancer_count().await, 1);
        assert!(!cloud
            .calls()
            .await
            .contains(&"CreateNetworkLoadBalancer".to_string()));
    }

    #[tokio::test]
    async fn test_reused_in_other_vpc() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let lb = cloud
            .seed_nlb(NlbAttribute {
                load_balancer_name: "elsewhere".to_string(),
                vpc_id: "vpc-other".to_string(),
                ..Default::default()
            })
            .await;

        let ctx = web(&[(keys::LOAD_BALANCER_ID, lb.as_str())]);
        let err = reconcile(&nlb, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Reference(_)), "{}", err);
        assert!(err.to_string().contains("vpc-other"), "{}", err);
        assert!(cloud.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_reused_keep_converges_owned_groups() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let lb = cloud
            .seed_nlb(NlbAttribute {
                load_balancer_name: "shared".to_string(),
                dns_name: "shared.nlb.aliyuncsslb.com".to_string(),
                ..Default::default()
            })
            .await;
        let pass = |override_listeners: &str, nodes: &[&str]| {
            let svc = service(
                "web",
                vec![service_port("http", 80, 8080, 30080)],
                &[
                    (keys::LOAD_BALANCER_ID, lb.as_str()),
                    (keys::OVERRIDE_LISTENER, override_listeners),
                ],
            );
            context(svc).with_backends(None, nodes.iter().map(|n| node(n)).collect())
        };

        reconcile(&nlb, &pass("true", &["n1"])).await.unwrap();

        // listeners are left alone, the group we own still follows the nodes
        cloud.clear_calls().await;
        let mdl = reconcile(&nlb, &pass("false", &["n1", "n2"])).await.unwrap();
        let group = mdl.group_by_name("k8s.30080.tcp.web.default.c1a2b3").unwrap();
        assert_eq!(group.servers.len(), 2);
        let calls = cloud.calls().await;
        assert!(calls.contains(&"AddServersToServerGroup".to_string()), "{:?}", calls);
        assert!(!calls.iter().any(|c| c.contains("Listener")), "{:?}", calls);
    }

    #[tokio::test]
    async fn test_group_attribute_change() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        reconcile(&nlb, &web(&[])).await.unwrap();
        cloud.clear_calls().await;

        let mdl = reconcile(&nlb, &web(&[(keys::SCHEDULER, "wrr")])).await.unwrap();
        assert_eq!(
            cloud.calls().await,
            vec!["UpdateServerGroupAttribute", "UpdateServerGroupAttribute"]
        );
        // the health check survives a partial update
        assert!(mdl
            .server_groups
            .iter()
            .all(|g| g.health_check.enabled == Some(true)));
    }

    #[tokio::test]
    async fn test_zone_mappings_required() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let svc = service("web", vec![service_port("http", 80, 8080, 30080)], &[]);
        let zoneless = CloudConfig {
            zone_id: None,
            ..config()
        };
        let ctx = RequestContext::new(Arc::new(svc.clone()), Arc::new(zoneless.clone()));
        let err = reconcile(&nlb, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Annotation { .. }), "{}", err);

        let mut svc = svc;
        svc.metadata.annotations.get_or_insert_with(Default::default).insert(
            crate::annotation::annotation(keys::ZONE_MAPS),
            "cn-hangzhou-j:vsw-j,cn-hangzhou-k:vsw-k".to_string(),
        );
        let ctx = RequestContext::new(Arc::new(svc), Arc::new(zoneless));
        let mdl = reconcile(&nlb, &ctx).await.unwrap();
        assert_eq!(mdl.attribute.zone_mappings.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_load_balancer_and_groups() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let ctx = web(&[]);
        reconcile(&nlb, &ctx).await.unwrap();

        let remote = nlb.build_remote(&ctx).await.unwrap();
        nlb.cleanup(&ctx, remote).await.unwrap();
        assert_eq!(cloud.load_balancer_count().await, 0);
        assert!(cloud.list_server_groups(VPC_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reused_override_and_cleanup() {
        let cloud = cloud();
        let nlb = Nlb::new(cloud.clone());
        let lb = cloud
            .seed_nlb(NlbAttribute {
                load_balancer_name: "shared".to_string(),
                dns_name: "shared.nlb.aliyuncsslb.com".to_string(),
                ..Default::default()
            })
            .await;
        let a = cloud
            .create_server_group(&ServerGroup {
                server_group_name: "user-a".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let b = cloud
            .create_server_group(&ServerGroup {
                server_group_name: "user-b".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        cloud.add_servers(&b, &[manual_server()]).await.unwrap();
        let mut listener = NlbListener::new(80, Protocol::Tcp);
        listener.listener_description = "user-listener".to_string();
        listener.server_group_id = a.clone();
        NlbApi::create_listener(&*cloud, &lb, &listener).await.unwrap();

        let svc = service("web", vec![service_port("http", 80, 8080, 30080)], &[]);
        let vgroup = format!("{}:80", b);
        let base = context(svc).with_backends(None, vec![node("n1")]);

        // without override the listener must already point at the group
        let mut keep = base.service.as_ref().clone();
        keep.metadata.annotations = Some(
            [
                (crate::annotation::annotation(keys::LOAD_BALANCER_ID), lb.clone()),
                (crate::annotation::annotation(keys::VGROUP_PORT), vgroup.clone()),
            ]
            .into(),
        );
        let ctx = context(keep).with_backends(None, vec![node("n1")]);
        let err = reconcile(&nlb, &ctx).await.unwrap_err();
        assert!(err
            .to_string()
            .contains(&format!("port 80 does not use vgroup id {}", b)));

        let mut takeover = base.service.as_ref().clone();
        takeover.metadata.annotations = Some(
            [
                (crate::annotation::annotation(keys::LOAD_BALANCER_ID), lb.clone()),
                (crate::annotation::annotation(keys::VGROUP_PORT), vgroup),
                (crate::annotation::annotation(keys::OVERRIDE_LISTENER), "true".to_string()),
            ]
            .into(),
        );
        let ctx = context(takeover).with_backends(None, vec![node("n1")]);
        let mdl = reconcile(&nlb, &ctx).await.unwrap();
        assert_eq!(
            nlb.ingress_address(&mdl).as_deref(),
            Some("shared.nlb.aliyuncsslb.com")
        );
        let listener = mdl.listener(80, Protocol::Tcp).unwrap();
        assert_eq!(listener.server_group_id, b);
        assert_eq!(listener.listener_description, "k8s.80.tcp.web.default.c1a2b3");
        assert_eq!(mdl.group_by_id(&b).unwrap().servers.len(), 2);

        let remote = nlb.build_remote(&ctx).await.unwrap();
        nlb.cleanup(&ctx, remote).await.unwrap();
        assert_eq!(cloud.load_balancer_count().await, 1);
        assert!(cloud.list_listeners(&lb).await.unwrap().is_empty());
        let groups = cloud.list_server_groups(VPC_ID).await.unwrap();
        assert_eq!(groups.len(), 2);
        let b_group = groups.iter().find(|g| g.server_group_id == b).unwrap();
        assert_eq!(b_group.servers, vec![manual_server()]);
    }
}
