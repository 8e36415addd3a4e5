use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::annotation::keys;
use crate::backend::{build_backends, BackendCandidates, BackendTarget};
use crate::cloud::NlbApi;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::listener::nlb::{health_check, server_group_protocol};
use crate::listener::{parse_in_range, set_and_differs};
use crate::manager::{referenced_group, BackendDiff};
use crate::model::{
    Backend, BackendType, NamedKey, NetworkLoadBalancer, NlbHealthCheck, ServerGroup,
    ServerGroupType, TrafficPolicy,
};

/// Servers per server group call
pub const MAX_SERVER_BATCH: usize = 40;

pub struct ServerGroupManager {
    cloud: Arc<dyn NlbApi>,
}

impl ServerGroupManager {
    pub fn new(cloud: Arc<dyn NlbApi>) -> Self {
        Self { cloud }
    }

    /// One group per distinct group name across the listeners
    pub fn build_local_model(
        &self,
        ctx: &RequestContext,
        candidates: &BackendCandidates,
        mdl: &mut NetworkLoadBalancer,
    ) -> Result<()> {
        let anno = &ctx.anno;
        let weight = anno.weight()?;
        let group_type = match candidates.policy {
            TrafficPolicy::Eni => ServerGroupType::Ip,
            TrafficPolicy::Local | TrafficPolicy::Cluster => ServerGroupType::Instance,
        };
        let hc = health_check(ctx)?;
        let connection_drain = anno.flag(keys::CONNECTION_DRAIN)?.map(|f| f.is_on());
        let connection_drain_timeout =
            parse_in_range(anno, keys::CONNECTION_DRAIN_TIMEOUT, 10..=900)?;
        if connection_drain == Some(true) && connection_drain_timeout.is_none() {
            return Err(Error::annotation(
                keys::CONNECTION_DRAIN,
                "on",
                "connection-drain-timeout is required when connection drain is on",
            ));
        }

        let mut groups: Vec<ServerGroup> = Vec::new();
        for listener in &mdl.listeners {
            if groups
                .iter()
                .any(|g| g.server_group_name == listener.server_group_name)
            {
                continue;
            }
            let Some(port) = listener.service_port.as_ref() else {
                continue;
            };

            let servers = build_backends(
                ctx,
                candidates,
                &BackendTarget {
                    service_port: port,
                    weight,
                    description: &listener.server_group_name,
                },
            )?;
            let mut group = ServerGroup {
                named_key: NamedKey::decode(&listener.server_group_name).ok(),
                server_group_name: listener.server_group_name.clone(),
                server_group_type: group_type,
                protocol: Some(server_group_protocol(listener.listener_protocol)),
                scheduler: anno.parse(keys::SCHEDULER)?,
                connection_drain_enabled: connection_drain,
                connection_drain_timeout,
                preserve_client_ip_enabled: anno
                    .flag(keys::PRESERVE_CLIENT_IP)?
                    .map(|f| f.is_on()),
                vpc_id: ctx.config.vpc_id.clone(),
                resource_group_id: anno.get(keys::RESOURCE_GROUP_ID).map(String::from),
                health_check: hc.clone(),
                service_port: Some(port.clone()),
                weight,
                servers: registrable(group_type, servers),
                ..Default::default()
            };
            if let Some(id) = referenced_group(ctx, port.port)? {
                group.server_group_id = id;
                group.is_user_managed = true;
            }
            groups.push(group);
        }
        mdl.server_groups = groups;
        Ok(())
    }

    /// Owned and referenced server groups in the cluster VPC
    #[instrument(skip(self, ctx, mdl), fields(service = %ctx.namespaced_name()))]
    pub async fn find(&self, ctx: &RequestContext, mdl: &mut NetworkLoadBalancer) -> Result<()> {
        let referenced: Vec<String> = ctx
            .anno
            .vgroup_port()?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let key = ctx.named_key(0);

        for mut group in self.cloud.list_server_groups(&ctx.config.vpc_id).await? {
            let is_referenced = referenced.contains(&group.server_group_id);
            if !is_referenced && !key.owns(&group.server_group_name) {
                continue;
            }
            group.is_user_managed = is_referenced;
            group.named_key = NamedKey::decode(&group.server_group_name).ok();
            mdl.server_groups.push(group);
        }
        for id in &referenced {
            if mdl.group_by_id(id).is_none() {
                return Err(Error::Reference(format!("server group {} not found", id)));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, ctx, local, remote), fields(service = %ctx.namespaced_name()))]
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        local: &[ServerGroup],
        remote: &[ServerGroup],
    ) -> Result<Vec<ServerGroup>> {
        let mut applied = Vec::with_capacity(local.len());
        for want in local {
            let have = if want.is_user_managed {
                remote.iter().find(|g| g.server_group_id == want.server_group_id)
            } else {
                remote
                    .iter()
                    .find(|g| g.server_group_name == want.server_group_name)
            };

            let mut group = want.clone();
            match have {
                Some(have) => {
                    group.server_group_id = have.server_group_id.clone();
                    if !want.is_user_managed {
                        if let Some(patch) = group_patch(&group, have) {
                            info!("updating server group {}", have.server_group_id);
                            self.cloud.update_server_group(&patch).await?;
                        }
                    }
                    self.update_servers(ctx, &group, have).await?;
                }
                None => group.server_group_id = self.create(want).await?,
            }
            applied.push(group);
        }
        Ok(applied)
    }

    async fn create(&self, group: &ServerGroup) -> Result<String> {
        let bare = ServerGroup {
            servers: Vec::new(),
            ..group.clone()
        };
        let id = self.cloud.create_server_group(&bare).await?;
        for batch in group.servers.chunks(MAX_SERVER_BATCH) {
            self.cloud.add_servers(&id, batch).await?;
        }
        info!(
            "created server group {} ({}) with {} servers",
            group.server_group_name,
            id,
            group.servers.len()
        );
        Ok(id)
    }

    async fn update_servers(
        &self,
        ctx: &RequestContext,
        local: &ServerGroup,
        remote: &ServerGroup,
    ) -> Result<()> {
        let key = ctx.named_key(0);
        let owned = |b: &Backend| !remote.is_user_managed || key.owns(&b.description);
        let diff = BackendDiff::compute(&local.servers, &remote.servers, owned);
        if diff.is_empty() {
            debug!("server group {} is up to date", remote.server_group_id);
            return Ok(());
        }

        let id = &remote.server_group_id;
        info!(
            "server group {}: +{} -{} ~{} servers",
            id,
            diff.add.len(),
            diff.remove.len(),
            diff.update.len()
        );
        for batch in diff.add.chunks(MAX_SERVER_BATCH) {
            self.cloud.add_servers(id, batch).await?;
        }
        for batch in diff.remove.chunks(MAX_SERVER_BATCH) {
            self.cloud.remove_servers(id, batch).await?;
        }
        for batch in diff.update.chunks(MAX_SERVER_BATCH) {
            self.cloud.update_servers(id, batch).await?;
        }
        Ok(())
    }

    pub async fn delete_stale(&self, local: &[ServerGroup], remote: &[ServerGroup]) -> Result<()> {
        for have in remote.iter().filter(|g| !g.is_user_managed) {
            if local.iter().any(|g| g.server_group_name == have.server_group_name) {
                continue;
            }
            info!(
                "deleting stale server group {} ({})",
                have.server_group_name, have.server_group_id
            );
            self.cloud.delete_server_group(&have.server_group_id).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, ctx: &RequestContext, group: &ServerGroup) -> Result<()> {
        if !group.is_user_managed {
            info!(
                "deleting server group {} ({})",
                group.server_group_name, group.server_group_id
            );
            return self.cloud.delete_server_group(&group.server_group_id).await;
        }

        let key = ctx.named_key(0);
        let ours: Vec<Backend> = group
            .servers
            .iter()
            .filter(|b| key.owns(&b.description))
            .cloned()
            .collect();
        for batch in ours.chunks(MAX_SERVER_BATCH) {
            self.cloud.remove_servers(&group.server_group_id, batch).await?;
        }
        Ok(())
    }
}

/// Servers in the form the group type registers them
///
/// Ip groups take pod addresses; Instance groups take ECS instances only.
fn registrable(group_type: ServerGroupType, servers: Vec<Backend>) -> Vec<Backend> {
    servers
        .into_iter()
        .filter_map(|mut b| match (group_type, b.backend_type) {
            (ServerGroupType::Ip, BackendType::Ecs) => None,
            (ServerGroupType::Ip, _) => {
                b.server_id = b.server_ip.clone();
                Some(b)
            }
            (ServerGroupType::Instance, BackendType::Ecs) => Some(b),
            (ServerGroupType::Instance, _) => {
                warn!(
                    "pod {} cannot join an instance server group, use eni backends",
                    b.server_ip
                );
                None
            }
        })
        .collect()
}

/// Attribute changes of an owned server group, if any
pub fn group_patch(local: &ServerGroup, remote: &ServerGroup) -> Option<ServerGroup> {
    let mut patch = ServerGroup {
        server_group_id: remote.server_group_id.clone(),
        server_group_type: remote.server_group_type,
        ..Default::default()
    };
    let mut changed = false;

    if set_and_differs(&local.scheduler, &remote.scheduler) {
        patch.scheduler = local.scheduler;
        changed = true;
    }
    if set_and_differs(&local.connection_drain_enabled, &remote.connection_drain_enabled)
        || set_and_differs(&local.connection_drain_timeout, &remote.connection_drain_timeout)
    {
        patch.connection_drain_enabled = local.connection_drain_enabled;
        patch.connection_drain_timeout = local.connection_drain_timeout;
        changed = true;
    }
    if set_and_differs(&local.preserve_client_ip_enabled, &remote.preserve_client_ip_enabled) {
        patch.preserve_client_ip_enabled = local.preserve_client_ip_enabled;
        changed = true;
    }
    if health_check_changed(&local.health_check, &remote.health_check) {
        patch.health_check = local.health_check.clone();
        changed = true;
    }
    changed.then_some(patch)
}

fn health_check_changed(local: &NlbHealthCheck, remote: &NlbHealthCheck) -> bool {
    set_and_differs(&local.enabled, &remote.enabled)
        || set_and_differs(&local.check_type, &remote.check_type)
        || set_and_differs(&local.connect_port, &remote.connect_port)
        || set_and_differs(&local.healthy_threshold, &remote.healthy_threshold)
        || set_and_differs(&local.unhealthy_threshold, &remote.unhealthy_threshold)
        || set_and_differs(&local.connect_timeout, &remote.connect_timeout)
        || set_and_differs(&local.interval, &remote.interval)
        || set_and_differs(&local.domain, &remote.domain)
        || set_and_differs(&local.url, &remote.url)
        || (!local.http_code.is_empty() && local.http_code != remote.http_code)
}
