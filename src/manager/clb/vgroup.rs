use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::{build_backends, BackendCandidates, BackendTarget};
use crate::cloud::SlbApi;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::manager::{referenced_group, BackendDiff};
use crate::model::{Backend, BackendType, LoadBalancer, NamedKey, VServerGroup};

/// Backends per vserver group call
pub const MAX_BACKEND_BATCH: usize = 20;

pub struct VGroupManager {
    cloud: Arc<dyn SlbApi>,
}

impl VGroupManager {
    pub fn new(cloud: Arc<dyn SlbApi>) -> Self {
        Self { cloud }
    }

    /// One group per listener that forwards to backends
    pub fn build_local_model(
        &self,
        ctx: &RequestContext,
        candidates: &BackendCandidates,
        mdl: &mut LoadBalancer,
    ) -> Result<()> {
        let weight = ctx.anno.weight()?;
        let mut groups: Vec<VServerGroup> = Vec::new();

        for listener in mdl.listeners.iter().filter(|l| !l.v_group_name.is_empty()) {
            if groups.iter().any(|g| g.v_server_group_name == listener.v_group_name) {
                continue;
            }
            let Some(port) = listener.service_port.as_ref() else {
                continue;
            };
            let backends = build_backends(
                ctx,
                candidates,
                &BackendTarget {
                    service_port: port,
                    weight,
                    description: &listener.v_group_name,
                },
            )?;

            let mut group = VServerGroup {
                named_key: listener.named_key.clone(),
                v_server_group_name: listener.v_group_name.clone(),
                service_port: Some(port.clone()),
                weight,
                backends,
                ..Default::default()
            };
            if let Some(id) = referenced_group(ctx, port.port)? {
                group.v_server_group_id = id;
                group.is_user_managed = true;
            }
            groups.push(group);
        }
        mdl.vserver_groups = groups;
        Ok(())
    }

    /// Groups owned by the Service plus the ones it references
    #[instrument(skip(self, ctx, mdl), fields(service = %ctx.namespaced_name()))]
    pub async fn find(&self, ctx: &RequestContext, mdl: &mut LoadBalancer) -> Result<()> {
        let lb_id = mdl.attribute.load_balancer_id.clone();
        if lb_id.is_empty() {
            return Ok(());
        }
        let referenced: Vec<String> = ctx
            .anno
            .vgroup_port()?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let key = ctx.named_key(0);

        for mut group in self.cloud.describe_vserver_groups(&lb_id).await? {
            if referenced.contains(&group.v_server_group_id) {
                group.is_user_managed = true;
                group.named_key = NamedKey::decode(&group.v_server_group_name).ok();
                mdl.vserver_groups.push(group);
            } else if key.owns(&group.v_server_group_name) {
                group.named_key = NamedKey::decode(&group.v_server_group_name).ok();
                mdl.vserver_groups.push(group);
            }
        }

        for id in &referenced {
            if mdl.group_by_id(id).is_none() {
                return Err(Error::Reference(format!(
                    "vserver group {} not found on load balancer {}",
                    id, lb_id
                )));
            }
        }
        Ok(())
    }

    /// Fill in ENI ids of pod backends
    ///
    /// Backends whose address has no network interface yet are dropped; the
    /// next pass picks them up.
    pub async fn resolve_eni_ids(
        &self,
        ctx: &RequestContext,
        groups: &mut [VServerGroup],
    ) -> Result<()> {
        let ips: Vec<String> = groups
            .iter()
            .flat_map(|g| g.backends.iter())
            .filter(|b| b.backend_type != BackendType::Ecs && b.server_id.is_empty())
            .map(|b| b.server_ip.clone())
            .collect();
        if ips.is_empty() {
            return Ok(());
        }

        let enis = self
            .cloud
            .find_network_interfaces(&ctx.config.vpc_id, &ips)
            .await?;
        for group in groups.iter_mut() {
            group.backends.retain_mut(|b| {
                if b.backend_type == BackendType::Ecs || !b.server_id.is_empty() {
                    return true;
                }
                match enis.get(&b.server_ip) {
                    Some(eni) => {
                        b.server_id = eni.clone();
                        true
                    }
                    None => {
                        warn!("no network interface found for {}, skipping", b.server_ip);
                        false
                    }
                }
            });
        }
        Ok(())
    }

    /// Create or update every local group; returns the groups with their ids
    #[instrument(skip(self, ctx, local, remote), fields(service = %ctx.namespaced_name()))]
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        lb_id: &str,
        local: &[VServerGroup],
        remote: &[VServerGroup],
    ) -> Result<Vec<VServerGroup>> {
        let mut applied = Vec::with_capacity(local.len());
        for want in local {
            let have = if want.is_user_managed {
                remote.iter().find(|g| g.v_server_group_id == want.v_server_group_id)
            } else {
                remote
                    .iter()
                    .find(|g| g.v_server_group_name == want.v_server_group_name)
            };

            let mut group = want.clone();
            match have {
                Some(have) => {
                    group.v_server_group_id = have.v_server_group_id.clone();
                    self.update(ctx, &group, have).await?;
                }
                None => {
                    group.v_server_group_id = self.create(lb_id, want).await?;
                }
            }
            applied.push(group);
        }
        Ok(applied)
    }

    async fn create(&self, lb_id: &str, group: &VServerGroup) -> Result<String> {
        let mut batches = group.backends.chunks(MAX_BACKEND_BATCH);
        let first = batches.next().unwrap_or_default();
        let id = self
            .cloud
            .create_vserver_group(lb_id, &group.v_server_group_name, first)
            .await?;
        for batch in batches {
            self.cloud.add_vserver_group_backends(&id, batch).await?;
        }
        info!(
            "created vserver group {} ({}) with {} backends",
            group.v_server_group_name,
            id,
            group.backends.len()
        );
        Ok(id)
    }

    /// Converge the backends of one existing group
    pub async fn update(
        &self,
        ctx: &RequestContext,
        local: &VServerGroup,
        remote: &VServerGroup,
    ) -> Result<()> {
        let key = ctx.named_key(0);
        let owned = |b: &Backend| !remote.is_user_managed || key.owns(&b.description);
        let diff = BackendDiff::compute(&local.backends, &remote.backends, owned);
        if diff.is_empty() {
            debug!("vserver group {} is up to date", remote.v_server_group_id);
            return Ok(());
        }

        let id = &remote.v_server_group_id;
        info!(
            "vserver group {}: +{} -{} ~{} backends",
            id,
            diff.add.len(),
            diff.remove.len(),
            diff.update.len()
        );
        for batch in diff.add.chunks(MAX_BACKEND_BATCH) {
            self.cloud.add_vserver_group_backends(id, batch).await?;
        }
        for batch in diff.remove.chunks(MAX_BACKEND_BATCH) {
            self.cloud.remove_vserver_group_backends(id, batch).await?;
        }
        for batch in diff.update.chunks(MAX_BACKEND_BATCH) {
            self.cloud.set_vserver_group_backends(id, batch).await?;
        }
        Ok(())
    }

    /// Delete owned groups that no local listener uses any more
    ///
    /// Runs after the listeners were converged, so the groups are unbound.
    pub async fn delete_stale(
        &self,
        local: &[VServerGroup],
        remote: &[VServerGroup],
    ) -> Result<()> {
        for have in remote.iter().filter(|g| !g.is_user_managed) {
            if local
                .iter()
                .any(|g| g.v_server_group_name == have.v_server_group_name)
            {
                continue;
            }
            info!(
                "deleting stale vserver group {} ({})",
                have.v_server_group_name, have.v_server_group_id
            );
            self.cloud.delete_vserver_group(&have.v_server_group_id).await?;
        }
        Ok(())
    }

    /// Delete an owned group, or withdraw our backends from a referenced one
    pub async fn delete(&self, ctx: &RequestContext, group: &VServerGroup) -> Result<()> {
        if !group.is_user_managed {
            info!(
                "deleting vserver group {} ({})",
                group.v_server_group_name, group.v_server_group_id
            );
            return self.cloud.delete_vserver_group(&group.v_server_group_id).await;
        }

        let key = ctx.named_key(0);
        let ours: Vec<Backend> = group
            .backends
            .iter()
            .filter(|b| key.owns(&b.description))
            .cloned()
            .collect();
        if ours.is_empty() {
            return Ok(());
        }
        info!(
            "removing {} backends from referenced vserver group {}",
            ours.len(),
            group.v_server_group_id
        );
        for batch in ours.chunks(MAX_BACKEND_BATCH) {
            self.cloud
                .remove_vserver_group_backends(&group.v_server_group_id, batch)
                .await?;
        }
        Ok(())
    }
}
