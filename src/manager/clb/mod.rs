//! Classic load balancer family

mod listener;
mod load_balancer;
mod vgroup;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::backend::BackendCandidates;
use crate::cloud::SlbApi;
use crate::context::RequestContext;
use crate::error::Result;
use crate::manager::{check_group_bindings, ListenerPolicy, LoadBalancerFamily};
use crate::model::{Flag, LoadBalancer};

pub use listener::{listener_patch, ListenerManager};
pub use load_balancer::LoadBalancerManager;
pub use vgroup::{VGroupManager, MAX_BACKEND_BATCH};

/// Drives CLB load balancers, listeners and vserver groups
pub struct Clb {
    lb: LoadBalancerManager,
    listeners: ListenerManager,
    vgroups: VGroupManager,
}

impl Clb {
    pub fn new(cloud: Arc<dyn SlbApi>) -> Self {
        Self {
            lb: LoadBalancerManager::new(cloud.clone()),
            listeners: ListenerManager::new(cloud.clone()),
            vgroups: VGroupManager::new(cloud),
        }
    }
}

#[async_trait]
impl LoadBalancerFamily for Clb {
    type Model = LoadBalancer;

    fn name(&self) -> &'static str {
        "clb"
    }

    fn build_local(&self, ctx: &RequestContext) -> Result<LoadBalancer> {
        let candidates =
            BackendCandidates::new(ctx, ctx.endpoints.clone(), ctx.nodes.clone())?;
        let mut mdl = LoadBalancer::new(ctx.namespaced_name());
        self.lb.build_local_model(ctx, &mut mdl)?;
        self.listeners.build_local_model(ctx, &mut mdl)?;
        self.vgroups.build_local_model(ctx, &candidates, &mut mdl)?;
        Ok(mdl)
    }

    async fn build_remote(&self, ctx: &RequestContext) -> Result<LoadBalancer> {
        let mut mdl = LoadBalancer::new(ctx.namespaced_name());
        self.lb.find(ctx, &mut mdl).await?;
        self.vgroups.find(ctx, &mut mdl).await?;
        self.listeners.find(&mut mdl).await?;
        Ok(mdl)
    }

    #[instrument(skip_all, fields(service = %ctx.namespaced_name()))]
    async fn apply(
        &self,
        ctx: &RequestContext,
        local: &LoadBalancer,
        mut remote: LoadBalancer,
    ) -> Result<LoadBalancer> {
        let policy = ListenerPolicy::of(ctx)?;
        if policy == ListenerPolicy::Keep {
            check_group_bindings(ctx, |port| {
                remote
                    .listeners
                    .iter()
                    .filter(|l| l.listener_port == port)
                    .map(|l| l.v_server_group_id.clone())
                    .collect()
            })?;
        }

        if remote.attribute.load_balancer_id.is_empty() {
            remote.attribute = self.lb.create(ctx, local).await?;
        } else {
            self.lb.update(ctx, local, &mut remote).await?;
        }
        let lb_id = remote.attribute.load_balancer_id.clone();

        // with listeners kept, only groups that already exist are converged;
        // a new one would have no listener
        let mut groups: Vec<_> = local
            .vserver_groups
            .iter()
            .filter(|g| {
                policy != ListenerPolicy::Keep
                    || g.is_user_managed
                    || remote.group_by_name(&g.v_server_group_name).is_some()
            })
            .cloned()
            .collect();
        self.vgroups.resolve_eni_ids(ctx, &mut groups).await?;
        let applied = self
            .vgroups
            .apply(ctx, &lb_id, &groups, &remote.vserver_groups)
            .await?;

        self.listeners
            .apply(ctx, policy, &lb_id, &local.listeners, &remote.listeners, &applied)
            .await?;
        if policy != ListenerPolicy::Keep {
            self.vgroups
                .delete_stale(&applied, &remote.vserver_groups)
                .await?;
        }

        self.build_remote(ctx).await
    }

    #[instrument(skip_all, fields(service = %ctx.namespaced_name()))]
    async fn cleanup(&self, ctx: &RequestContext, remote: LoadBalancer) -> Result<()> {
        let attr = &remote.attribute;
        if attr.load_balancer_id.is_empty() {
            info!("no load balancer left for {}", ctx.namespaced_name());
            return Ok(());
        }
        if !attr.is_user_managed && attr.delete_protection != Some(Flag::On) {
            return self.lb.delete(ctx, &remote).await;
        }

        let key = ctx.named_key(0);
        if ListenerPolicy::of(ctx)? != ListenerPolicy::Keep {
            for l in remote.listeners.iter().filter(|l| l.is_owned_by(&key)) {
                self.listeners.delete(&attr.load_balancer_id, l).await?;
            }
        }
        for group in &remote.vserver_groups {
            self.vgroups.delete(ctx, group).await?;
        }
        Ok(())
    }

    fn ingress_address(&self, model: &LoadBalancer) -> Option<String> {
        Some(model.attribute.address.clone()).filter(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod clb_test;
