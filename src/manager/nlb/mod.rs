//! Network load balancer family
//!
//! Server groups are VPC-level resources on NLB and outlive the load
//! balancer they serve, so cleanup deletes them explicitly.

mod listener;
mod load_balancer;
mod server_group;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::backend::BackendCandidates;
use crate::cloud::NlbApi;
use crate::context::RequestContext;
use crate::error::Result;
use crate::manager::{check_group_bindings, ListenerPolicy, LoadBalancerFamily};
use crate::model::{Flag, NetworkLoadBalancer};

pub use listener::{listener_patch, ListenerManager};
pub use load_balancer::LoadBalancerManager;
pub use server_group::{group_patch, ServerGroupManager, MAX_SERVER_BATCH};

pub struct Nlb {
    lb: LoadBalancerManager,
    listeners: ListenerManager,
    groups: ServerGroupManager,
}

impl Nlb {
    pub fn new(cloud: Arc<dyn NlbApi>) -> Self {
        Self {
            lb: LoadBalancerManager::new(cloud.clone()),
            listeners: ListenerManager::new(cloud.clone()),
            groups: ServerGroupManager::new(cloud),
        }
    }
}

#[async_trait]
impl LoadBalancerFamily for Nlb {
    type Model = NetworkLoadBalancer;

    fn name(&self) -> &'static str {
        "nlb"
    }

    fn build_local(&self, ctx: &RequestContext) -> Result<NetworkLoadBalancer> {
        let candidates =
            BackendCandidates::new(ctx, ctx.endpoints.clone(), ctx.nodes.clone())?;
        let mut mdl = NetworkLoadBalancer::new(ctx.namespaced_name());
        self.lb.build_local_model(ctx, &mut mdl)?;
        self.listeners.build_local_model(ctx, &mut mdl)?;
        self.groups.build_local_model(ctx, &candidates, &mut mdl)?;
        Ok(mdl)
    }

    async fn build_remote(&self, ctx: &RequestContext) -> Result<NetworkLoadBalancer> {
        let mut mdl = NetworkLoadBalancer::new(ctx.namespaced_name());
        self.lb.find(ctx, &mut mdl).await?;
        self.groups.find(ctx, &mut mdl).await?;
        self.listeners.find(&mut mdl).await?;
        Ok(mdl)
    }

    #[instrument(skip_all, fields(service = %ctx.namespaced_name()))]
    async fn apply(
        &self,
        ctx: &RequestContext,
        local: &NetworkLoadBalancer,
        mut remote: NetworkLoadBalancer,
    ) -> Result<NetworkLoadBalancer> {
        let policy = ListenerPolicy::of(ctx)?;
        if policy == ListenerPolicy::Keep {
            check_group_bindings(ctx, |port| {
                remote
                    .listeners
                    .iter()
                    .filter(|l| l.listener_port == port)
                    .map(|l| l.server_group_id.clone())
                    .collect()
            })?;
        }

        if remote.attribute.load_balancer_id.is_empty() {
            remote.attribute = self.lb.create(ctx, local).await?;
        } else {
            self.lb.update(ctx, local, &mut remote).await?;
        }
        let lb_id = remote.attribute.load_balancer_id.clone();

        let groups: Vec<_> = local
            .server_groups
            .iter()
            .filter(|g| {
                policy != ListenerPolicy::Keep
                    || g.is_user_managed
                    || remote.group_by_name(&g.server_group_name).is_some()
            })
            .cloned()
            .collect();
        let applied = self.groups.apply(ctx, &groups, &remote.server_groups).await?;

        self.listeners
            .apply(ctx, policy, &lb_id, &local.listeners, &remote.listeners, &applied)
            .await?;
        if policy != ListenerPolicy::Keep {
            self.groups
                .delete_stale(&applied, &remote.server_groups)
                .await?;
        }

        self.build_remote(ctx).await
    }

    #[instrument(skip_all, fields(service = %ctx.namespaced_name()))]
    async fn cleanup(&self, ctx: &RequestContext, remote: NetworkLoadBalancer) -> Result<()> {
        let attr = &remote.attribute;
        let key = ctx.named_key(0);

        if !attr.load_balancer_id.is_empty() {
            if !attr.is_user_managed && attr.deletion_protection != Some(Flag::On) {
                self.lb.delete(ctx, &remote).await?;
            } else if ListenerPolicy::of(ctx)? != ListenerPolicy::Keep {
                for l in remote.listeners.iter().filter(|l| l.is_owned_by(&key)) {
                    self.listeners.delete(l).await?;
                }
            }
        } else {
            info!("no network load balancer left for {}", ctx.namespaced_name());
        }

        for group in &remote.server_groups {
            self.groups.delete(ctx, group).await?;
        }
        Ok(())
    }

    fn ingress_address(&self, model: &NetworkLoadBalancer) -> Option<String> {
        Some(model.attribute.dns_name.clone()).filter(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod nlb_test;
