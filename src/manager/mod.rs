//! Resource managers
//!
//! One manager per cloud resource kind (load balancer, listener, backend
//! group) and product family. Managers find remote resources, build the
//! desired ones and issue the create/update/delete calls that close the gap.
//! Ownership is decided by [`NamedKey`] only; a resource that does not carry
//! this Service's key and was not referenced explicitly is never touched.
//!
//! [`NamedKey`]: crate::model::NamedKey

pub mod clb;
pub mod nlb;

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::annotation::keys;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::model::Backend;

pub use clb::Clb;
pub use nlb::Nlb;

/// A load balancer product the controller can drive
#[async_trait]
pub trait LoadBalancerFamily: Send + Sync {
    type Model: Clone + Debug + Serialize + Send + Sync;

    fn name(&self) -> &'static str;

    /// Desired model derived from the Service, without I/O
    fn build_local(&self, ctx: &RequestContext) -> Result<Self::Model>;

    /// Observed model, found through the cloud API
    async fn build_remote(&self, ctx: &RequestContext) -> Result<Self::Model>;

    /// Bring the cloud in line with `local`; returns the resulting model
    async fn apply(
        &self,
        ctx: &RequestContext,
        local: &Self::Model,
        remote: Self::Model,
    ) -> Result<Self::Model>;

    /// Remove everything the Service owns
    async fn cleanup(&self, ctx: &RequestContext, remote: Self::Model) -> Result<()>;

    /// Address published in the Service status
    fn ingress_address(&self, model: &Self::Model) -> Option<String>;
}

/// Membership and weight changes of one backend group
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendDiff {
    pub add: Vec<Backend>,
    pub remove: Vec<Backend>,
    pub update: Vec<Backend>,
}

impl BackendDiff {
    /// Compare desired and registered backends
    ///
    /// Remote backends rejected by `owned` belong to someone else and are
    /// neither removed nor reweighted.
    pub fn compute(
        local: &[Backend],
        remote: &[Backend],
        owned: impl Fn(&Backend) -> bool,
    ) -> Self {
        let mut diff = BackendDiff::default();
        for want in local {
            match remote.iter().find(|r| r.identity() == want.identity()) {
                None => diff.add.push(want.clone()),
                Some(have) if owned(have) => {
                    if have.weight != want.weight || have.description != want.description {
                        diff.update.push(want.clone());
                    }
                }
                Some(have) => warn!(
                    "backend {:?} is registered by another owner ({}), leaving it",
                    want.identity(),
                    have.description
                ),
            }
        }
        for have in remote.iter().filter(|r| owned(r)) {
            if !local.iter().any(|l| l.identity() == have.identity()) {
                diff.remove.push(have.clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }
}

/// Check that each `vgroup-port` group is bound on its port
///
/// Listeners of a reused load balancer are not touched unless override is
/// requested, so a referenced group that is bound elsewhere would never
/// receive traffic. `bound_groups` lists the groups of every listener on a
/// port; a TCP and a UDP listener may share one.
pub fn check_group_bindings(
    ctx: &RequestContext,
    bound_groups: impl Fn(i32) -> Vec<String>,
) -> Result<()> {
    for (group_id, port) in ctx.anno.vgroup_port()? {
        if !bound_groups(port).contains(&group_id) {
            return Err(Error::Consistency(format!(
                "port {} does not use vgroup id {}",
                port, group_id
            )));
        }
    }
    Ok(())
}

/// Listener ownership policy for the Service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerPolicy {
    /// Load balancer created by the controller
    Owned,
    /// Reused load balancer, listeners left as they are
    Keep,
    /// Reused load balancer, Service ports taken over
    Override,
}

impl ListenerPolicy {
    pub fn of(ctx: &RequestContext) -> Result<Self> {
        if !ctx.is_reused() {
            return Ok(ListenerPolicy::Owned);
        }
        if ctx.override_listeners()? {
            Ok(ListenerPolicy::Override)
        } else {
            Ok(ListenerPolicy::Keep)
        }
    }
}

/// Explicit group ids referenced through `vgroup-port`
pub(crate) fn referenced_group(ctx: &RequestContext, port: i32) -> Result<Option<String>> {
    Ok(ctx
        .anno
        .vgroup_port()?
        .into_iter()
        .find(|(_, p)| *p == port)
        .map(|(id, _)| id))
}

/// Whether the annotation surface names an explicit load balancer
pub(crate) fn explicit_id(ctx: &RequestContext) -> Option<String> {
    ctx.anno.get(keys::LOAD_BALANCER_ID).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendType;

    fn ecs(id: &str, weight: i32, description: &str) -> Backend {
        Backend {
            server_id: id.to_string(),
            server_ip: String::new(),
            port: 30080,
            weight,
            backend_type: BackendType::Ecs,
            description: description.to_string(),
            node_name: None,
        }
    }

    #[test]
    fn test_backend_diff() {
        let local = vec![ecs("i-1", 100, "mine"), ecs("i-2", 50, "mine")];
        let remote = vec![
            ecs("i-2", 100, "mine"),
            ecs("i-3", 100, "mine"),
            ecs("i-4", 100, "theirs"),
        ];
        let diff = BackendDiff::compute(&local, &remote, |b| b.description == "mine");
        assert_eq!(diff.add, vec![ecs("i-1", 100, "mine")]);
        assert_eq!(diff.update, vec![ecs("i-2", 50, "mine")]);
        assert_eq!(diff.remove, vec![ecs("i-3", 100, "mine")]);
    }

    #[test]
    fn test_backend_diff_is_empty_when_converged() {
        let local = vec![ecs("i-1", 100, "mine")];
        assert!(BackendDiff::compute(&local, &local, |_| true).is_empty());
    }
}
