use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::backend::traffic_policy;
use crate::cloud::NlbApi;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::listener::nlb::build_nlb_listener;
use crate::listener::set_and_differs;
use crate::manager::ListenerPolicy;
use crate::model::{NamedKey, NetworkLoadBalancer, NlbListener, ServerGroup};

pub struct ListenerManager {
    cloud: Arc<dyn NlbApi>,
}

impl ListenerManager {
    pub fn new(cloud: Arc<dyn NlbApi>) -> Self {
        Self { cloud }
    }

    pub fn build_local_model(
        &self,
        ctx: &RequestContext,
        mdl: &mut NetworkLoadBalancer,
    ) -> Result<()> {
        let policy = traffic_policy(ctx)?;
        for port in ctx.ports() {
            mdl.listeners.push(build_nlb_listener(ctx, &port, policy)?);
        }
        Ok(())
    }

    pub async fn find(&self, mdl: &mut NetworkLoadBalancer) -> Result<()> {
        let lb_id = &mdl.attribute.load_balancer_id;
        if lb_id.is_empty() {
            return Ok(());
        }
        let mut listeners = self.cloud.list_listeners(lb_id).await?;
        for l in &mut listeners {
            l.named_key = NamedKey::decode(&l.listener_description).ok();
        }
        mdl.listeners = listeners;
        Ok(())
    }

    /// Converge listeners, matched on port and protocol
    #[instrument(skip_all, fields(service = %ctx.namespaced_name(), lb = %lb_id))]
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        policy: ListenerPolicy,
        lb_id: &str,
        local: &[NlbListener],
        remote: &[NlbListener],
        groups: &[ServerGroup],
    ) -> Result<()> {
        if policy == ListenerPolicy::Keep {
            debug!("listeners of reused network load balancer {} are left as they are", lb_id);
            return Ok(());
        }
        let key = ctx.named_key(0);
        let same = |a: &NlbListener, b: &NlbListener| {
            a.listener_port == b.listener_port && a.listener_protocol == b.listener_protocol
        };

        for have in remote.iter().filter(|l| l.is_owned_by(&key)) {
            if !local.iter().any(|l| same(l, have)) {
                self.delete(have).await?;
            }
        }

        for want in local {
            let mut want = want.clone();
            want.server_group_id = groups
                .iter()
                .find(|g| g.server_group_name == want.server_group_name)
                .map(|g| g.server_group_id.clone())
                .ok_or_else(|| {
                    Error::Consistency(format!(
                        "no server group {} for port {}",
                        want.server_group_name, want.listener_port
                    ))
                })?;

            match remote.iter().find(|l| same(l, &want)) {
                None => {
                    info!(
                        "creating {} listener {} ({})",
                        want.listener_protocol, want.listener_port, want.listener_description
                    );
                    self.cloud.create_listener(lb_id, &want).await?;
                }
                Some(have) if !have.is_owned_by(&key) && policy != ListenerPolicy::Override => {
                    return Err(Error::Consistency(format!(
                        "port {} already used by a listener not created for this service, \
                         set force-override-listeners to take it over",
                        want.listener_port
                    )));
                }
                Some(have) => {
                    if let Some(patch) = listener_patch(&want, have) {
                        info!(
                            "updating {} listener {}",
                            want.listener_protocol, want.listener_port
                        );
                        self.cloud.update_listener(&patch).await?;
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn delete(&self, listener: &NlbListener) -> Result<()> {
        info!(
            "deleting {} listener {} ({})",
            listener.listener_protocol, listener.listener_port, listener.listener_description
        );
        self.cloud.delete_listener(&listener.listener_id).await
    }
}

/// Fields of `local` that differ from `remote`, keyed by the remote id
pub fn listener_patch(local: &NlbListener, remote: &NlbListener) -> Option<NlbListener> {
    let mut patch = NlbListener::new(remote.listener_port, remote.listener_protocol);
    patch.listener_id = remote.listener_id.clone();
    let mut changed = false;

    if local.listener_description != remote.listener_description {
        patch.listener_description = local.listener_description.clone();
        changed = true;
    }
    if local.server_group_id != remote.server_group_id {
        patch.server_group_id = local.server_group_id.clone();
        changed = true;
    }
    if set_and_differs(&local.idle_timeout, &remote.idle_timeout) {
        patch.idle_timeout = local.idle_timeout;
        changed = true;
    }
    if set_and_differs(&local.proxy_protocol_enabled, &remote.proxy_protocol_enabled) {
        patch.proxy_protocol_enabled = local.proxy_protocol_enabled;
        changed = true;
    }
    if set_and_differs(&local.cps, &remote.cps) {
        patch.cps = local.cps;
        changed = true;
    }
    if set_and_differs(&local.security_policy_id, &remote.security_policy_id) {
        patch.security_policy_id = local.security_policy_id.clone();
        changed = true;
    }
    if !local.certificate_ids.is_empty() && local.certificate_ids != remote.certificate_ids {
        patch.certificate_ids = local.certificate_ids.clone();
        changed = true;
    }
    if set_and_differs(&local.ca_enabled, &remote.ca_enabled)
        || (!local.ca_certificate_ids.is_empty()
            && local.ca_certificate_ids != remote.ca_certificate_ids)
    {
        patch.ca_enabled = local.ca_enabled;
        patch.ca_certificate_ids = local.ca_certificate_ids.clone();
        changed = true;
    }
    if set_and_differs(&local.alpn_enabled, &remote.alpn_enabled)
        || set_and_differs(&local.alpn_policy, &remote.alpn_policy)
    {
        patch.alpn_enabled = local.alpn_enabled;
        patch.alpn_policy = local.alpn_policy.clone();
        changed = true;
    }
    changed.then_some(patch)
}
