use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::cloud::SlbApi;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::listener::{build_clb_listener, health_check_changed, set_and_differs};
use crate::manager::ListenerPolicy;
use crate::model::{ListenerAttribute, LoadBalancer, NamedKey, VServerGroup};

const STATUS_STOPPED: &str = "stopped";

pub struct ListenerManager {
    cloud: Arc<dyn SlbApi>,
}

impl ListenerManager {
    pub fn new(cloud: Arc<dyn SlbApi>) -> Self {
        Self { cloud }
    }

    pub fn build_local_model(&self, ctx: &RequestContext, mdl: &mut LoadBalancer) -> Result<()> {
        for port in ctx.ports() {
            mdl.listeners.push(build_clb_listener(ctx, &port)?);
        }
        Ok(())
    }

    /// Every listener of the load balancer, owned or not
    pub async fn find(&self, mdl: &mut LoadBalancer) -> Result<()> {
        let lb_id = &mdl.attribute.load_balancer_id;
        if lb_id.is_empty() {
            return Ok(());
        }
        let mut listeners = self.cloud.describe_listeners(lb_id).await?;
        for l in &mut listeners {
            l.named_key = NamedKey::decode(&l.description).ok();
        }
        mdl.listeners = listeners;
        Ok(())
    }

    /// Converge listeners; `groups` carry the ids of the applied groups
    #[instrument(skip_all, fields(service = %ctx.namespaced_name(), lb = %lb_id))]
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        policy: ListenerPolicy,
        lb_id: &str,
        local: &[ListenerAttribute],
        remote: &[ListenerAttribute],
        groups: &[VServerGroup],
    ) -> Result<()> {
        if policy == ListenerPolicy::Keep {
            debug!("listeners of reused load balancer {} are left as they are", lb_id);
            return Ok(());
        }
        let key = ctx.named_key(0);
        let mut remote: Vec<ListenerAttribute> = remote.to_vec();

        // free ports held by listeners the Service no longer declares
        let mut kept = Vec::with_capacity(remote.len());
        for have in remote.drain(..) {
            let wanted = local
                .iter()
                .any(|l| l.listener_port == have.listener_port && l.protocol == have.protocol);
            if have.is_owned_by(&key) && !wanted {
                self.delete(lb_id, &have).await?;
            } else {
                kept.push(have);
            }
        }
        let remote = kept;

        for want in local {
            let mut want = want.clone();
            if !want.v_group_name.is_empty() {
                let group = groups
                    .iter()
                    .find(|g| g.v_server_group_name == want.v_group_name)
                    .ok_or_else(|| {
                        Error::Consistency(format!(
                            "no vserver group {} for port {}",
                            want.v_group_name, want.listener_port
                        ))
                    })?;
                want.v_server_group_id = group.v_server_group_id.clone();
            }

            let Some(have) = occupant(&remote, &want) else {
                self.create(lb_id, &want).await?;
                continue;
            };
            if !have.is_owned_by(&key) && policy != ListenerPolicy::Override {
                return Err(Error::Consistency(format!(
                    "port {} already used by a listener not created for this service, \
                     set force-override-listeners to take it over",
                    want.listener_port
                )));
            }
            if have.protocol != want.protocol {
                info!(
                    "port {} changes protocol {} -> {}, recreating the listener",
                    want.listener_port, have.protocol, want.protocol
                );
                self.delete(lb_id, have).await?;
                self.create(lb_id, &want).await?;
                continue;
            }

            if let Some(patch) = listener_patch(&want, have) {
                info!("updating {} listener {}", want.protocol, want.listener_port);
                self.cloud.modify_listener(lb_id, &patch).await?;
            }
            if have.status.as_deref() == Some(STATUS_STOPPED) {
                self.cloud
                    .start_listener(lb_id, want.listener_port, want.protocol)
                    .await?;
            }
        }
        Ok(())
    }

    async fn create(&self, lb_id: &str, listener: &ListenerAttribute) -> Result<()> {
        info!(
            "creating {} listener {} ({})",
            listener.protocol, listener.listener_port, listener.description
        );
        self.cloud.create_listener(lb_id, listener).await?;
        self.cloud
            .start_listener(lb_id, listener.listener_port, listener.protocol)
            .await
    }

    pub async fn delete(&self, lb_id: &str, listener: &ListenerAttribute) -> Result<()> {
        info!(
            "deleting {} listener {} ({})",
            listener.protocol, listener.listener_port, listener.description
        );
        self.cloud
            .delete_listener(lb_id, listener.listener_port, listener.protocol)
            .await
    }
}

/// Remote listener holding the port `want` needs
///
/// An exact `(port, protocol)` match wins; otherwise a listener of another
/// protocol on the same transport blocks the port.
fn occupant<'a>(
    remote: &'a [ListenerAttribute],
    want: &ListenerAttribute,
) -> Option<&'a ListenerAttribute> {
    let port = want.listener_port;
    let transport = want.protocol.transport();
    remote
        .iter()
        .find(|l| l.listener_port == port && l.protocol == want.protocol)
        .or_else(|| {
            remote
                .iter()
                .find(|l| l.listener_port == port && l.protocol.transport() == transport)
        })
}

/// The fields of `local` that must be written to `remote`, if any
pub fn listener_patch(
    local: &ListenerAttribute,
    remote: &ListenerAttribute,
) -> Option<ListenerAttribute> {
    let mut patch = ListenerAttribute::new(local.listener_port, local.protocol);
    let mut changed = false;

    macro_rules! sync {
        ($($field:ident),+ $(,)?) => {
            $(
                if set_and_differs(&local.$field, &remote.$field) {
                    debug!(
                        "listener {} {}: {:?} -> {:?}",
                        local.listener_port,
                        stringify!($field),
                        remote.$field,
                        local.$field
                    );
                    patch.$field = local.$field.clone();
                    changed = true;
                }
            )+
        };
    }
    sync!(
        scheduler,
        persistence_timeout,
        established_timeout,
        proxy_protocol_v2_enabled,
        connection_drain,
        connection_drain_timeout,
        acl_status,
        acl_id,
        acl_type,
        sticky_session,
        sticky_session_type,
        cookie_timeout,
        cookie,
        x_forwarded_for_proto,
        x_forwarded_for_slb_ip,
        x_forwarded_for_slb_id,
        x_forwarded_for_slb_port,
        x_forwarded_for_client_src_port,
        idle_timeout,
        request_timeout,
        cert_id,
        ca_certificate_id,
        tls_cipher_policy,
        enable_http2,
    );

    if local.description != remote.description {
        patch.description = local.description.clone();
        changed = true;
    }
    if !local.v_server_group_id.is_empty()
        && local.v_server_group_id != remote.v_server_group_id
    {
        patch.v_server_group_id = local.v_server_group_id.clone();
        changed = true;
    }
    if health_check_changed(local.protocol, &local.health_check, &remote.health_check) {
        patch.health_check = local.health_check.clone();
        changed = true;
    }
    changed.then_some(patch)
}
