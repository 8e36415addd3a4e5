//! Read-only cloud wrapper for `--dry-run`
//!
//! Describe calls reach the wrapped cloud; every mutation is logged and
//! answered with a placeholder so the rest of the pass can run.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use super::{NlbApi, SlbApi};
use crate::error::Result;
use crate::model::{
    Backend, ChargeType, Flag, ListenerAttribute, LoadBalancerAttribute, NlbAttribute,
    NlbListener, Protocol, ServerGroup, Tag, VServerGroup, ZoneMapping,
};

const PLACEHOLDER_ID: &str = "dry-run";

/// Wraps a cloud client and suppresses every write
#[derive(Clone, Debug)]
pub struct DryRun<C> {
    inner: C,
}

impl<C> DryRun<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: SlbApi> SlbApi for DryRun<C> {
    async fn describe_load_balancer(&self, id: &str) -> Result<Option<LoadBalancerAttribute>> {
        self.inner.describe_load_balancer(id).await
    }

    async fn find_load_balancers_by_tags(
        &self,
        tags: &[Tag],
    ) -> Result<Vec<LoadBalancerAttribute>> {
        self.inner.find_load_balancers_by_tags(tags).await
    }

    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<LoadBalancerAttribute>> {
        self.inner.find_load_balancers_by_name(name).await
    }

    async fn create_load_balancer(
        &self,
        attr: &LoadBalancerAttribute,
    ) -> Result<LoadBalancerAttribute> {
        info!("dry-run: would create load balancer {}", attr.load_balancer_name);
        Ok(LoadBalancerAttribute {
            load_balancer_id: PLACEHOLDER_ID.to_string(),
            ..attr.clone()
        })
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        info!("dry-run: would delete load balancer {}", id);
        Ok(())
    }

    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()> {
        info!("dry-run: would rename load balancer {} to {}", id, name);
        Ok(())
    }

    async fn modify_load_balancer_spec(&self, id: &str, spec: &str) -> Result<()> {
        info!("dry-run: would change load balancer {} spec to {}", id, spec);
        Ok(())
    }

    async fn modify_internet_spec(
        &self,
        id: &str,
        charge_type: Option<ChargeType>,
        bandwidth: Option<i32>,
    ) -> Result<()> {
        info!(
            "dry-run: would change load balancer {} charge type {:?} bandwidth {:?}",
            id, charge_type, bandwidth
        );
        Ok(())
    }

    async fn set_delete_protection(&self, id: &str, flag: Flag) -> Result<()> {
        info!("dry-run: would set delete protection of {} {}", id, flag);
        Ok(())
    }

    async fn set_modification_protection(&self, id: &str, flag: Flag) -> Result<()> {
        info!("dry-run: would set modification protection of {} {}", id, flag);
        Ok(())
    }

    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()> {
        info!("dry-run: would tag {} with {:?}", id, tags);
        Ok(())
    }

    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>> {
        self.inner.describe_listeners(lb_id).await
    }

    async fn create_listener(&self, lb_id: &str, listener: &ListenerAttribute) -> Result<()> {
        info!(
            "dry-run: would create {} listener {} on {}",
            listener.protocol, listener.listener_port, lb_id
        );
        Ok(())
    }

    async fn modify_listener(&self, lb_id: &str, patch: &ListenerAttribute) -> Result<()> {
        info!(
            "dry-run: would modify listener {} on {}: {}",
            patch.listener_port,
            lb_id,
            serde_json::to_string(patch)?
        );
        Ok(())
    }

    async fn start_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()> {
        info!("dry-run: would start {} listener {} on {}", protocol, port, lb_id);
        Ok(())
    }

    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()> {
        info!("dry-run: would delete {} listener {} on {}", protocol, port, lb_id);
        Ok(())
    }

    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>> {
        self.inner.describe_vserver_groups(lb_id).await
    }

    async fn create_vserver_group(
        &self,
        lb_id: &str,
        name: &str,
        backends: &[Backend],
    ) -> Result<String> {
        info!(
            "dry-run: would create vserver group {} on {} with {} backends",
            name,
            lb_id,
            backends.len()
        );
        Ok(format!("{}-{}", PLACEHOLDER_ID, name))
    }

    async fn delete_vserver_group(&self, group_id: &str) -> Result<()> {
        info!("dry-run: would delete vserver group {}", group_id);
        Ok(())
    }

    async fn add_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()> {
        info!("dry-run: would add {} backends to {}", backends.len(), group_id);
        Ok(())
    }

    async fn remove_vserver_group_backends(
        &self,
        group_id: &str,
        backends: &[Backend],
    ) -> Result<()> {
        info!("dry-run: would remove {} backends from {}", backends.len(), group_id);
        Ok(())
    }

    async fn set_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()> {
        info!("dry-run: would reweight {} backends of {}", backends.len(), group_id);
        Ok(())
    }

    async fn find_network_interfaces(
        &self,
        vpc_id: &str,
        ips: &[String],
    ) -> Result<HashMap<String, String>> {
        self.inner.find_network_interfaces(vpc_id, ips).await
    }
}

#[async_trait]
impl<C: NlbApi> NlbApi for DryRun<C> {
    async fn get_load_balancer(&self, id: &str) -> Result<Option<NlbAttribute>> {
        self.inner.get_load_balancer(id).await
    }

    async fn find_load_balancers_by_tags(&self, tags: &[Tag]) -> Result<Vec<NlbAttribute>> {
        self.inner.find_load_balancers_by_tags(tags).await
    }

    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<NlbAttribute>> {
        self.inner.find_load_balancers_by_name(name).await
    }

    async fn create_load_balancer(&self, attr: &NlbAttribute) -> Result<NlbAttribute> {
        info!("dry-run: would create network load balancer {}", attr.load_balancer_name);
        Ok(NlbAttribute {
            load_balancer_id: PLACEHOLDER_ID.to_string(),
            ..attr.clone()
        })
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        info!("dry-run: would delete network load balancer {}", id);
        Ok(())
    }

    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()> {
        info!("dry-run: would rename network load balancer {} to {}", id, name);
        Ok(())
    }

    async fn update_zones(&self, id: &str, zones: &[ZoneMapping]) -> Result<()> {
        info!("dry-run: would move {} to {} zones", id, zones.len());
        Ok(())
    }

    async fn join_security_groups(&self, id: &str, security_group_ids: &[String]) -> Result<()> {
        info!("dry-run: would join {} to {:?}", id, security_group_ids);
        Ok(())
    }

    async fn set_deletion_protection(&self, id: &str, enabled: bool) -> Result<()> {
        info!("dry-run: would set deletion protection of {} to {}", id, enabled);
        Ok(())
    }

    async fn set_modification_protection(&self, id: &str, enabled: bool) -> Result<()> {
        info!("dry-run: would set modification protection of {} to {}", id, enabled);
        Ok(())
    }

    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()> {
        info!("dry-run: would tag {} with {:?}", id, tags);
        Ok(())
    }

    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<NlbListener>> {
        self.inner.list_listeners(lb_id).await
    }

    async fn create_listener(&self, lb_id: &str, listener: &NlbListener) -> Result<String> {
        info!(
            "dry-run: would create {} listener {} on {}",
            listener.listener_protocol, listener.listener_port, lb_id
        );
        Ok(format!("{}-{}", PLACEHOLDER_ID, listener.listener_port))
    }

    async fn update_listener(&self, listener: &NlbListener) -> Result<()> {
        info!("dry-run: would update listener {}", listener.listener_id);
        Ok(())
    }

    async fn delete_listener(&self, listener_id: &str) -> Result<()> {
        info!("dry-run: would delete listener {}", listener_id);
        Ok(())
    }

    async fn list_server_groups(&self, vpc_id: &str) -> Result<Vec<ServerGroup>> {
        self.inner.list_server_groups(vpc_id).await
    }

    async fn create_server_group(&self, group: &ServerGroup) -> Result<String> {
        info!(
            "dry-run: would create server group {} with {} servers",
            group.server_group_name,
            group.servers.len()
        );
        Ok(format!("{}-{}", PLACEHOLDER_ID, group.server_group_name))
    }

    async fn update_server_group(&self, group: &ServerGroup) -> Result<()> {
        info!("dry-run: would update server group {}", group.server_group_id);
        Ok(())
    }

    async fn delete_server_group(&self, group_id: &str) -> Result<()> {
        info!("dry-run: would delete server group {}", group_id);
        Ok(())
    }

    async fn add_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        info!("dry-run: would add {} servers to {}", servers.len(), group_id);
        Ok(())
    }

    async fn remove_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        info!("dry-run: would remove {} servers from {}", servers.len(), group_id);
        Ok(())
    }

    async fn update_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        info!("dry-run: would reweight {} servers of {}", servers.len(), group_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MemoryCloud;

    #[tokio::test]
    async fn test_writes_do_not_reach_the_cloud() {
        let cloud = DryRun::new(MemoryCloud::new("cn-hangzhou", "vpc-1"));
        let created = SlbApi::create_load_balancer(&cloud, &LoadBalancerAttribute::default())
            .await
            .unwrap();
        assert_eq!(created.load_balancer_id, PLACEHOLDER_ID);
        assert!(cloud.inner.calls().await.is_empty());
        assert!(SlbApi::describe_load_balancer(&cloud, PLACEHOLDER_ID)
            .await
            .unwrap()
            .is_none());
    }
}
