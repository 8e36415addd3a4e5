//! Cloud provider seam
//!
//! Managers talk to the cloud only through [`SlbApi`] and [`NlbApi`]. Every
//! call is one blocking RPC from the manager's point of view; nothing here
//! retries. Transient failures surface as [`Error::Cloud`] and the
//! reconciler requeues the whole pass.
//!
//! [`Error::Cloud`]: crate::error::Error::Cloud

pub mod dry_run;
pub mod memory;
pub mod rpc;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    Backend, ChargeType, Flag, ListenerAttribute, LoadBalancerAttribute, NlbAttribute,
    NlbListener, Protocol, ServerGroup, Tag, VServerGroup, ZoneMapping,
};

pub use dry_run::DryRun;
pub use memory::MemoryCloud;
pub use rpc::RpcClient;

/// Classic load balancer API
#[async_trait]
pub trait SlbApi: Send + Sync {
    /// `None` when no load balancer has this id
    async fn describe_load_balancer(&self, id: &str) -> Result<Option<LoadBalancerAttribute>>;
    /// Load balancers carrying every one of `tags`
    async fn find_load_balancers_by_tags(&self, tags: &[Tag]) -> Result<Vec<LoadBalancerAttribute>>;
    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<LoadBalancerAttribute>>;
    /// Returns the attribute with id and address filled in
    async fn create_load_balancer(
        &self,
        attr: &LoadBalancerAttribute,
    ) -> Result<LoadBalancerAttribute>;
    async fn delete_load_balancer(&self, id: &str) -> Result<()>;
    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()>;
    async fn modify_load_balancer_spec(&self, id: &str, spec: &str) -> Result<()>;
    async fn modify_internet_spec(
        &self,
        id: &str,
        charge_type: Option<ChargeType>,
        bandwidth: Option<i32>,
    ) -> Result<()>;
    async fn set_delete_protection(&self, id: &str, flag: Flag) -> Result<()>;
    async fn set_modification_protection(&self, id: &str, flag: Flag) -> Result<()>;
    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()>;

    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>>;
    async fn create_listener(&self, lb_id: &str, listener: &ListenerAttribute) -> Result<()>;
    /// Only the `Some` fields of `patch` are changed
    async fn modify_listener(&self, lb_id: &str, patch: &ListenerAttribute) -> Result<()>;
    async fn start_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()>;
    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()>;

    /// Groups of a load balancer, backends included
    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>>;
    /// Returns the new group id
    async fn create_vserver_group(
        &self,
        lb_id: &str,
        name: &str,
        backends: &[Backend],
    ) -> Result<String>;
    async fn delete_vserver_group(&self, group_id: &str) -> Result<()>;
    async fn add_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()>;
    async fn remove_vserver_group_backends(
        &self,
        group_id: &str,
        backends: &[Backend],
    ) -> Result<()>;
    async fn set_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()>;

    /// ENI id of each private address found in the VPC
    async fn find_network_interfaces(
        &self,
        vpc_id: &str,
        ips: &[String],
    ) -> Result<HashMap<String, String>>;
}

/// Network load balancer API
#[async_trait]
pub trait NlbApi: Send + Sync {
    async fn get_load_balancer(&self, id: &str) -> Result<Option<NlbAttribute>>;
    async fn find_load_balancers_by_tags(&self, tags: &[Tag]) -> Result<Vec<NlbAttribute>>;
    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<NlbAttribute>>;
    async fn create_load_balancer(&self, attr: &NlbAttribute) -> Result<NlbAttribute>;
    async fn delete_load_balancer(&self, id: &str) -> Result<()>;
    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()>;
    async fn update_zones(&self, id: &str, zones: &[ZoneMapping]) -> Result<()>;
    async fn join_security_groups(&self, id: &str, security_group_ids: &[String]) -> Result<()>;
    async fn set_deletion_protection(&self, id: &str, enabled: bool) -> Result<()>;
    async fn set_modification_protection(&self, id: &str, enabled: bool) -> Result<()>;
    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()>;

    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<NlbListener>>;
    /// Returns the new listener id
    async fn create_listener(&self, lb_id: &str, listener: &NlbListener) -> Result<String>;
    async fn update_listener(&self, listener: &NlbListener) -> Result<()>;
    async fn delete_listener(&self, listener_id: &str) -> Result<()>;

    /// Server groups of a VPC, servers included
    async fn list_server_groups(&self, vpc_id: &str) -> Result<Vec<ServerGroup>>;
    /// Returns the new server group id
    async fn create_server_group(&self, group: &ServerGroup) -> Result<String>;
    async fn update_server_group(&self, group: &ServerGroup) -> Result<()>;
    async fn delete_server_group(&self, group_id: &str) -> Result<()>;
    async fn add_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()>;
    async fn remove_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()>;
    async fn update_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()>;
}
