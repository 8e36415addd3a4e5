//! In-memory cloud
//!
//! Keeps load balancers, listeners and groups in process and enforces the
//! few invariants the managers depend on: listener ports are unique, a
//! group bound to a listener cannot be deleted, protected load balancers
//! cannot be deleted. Used by the unit tests and by `render`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{NlbApi, SlbApi};
use crate::error::{Error, Result};
use crate::model::{
    AddressType, Backend, ChargeType, Flag, ListenerAttribute, LoadBalancerAttribute,
    NlbAttribute, NlbListener, Protocol, ServerGroup, Tag, VServerGroup, ZoneMapping,
};

#[derive(Debug, Default)]
struct Clb {
    attr: LoadBalancerAttribute,
    listeners: Vec<ListenerAttribute>,
}

#[derive(Debug, Default)]
struct Nlb {
    attr: NlbAttribute,
    listeners: Vec<NlbListener>,
}

#[derive(Debug, Default)]
struct State {
    seq: u64,
    clbs: BTreeMap<String, Clb>,
    /// group id → (load balancer id, group)
    vgroups: BTreeMap<String, (String, VServerGroup)>,
    nlbs: BTreeMap<String, Nlb>,
    server_groups: BTreeMap<String, ServerGroup>,
    calls: Vec<String>,
    faults: HashMap<String, String>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{}-{:06}", prefix, self.seq)
    }

    /// Record a mutating call, failing it when a fault was injected
    fn record(&mut self, action: &str) -> Result<()> {
        if let Some(code) = self.faults.remove(action) {
            return Err(Error::Cloud {
                action: action.to_string(),
                code,
                message: "injected fault".to_string(),
            });
        }
        self.calls.push(action.to_string());
        Ok(())
    }

    fn clb(&mut self, id: &str) -> Result<&mut Clb> {
        self.clbs.get_mut(id).ok_or_else(|| not_found("LoadBalancer", id))
    }

    fn nlb(&mut self, id: &str) -> Result<&mut Nlb> {
        self.nlbs.get_mut(id).ok_or_else(|| not_found("LoadBalancer", id))
    }

    fn vgroup(&mut self, id: &str) -> Result<&mut VServerGroup> {
        self.vgroups
            .get_mut(id)
            .map(|(_, g)| g)
            .ok_or_else(|| not_found("VServerGroup", id))
    }

    fn server_group(&mut self, id: &str) -> Result<&mut ServerGroup> {
        self.server_groups
            .get_mut(id)
            .ok_or_else(|| not_found("ServerGroup", id))
    }
}

fn not_found(kind: &str, id: &str) -> Error {
    Error::Cloud {
        action: format!("Describe{}", kind),
        code: format!("Invalid{}Id.NotFound", kind),
        message: format!("{} {} does not exist", kind, id),
    }
}

fn conflict(action: &str, code: &str, message: String) -> Error {
    Error::Cloud {
        action: action.to_string(),
        code: code.to_string(),
        message,
    }
}

fn has_tags(tags: &[Tag], wanted: &[Tag]) -> bool {
    wanted.iter().all(|w| tags.contains(w))
}

/// Apply the non-empty fields of `patch` over `base`
fn overlay<T: Serialize + DeserializeOwned>(base: &T, patch: &T) -> Result<T> {
    let mut merged = serde_json::to_value(base)?;
    merge(&mut merged, serde_json::to_value(patch)?);
    Ok(serde_json::from_value(merged)?)
}

fn merge(target: &mut Value, patch: Value) {
    let (Value::Object(target), Value::Object(patch)) = (target, patch) else {
        return;
    };
    for (k, v) in patch {
        let nested = v.is_object() && target.get(&k).map(Value::is_object).unwrap_or(false);
        if nested {
            if let Some(existing) = target.get_mut(&k) {
                merge(existing, v);
            }
            continue;
        }
        let empty = match &v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        };
        if !empty {
            target.insert(k, v);
        }
    }
}

fn upsert_backends(existing: &mut Vec<Backend>, update: &[Backend]) {
    for b in update {
        match existing.iter_mut().find(|e| e.identity() == b.identity()) {
            Some(e) => *e = b.clone(),
            None => existing.push(b.clone()),
        }
    }
}

fn drop_backends(existing: &mut Vec<Backend>, remove: &[Backend]) {
    existing.retain(|e| !remove.iter().any(|r| r.identity() == e.identity()));
}

/// Process-local implementation of both cloud APIs
#[derive(Debug)]
pub struct MemoryCloud {
    region_id: String,
    vpc_id: String,
    state: Mutex<State>,
}

impl MemoryCloud {
    pub fn new(region_id: impl Into<String>, vpc_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            vpc_id: vpc_id.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Mutating actions issued so far, in order
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Make the next call of `action` fail with `code`
    pub async fn inject_fault(&self, action: &str, code: &str) {
        self.state
            .lock()
            .await
            .faults
            .insert(action.to_string(), code.to_string());
    }

    /// Register a load balancer created outside the controller
    pub async fn seed_load_balancer(&self, mut attr: LoadBalancerAttribute) -> String {
        let mut state = self.state.lock().await;
        if attr.load_balancer_id.is_empty() {
            attr.load_balancer_id = state.next_id("lb");
        }
        if attr.vpc_id.is_empty() {
            attr.vpc_id = self.vpc_id.clone();
        }
        let id = attr.load_balancer_id.clone();
        state.clbs.insert(
            id.clone(),
            Clb {
                attr,
                listeners: Vec::new(),
            },
        );
        id
    }

    pub async fn seed_listener(&self, lb_id: &str, mut listener: ListenerAttribute) {
        listener.status = Some("running".to_string());
        if let Some(clb) = self.state.lock().await.clbs.get_mut(lb_id) {
            clb.listeners.push(listener);
        }
    }

    pub async fn seed_vserver_group(&self, lb_id: &str, mut group: VServerGroup) -> String {
        let mut state = self.state.lock().await;
        let id = state.next_id("rsp");
        group.v_server_group_id = id.clone();
        state.vgroups.insert(id.clone(), (lb_id.to_string(), group));
        id
    }

    pub async fn seed_nlb(&self, mut attr: NlbAttribute) -> String {
        let mut state = self.state.lock().await;
        if attr.load_balancer_id.is_empty() {
            attr.load_balancer_id = state.next_id("nlb");
        }
        if attr.vpc_id.is_empty() {
            attr.vpc_id = self.vpc_id.clone();
        }
        let id = attr.load_balancer_id.clone();
        state.nlbs.insert(
            id.clone(),
            Nlb {
                attr,
                listeners: Vec::new(),
            },
        );
        id
    }

    pub async fn clb_listeners(&self, lb_id: &str) -> Vec<ListenerAttribute> {
        self.state
            .lock()
            .await
            .clbs
            .get(lb_id)
            .map(|c| c.listeners.clone())
            .unwrap_or_default()
    }

    pub async fn load_balancer_count(&self) -> usize {
        let state = self.state.lock().await;
        state.clbs.len() + state.nlbs.len()
    }
}

#[async_trait]
impl SlbApi for MemoryCloud {
    async fn describe_load_balancer(&self, id: &str) -> Result<Option<LoadBalancerAttribute>> {
        Ok(self.state.lock().await.clbs.get(id).map(|c| c.attr.clone()))
    }

    async fn find_load_balancers_by_tags(
        &self,
        tags: &[Tag],
    ) -> Result<Vec<LoadBalancerAttribute>> {
        Ok(self
            .state
            .lock()
            .await
            .clbs
            .values()
            .filter(|c| has_tags(&c.attr.tags, tags))
            .map(|c| c.attr.clone())
            .collect())
    }

    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<LoadBalancerAttribute>> {
        Ok(self
            .state
            .lock()
            .await
            .clbs
            .values()
            .filter(|c| c.attr.load_balancer_name == name)
            .map(|c| c.attr.clone())
            .collect())
    }

    async fn create_load_balancer(
        &self,
        attr: &LoadBalancerAttribute,
    ) -> Result<LoadBalancerAttribute> {
        let mut state = self.state.lock().await;
        state.record("CreateLoadBalancer")?;
        let id = state.next_id("lb");
        let address = match attr.address_type {
            Some(AddressType::Intranet) => format!("192.168.0.{}", state.seq % 250),
            _ => format!("47.100.0.{}", state.seq % 250),
        };
        let created = LoadBalancerAttribute {
            load_balancer_id: id.clone(),
            address,
            region_id: self.region_id.clone(),
            vpc_id: if attr.vpc_id.is_empty() {
                self.vpc_id.clone()
            } else {
                attr.vpc_id.clone()
            },
            ..attr.clone()
        };
        state.clbs.insert(
            id,
            Clb {
                attr: created.clone(),
                listeners: Vec::new(),
            },
        );
        Ok(created)
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.clb(id)?.attr.delete_protection == Some(Flag::On) {
            return Err(conflict(
                "DeleteLoadBalancer",
                "LoadBalancer.DeleteProtectionIsOn",
                format!("load balancer {} has delete protection on", id),
            ));
        }
        state.record("DeleteLoadBalancer")?;
        state.clbs.remove(id);
        state.vgroups.retain(|_, (lb, _)| lb != id);
        Ok(())
    }

    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("SetLoadBalancerName")?;
        state.clb(id)?.attr.load_balancer_name = name.to_string();
        Ok(())
    }

    async fn modify_load_balancer_spec(&self, id: &str, spec: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("ModifyLoadBalancerInstanceSpec")?;
        state.clb(id)?.attr.load_balancer_spec = Some(spec.to_string());
        Ok(())
    }

    async fn modify_internet_spec(
        &self,
        id: &str,
        charge_type: Option<ChargeType>,
        bandwidth: Option<i32>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("ModifyLoadBalancerInternetSpec")?;
        let attr = &mut state.clb(id)?.attr;
        if charge_type.is_some() {
            attr.internet_charge_type = charge_type;
        }
        if bandwidth.is_some() {
            attr.bandwidth = bandwidth;
        }
        Ok(())
    }

    async fn set_delete_protection(&self, id: &str, flag: Flag) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("SetLoadBalancerDeleteProtection")?;
        state.clb(id)?.attr.delete_protection = Some(flag);
        Ok(())
    }

    async fn set_modification_protection(&self, id: &str, flag: Flag) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("SetLoadBalancerModificationProtection")?;
        state.clb(id)?.attr.modification_protection = Some(flag);
        Ok(())
    }

    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("TagResources")?;
        let attr = &mut state.clb(id)?.attr;
        for tag in tags {
            attr.tags.retain(|t| t.key != tag.key);
            attr.tags.push(tag.clone());
        }
        Ok(())
    }

    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>> {
        let mut state = self.state.lock().await;
        Ok(state.clb(lb_id)?.listeners.clone())
    }

    async fn create_listener(&self, lb_id: &str, listener: &ListenerAttribute) -> Result<()> {
        let mut state = self.state.lock().await;
        let bound = listener.v_server_group_id.clone();
        if !bound.is_empty() && !state.vgroups.contains_key(&bound) {
            return Err(not_found("VServerGroup", &bound));
        }
        if state.clb(lb_id)?.listeners.iter().any(|l| {
            l.listener_port == listener.listener_port
                && l.protocol.transport() == listener.protocol.transport()
        }) {
            return Err(conflict(
                "CreateLoadBalancerListener",
                "ListenerAlreadyExists",
                format!(
                    "{} port {} is already in use",
                    listener.protocol.transport(),
                    listener.listener_port
                ),
            ));
        }
        state.record(&format!(
            "CreateLoadBalancer{}Listener",
            listener.protocol.as_str().to_uppercase()
        ))?;
        let mut created = listener.clone();
        created.named_key = None;
        created.v_group_name.clear();
        created.status = Some("stopped".to_string());
        state.clb(lb_id)?.listeners.push(created);
        Ok(())
    }

    async fn modify_listener(&self, lb_id: &str, patch: &ListenerAttribute) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(&format!(
            "SetLoadBalancer{}ListenerAttribute",
            patch.protocol.as_str().to_uppercase()
        ))?;
        let clb = state.clb(lb_id)?;
        let Some(existing) = clb
            .listeners
            .iter_mut()
            .find(|l| l.listener_port == patch.listener_port && l.protocol == patch.protocol)
        else {
            return Err(not_found("Listener", &patch.listener_port.to_string()));
        };
        *existing = overlay(existing, patch)?;
        Ok(())
    }

    async fn start_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("StartLoadBalancerListener")?;
        if let Some(l) = state
            .clb(lb_id)?
            .listeners
            .iter_mut()
            .find(|l| l.listener_port == port && l.protocol == protocol)
        {
            l.status = Some("running".to_string());
        }
        Ok(())
    }

    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("DeleteLoadBalancerListener")?;
        state
            .clb(lb_id)?
            .listeners
            .retain(|l| !(l.listener_port == port && l.protocol == protocol));
        Ok(())
    }

    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>> {
        Ok(self
            .state
            .lock()
            .await
            .vgroups
            .values()
            .filter(|(lb, _)| lb == lb_id)
            .map(|(_, g)| VServerGroup {
                v_server_group_id: g.v_server_group_id.clone(),
                v_server_group_name: g.v_server_group_name.clone(),
                backends: g.backends.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn create_vserver_group(
        &self,
        lb_id: &str,
        name: &str,
        backends: &[Backend],
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        state.clb(lb_id)?;
        state.record("CreateVServerGroup")?;
        let id = state.next_id("rsp");
        let group = VServerGroup {
            v_server_group_id: id.clone(),
            v_server_group_name: name.to_string(),
            backends: backends.to_vec(),
            ..Default::default()
        };
        state.vgroups.insert(id.clone(), (lb_id.to_string(), group));
        Ok(id)
    }

    async fn delete_vserver_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let in_use = state
            .clbs
            .values()
            .flat_map(|c| c.listeners.iter())
            .any(|l| l.v_server_group_id == group_id);
        if in_use {
            return Err(conflict(
                "DeleteVServerGroup",
                "ResourceInUse.VServerGroup",
                format!("vserver group {} is bound to a listener", group_id),
            ));
        }
        state.record("DeleteVServerGroup")?;
        state.vgroups.remove(group_id);
        Ok(())
    }

    async fn add_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("AddVServerGroupBackendServers")?;
        upsert_backends(&mut state.vgroup(group_id)?.backends, backends);
        Ok(())
    }

    async fn remove_vserver_group_backends(
        &self,
        group_id: &str,
        backends: &[Backend],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("RemoveVServerGroupBackendServers")?;
        drop_backends(&mut state.vgroup(group_id)?.backends, backends);
        Ok(())
    }

    async fn set_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("SetVServerGroupAttribute")?;
        upsert_backends(&mut state.vgroup(group_id)?.backends, backends);
        Ok(())
    }

    async fn find_network_interfaces(
        &self,
        _vpc_id: &str,
        ips: &[String],
    ) -> Result<HashMap<String, String>> {
        Ok(ips
            .iter()
            .map(|ip| (ip.clone(), format!("eni-{}", ip.replace(['.', ':'], ""))))
            .collect())
    }
}

#[async_trait]
impl NlbApi for MemoryCloud {
    async fn get_load_balancer(&self, id: &str) -> Result<Option<NlbAttribute>> {
        Ok(self.state.lock().await.nlbs.get(id).map(|n| n.attr.clone()))
    }

    async fn find_load_balancers_by_tags(&self, tags: &[Tag]) -> Result<Vec<NlbAttribute>> {
        Ok(self
            .state
            .lock()
            .await
            .nlbs
            .values()
            .filter(|n| has_tags(&n.attr.tags, tags))
            .map(|n| n.attr.clone())
            .collect())
    }

    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<NlbAttribute>> {
        Ok(self
            .state
            .lock()
            .await
            .nlbs
            .values()
            .filter(|n| n.attr.load_balancer_name == name)
            .map(|n| n.attr.clone())
            .collect())
    }

    async fn create_load_balancer(&self, attr: &NlbAttribute) -> Result<NlbAttribute> {
        let mut state = self.state.lock().await;
        state.record("CreateNetworkLoadBalancer")?;
        let id = state.next_id("nlb");
        let created = NlbAttribute {
            load_balancer_id: id.clone(),
            dns_name: format!("{}.{}.nlb.aliyuncsslb.com", id, self.region_id),
            ..attr.clone()
        };
        state.nlbs.insert(
            id,
            Nlb {
                attr: created.clone(),
                listeners: Vec::new(),
            },
        );
        Ok(created)
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.nlb(id)?.attr.deletion_protection == Some(Flag::On) {
            return Err(conflict(
                "DeleteLoadBalancer",
                "OperationDenied.DeletionProtectionEnabled",
                format!("load balancer {} has deletion protection on", id),
            ));
        }
        state.record("DeleteNetworkLoadBalancer")?;
        state.nlbs.remove(id);
        Ok(())
    }

    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateLoadBalancerAttribute")?;
        state.nlb(id)?.attr.load_balancer_name = name.to_string();
        Ok(())
    }

    async fn update_zones(&self, id: &str, zones: &[ZoneMapping]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateLoadBalancerZones")?;
        state.nlb(id)?.attr.zone_mappings = zones.to_vec();
        Ok(())
    }

    async fn join_security_groups(&self, id: &str, security_group_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("LoadBalancerJoinSecurityGroup")?;
        let attr = &mut state.nlb(id)?.attr;
        for sg in security_group_ids {
            if !attr.security_group_ids.contains(sg) {
                attr.security_group_ids.push(sg.clone());
            }
        }
        Ok(())
    }

    async fn set_deletion_protection(&self, id: &str, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateDeletionProtection")?;
        state.nlb(id)?.attr.deletion_protection = Some(Flag::from(enabled));
        Ok(())
    }

    async fn set_modification_protection(&self, id: &str, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateLoadBalancerProtection")?;
        state.nlb(id)?.attr.modification_protection = Some(Flag::from(enabled));
        Ok(())
    }

    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("TagNetworkLoadBalancer")?;
        let attr = &mut state.nlb(id)?.attr;
        for tag in tags {
            attr.tags.retain(|t| t.key != tag.key);
            attr.tags.push(tag.clone());
        }
        Ok(())
    }

    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<NlbListener>> {
        let mut state = self.state.lock().await;
        Ok(state.nlb(lb_id)?.listeners.clone())
    }

    async fn create_listener(&self, lb_id: &str, listener: &NlbListener) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.server_groups.contains_key(&listener.server_group_id) {
            return Err(not_found("ServerGroup", &listener.server_group_id));
        }
        if state.nlb(lb_id)?.listeners.iter().any(|l| {
            l.listener_port == listener.listener_port
                && l.listener_protocol == listener.listener_protocol
        }) {
            return Err(conflict(
                "CreateListener",
                "Conflict.Port",
                format!(
                    "{}:{} is already in use",
                    listener.listener_protocol, listener.listener_port
                ),
            ));
        }
        state.record("CreateListener")?;
        let id = state.next_id("lsn");
        let mut created = listener.clone();
        created.listener_id = id.clone();
        created.named_key = None;
        created.server_group_name.clear();
        created.listener_status = Some("Running".to_string());
        state.nlb(lb_id)?.listeners.push(created);
        Ok(id)
    }

    async fn update_listener(&self, listener: &NlbListener) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateListenerAttribute")?;
        let existing = state
            .nlbs
            .values_mut()
            .flat_map(|n| n.listeners.iter_mut())
            .find(|l| l.listener_id == listener.listener_id)
            .ok_or_else(|| not_found("Listener", &listener.listener_id))?;
        *existing = overlay(existing, listener)?;
        Ok(())
    }

    async fn delete_listener(&self, listener_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("DeleteListener")?;
        for nlb in state.nlbs.values_mut() {
            nlb.listeners.retain(|l| l.listener_id != listener_id);
        }
        Ok(())
    }

    async fn list_server_groups(&self, vpc_id: &str) -> Result<Vec<ServerGroup>> {
        Ok(self
            .state
            .lock()
            .await
            .server_groups
            .values()
            .filter(|g| g.vpc_id == vpc_id)
            .map(|g| ServerGroup {
                named_key: None,
                is_user_managed: false,
                service_port: None,
                weight: None,
                ..g.clone()
            })
            .collect())
    }

    async fn create_server_group(&self, group: &ServerGroup) -> Result<String> {
        let mut state = self.state.lock().await;
        state.record("CreateServerGroup")?;
        let id = state.next_id("sgp");
        let mut created = group.clone();
        created.server_group_id = id.clone();
        if created.vpc_id.is_empty() {
            created.vpc_id = self.vpc_id.clone();
        }
        state.server_groups.insert(id.clone(), created);
        Ok(id)
    }

    async fn update_server_group(&self, group: &ServerGroup) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateServerGroupAttribute")?;
        let existing = state.server_group(&group.server_group_id)?;
        let servers = std::mem::take(&mut existing.servers);
        let mut merged = overlay(existing, group)?;
        merged.servers = servers;
        *existing = merged;
        Ok(())
    }

    async fn delete_server_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let in_use = state
            .nlbs
            .values()
            .flat_map(|n| n.listeners.iter())
            .any(|l| l.server_group_id == group_id);
        if in_use {
            return Err(conflict(
                "DeleteServerGroup",
                "IncorrectStatus.serverGroup",
                format!("server group {} is bound to a listener", group_id),
            ));
        }
        state.record("DeleteServerGroup")?;
        state.server_groups.remove(group_id);
        Ok(())
    }

    async fn add_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("AddServersToServerGroup")?;
        upsert_backends(&mut state.server_group(group_id)?.servers, servers);
        Ok(())
    }

    async fn remove_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("RemoveServersFromServerGroup")?;
        drop_backends(&mut state.server_group(group_id)?.servers, servers);
        Ok(())
    }

    async fn update_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record("UpdateServerGroupServersAttribute")?;
        upsert_backends(&mut state.server_group(group_id)?.servers, servers);
        Ok(())
    }
}
