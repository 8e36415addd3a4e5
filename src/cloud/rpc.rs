//! RPC-over-HTTP transport for the cloud gateway
//!
//! Every call is a `POST` of a JSON object carrying `Action`, `Version`,
//! `RegionId` and the action parameters. A non-2xx answer carries `Code` and
//! `Message` and becomes [`Error::Cloud`].

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::{NlbApi, SlbApi};
use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::model::{
    Backend, ChargeType, Flag, ListenerAttribute, LoadBalancerAttribute, NlbAttribute,
    NlbListener, Protocol, ServerGroup, Tag, VServerGroup, ZoneMapping,
};

pub const SLB_API_VERSION: &str = "2014-05-15";
pub const NLB_API_VERSION: &str = "2022-04-30";

/// Client for the cloud RPC gateway
#[derive(Clone, Debug)]
pub struct RpcClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
    region_id: String,
}

impl RpcClient {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(Error::ConfigError(
                "endpoint must be set to talk to the cloud".to_string(),
            ));
        }
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            token: config.access_token.clone(),
            region_id: config.region_id.clone(),
        })
    }

    #[instrument(skip(self, params), fields(region = %self.region_id))]
    async fn call<R: DeserializeOwned>(
        &self,
        version: &str,
        action: &str,
        params: Value,
    ) -> Result<R> {
        let mut body = Map::new();
        body.insert("Action".to_string(), json!(action));
        body.insert("Version".to_string(), json!(version));
        body.insert("RegionId".to_string(), json!(self.region_id));
        if let Value::Object(params) = params {
            body.extend(params.into_iter().filter(|(_, v)| !v.is_null()));
        }

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("{} returned {}", action, status);

        if !status.is_success() {
            let parsed: Option<CloudFault> = serde_json::from_str(&text).ok();
            let (code, message) = match parsed {
                Some(fault) => (fault.code, fault.message),
                None => {
                    let code = match status.as_u16() {
                        503 => "ServiceUnavailable".to_string(),
                        500..=599 => "InternalError".to_string(),
                        other => format!("Http{}", other),
                    };
                    (code, text)
                }
            };
            return Err(Error::Cloud {
                action: action.to_string(),
                code,
                message,
            });
        }

        // actions without a payload answer with a bare `{"RequestId": ...}`
        let value: Value = if text.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&text)?
        };
        Ok(serde_json::from_value(value)?)
    }

    async fn slb<R: DeserializeOwned>(&self, action: &str, params: Value) -> Result<R> {
        self.call(SLB_API_VERSION, action, params).await
    }

    async fn nlb<R: DeserializeOwned>(&self, action: &str, params: Value) -> Result<R> {
        self.call(NLB_API_VERSION, action, params).await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CloudFault {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Ack {}

#[derive(Deserialize)]
struct LoadBalancers<T> {
    #[serde(rename = "LoadBalancers", default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Created {
    #[serde(alias = "VServerGroupId", alias = "ServerGroupId", alias = "ListenerId")]
    load_balancer_id: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, rename = "DNSName")]
    dns_name: Option<String>,
}

#[derive(Deserialize)]
struct Listeners<T> {
    #[serde(rename = "Listeners", default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupSummary {
    #[serde(default)]
    v_server_group_id: String,
    #[serde(default)]
    v_server_group_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VServerGroups {
    #[serde(default, rename = "VServerGroups")]
    items: Vec<GroupSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BackendServers {
    #[serde(default)]
    backend_servers: Vec<Backend>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkInterface {
    network_interface_id: String,
    private_ip_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkInterfaces {
    #[serde(default)]
    network_interface_sets: Vec<NetworkInterface>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServerGroups {
    #[serde(default)]
    server_groups: Vec<ServerGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Servers {
    #[serde(default)]
    servers: Vec<Backend>,
}

/// Merge extra parameters into a serialized model
fn with_params<T: Serialize>(model: &T, extra: Value) -> Result<Value> {
    let mut value = serde_json::to_value(model)?;
    if let (Value::Object(target), Value::Object(extra)) = (&mut value, extra) {
        target.extend(extra);
    }
    Ok(value)
}

fn listener_action(verb: &str, protocol: Protocol) -> String {
    format!("{}LoadBalancer{}Listener", verb, protocol.as_str().to_uppercase())
}

fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(Error::Cloud { code, .. })
            if code.contains("NotFound") || code.contains("NotExist") =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl SlbApi for RpcClient {
    async fn describe_load_balancer(&self, id: &str) -> Result<Option<LoadBalancerAttribute>> {
        not_found_as_none(
            self.slb("DescribeLoadBalancerAttribute", json!({ "LoadBalancerId": id }))
                .await,
        )
    }

    async fn find_load_balancers_by_tags(
        &self,
        tags: &[Tag],
    ) -> Result<Vec<LoadBalancerAttribute>> {
        let found: LoadBalancers<LoadBalancerAttribute> =
            self.slb("DescribeLoadBalancers", json!({ "Tags": tags })).await?;
        Ok(found.items)
    }

    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<LoadBalancerAttribute>> {
        let found: LoadBalancers<LoadBalancerAttribute> = self
            .slb("DescribeLoadBalancers", json!({ "LoadBalancerName": name }))
            .await?;
        Ok(found.items)
    }

    async fn create_load_balancer(
        &self,
        attr: &LoadBalancerAttribute,
    ) -> Result<LoadBalancerAttribute> {
        let created: Created = self
            .slb("CreateLoadBalancer", serde_json::to_value(attr)?)
            .await?;
        Ok(LoadBalancerAttribute {
            load_balancer_id: created.load_balancer_id,
            address: created.address.unwrap_or_default(),
            ..attr.clone()
        })
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let _: Ack = self.slb("DeleteLoadBalancer", json!({ "LoadBalancerId": id })).await?;
        Ok(())
    }

    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .slb(
                "SetLoadBalancerName",
                json!({ "LoadBalancerId": id, "LoadBalancerName": name }),
            )
            .await?;
        Ok(())
    }

    async fn modify_load_balancer_spec(&self, id: &str, spec: &str) -> Result<()> {
        let _: Ack = self
            .slb(
                "ModifyLoadBalancerInstanceSpec",
                json!({ "LoadBalancerId": id, "LoadBalancerSpec": spec }),
            )
            .await?;
        Ok(())
    }

    async fn modify_internet_spec(
        &self,
        id: &str,
        charge_type: Option<ChargeType>,
        bandwidth: Option<i32>,
    ) -> Result<()> {
        let _: Ack = self
            .slb(
                "ModifyLoadBalancerInternetSpec",
                json!({
                    "LoadBalancerId": id,
                    "InternetChargeType": charge_type,
                    "Bandwidth": bandwidth,
                }),
            )
            .await?;
        Ok(())
    }

    async fn set_delete_protection(&self, id: &str, flag: Flag) -> Result<()> {
        let _: Ack = self
            .slb(
                "SetLoadBalancerDeleteProtection",
                json!({ "LoadBalancerId": id, "DeleteProtection": flag }),
            )
            .await?;
        Ok(())
    }

    async fn set_modification_protection(&self, id: &str, flag: Flag) -> Result<()> {
        let _: Ack = self
            .slb(
                "SetLoadBalancerModificationProtection",
                json!({ "LoadBalancerId": id, "ModificationProtection": flag }),
            )
            .await?;
        Ok(())
    }

    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()> {
        let _: Ack = self
            .slb(
                "TagResources",
                json!({ "ResourceType": "instance", "ResourceId": [id], "Tag": tags }),
            )
            .await?;
        Ok(())
    }

    async fn describe_listeners(&self, lb_id: &str) -> Result<Vec<ListenerAttribute>> {
        let found: Listeners<ListenerAttribute> = self
            .slb(
                "DescribeLoadBalancerListeners",
                json!({ "LoadBalancerId": [lb_id] }),
            )
            .await?;
        Ok(found.items)
    }

    async fn create_listener(&self, lb_id: &str, listener: &ListenerAttribute) -> Result<()> {
        let params = with_params(listener, json!({ "LoadBalancerId": lb_id }))?;
        let _: Ack = self
            .slb(&listener_action("Create", listener.protocol), params)
            .await?;
        Ok(())
    }

    async fn modify_listener(&self, lb_id: &str, patch: &ListenerAttribute) -> Result<()> {
        let params = with_params(patch, json!({ "LoadBalancerId": lb_id }))?;
        let action = format!(
            "SetLoadBalancer{}ListenerAttribute",
            patch.protocol.as_str().to_uppercase()
        );
        let _: Ack = self.slb(&action, params).await?;
        Ok(())
    }

    async fn start_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()> {
        let _: Ack = self
            .slb(
                "StartLoadBalancerListener",
                json!({
                    "LoadBalancerId": lb_id,
                    "ListenerPort": port,
                    "ListenerProtocol": protocol,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_listener(&self, lb_id: &str, port: i32, protocol: Protocol) -> Result<()> {
        let _: Ack = self
            .slb(
                "DeleteLoadBalancerListener",
                json!({
                    "LoadBalancerId": lb_id,
                    "ListenerPort": port,
                    "ListenerProtocol": protocol,
                }),
            )
            .await?;
        Ok(())
    }

    async fn describe_vserver_groups(&self, lb_id: &str) -> Result<Vec<VServerGroup>> {
        let summaries: VServerGroups = self
            .slb("DescribeVServerGroups", json!({ "LoadBalancerId": lb_id }))
            .await?;
        let mut groups = Vec::with_capacity(summaries.items.len());
        for summary in summaries.items {
            let detail: BackendServers = self
                .slb(
                    "DescribeVServerGroupAttribute",
                    json!({ "VServerGroupId": summary.v_server_group_id }),
                )
                .await?;
            groups.push(VServerGroup {
                v_server_group_id: summary.v_server_group_id,
                v_server_group_name: summary.v_server_group_name,
                backends: detail.backend_servers,
                ..Default::default()
            });
        }
        Ok(groups)
    }

    async fn create_vserver_group(
        &self,
        lb_id: &str,
        name: &str,
        backends: &[Backend],
    ) -> Result<String> {
        let created: Created = self
            .slb(
                "CreateVServerGroup",
                json!({
                    "LoadBalancerId": lb_id,
                    "VServerGroupName": name,
                    "BackendServers": backends,
                }),
            )
            .await?;
        Ok(created.load_balancer_id)
    }

    async fn delete_vserver_group(&self, group_id: &str) -> Result<()> {
        let _: Ack = self
            .slb("DeleteVServerGroup", json!({ "VServerGroupId": group_id }))
            .await?;
        Ok(())
    }

    async fn add_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()> {
        let _: Ack = self
            .slb(
                "AddVServerGroupBackendServers",
                json!({ "VServerGroupId": group_id, "BackendServers": backends }),
            )
            .await?;
        Ok(())
    }

    async fn remove_vserver_group_backends(
        &self,
        group_id: &str,
        backends: &[Backend],
    ) -> Result<()> {
        let _: Ack = self
            .slb(
                "RemoveVServerGroupBackendServers",
                json!({ "VServerGroupId": group_id, "BackendServers": backends }),
            )
            .await?;
        Ok(())
    }

    async fn set_vserver_group_backends(&self, group_id: &str, backends: &[Backend]) -> Result<()> {
        let _: Ack = self
            .slb(
                "SetVServerGroupAttribute",
                json!({ "VServerGroupId": group_id, "BackendServers": backends }),
            )
            .await?;
        Ok(())
    }

    async fn find_network_interfaces(
        &self,
        vpc_id: &str,
        ips: &[String],
    ) -> Result<HashMap<String, String>> {
        let found: NetworkInterfaces = self
            .slb(
                "DescribeNetworkInterfaces",
                json!({ "VpcId": vpc_id, "PrivateIpAddress": ips }),
            )
            .await?;
        Ok(found
            .network_interface_sets
            .into_iter()
            .map(|ni| (ni.private_ip_address, ni.network_interface_id))
            .collect())
    }
}

#[async_trait]
impl NlbApi for RpcClient {
    async fn get_load_balancer(&self, id: &str) -> Result<Option<NlbAttribute>> {
        not_found_as_none(
            self.nlb("GetLoadBalancerAttribute", json!({ "LoadBalancerId": id }))
                .await,
        )
    }

    async fn find_load_balancers_by_tags(&self, tags: &[Tag]) -> Result<Vec<NlbAttribute>> {
        let found: LoadBalancers<NlbAttribute> =
            self.nlb("ListLoadBalancers", json!({ "Tag": tags })).await?;
        Ok(found.items)
    }

    async fn find_load_balancers_by_name(&self, name: &str) -> Result<Vec<NlbAttribute>> {
        let found: LoadBalancers<NlbAttribute> = self
            .nlb("ListLoadBalancers", json!({ "LoadBalancerNames": [name] }))
            .await?;
        Ok(found.items)
    }

    async fn create_load_balancer(&self, attr: &NlbAttribute) -> Result<NlbAttribute> {
        let created: Created = self
            .nlb("CreateLoadBalancer", serde_json::to_value(attr)?)
            .await?;
        Ok(NlbAttribute {
            load_balancer_id: created.load_balancer_id,
            dns_name: created.dns_name.unwrap_or_default(),
            ..attr.clone()
        })
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let _: Ack = self.nlb("DeleteLoadBalancer", json!({ "LoadBalancerId": id })).await?;
        Ok(())
    }

    async fn set_load_balancer_name(&self, id: &str, name: &str) -> Result<()> {
        let _: Ack = self
            .nlb(
                "UpdateLoadBalancerAttribute",
                json!({ "LoadBalancerId": id, "LoadBalancerName": name }),
            )
            .await?;
        Ok(())
    }

    async fn update_zones(&self, id: &str, zones: &[ZoneMapping]) -> Result<()> {
        let _: Ack = self
            .nlb(
                "UpdateLoadBalancerZones",
                json!({ "LoadBalancerId": id, "ZoneMappings": zones }),
            )
            .await?;
        Ok(())
    }

    async fn join_security_groups(&self, id: &str, security_group_ids: &[String]) -> Result<()> {
        let _: Ack = self
            .nlb(
                "LoadBalancerJoinSecurityGroup",
                json!({ "LoadBalancerId": id, "SecurityGroupIds": security_group_ids }),
            )
            .await?;
        Ok(())
    }

    async fn set_deletion_protection(&self, id: &str, enabled: bool) -> Result<()> {
        let action = if enabled {
            "EnableDeletionProtection"
        } else {
            "DisableDeletionProtection"
        };
        let _: Ack = self.nlb(action, json!({ "ResourceId": id })).await?;
        Ok(())
    }

    async fn set_modification_protection(&self, id: &str, enabled: bool) -> Result<()> {
        let _: Ack = self
            .nlb(
                "UpdateLoadBalancerProtection",
                json!({ "LoadBalancerId": id, "ModificationProtectionEnabled": enabled }),
            )
            .await?;
        Ok(())
    }

    async fn tag_resources(&self, id: &str, tags: &[Tag]) -> Result<()> {
        let _: Ack = self
            .nlb(
                "TagResources",
                json!({ "ResourceType": "loadbalancer", "ResourceId": [id], "Tag": tags }),
            )
            .await?;
        Ok(())
    }

    async fn list_listeners(&self, lb_id: &str) -> Result<Vec<NlbListener>> {
        let found: Listeners<NlbListener> = self
            .nlb("ListListeners", json!({ "LoadBalancerIds": [lb_id] }))
            .await?;
        Ok(found.items)
    }

    async fn create_listener(&self, lb_id: &str, listener: &NlbListener) -> Result<String> {
        let params = with_params(listener, json!({ "LoadBalancerId": lb_id }))?;
        let created: Created = self.nlb("CreateListener", params).await?;
        Ok(created.load_balancer_id)
    }

    async fn update_listener(&self, listener: &NlbListener) -> Result<()> {
        let _: Ack = self
            .nlb("UpdateListenerAttribute", serde_json::to_value(listener)?)
            .await?;
        Ok(())
    }

    async fn delete_listener(&self, listener_id: &str) -> Result<()> {
        let _: Ack = self
            .nlb("DeleteListener", json!({ "ListenerId": listener_id }))
            .await?;
        Ok(())
    }

    async fn list_server_groups(&self, vpc_id: &str) -> Result<Vec<ServerGroup>> {
        let found: ServerGroups = self.nlb("ListServerGroups", json!({ "VpcId": vpc_id })).await?;
        let mut groups = Vec::with_capacity(found.server_groups.len());
        for mut group in found.server_groups {
            let servers: Servers = self
                .nlb(
                    "ListServerGroupServers",
                    json!({ "ServerGroupId": group.server_group_id }),
                )
                .await?;
            group.servers = servers.servers;
            groups.push(group);
        }
        Ok(groups)
    }

    async fn create_server_group(&self, group: &ServerGroup) -> Result<String> {
        let created: Created = self
            .nlb("CreateServerGroup", serde_json::to_value(group)?)
            .await?;
        Ok(created.load_balancer_id)
    }

    async fn update_server_group(&self, group: &ServerGroup) -> Result<()> {
        let _: Ack = self
            .nlb("UpdateServerGroupAttribute", serde_json::to_value(group)?)
            .await?;
        Ok(())
    }

    async fn delete_server_group(&self, group_id: &str) -> Result<()> {
        let _: Ack = self
            .nlb("DeleteServerGroup", json!({ "ServerGroupId": group_id }))
            .await?;
        Ok(())
    }

    async fn add_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        let _: Ack = self
            .nlb(
                "AddServersToServerGroup",
                json!({ "ServerGroupId": group_id, "Servers": servers }),
            )
            .await?;
        Ok(())
    }

    async fn remove_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        let _: Ack = self
            .nlb(
                "RemoveServersFromServerGroup",
                json!({ "ServerGroupId": group_id, "Servers": servers }),
            )
            .await?;
        Ok(())
    }

    async fn update_servers(&self, group_id: &str, servers: &[Backend]) -> Result<()> {
        let _: Ack = self
            .nlb(
                "UpdateServerGroupServersAttribute",
                json!({ "ServerGroupId": group_id, "Servers": servers }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RpcClient {
        let config = CloudConfig {
            region_id: "cn-hangzhou".to_string(),
            endpoint: server.uri(),
            access_token: Some("secret".to_string()),
            ..Default::default()
        };
        RpcClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_required() {
        let err = RpcClient::new(&CloudConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_request_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "Action": "SetLoadBalancerName",
                "Version": SLB_API_VERSION,
                "RegionId": "cn-hangzhou",
                "LoadBalancerId": "lb-1",
                "LoadBalancerName": "web",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"RequestId":"r-1"}"#))
            .expect(1)
            .mount(&server)
            .await;

        SlbApi::set_load_balancer_name(&client(&server), "lb-1", "web")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cloud_error_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"Code":"Throttling.User","Message":"Request was denied."}"#,
            ))
            .mount(&server)
            .await;

        let err = SlbApi::delete_load_balancer(&client(&server), "lb-1")
            .await
            .unwrap_err();
        match &err {
            Error::Cloud { action, code, .. } => {
                assert_eq!(action, "DeleteLoadBalancer");
                assert_eq!(code, "Throttling.User");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_unstructured_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = NlbApi::delete_listener(&client(&server), "lsn-1")
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Cloud { code, .. } if code == "ServiceUnavailable"));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                r#"{"Code":"InvalidLoadBalancerId.NotFound","Message":"lb-x not found"}"#,
            ))
            .mount(&server)
            .await;

        let found = SlbApi::describe_load_balancer(&client(&server), "lb-x")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_create_load_balancer_returns_id_and_address() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "Action": "CreateLoadBalancer",
                "LoadBalancerName": "a5f1c2a9e",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"LoadBalancerId":"lb-123","Address":"47.1.2.3","RequestId":"r"}"#,
            ))
            .mount(&server)
            .await;

        let attr = LoadBalancerAttribute {
            load_balancer_name: "a5f1c2a9e".to_string(),
            ..Default::default()
        };
        let created = SlbApi::create_load_balancer(&client(&server), &attr)
            .await
            .unwrap();
        assert_eq!(created.load_balancer_id, "lb-123");
        assert_eq!(created.address, "47.1.2.3");
    }

    #[tokio::test]
    async fn test_listener_action_names() {
        assert_eq!(listener_action("Create", Protocol::Https), "CreateLoadBalancerHTTPSListener");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "Action": "CreateLoadBalancerTCPListener",
                "LoadBalancerId": "lb-1",
                "ListenerPort": 80,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let listener = ListenerAttribute::new(80, Protocol::Tcp);
        SlbApi::create_listener(&client(&server), "lb-1", &listener)
            .await
            .unwrap();
    }
}
