//! Service LoadBalancer reconciler
//!
//! Implements the controller pattern using kube-rs runtime. Services are the
//! primary resource; Endpoints and Node changes requeue the Services they
//! affect.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Event, LoadBalancerIngress, Node, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        reflector::ObjectRef,
        watcher::Config,
    },
    Resource, ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::applier;
use super::finalizers::{self, SERVICE_FINALIZER};
use crate::builder::ModelBuilder;
use crate::cloud::{NlbApi, SlbApi};
use crate::config::CloudConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::manager::{Clb, Nlb};

/// `spec.loadBalancerClass` served by the NLB family
pub const NLB_CLASS: &str = "alibabacloud.com/nlb";

const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub clb: ModelBuilder<Clb>,
    pub nlb: ModelBuilder<Nlb>,
    /// Writes go to a logging cloud wrapper and nothing is written back
    /// to the cluster
    pub dry_run: bool,
}

impl ControllerState {
    pub fn new(
        client: Client,
        config: Arc<CloudConfig>,
        slb: Arc<dyn SlbApi>,
        nlb: Arc<dyn NlbApi>,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            clb: ModelBuilder::new(Clb::new(slb), config.clone()),
            nlb: ModelBuilder::new(Nlb::new(nlb), config),
            dry_run,
        }
    }
}

/// Load balancer product serving a Service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FamilyKind {
    Clb,
    Nlb,
}

impl FamilyKind {
    /// `None` unless the Service is a LoadBalancer this controller serves
    pub fn of(svc: &Service) -> Option<Self> {
        let spec = svc.spec.as_ref()?;
        if spec.type_.as_deref() != Some("LoadBalancer") {
            return None;
        }
        match spec.load_balancer_class.as_deref() {
            None => Some(FamilyKind::Clb),
            Some(NLB_CLASS) => Some(FamilyKind::Nlb),
            Some(_) => None,
        }
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let services: Api<Service> = Api::all(client.clone());

    info!("Starting Service LoadBalancer controller");

    let controller = Controller::new(services, Config::default());
    let store = controller.store();
    let seen = Arc::new(Mutex::new(HashMap::new()));

    controller
        .watches(
            Api::<Endpoints>::all(client.clone()),
            Config::default(),
            |ep| {
                ep.namespace()
                    .map(|ns| ObjectRef::new(&ep.name_any()).within(&ns))
            },
        )
        .watches(Api::<Node>::all(client), Config::default(), move |node| {
            if !node_changed(&seen, &node) {
                return Vec::new();
            }
            debug!("node {} changed, requeueing load balancer services", node.name_any());
            store
                .state()
                .into_iter()
                .filter(|svc| FamilyKind::of(svc).is_some())
                .map(|svc| ObjectRef::from_obj(svc.as_ref()))
                .collect()
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Node properties backend selection depends on
#[derive(Clone, Debug, PartialEq)]
struct NodeFingerprint {
    ready: bool,
    unschedulable: bool,
    provider_id: Option<String>,
    labels: BTreeMap<String, String>,
}

impl NodeFingerprint {
    fn of(node: &Node) -> Self {
        let ready = node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|c| c.iter().find(|c| c.type_ == "Ready"))
            .map(|c| c.status == "True")
            .unwrap_or(false);
        let spec = node.spec.as_ref();
        Self {
            ready,
            unschedulable: spec.and_then(|s| s.unschedulable).unwrap_or(false),
            provider_id: spec.and_then(|s| s.provider_id.clone()),
            labels: node.labels().clone(),
        }
    }
}

/// Heartbeats rewrite Node status constantly; only changes that can move
/// backends are worth a pass over every Service
fn node_changed(seen: &Mutex<HashMap<String, NodeFingerprint>>, node: &Node) -> bool {
    let fingerprint = NodeFingerprint::of(node);
    let Ok(mut seen) = seen.lock() else {
        return true;
    };
    let deleted = node.metadata.deletion_timestamp.is_some();
    match seen.insert(node.name_any(), fingerprint.clone()) {
        Some(previous) => deleted || previous != fingerprint,
        None => true,
    }
}

/// Helper to emit a Kubernetes Event
async fn emit_event(
    client: &Client,
    svc: &Service,
    event_type: &str,
    reason: &str,
    message: &str,
) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_else(|| "default".to_string());
    let events: Api<Event> = Api::namespaced(client.clone(), &namespace);

    let time = chrono::Utc::now();
    let event = Event {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-", svc.name_any())),
            ..Default::default()
        },
        type_: Some(event_type.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: svc.object_ref(&()),
        first_timestamp: Some(Time(time)),
        last_timestamp: Some(Time(time)),
        count: Some(1),
        ..Default::default()
    };

    events.create(&PostParams::default(), &event).await?;
    Ok(())
}

/// Events are best effort; a failure to record one never fails the pass
async fn record(
    state: &ControllerState,
    svc: &Service,
    event_type: &str,
    reason: &str,
    message: &str,
) {
    if state.dry_run {
        info!("dry-run: would record {} event {}: {}", event_type, reason, message);
        return;
    }
    if let Err(e) = emit_event(&state.client, svc, event_type, reason, message).await {
        warn!("Failed to record event {} for {}: {}", reason, svc.name_any(), e);
    }
}

/// The main reconciliation function
///
/// This function is called whenever:
/// - A Service is created, updated, or deleted
/// - Its Endpoints or a relevant Node changes
/// - The requeue timer expires
#[instrument(skip(state), fields(name = %svc.name_any(), namespace = svc.namespace()))]
async fn reconcile(svc: Arc<Service>, state: Arc<ControllerState>) -> Result<Action> {
    let namespace = svc.namespace().unwrap_or_else(|| "default".to_string());

    if FamilyKind::of(&svc).is_none() {
        if finalizers::has_finalizer(&svc) {
            info!(
                "Service {}/{} is no longer a load balancer, releasing cloud resources",
                namespace,
                svc.name_any()
            );
            release_service(&state, &svc).await?;
            if !state.dry_run {
                patch_ingress(&state.client, &svc, Vec::new()).await?;
                finalizers::remove_finalizer(&state.client, &svc).await?;
            }
        }
        return Ok(Action::await_change());
    }

    if state.dry_run {
        return if svc.metadata.deletion_timestamp.is_some() {
            release_service(&state, &svc).await
        } else {
            ensure_service(&state, &svc).await
        };
    }

    let api: Api<Service> = Api::namespaced(state.client.clone(), &namespace);
    finalizer(&api, SERVICE_FINALIZER, svc, |event| async {
        match event {
            FinalizerEvent::Apply(svc) => ensure_service(&state, &svc).await,
            FinalizerEvent::Cleanup(svc) => release_service(&state, &svc).await,
        }
    })
    .await
    .map_err(Error::from)
}

/// Endpoints of the Service and every Node, read fresh for each pass
async fn observe_backends(
    client: &Client,
    svc: &Service,
) -> Result<(Option<Endpoints>, Vec<Node>)> {
    let namespace = svc.namespace().unwrap_or_else(|| "default".to_string());
    let endpoints: Api<Endpoints> = Api::namespaced(client.clone(), &namespace);
    let endpoints = endpoints.get_opt(&svc.name_any()).await?;
    let nodes: Api<Node> = Api::all(client.clone());
    let nodes = nodes.list(&ListParams::default()).await?.items;
    Ok((endpoints, nodes))
}

async fn context_for(
    state: &ControllerState,
    svc: &Service,
) -> Result<(FamilyKind, RequestContext)> {
    let (endpoints, nodes) = observe_backends(&state.client, svc).await?;
    let svc = Arc::new(svc.clone());
    Ok(match FamilyKind::of(&svc) {
        Some(FamilyKind::Nlb) => (FamilyKind::Nlb, state.nlb.context(svc, endpoints, nodes)),
        _ => (FamilyKind::Clb, state.clb.context(svc, endpoints, nodes)),
    })
}

/// Create or update the load balancer of a Service and publish its address
async fn ensure_service(state: &ControllerState, svc: &Service) -> Result<Action> {
    let (kind, ctx) = context_for(state, svc).await?;
    info!("Ensuring {:?} load balancer for {}", kind, ctx.namespaced_name());

    let result = match kind {
        FamilyKind::Clb => applier::ensure(&state.clb, &ctx).await,
        FamilyKind::Nlb => applier::ensure(&state.nlb, &ctx).await,
    };
    let ingress = match result {
        Ok(ingress) => ingress,
        Err(e) => {
            record(state, svc, "Warning", "SyncLoadBalancerFailed", &e.to_string()).await;
            return Err(e);
        }
    };

    if state.dry_run {
        info!("dry-run: would publish ingress {:?}", ingress);
    } else if current_ingress(svc) != ingress {
        patch_ingress(&state.client, svc, ingress).await?;
        record(state, svc, "Normal", "EnsuredLoadBalancer", "Ensured load balancer").await;
    }
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Release the cloud resources of a Service being deleted
async fn release_service(state: &ControllerState, svc: &Service) -> Result<Action> {
    let (kind, ctx) = context_for(state, svc).await?;
    info!("Releasing {:?} load balancer for {}", kind, ctx.namespaced_name());

    let result = match kind {
        FamilyKind::Clb => applier::release(&state.clb, &ctx).await,
        FamilyKind::Nlb => applier::release(&state.nlb, &ctx).await,
    };
    match result {
        Ok(()) => {
            record(state, svc, "Normal", "DeletedLoadBalancer", "Deleted load balancer").await;
            Ok(Action::await_change())
        }
        Err(e) => {
            record(state, svc, "Warning", "DeleteLoadBalancerFailed", &e.to_string()).await;
            Err(e)
        }
    }
}

fn current_ingress(svc: &Service) -> Vec<LoadBalancerIngress> {
    svc.status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default()
}

async fn patch_ingress(
    client: &Client,
    svc: &Service,
    ingress: Vec<LoadBalancerIngress>,
) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({
        "status": {
            "loadBalancer": {
                "ingress": ingress
            }
        }
    });
    api.patch_status(&svc.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Requeue interval after a failed pass
pub fn retry_after(error: &Error) -> Duration {
    if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    }
}

/// Error policy for the controller
fn error_policy(svc: Arc<Service>, error: &Error, _state: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", svc.name_any(), error);
    Action::requeue(retry_after(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{node, service};

    #[test]
    fn test_family_by_load_balancer_class() {
        let mut svc = service("web", vec![], &[]);
        assert_eq!(FamilyKind::of(&svc), Some(FamilyKind::Clb));

        if let Some(spec) = svc.spec.as_mut() {
            spec.load_balancer_class = Some(NLB_CLASS.to_string());
        }
        assert_eq!(FamilyKind::of(&svc), Some(FamilyKind::Nlb));

        if let Some(spec) = svc.spec.as_mut() {
            spec.load_balancer_class = Some("example.com/lb".to_string());
        }
        assert_eq!(FamilyKind::of(&svc), None);
    }

    #[test]
    fn test_cluster_ip_service_is_ignored() {
        let mut svc = service("web", vec![], &[]);
        if let Some(spec) = svc.spec.as_mut() {
            spec.type_ = Some("ClusterIP".to_string());
        }
        assert_eq!(FamilyKind::of(&svc), None);
    }

    #[test]
    fn test_retry_after() {
        let throttled = Error::Cloud {
            action: "CreateLoadBalancer".to_string(),
            code: "Throttling".to_string(),
            message: "slow down".to_string(),
        };
        assert_eq!(retry_after(&throttled), Duration::from_secs(15));

        let invalid = Error::annotation("spec", "slb.x", "unknown spec");
        assert_eq!(retry_after(&invalid), Duration::from_secs(60));
    }

    #[test]
    fn test_node_heartbeat_does_not_requeue() {
        let seen = Mutex::new(HashMap::new());
        let n1 = node("n1");
        assert!(node_changed(&seen, &n1));
        assert!(!node_changed(&seen, &n1.clone()));

        let mut cordoned = n1.clone();
        if let Some(spec) = cordoned.spec.as_mut() {
            spec.unschedulable = Some(true);
        }
        assert!(node_changed(&seen, &cordoned));

        let mut relabeled = cordoned.clone();
        relabeled
            .labels_mut()
            .insert("role".to_string(), "edge".to_string());
        assert!(node_changed(&seen, &relabeled));
    }

    #[test]
    fn test_current_ingress_defaults_to_empty() {
        let svc = service("web", vec![], &[]);
        assert!(current_ingress(&svc).is_empty());
    }
}
