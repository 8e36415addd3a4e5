//! Finalizer handling for Service cleanup
//!
//! The finalizer keeps a LoadBalancer Service around until the cloud
//! resources it owns are released. The kube-rs `finalizer` helper adds and
//! removes it while the Service stays a LoadBalancer; when the Service type
//! changes away from LoadBalancer the reconciler removes it by hand.

use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::info;

use crate::error::Result;

/// Finalizer guarding the cloud resources of a Service
pub const SERVICE_FINALIZER: &str = "service.k8s.alibaba/resources";

pub fn has_finalizer(svc: &Service) -> bool {
    svc.finalizers().iter().any(|f| f == SERVICE_FINALIZER)
}

/// Remove the finalizer after cleanup is complete
pub async fn remove_finalizer(client: &Client, svc: &Service) -> Result<()> {
    let namespace = svc.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);

    let finalizers: Vec<String> = svc
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != SERVICE_FINALIZER)
        .cloned()
        .collect();

    let patch = json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(
        &svc.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    info!("Removed finalizer from Service: {}/{}", namespace, svc.name_any());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::service;

    #[test]
    fn test_finalizer_name() {
        assert_eq!(SERVICE_FINALIZER, "service.k8s.alibaba/resources");
    }

    #[test]
    fn test_has_finalizer() {
        let mut svc = service("web", vec![], &[]);
        assert!(!has_finalizer(&svc));

        svc.metadata.finalizers = Some(vec![
            "foregroundDeletion".to_string(),
            SERVICE_FINALIZER.to_string(),
        ]);
        assert!(has_finalizer(&svc));
    }
}
