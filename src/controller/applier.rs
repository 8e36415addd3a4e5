//! One reconcile pass over a single Service
//!
//! Family-agnostic: builds the desired and observed models, applies the
//! difference and reports the address to publish.

use std::net::IpAddr;

use k8s_openapi::api::core::v1::LoadBalancerIngress;
use tracing::{info, instrument};

use crate::annotation::keys;
use crate::builder::ModelBuilder;
use crate::context::RequestContext;
use crate::error::Result;
use crate::manager::LoadBalancerFamily;
use crate::model::BuildMode;

/// Create or update every cloud resource of the Service
#[instrument(skip_all, fields(service = %ctx.namespaced_name(), family = builder.family().name()))]
pub async fn ensure<F: LoadBalancerFamily>(
    builder: &ModelBuilder<F>,
    ctx: &RequestContext,
) -> Result<Vec<LoadBalancerIngress>> {
    let local = builder.build(ctx, BuildMode::Local).await?;
    let remote = builder.build(ctx, BuildMode::Remote).await?;
    let applied = builder.family().apply(ctx, &local, remote).await?;

    let ingress = ingress_status(ctx, builder.family().ingress_address(&applied));
    info!("load balancer of {} ensured", ctx.namespaced_name());
    Ok(ingress)
}

/// Release everything the Service owns
#[instrument(skip_all, fields(service = %ctx.namespaced_name(), family = builder.family().name()))]
pub async fn release<F: LoadBalancerFamily>(
    builder: &ModelBuilder<F>,
    ctx: &RequestContext,
) -> Result<()> {
    let remote = builder.build(ctx, BuildMode::Remote).await?;
    builder.family().cleanup(ctx, remote).await?;
    info!("load balancer of {} released", ctx.namespaced_name());
    Ok(())
}

/// `status.loadBalancer.ingress` for `address`
///
/// The `hostname` annotation replaces whatever the cloud reports.
pub fn ingress_status(ctx: &RequestContext, address: Option<String>) -> Vec<LoadBalancerIngress> {
    if let Some(hostname) = ctx.anno.get(keys::HOSTNAME) {
        return vec![LoadBalancerIngress {
            hostname: Some(hostname.to_string()),
            ..Default::default()
        }];
    }
    match address {
        Some(ip) if ip.parse::<IpAddr>().is_ok() => vec![LoadBalancerIngress {
            ip: Some(ip),
            ..Default::default()
        }],
        Some(hostname) => vec![LoadBalancerIngress {
            hostname: Some(hostname),
            ..Default::default()
        }],
        None => Vec::new(),
    }
}
