//! Model builder
//!
//! Entry point used by the reconciler: turns one Service into either the
//! desired (local) or the observed (remote) model of a load balancer family.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use tracing::{debug, instrument};

use crate::config::CloudConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::manager::LoadBalancerFamily;
use crate::model::BuildMode;

pub struct ModelBuilder<F: LoadBalancerFamily> {
    family: F,
    config: Arc<CloudConfig>,
}

impl<F: LoadBalancerFamily> ModelBuilder<F> {
    pub fn new(family: F, config: Arc<CloudConfig>) -> Self {
        Self { family, config }
    }

    pub fn family(&self) -> &F {
        &self.family
    }

    pub fn config(&self) -> &Arc<CloudConfig> {
        &self.config
    }

    /// Request context for one pass over `service`
    pub fn context(
        &self,
        service: Arc<Service>,
        endpoints: Option<Endpoints>,
        nodes: Vec<Node>,
    ) -> RequestContext {
        RequestContext::new(service, self.config.clone()).with_backends(endpoints, nodes)
    }

    #[instrument(
        skip(self, ctx),
        fields(service = %ctx.namespaced_name(), family = self.family.name())
    )]
    pub async fn build(&self, ctx: &RequestContext, mode: BuildMode) -> Result<F::Model> {
        let mdl = match mode {
            BuildMode::Local => self.family.build_local(ctx)?,
            BuildMode::Remote => self.family.build_remote(ctx).await?,
        };
        debug!("built {:?} model", mode);
        Ok(mdl)
    }
}
