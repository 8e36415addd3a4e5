use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::annotation::keys;
use crate::cloud::SlbApi;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::listener::parse_in_range;
use crate::listener::set_and_differs;
use crate::manager::explicit_id;
use crate::model::{
    AddressType, ChargeType, Flag, InstanceChargeType, LoadBalancer, LoadBalancerAttribute,
};

/// Bandwidth assumed for pay-by-bandwidth load balancers without an annotation
const DEFAULT_BANDWIDTH: i32 = 50;

pub struct LoadBalancerManager {
    cloud: Arc<dyn SlbApi>,
}

impl LoadBalancerManager {
    pub fn new(cloud: Arc<dyn SlbApi>) -> Self {
        Self { cloud }
    }

    /// Desired attributes
    ///
    /// Only annotated values are set so that a reused load balancer is not
    /// reshaped; cluster defaults are filled in when creating.
    pub fn build_local_model(&self, ctx: &RequestContext, mdl: &mut LoadBalancer) -> Result<()> {
        let anno = &ctx.anno;
        let attr = &mut mdl.attribute;

        if let Some(id) = explicit_id(ctx) {
            attr.load_balancer_id = id;
            attr.is_user_managed = true;
        }
        attr.load_balancer_name = anno
            .get(keys::LOAD_BALANCER_NAME)
            .map(String::from)
            .unwrap_or_else(|| anno.default_load_balancer_name());
        attr.address_type = anno.parse(keys::ADDRESS_TYPE)?;
        attr.address_ip_version = anno.parse(keys::IP_VERSION)?;
        attr.load_balancer_spec = anno.get(keys::SPEC).map(String::from);
        attr.instance_charge_type = anno.parse(keys::INSTANCE_CHARGE_TYPE)?;
        attr.internet_charge_type = anno.parse(keys::CHARGE_TYPE)?;
        attr.bandwidth = parse_in_range(anno, keys::BANDWIDTH, 1..=5120)?;
        attr.vswitch_id = anno.get(keys::VSWITCH_ID).unwrap_or_default().to_string();
        attr.master_zone_id = anno.get(keys::MASTER_ZONE_ID).map(String::from);
        attr.slave_zone_id = anno.get(keys::SLAVE_ZONE_ID).map(String::from);
        attr.delete_protection = anno.flag(keys::DELETE_PROTECTION)?;
        attr.modification_protection = anno.flag(keys::MODIFICATION_PROTECTION)?;
        attr.resource_group_id = anno.get(keys::RESOURCE_GROUP_ID).map(String::from);
        attr.region_id = ctx.config.region_id.clone();
        attr.vpc_id = ctx.config.vpc_id.clone();

        if attr.instance_charge_type == Some(InstanceChargeType::PayByClcu)
            && attr.load_balancer_spec.is_some()
        {
            return Err(Error::annotation(
                keys::SPEC,
                anno.get(keys::SPEC).unwrap_or_default(),
                "spec cannot be set for PayByCLCU load balancers",
            ));
        }

        let mut tags = if attr.is_user_managed {
            Vec::new()
        } else {
            anno.default_tags(ctx.cluster_id())
        };
        tags.extend(anno.additional_tags()?);
        attr.tags = tags;
        Ok(())
    }

    /// Locate the load balancer: explicit id, then tags, then name
    #[instrument(skip(self, ctx, mdl), fields(service = %ctx.namespaced_name()))]
    pub async fn find(&self, ctx: &RequestContext, mdl: &mut LoadBalancer) -> Result<()> {
        if let Some(id) = explicit_id(ctx) {
            let attr = self
                .cloud
                .describe_load_balancer(&id)
                .await?
                .ok_or_else(|| Error::Reference(format!("load balancer {} not found", id)))?;
            if !attr.vpc_id.is_empty() && attr.vpc_id != ctx.config.vpc_id {
                return Err(Error::Reference(format!(
                    "load balancer {} is in vpc {}, the cluster is in {}",
                    id, attr.vpc_id, ctx.config.vpc_id
                )));
            }
            mdl.attribute = LoadBalancerAttribute {
                is_user_managed: true,
                ..attr
            };
            return Ok(());
        }

        let tagged = self
            .cloud
            .find_load_balancers_by_tags(&ctx.anno.default_tags(ctx.cluster_id()))
            .await?;
        if tagged.len() > 1 {
            warn!(
                "{} load balancers carry the tags of {}, using the first",
                tagged.len(),
                ctx.namespaced_name()
            );
        }
        if let Some(attr) = tagged.into_iter().next() {
            mdl.attribute = attr;
            return Ok(());
        }

        // tags may have been stripped out of band
        let name = ctx.anno.default_load_balancer_name();
        if let Some(attr) = self
            .cloud
            .find_load_balancers_by_name(&name)
            .await?
            .into_iter()
            .find(|a| a.load_balancer_name == name)
        {
            info!("found load balancer {} by name {}", attr.load_balancer_id, name);
            mdl.attribute = attr;
        }
        Ok(())
    }

    #[instrument(skip(self, ctx, local), fields(service = %ctx.namespaced_name()))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        local: &LoadBalancer,
    ) -> Result<LoadBalancerAttribute> {
        let config = &ctx.config;
        let mut attr = local.attribute.clone();
        let address_type = *attr.address_type.get_or_insert(config.default_address_type);
        if attr.instance_charge_type != Some(InstanceChargeType::PayByClcu) {
            attr.load_balancer_spec
                .get_or_insert_with(|| config.default_spec.clone());
        }
        if address_type == AddressType::Intranet && attr.vswitch_id.is_empty() {
            attr.vswitch_id = config.vswitch_id.clone();
        }
        if attr.internet_charge_type == Some(ChargeType::PayByBandwidth) {
            attr.bandwidth.get_or_insert(DEFAULT_BANDWIDTH);
        }
        if attr.resource_group_id.is_none() {
            attr.resource_group_id = config.resource_group_id.clone();
        }

        let created = self.cloud.create_load_balancer(&attr).await?;
        info!(
            "created load balancer {} ({}) for {}",
            created.load_balancer_id,
            created.address,
            ctx.namespaced_name()
        );
        Ok(created)
    }

    /// Modify the attributes the Service sets explicitly
    #[instrument(skip(self, ctx, local, remote), fields(service = %ctx.namespaced_name()))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        local: &LoadBalancer,
        remote: &mut LoadBalancer,
    ) -> Result<()> {
        let want = &local.attribute;
        let have = &mut remote.attribute;
        let id = have.load_balancer_id.clone();

        if set_and_differs(&want.address_type, &have.address_type) {
            warn!(
                "address type of load balancer {} cannot change from {:?} to {:?}",
                id, have.address_type, want.address_type
            );
        }
        if ctx.anno.has(keys::LOAD_BALANCER_NAME)
            && want.load_balancer_name != have.load_balancer_name
        {
            info!("renaming load balancer {} to {}", id, want.load_balancer_name);
            self.cloud
                .set_load_balancer_name(&id, &want.load_balancer_name)
                .await?;
            have.load_balancer_name = want.load_balancer_name.clone();
        }
        if let Some(spec) = &want.load_balancer_spec {
            if have.load_balancer_spec.as_ref() != Some(spec) {
                info!("changing spec of load balancer {} to {}", id, spec);
                self.cloud.modify_load_balancer_spec(&id, spec).await?;
                have.load_balancer_spec = Some(spec.clone());
            }
        }
        if set_and_differs(&want.internet_charge_type, &have.internet_charge_type)
            || set_and_differs(&want.bandwidth, &have.bandwidth)
        {
            info!(
                "changing internet spec of load balancer {} to {:?}/{:?}",
                id, want.internet_charge_type, want.bandwidth
            );
            self.cloud
                .modify_internet_spec(&id, want.internet_charge_type, want.bandwidth)
                .await?;
            have.internet_charge_type = want.internet_charge_type.or(have.internet_charge_type);
            have.bandwidth = want.bandwidth.or(have.bandwidth);
        }
        if let Some(flag) = want.delete_protection.filter(|f| have.delete_protection != Some(*f)) {
            self.cloud.set_delete_protection(&id, flag).await?;
            have.delete_protection = Some(flag);
        }
        if let Some(flag) = want
            .modification_protection
            .filter(|f| have.modification_protection != Some(*f))
        {
            self.cloud.set_modification_protection(&id, flag).await?;
            have.modification_protection = Some(flag);
        }

        let missing: Vec<_> = want
            .tags
            .iter()
            .filter(|t| !have.tags.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.cloud.tag_resources(&id, &missing).await?;
            have.tags.extend(missing);
        }
        Ok(())
    }

    /// Delete a controller-owned load balancer
    #[instrument(skip(self, ctx, remote), fields(service = %ctx.namespaced_name()))]
    pub async fn delete(&self, ctx: &RequestContext, remote: &LoadBalancer) -> Result<()> {
        let attr = &remote.attribute;
        if attr.load_balancer_id.is_empty() {
            return Ok(());
        }
        if attr.is_user_managed {
            info!("load balancer {} is reused, not deleting it", attr.load_balancer_id);
            return Ok(());
        }
        if attr.delete_protection == Some(Flag::On) {
            warn!(
                "load balancer {} has delete protection on, leaving it",
                attr.load_balancer_id
            );
            return Ok(());
        }
        self.cloud.delete_load_balancer(&attr.load_balancer_id).await?;
        info!(
            "deleted load balancer {} of {}",
            attr.load_balancer_id,
            ctx.namespaced_name()
        );
        Ok(())
    }
}
