use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::annotation::keys;
use crate::cloud::NlbApi;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::listener::set_and_differs;
use crate::manager::explicit_id;
use crate::model::{Flag, NetworkLoadBalancer, NlbAttribute, ZoneMapping};

pub struct LoadBalancerManager {
    cloud: Arc<dyn NlbApi>,
}

impl LoadBalancerManager {
    pub fn new(cloud: Arc<dyn NlbApi>) -> Self {
        Self { cloud }
    }

    pub fn build_local_model(
        &self,
        ctx: &RequestContext,
        mdl: &mut NetworkLoadBalancer,
    ) -> Result<()> {
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
        attr.vpc_id = ctx.config.vpc_id.clone();
        attr.zone_mappings = anno.zone_maps()?;
        attr.security_group_ids = anno.list(keys::SECURITY_GROUP_IDS);
        attr.resource_group_id = anno.get(keys::RESOURCE_GROUP_ID).map(String::from);
        attr.deletion_protection = anno.flag(keys::DELETE_PROTECTION)?;
        attr.modification_protection = anno.flag(keys::MODIFICATION_PROTECTION)?;

        let mut tags = if attr.is_user_managed {
            Vec::new()
        } else {
            anno.default_tags(ctx.cluster_id())
        };
        tags.extend(anno.additional_tags()?);
        attr.tags = tags;
        Ok(())
    }

    #[instrument(skip(self, ctx, mdl), fields(service = %ctx.namespaced_name()))]
    pub async fn find(&self, ctx: &RequestContext, mdl: &mut NetworkLoadBalancer) -> Result<()> {
        if let Some(id) = explicit_id(ctx) {
            let attr = self
                .cloud
                .get_load_balancer(&id)
                .await?
                .ok_or_else(|| {
                    Error::Reference(format!("network load balancer {} not found", id))
                })?;
            if !attr.vpc_id.is_empty() && attr.vpc_id != ctx.config.vpc_id {
                return Err(Error::Reference(format!(
                    "network load balancer {} is in vpc {}, the cluster is in {}",
                    id, attr.vpc_id, ctx.config.vpc_id
                )));
            }
            mdl.attribute = NlbAttribute {
                is_user_managed: true,
                ..attr
            };
            return Ok(());
        }

        let tagged = self
            .cloud
            .find_load_balancers_by_tags(&ctx.anno.default_tags(ctx.cluster_id()))
            .await?;
        if let Some(attr) = tagged.into_iter().next() {
            mdl.attribute = attr;
            return Ok(());
        }
        let name = ctx.anno.default_load_balancer_name();
        if let Some(attr) = self
            .cloud
            .find_load_balancers_by_name(&name)
            .await?
            .into_iter()
            .find(|a| a.load_balancer_name == name)
        {
            info!("found network load balancer {} by name {}", attr.load_balancer_id, name);
            mdl.attribute = attr;
        }
        Ok(())
    }

    /// Create the load balancer; zone mappings fall back to the cluster zone
    #[instrument(skip(self, ctx, local), fields(service = %ctx.namespaced_name()))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        local: &NetworkLoadBalancer,
    ) -> Result<NlbAttribute> {
        let config = &ctx.config;
        let mut attr = local.attribute.clone();
        attr.address_type.get_or_insert(config.default_address_type);
        if attr.zone_mappings.is_empty() {
            match &config.zone_id {
                Some(zone) if !config.vswitch_id.is_empty() => attr.zone_mappings.push(ZoneMapping {
                    zone_id: zone.clone(),
                    vswitch_id: config.vswitch_id.clone(),
                    ..Default::default()
                }),
                _ => {
                    return Err(Error::annotation(
                        keys::ZONE_MAPS,
                        "",
                        "zone mappings are required to create a network load balancer",
                    ))
                }
            }
        }
        if attr.resource_group_id.is_none() {
            attr.resource_group_id = config.resource_group_id.clone();
        }

        let created = self.cloud.create_load_balancer(&attr).await?;
        info!(
            "created network load balancer {} ({}) for {}",
            created.load_balancer_id,
            created.dns_name,
            ctx.namespaced_name()
        );
        if !attr.security_group_ids.is_empty() {
            self.cloud
                .join_security_groups(&created.load_balancer_id, &attr.security_group_ids)
                .await?;
        }
        Ok(created)
    }

    #[instrument(skip(self, ctx, local, remote), fields(service = %ctx.namespaced_name()))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        local: &NetworkLoadBalancer,
        remote: &mut NetworkLoadBalancer,
    ) -> Result<()> {
        let want = &local.attribute;
        let have = &mut remote.attribute;
        let id = have.load_balancer_id.clone();

        if set_and_differs(&want.address_type, &have.address_type) {
            warn!(
                "address type of network load balancer {} cannot change from {:?} to {:?}",
                id, have.address_type, want.address_type
            );
        }
        if ctx.anno.has(keys::LOAD_BALANCER_NAME)
            && want.load_balancer_name != have.load_balancer_name
        {
            self.cloud
                .set_load_balancer_name(&id, &want.load_balancer_name)
                .await?;
            have.load_balancer_name = want.load_balancer_name.clone();
        }
        if !want.zone_mappings.is_empty()
            && zones(&want.zone_mappings) != zones(&have.zone_mappings)
        {
            info!("moving network load balancer {} to zones {:?}", id, zones(&want.zone_mappings));
            self.cloud.update_zones(&id, &want.zone_mappings).await?;
            have.zone_mappings = want.zone_mappings.clone();
        }

        let missing: Vec<String> = want
            .security_group_ids
            .iter()
            .filter(|sg| !have.security_group_ids.contains(sg))
            .cloned()
            .collect();
        if !missing.is_empty() {
            self.cloud.join_security_groups(&id, &missing).await?;
            have.security_group_ids.extend(missing);
        }

        if let Some(flag) = want
            .deletion_protection
            .filter(|f| have.deletion_protection != Some(*f))
        {
            self.cloud.set_deletion_protection(&id, flag.is_on()).await?;
            have.deletion_protection = Some(flag);
        }
        if let Some(flag) = want
            .modification_protection
            .filter(|f| have.modification_protection != Some(*f))
        {
            self.cloud.set_modification_protection(&id, flag.is_on()).await?;
            have.modification_protection = Some(flag);
        }

        let tags: Vec<_> = want
            .tags
            .iter()
            .filter(|t| !have.tags.contains(t))
            .cloned()
            .collect();
        if !tags.is_empty() {
            self.cloud.tag_resources(&id, &tags).await?;
            have.tags.extend(tags);
        }
        Ok(())
    }

    #[instrument(skip(self, ctx, remote), fields(service = %ctx.namespaced_name()))]
    pub async fn delete(&self, ctx: &RequestContext, remote: &NetworkLoadBalancer) -> Result<()> {
        let attr = &remote.attribute;
        if attr.load_balancer_id.is_empty() || attr.is_user_managed {
            return Ok(());
        }
        if attr.deletion_protection == Some(Flag::On) {
            warn!(
                "network load balancer {} has deletion protection on, leaving it",
                attr.load_balancer_id
            );
            return Ok(());
        }
        self.cloud.delete_load_balancer(&attr.load_balancer_id).await?;
        info!(
            "deleted network load balancer {} of {}",
            attr.load_balancer_id,
            ctx.namespaced_name()
        );
        Ok(())
    }
}

fn zones(mappings: &[ZoneMapping]) -> BTreeSet<(&str, &str)> {
    mappings
        .iter()
        .map(|z| (z.zone_id.as_str(), z.vswitch_id.as_str()))
        .collect()
}
