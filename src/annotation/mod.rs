//! Typed access to the Service annotations
//!
//! [`AnnotationRequest`] is the only place annotation strings are parsed.
//! Lookups never validate on their own; the typed accessors return an
//! [`Error::Annotation`] when a value is present but malformed, and `None`
//! when it is absent, so callers can apply their own defaults.

pub mod keys;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

use crate::error::{Error, Result};
use crate::model::{Flag, Protocol, Tag, ZoneMapping};

pub use keys::ANNOTATION_PREFIX;

/// Maximum length of a generated load balancer name
const MAX_DEFAULT_NAME_LEN: usize = 32;

/// Expand a semantic key into the full annotation name
pub fn annotation(key: &str) -> String {
    format!("{}{}", ANNOTATION_PREFIX, key)
}

/// Parsed view over one Service's annotations
#[derive(Clone, Debug, Default)]
pub struct AnnotationRequest {
    annotations: BTreeMap<String, String>,
    service_uid: String,
}

impl AnnotationRequest {
    pub fn new(svc: &Service) -> Self {
        Self {
            annotations: svc.annotations().clone(),
            service_uid: svc.metadata.uid.clone().unwrap_or_default(),
        }
    }

    /// Raw value of a semantic key; blank values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(&annotation(key))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Parse a value with `FromStr`, reporting the key on failure
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| Error::annotation(key, raw, e.to_string())),
        }
    }

    pub fn flag(&self, key: &str) -> Result<Option<Flag>> {
        self.parse::<Flag>(key)
    }

    /// A flag that defaults to off when absent
    pub fn is_on(&self, key: &str) -> Result<bool> {
        Ok(self.flag(key)?.map(|f| f.is_on()).unwrap_or(false))
    }

    /// Comma separated list, empty entries dropped
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Backend weight override, an integer in `[0, 100]`
    pub fn weight(&self) -> Result<Option<i32>> {
        let weight = self.parse::<i32>(keys::VGROUP_WEIGHT)?;
        if let Some(w) = weight {
            if !(0..=100).contains(&w) {
                return Err(Error::annotation(
                    keys::VGROUP_WEIGHT,
                    &w.to_string(),
                    "weight must be an integer in range [0,100]",
                ));
            }
        }
        Ok(weight)
    }

    /// Entries of the `protocol-port` annotation, e.g. `https:443,http:80`
    pub fn protocol_port(&self) -> Result<Vec<(Protocol, i32)>> {
        self.pairs(keys::PROTOCOL_PORT, |proto, port| {
            let protocol = proto.parse::<Protocol>()?;
            let port = parse_port(port)?;
            Ok((protocol, port))
        })
    }

    /// Entries of the `vgroup-port` annotation, e.g. `rsp-abc:80,rsp-def:443`
    pub fn vgroup_port(&self) -> Result<Vec<(String, i32)>> {
        self.pairs(keys::VGROUP_PORT, |id, port| {
            if id.is_empty() {
                return Err("empty vgroup id".to_string());
            }
            Ok((id.to_string(), parse_port(port)?))
        })
    }

    /// Entries of the `forward-port` annotation, e.g. `80:443`
    pub fn forward_port(&self) -> Result<Vec<(i32, i32)>> {
        self.pairs(keys::FORWARD_PORT, |from, to| {
            Ok((parse_port(from)?, parse_port(to)?))
        })
    }

    /// Node label selector from `backend-label`, e.g. `role=lb,tier=edge`
    pub fn backend_label(&self) -> Result<BTreeMap<String, String>> {
        let mut selector = BTreeMap::new();
        let Some(raw) = self.get(keys::BACKEND_LABEL) else {
            return Ok(selector);
        };
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((k, v)) = entry.split_once('=') else {
                return Err(Error::annotation(
                    keys::BACKEND_LABEL,
                    raw,
                    format!("label [{}] must be key=value", entry),
                ));
            };
            selector.insert(k.trim().to_string(), v.trim().to_string());
        }
        Ok(selector)
    }

    /// User tags from `additional-resource-tags`, e.g. `env=prod,team=a`
    pub fn additional_tags(&self) -> Result<Vec<Tag>> {
        let Some(raw) = self.get(keys::ADDITIONAL_TAGS) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => Ok(Tag::new(k.trim(), v.trim())),
                _ => Err(Error::annotation(
                    keys::ADDITIONAL_TAGS,
                    raw,
                    format!("tag [{}] must be key=value", entry),
                )),
            })
            .collect()
    }

    /// NLB zone mappings, `zone:vswitch[:eip-allocation]` comma separated
    pub fn zone_maps(&self) -> Result<Vec<ZoneMapping>> {
        let Some(raw) = self.get(keys::ZONE_MAPS) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|entry| {
                let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
                match parts.as_slice() {
                    [zone, vsw] | [zone, vsw, ""] if !zone.is_empty() && !vsw.is_empty() => {
                        Ok(ZoneMapping {
                            zone_id: zone.to_string(),
                            vswitch_id: vsw.to_string(),
                            ..Default::default()
                        })
                    }
                    [zone, vsw, eip] if !zone.is_empty() && !vsw.is_empty() => Ok(ZoneMapping {
                        zone_id: zone.to_string(),
                        vswitch_id: vsw.to_string(),
                        allocation_id: Some(eip.to_string()),
                        ..Default::default()
                    }),
                    _ => Err(Error::annotation(
                        keys::ZONE_MAPS,
                        raw,
                        format!("zone mapping [{}] must be zone:vswitch[:allocation]", entry),
                    )),
                }
            })
            .collect()
    }

    /// Name used for load balancers the controller creates
    ///
    /// `a` followed by the Service UID without dashes, at most 32 characters.
    pub fn default_load_balancer_name(&self) -> String {
        let mut name = format!("a{}", self.service_uid.replace('-', ""));
        name.truncate(MAX_DEFAULT_NAME_LEN);
        name
    }

    /// Tags identifying a controller-created load balancer
    pub fn default_tags(&self, cluster_id: &str) -> Vec<Tag> {
        vec![
            Tag::new(keys::TAG_KEY_SERVICE, self.default_load_balancer_name()),
            Tag::new(keys::TAG_KEY_CLUSTER, cluster_id),
        ]
    }

    fn pairs<T>(
        &self,
        key: &str,
        parse: impl Fn(&str, &str) -> std::result::Result<T, String>,
    ) -> Result<Vec<T>> {
        let Some(raw) = self.get(key) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|entry| {
                let (left, right) = entry.split_once(':').ok_or_else(|| {
                    Error::annotation(
                        key,
                        raw,
                        format!("entry [{}] must be colon separated, like 'https:443'", entry),
                    )
                })?;
                parse(left.trim(), right.trim()).map_err(|reason| {
                    Error::annotation(key, raw, format!("entry [{}]: {}", entry, reason))
                })
            })
            .collect()
    }
}

fn parse_port(raw: &str) -> std::result::Result<i32, String> {
    match raw.parse::<i32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(p),
        _ => Err(format!("[{}] is not a valid port", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn service_with(annotations: &[(&str, &str)]) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("5f1c2a9e-1b2c-4d3e-8f90-a1b2c3d4e5f6".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (annotation(k), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_get_and_has() {
        let anno = AnnotationRequest::new(&service_with(&[
            (keys::ADDRESS_TYPE, "intranet"),
            (keys::SPEC, "  "),
        ]));
        assert_eq!(anno.get(keys::ADDRESS_TYPE), Some("intranet"));
        assert!(anno.has(keys::ADDRESS_TYPE));
        assert!(!anno.has(keys::SPEC));
        assert!(!anno.has(keys::LOAD_BALANCER_ID));
    }

    #[test]
    fn test_protocol_port() {
        let anno = AnnotationRequest::new(&service_with(&[(
            keys::PROTOCOL_PORT,
            "https:443,http:80",
        )]));
        assert_eq!(
            anno.protocol_port().unwrap(),
            vec![(Protocol::Https, 443), (Protocol::Http, 80)]
        );
    }

    #[test]
    fn test_protocol_port_malformed_is_error() {
        let anno = AnnotationRequest::new(&service_with(&[(keys::PROTOCOL_PORT, "https443")]));
        let err = anno.protocol_port().unwrap_err();
        assert!(err.to_string().contains("colon separated"));

        let anno = AnnotationRequest::new(&service_with(&[(keys::PROTOCOL_PORT, "ftp:21")]));
        assert!(anno.protocol_port().is_err());

        let anno = AnnotationRequest::new(&service_with(&[(keys::PROTOCOL_PORT, "http:abc")]));
        assert!(anno.protocol_port().is_err());
    }

    #[test]
    fn test_weight_range() {
        let anno = AnnotationRequest::new(&service_with(&[(keys::VGROUP_WEIGHT, "0")]));
        assert_eq!(anno.weight().unwrap(), Some(0));

        let anno = AnnotationRequest::new(&service_with(&[(keys::VGROUP_WEIGHT, "101")]));
        assert!(anno.weight().is_err());

        let anno = AnnotationRequest::new(&service_with(&[(keys::VGROUP_WEIGHT, "ten")]));
        assert!(anno.weight().is_err());

        let anno = AnnotationRequest::new(&service_with(&[]));
        assert_eq!(anno.weight().unwrap(), None);
    }

    #[test]
    fn test_default_name_and_tags() {
        let anno = AnnotationRequest::new(&service_with(&[]));
        let name = anno.default_load_balancer_name();
        assert_eq!(name, "a5f1c2a9e1b2c4d3e8f90a1b2c3d4e5f");
        assert_eq!(name.len(), 32);

        let tags = anno.default_tags("c123");
        assert_eq!(tags[0], Tag::new(keys::TAG_KEY_SERVICE, name));
        assert_eq!(tags[1], Tag::new(keys::TAG_KEY_CLUSTER, "c123"));
    }

    #[test]
    fn test_backend_label_and_tags() {
        let anno = AnnotationRequest::new(&service_with(&[
            (keys::BACKEND_LABEL, "role=edge, tier=lb"),
            (keys::ADDITIONAL_TAGS, "env=prod,team=net"),
        ]));
        let selector = anno.backend_label().unwrap();
        assert_eq!(selector.get("role").map(String::as_str), Some("edge"));
        assert_eq!(selector.get("tier").map(String::as_str), Some("lb"));
        assert_eq!(anno.additional_tags().unwrap().len(), 2);

        let anno = AnnotationRequest::new(&service_with(&[(keys::BACKEND_LABEL, "role")]));
        assert!(anno.backend_label().is_err());
    }

    #[test]
    fn test_zone_maps() {
        let anno = AnnotationRequest::new(&service_with(&[(
            keys::ZONE_MAPS,
            "cn-hangzhou-k:vsw-1,cn-hangzhou-j:vsw-2:eip-9",
        )]));
        let zones = anno.zone_maps().unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].vswitch_id, "vsw-1");
        assert_eq!(zones[1].allocation_id.as_deref(), Some("eip-9"));

        let anno = AnnotationRequest::new(&service_with(&[(keys::ZONE_MAPS, "cn-hangzhou-k")]));
        assert!(anno.zone_maps().is_err());
    }

    #[test]
    fn test_forward_and_vgroup_port() {
        let anno = AnnotationRequest::new(&service_with(&[
            (keys::FORWARD_PORT, "80:443"),
            (keys::VGROUP_PORT, "rsp-abc:80, rsp-def:443"),
        ]));
        assert_eq!(anno.forward_port().unwrap(), vec![(80, 443)]);
        assert_eq!(
            anno.vgroup_port().unwrap(),
            vec![("rsp-abc".to_string(), 80), ("rsp-def".to_string(), 443)]
        );
    }
}
