//! Ownership keys for listeners and backend groups
//!
//! Every listener and group the controller creates carries a [`NamedKey`] in
//! its name or description. The key is derived from the Service alone, so a
//! restarted controller finds exactly the resources it created before, and
//! resources created by users on a shared load balancer are never mistaken
//! for its own.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::Protocol;
use crate::error::{Error, Result};

pub const DEFAULT_PREFIX: &str = "k8s";

const DELIMITER: char = '.';

/// Port component of a key: a port number or a named target port
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPort {
    Number(i32),
    Name(String),
}

impl fmt::Display for KeyPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPort::Number(n) => write!(f, "{}", n),
            KeyPort::Name(name) => f.write_str(name),
        }
    }
}

impl From<i32> for KeyPort {
    fn from(port: i32) -> Self {
        KeyPort::Number(port)
    }
}

impl KeyPort {
    fn parse(segment: &str) -> KeyPort {
        // IANA service names always contain a letter, so a numeric segment
        // is never a named port.
        match segment.parse::<i32>() {
            Ok(n) => KeyPort::Number(n),
            Err(_) => KeyPort::Name(segment.to_string()),
        }
    }
}

/// Deterministic, reversible identity of a Service-owned cloud resource
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedKey {
    pub prefix: String,
    pub cluster_id: String,
    pub namespace: String,
    pub service_name: String,
    pub port: KeyPort,
    pub protocol: Option<Protocol>,
}

impl NamedKey {
    pub fn new(
        cluster_id: impl Into<String>,
        namespace: impl Into<String>,
        service_name: impl Into<String>,
        port: impl Into<KeyPort>,
    ) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            cluster_id: cluster_id.into(),
            namespace: namespace.into(),
            service_name: service_name.into(),
            port: port.into(),
            protocol: None,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Render the key as `prefix.port[.protocol].service.namespace.cluster`
    pub fn encode(&self) -> String {
        let port = self.port.to_string();
        let mut parts: Vec<&str> = vec![self.prefix.as_str(), port.as_str()];
        if let Some(protocol) = &self.protocol {
            parts.push(protocol.as_str());
        }
        parts.extend([
            self.service_name.as_str(),
            self.namespace.as_str(),
            self.cluster_id.as_str(),
        ]);
        parts.join(&DELIMITER.to_string())
    }

    pub fn decode(key: &str) -> Result<NamedKey> {
        let segments: Vec<&str> = key.split(DELIMITER).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::NamedKey(key.to_string()));
        }

        let (protocol, rest) = match segments.len() {
            5 => (None, &segments[2..]),
            6 => {
                let protocol = Protocol::from_str(segments[2])
                    .map_err(|_| Error::NamedKey(key.to_string()))?;
                (Some(protocol), &segments[3..])
            }
            _ => return Err(Error::NamedKey(key.to_string())),
        };

        Ok(NamedKey {
            prefix: segments[0].to_string(),
            port: KeyPort::parse(segments[1]),
            protocol,
            service_name: rest[0].to_string(),
            namespace: rest[1].to_string(),
            cluster_id: rest[2].to_string(),
        })
    }

    /// True when `other` was produced for the same Service in the same cluster
    pub fn same_service(&self, other: &NamedKey) -> bool {
        self.prefix == other.prefix
            && self.cluster_id == other.cluster_id
            && self.namespace == other.namespace
            && self.service_name == other.service_name
    }

    /// Check whether a remote name/description belongs to this key's Service
    pub fn owns(&self, remote: &str) -> bool {
        NamedKey::decode(remote)
            .map(|k| self.same_service(&k))
            .unwrap_or(false)
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for NamedKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NamedKey::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_protocol() {
        let key = NamedKey::new("c1a2b3", "default", "nginx", 80);
        assert_eq!(key.encode(), "k8s.80.nginx.default.c1a2b3");
    }

    #[test]
    fn test_encode_with_protocol() {
        let key =
            NamedKey::new("c1a2b3", "kube-system", "ingress", 443).with_protocol(Protocol::Https);
        assert_eq!(key.encode(), "k8s.443.https.ingress.kube-system.c1a2b3");
    }

    #[test]
    fn test_round_trip() {
        let keys = vec![
            NamedKey::new("c1", "default", "web", 80),
            NamedKey::new("c1", "default", "web", 8080).with_protocol(Protocol::Udp),
            NamedKey::new("c-prod-2", "team-a", "api", KeyPort::Name("http-metrics".into())),
            NamedKey::new("c-prod-2", "team-a", "api", KeyPort::Name("grpc".into()))
                .with_protocol(Protocol::TcpSsl),
        ];
        for key in keys {
            assert_eq!(NamedKey::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn test_custom_prefix_round_trip() {
        let mut key = NamedKey::new("c1", "default", "web", 80);
        key.prefix = "ccm".to_string();
        let decoded = NamedKey::decode(&key.encode()).unwrap();
        assert_eq!(decoded.prefix, "ccm");
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(NamedKey::decode("k8s.80.web.default").is_err());
        assert!(NamedKey::decode("k8s..web.default.c1").is_err());
        assert!(NamedKey::decode("k8s.80.sctp.web.default.c1").is_err());
        assert!(NamedKey::decode("my listener").is_err());
        assert!(NamedKey::decode("").is_err());
    }

    #[test]
    fn test_distinct_services_never_collide() {
        let a = NamedKey::new("c1", "ns-a", "svc", 80).encode();
        let b = NamedKey::new("c1", "ns", "a-svc", 80).encode();
        let c = NamedKey::new("c1", "ns-a", "svc", 80).with_protocol(Protocol::Tcp).encode();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ownership() {
        let key = NamedKey::new("c1", "default", "web", 80);
        assert!(key.owns("k8s.443.https.web.default.c1"));
        assert!(!key.owns("k8s.80.web.default.c2"));
        assert!(!key.owns("k8s.80.other.default.c1"));
        assert!(!key.owns("user-created-listener"));
    }
}
