//! Closed value types shared by the CLB and NLB models
//!
//! Annotation values, cloud attributes and listener protocols are all plain
//! strings on the wire. They are parsed into these enums once, when the
//! annotation is read, and rendered back only at the cloud API boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declares a string-backed enum with `as_str`, `Display` and a
/// case-insensitive `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok($name::$variant);
                    }
                )+
                Err(format!(
                    "expected one of [{}]",
                    [$($text),+].join("|")
                ))
            }
        }
    };
}

string_enum! {
    /// Listener protocol
    pub enum Protocol {
        Tcp => "tcp",
        Udp => "udp",
        Http => "http",
        Https => "https",
        /// TLS-terminating TCP, NLB only
        TcpSsl => "tcpssl",
    }
}

impl Protocol {
    /// Layer-7 protocols carry stickiness, X-Forwarded-For and forwarding
    pub fn is_layer7(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }

    /// Protocols that terminate TLS and need a certificate
    pub fn is_tls(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::TcpSsl)
    }

    /// Transport a listener occupies its port with; a TCP and a UDP
    /// listener can share a port number
    pub fn transport(&self) -> Protocol {
        match self {
            Protocol::Udp => Protocol::Udp,
            _ => Protocol::Tcp,
        }
    }
}

string_enum! {
    /// The on/off switches used throughout the annotation surface
    #[derive(Default)]
    pub enum Flag {
        On => "on",
        #[default]
        Off => "off",
    }
}

impl Flag {
    pub fn is_on(&self) -> bool {
        *self == Flag::On
    }
}

impl From<bool> for Flag {
    fn from(on: bool) -> Self {
        if on {
            Flag::On
        } else {
            Flag::Off
        }
    }
}

string_enum! {
    /// Whether the load balancer gets a public address
    #[derive(Default)]
    pub enum AddressType {
        #[default]
        Internet => "internet",
        Intranet => "intranet",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum IpVersion {
        #[default]
        Ipv4 => "ipv4",
        Ipv6 => "ipv6",
        DualStack => "dualstack",
    }
}

string_enum! {
    /// How backends are enumerated for a Service
    pub enum TrafficPolicy {
        /// Pods are attached directly by IP
        Eni => "eni",
        /// Only nodes hosting endpoints, weighted by pod count
        Local => "local",
        /// Every eligible node
        Cluster => "cluster",
    }
}

string_enum! {
    /// Kind of server registered in a backend group
    pub enum BackendType {
        Eni => "eni",
        Ecs => "ecs",
        Eci => "eci",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum Scheduler {
        #[default]
        Wrr => "wrr",
        Rr => "rr",
        Wlc => "wlc",
        Sch => "sch",
        Tch => "tch",
        Qch => "qch",
    }
}

string_enum! {
    pub enum StickySessionType {
        Insert => "insert",
        Server => "server",
    }
}

string_enum! {
    pub enum AclType {
        White => "white",
        Black => "black",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum HealthCheckType {
        #[default]
        Tcp => "tcp",
        Http => "http",
    }
}

string_enum! {
    pub enum HealthCheckMethod {
        Head => "head",
        Get => "get",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum ChargeType {
        #[default]
        PayByTraffic => "paybytraffic",
        PayByBandwidth => "paybybandwidth",
    }
}

string_enum! {
    pub enum InstanceChargeType {
        PayBySpec => "PayBySpec",
        PayByClcu => "PayByCLCU",
    }
}

/// A cloud resource tag
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
