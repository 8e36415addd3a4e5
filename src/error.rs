//! Error types for the load balancer controller

use thiserror::Error;

/// Errors raised while building or reconciling load balancer models
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// HTTP transport error talking to the cloud gateway
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid controller configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An annotation is present but its value cannot be used
    #[error("annotation {key}: invalid value [{value}]: {reason}")]
    Annotation {
        key: String,
        value: String,
        reason: String,
    },

    /// An explicitly referenced cloud resource does not exist or is foreign
    #[error("reference error: {0}")]
    Reference(String),

    /// Desired state contradicts what is bound in the cloud
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Endpoint address without a node name under Local traffic policy
    #[error("service {service}: endpoint address {ip} has no node name")]
    MissingNodeName { service: String, ip: String },

    /// A resource name or description is not a valid named key
    #[error("invalid named key [{0}], expected k8s.port[.protocol].service.namespace.cluster")]
    NamedKey(String),

    /// The cloud API rejected a call
    #[error("cloud API {action} failed: [{code}] {message}")]
    Cloud {
        action: String,
        code: String,
        message: String,
    },

    /// Finalizer bookkeeping failed
    #[error("Finalizer error: {0}")]
    FinalizerError(String),
}

impl Error {
    /// Build an annotation error for `key` carrying the offending value
    pub fn annotation(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Error::Annotation {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether requeueing quickly is likely to help
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(_) | Error::HttpError(_) => true,
            Error::Cloud { code, .. } => is_transient_code(code),
            Error::FinalizerError(_) => true,
            _ => false,
        }
    }
}

fn is_transient_code(code: &str) -> bool {
    code.starts_with("Throttling")
        || code.contains("Timeout")
        || code == "ServiceUnavailable"
        || code == "InternalError"
        || code.starts_with("Operation.Conflict")
        || code == "SystemBusy"
}

impl<E: std::error::Error + 'static> From<kube::runtime::finalizer::Error<E>> for Error {
    fn from(e: kube::runtime::finalizer::Error<E>) -> Self {
        Error::FinalizerError(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_throttling_is_retriable() {
        let err = Error::Cloud {
            action: "CreateLoadBalancer".to_string(),
            code: "Throttling.User".to_string(),
            message: "Request was denied due to user flow control.".to_string(),
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn test_configuration_errors_are_not_retriable() {
        let err = Error::annotation("protocol-port", "https443", "expected proto:port");
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("https443"));

        let err = Error::Consistency("port 80 does not use vgroup id rsp-1".to_string());
        assert!(!err.is_retriable());
    }
}
