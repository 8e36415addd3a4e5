//! Semantic annotation keys
//!
//! Every key is a suffix of [`ANNOTATION_PREFIX`]; [`AnnotationRequest`]
//! expands them on lookup.
//!
//! [`AnnotationRequest`]: super::AnnotationRequest

pub const ANNOTATION_PREFIX: &str = "service.beta.kubernetes.io/alibaba-cloud-loadbalancer-";

// Load balancer
pub const LOAD_BALANCER_ID: &str = "id";
pub const LOAD_BALANCER_NAME: &str = "name";
pub const OVERRIDE_LISTENER: &str = "force-override-listeners";
pub const ADDRESS_TYPE: &str = "address-type";
pub const IP_VERSION: &str = "ip-version";
pub const SPEC: &str = "spec";
pub const INSTANCE_CHARGE_TYPE: &str = "instance-charge-type";
pub const CHARGE_TYPE: &str = "charge-type";
pub const BANDWIDTH: &str = "bandwidth";
pub const VSWITCH_ID: &str = "vswitch-id";
pub const MASTER_ZONE_ID: &str = "master-zoneid";
pub const SLAVE_ZONE_ID: &str = "slave-zoneid";
pub const RESOURCE_GROUP_ID: &str = "resource-group-id";
pub const ADDITIONAL_TAGS: &str = "additional-resource-tags";
pub const DELETE_PROTECTION: &str = "delete-protection";
pub const MODIFICATION_PROTECTION: &str = "modification-protection";
pub const HOSTNAME: &str = "hostname";

// Listener
pub const PROTOCOL_PORT: &str = "protocol-port";
pub const SCHEDULER: &str = "scheduler";
pub const PERSISTENCE_TIMEOUT: &str = "persistence-timeout";
pub const ESTABLISHED_TIMEOUT: &str = "established-timeout";
pub const PROXY_PROTOCOL: &str = "proxy-protocol";
pub const CONNECTION_DRAIN: &str = "connection-drain";
pub const CONNECTION_DRAIN_TIMEOUT: &str = "connection-drain-timeout";
pub const ACL_STATUS: &str = "acl-status";
pub const ACL_ID: &str = "acl-id";
pub const ACL_TYPE: &str = "acl-type";
pub const CERT_ID: &str = "cert-id";
pub const CA_CERT: &str = "cacert";
pub const CA_CERT_ID: &str = "cacert-id";
pub const TLS_CIPHER_POLICY: &str = "tls-cipher-policy";
pub const ENABLE_HTTP2: &str = "http2-enabled";
pub const STICKY_SESSION: &str = "sticky-session";
pub const STICKY_SESSION_TYPE: &str = "sticky-session-type";
pub const COOKIE_TIMEOUT: &str = "cookie-timeout";
pub const COOKIE: &str = "cookie";
pub const X_FORWARDED_FOR_PROTO: &str = "xforwardedfor-proto";
pub const X_FORWARDED_FOR_SLB_IP: &str = "xforwardedfor-slbip";
pub const X_FORWARDED_FOR_SLB_ID: &str = "xforwardedfor-slbid";
pub const X_FORWARDED_FOR_SLB_PORT: &str = "xforwardedfor-slbport";
pub const X_FORWARDED_FOR_CLIENT_SRC_PORT: &str = "xforwardedfor-clientsrcport";
pub const IDLE_TIMEOUT: &str = "idle-timeout";
pub const REQUEST_TIMEOUT: &str = "request-timeout";
pub const FORWARD_PORT: &str = "forward-port";

// Health check
pub const HEALTH_CHECK_FLAG: &str = "health-check-flag";
pub const HEALTH_CHECK_TYPE: &str = "health-check-type";
pub const HEALTH_CHECK_CONNECT_PORT: &str = "health-check-connect-port";
pub const HEALTHY_THRESHOLD: &str = "healthy-threshold";
pub const UNHEALTHY_THRESHOLD: &str = "unhealthy-threshold";
pub const HEALTH_CHECK_INTERVAL: &str = "health-check-interval";
pub const HEALTH_CHECK_CONNECT_TIMEOUT: &str = "health-check-connect-timeout";
pub const HEALTH_CHECK_TIMEOUT: &str = "health-check-timeout";
pub const HEALTH_CHECK_URI: &str = "health-check-uri";
pub const HEALTH_CHECK_DOMAIN: &str = "health-check-domain";
pub const HEALTH_CHECK_HTTP_CODE: &str = "health-check-httpcode";
pub const HEALTH_CHECK_METHOD: &str = "health-check-method";

// Backends
pub const VGROUP_PORT: &str = "vgroup-port";
pub const VGROUP_WEIGHT: &str = "weight";
pub const BACKEND_TYPE: &str = "backend-type";
pub const BACKEND_LABEL: &str = "backend-label";
pub const REMOVE_UNSCHEDULED: &str = "remove-unscheduled-backend";

// NLB only
pub const ZONE_MAPS: &str = "zone-maps";
pub const SECURITY_GROUP_IDS: &str = "security-group-ids";
pub const CPS: &str = "cps";
pub const ALPN: &str = "alpn";
pub const ALPN_POLICY: &str = "alpn-policy";
pub const PRESERVE_CLIENT_IP: &str = "preserve-client-ip";

// Tags written to every load balancer the controller creates
pub const TAG_KEY_SERVICE: &str = "kubernetes.do.not.delete";
pub const TAG_KEY_CLUSTER: &str = "ack.aliyun.com";
pub const TAG_KEY_REUSED: &str = "kubernetes.reused.by.user";
