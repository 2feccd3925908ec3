//! Topology Types
//!
//! Domains, routes, API surfaces and the identifiers used to order their
//! creation.

use serde::{Deserialize, Serialize};

use crate::backend::BackendReference;
use crate::dns::DnsRecordType;
use crate::error::{Result, TopologyError};

/// Which shape a region deploys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyShape {
    /// Owning region: zone, query logs, zone parameter and every route
    Full,
    /// Secondary region: zone reference, certificate and the reduced route set
    Minimal,
}

impl std::fmt::Display for TopologyShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyShape::Full => write!(f, "full"),
            TopologyShape::Minimal => write!(f, "minimal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Any,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Head => write!(f, "HEAD"),
            HttpMethod::Options => write!(f, "OPTIONS"),
            HttpMethod::Any => write!(f, "ANY"),
        }
    }
}

/// Route bound to an already-resolved backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub backend: BackendReference,
}

impl Route {
    pub fn new(method: HttpMethod, path: &str, backend: BackendReference) -> Result<Self> {
        validate_path(path)?;
        Ok(Self {
            method,
            path: path.to_string(),
            backend,
        })
    }

    pub fn key(&self) -> (HttpMethod, String) {
        (self.method, self.path.clone())
    }
}

/// Route paths are absolute and free of whitespace
pub fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') && !path.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(TopologyError::InvalidConfig(format!("invalid route path {:?}", path)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    /// Canonical, apex-style name shared by every region
    Primary,
    /// Region-qualified alias
    Regional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointType {
    Regional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpAddressType {
    Ipv4,
    Dualstack,
}

/// Custom domain served by a regional, dual-stack endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub kind: DomainKind,
    pub certificate_id: String,
    pub endpoint_type: EndpointType,
    pub ip_address_type: IpAddressType,
}

impl Domain {
    pub fn new(name: &str, kind: DomainKind, certificate_id: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            certificate_id: certificate_id.to_string(),
            endpoint_type: EndpointType::Regional,
            ip_address_type: IpAddressType::Dualstack,
        }
    }
}

/// Where a custom domain's traffic enters the region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEndpoint {
    pub domain_name: String,
    /// Regional endpoint the alias records must target
    pub regional_domain_name: String,
    pub regional_hosted_zone_id: String,
}

/// API bound to one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSurface {
    pub name: String,
    pub description: String,
    pub region: String,
    /// Domain of the default mapping
    pub default_domain: String,
    pub routes: Vec<Route>,
}

/// Explicit domain-to-API mapping beyond the default one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMapping {
    pub api_name: String,
    pub domain: String,
}

/// Alias record to emit once its domain's endpoint is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPlan {
    pub name: String,
    pub record_type: DnsRecordType,
    /// Regional domain whose endpoint is the alias target
    pub target_domain: String,
}

/// Resource identity within one regional deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ResourceId {
    QueryLogs(String),
    Zone(String),
    ZoneParameter(String),
    Certificate(String),
    Domain(String),
    Api(String),
    ApiMapping(String),
    Route(String),
    Record(String),
    HealthCheck(String),
}

impl ResourceId {
    pub fn route(method: HttpMethod, path: &str) -> Self {
        ResourceId::Route(format!("{} {}", method, path))
    }

    pub fn record(name: &str, record_type: DnsRecordType) -> Self {
        ResourceId::Record(format!("{} {}", record_type, name))
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceId::QueryLogs(n) => write!(f, "query-logs:{}", n),
            ResourceId::Zone(n) => write!(f, "zone:{}", n),
            ResourceId::ZoneParameter(n) => write!(f, "parameter:{}", n),
            ResourceId::Certificate(n) => write!(f, "certificate:{}", n),
            ResourceId::Domain(n) => write!(f, "domain:{}", n),
            ResourceId::Api(n) => write!(f, "api:{}", n),
            ResourceId::ApiMapping(n) => write!(f, "mapping:{}", n),
            ResourceId::Route(n) => write!(f, "route:{}", n),
            ResourceId::Record(n) => write!(f, "record:{}", n),
            ResourceId::HealthCheck(n) => write!(f, "health-check:{}", n),
        }
    }
}
