//! Error types for topology provisioning
//!
//! Every failure carries enough context to name the resource (or the shared
//! parameter and its expected publisher) that stopped a regional deployment.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving shared state or assembling a region
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Shared state was never published
    #[error("Parameter {name} has not been published (expected publisher: {expected_publisher})")]
    NotFound {
        name: String,
        expected_publisher: String,
    },

    /// Shared state exists but is not yet visible to this reader
    #[error("Parameter {name} is published but has not propagated after {attempts} attempts (expected publisher: {expected_publisher})")]
    PendingPropagation {
        name: String,
        expected_publisher: String,
        attempts: u32,
    },

    /// Account parameter missing while resolving a backend reference
    #[error("Account parameter {parameter} is unresolved (expected publisher: {expected_publisher}): {reason}")]
    UnresolvedAccount {
        parameter: String,
        expected_publisher: String,
        reason: String,
    },

    /// A second publisher tried to write a name owned by someone else
    #[error("Parameter {name} is owned by {owner}; {publisher} may not publish it")]
    PublisherConflict {
        name: String,
        owner: String,
        publisher: String,
    },

    /// Parameter value does not match the shape of its namespace
    #[error("Parameter {name} has malformed value {value:?}: expected {expected}")]
    InvalidParameterValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    /// Parameter name outside the known namespaces
    #[error("Invalid parameter name: {0}")]
    InvalidParameterName(String),

    /// Function name does not match the lambda identifier pattern
    #[error("Invalid function name: {0}")]
    InvalidFunctionName(String),

    /// Region identifier is malformed
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Domain name is malformed
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    /// Duplicate (method, path) on one API surface
    #[error("Route conflict: {method} {path} is already defined")]
    RouteConflict { method: String, path: String },

    /// Certificate is not yet issued (or failed) and cannot be attached
    #[error("Certificate {certificate} is {state} and cannot be attached to a domain")]
    CertificateNotIssued { certificate: String, state: String },

    /// Certificate does not cover a domain it is being attached to
    #[error("Certificate {certificate} does not cover domain {domain}")]
    CertificateMismatch { certificate: String, domain: String },

    /// Name outside the zone that must hold its records
    #[error("Name {name} is outside zone {zone}")]
    NameOutsideZone { name: String, zone: String },

    /// Certificate stuck in DNS validation past the deadline
    #[error("Certificate {certificate} was not validated within {elapsed:?}; pending: {pending:?}")]
    ValidationTimeout {
        certificate: String,
        elapsed: Duration,
        pending: Vec<String>,
    },

    /// Declared resources form a cycle
    #[error("Dependency cycle among resources: {0:?}")]
    DependencyCycle(Vec<String>),

    /// Zone referenced by id does not exist
    #[error("Hosted zone {0} not found")]
    ZoneNotFound(String),

    /// A health check already exists for this region and fqdn
    #[error("Health check already attached for {fqdn} in {region}")]
    HealthCheckExists { region: String, fqdn: String },

    /// Health check settings are unusable
    #[error("Invalid health check: {0}")]
    InvalidHealthCheck(String),

    /// Health check id not known to the controller
    #[error("Unknown health check: {0}")]
    UnknownHealthCheck(String),

    /// Configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The deployment was aborted
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// A provider call failed
    #[error("Provider error: {0}")]
    Provider(String),
}

impl TopologyError {
    /// Whether a caller may retry the operation after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, TopologyError::PendingPropagation { .. })
    }
}

/// Crate-wide result alias
pub type Result<T, E = TopologyError> = std::result::Result<T, E>;
