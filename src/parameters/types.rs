//! Parameter Store Types
//!
//! Names, values and read policy for cross-stack shared state.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use crate::backoff::{duration_secs, BackoffPolicy};
use crate::error::{Result, TopologyError};

/// Namespaces other stacks depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterNamespace {
    /// `/route53/<zone-key>` holds a hosted zone id
    Route53,
    /// `/account/<service>` holds a 12-digit account id
    Account,
}

impl ParameterNamespace {
    fn prefix(&self) -> &'static str {
        match self {
            ParameterNamespace::Route53 => "/route53/",
            ParameterNamespace::Account => "/account/",
        }
    }

    /// Check a value against the fixed shape of this namespace
    pub fn validate_value(&self, name: &str, value: &str) -> Result<()> {
        let (pattern, expected) = match self {
            ParameterNamespace::Route53 => (hosted_zone_id_pattern(), "a hosted zone id (Z[A-Z0-9]+)"),
            ParameterNamespace::Account => (account_id_pattern(), "a 12-digit account id"),
        };

        if pattern.is_match(value) {
            Ok(())
        } else {
            Err(TopologyError::InvalidParameterValue {
                name: name.to_string(),
                value: value.to_string(),
                expected,
            })
        }
    }
}

impl std::fmt::Display for ParameterNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterNamespace::Route53 => write!(f, "route53"),
            ParameterNamespace::Account => write!(f, "account"),
        }
    }
}

fn hosted_zone_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^Z[A-Z0-9]{1,32}$").expect("static regex"))
}

fn account_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{12}$").expect("static regex"))
}

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,62}$").expect("static regex"))
}

/// A well-known parameter name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParameterName {
    namespace: ParameterNamespace,
    key: String,
}

impl ParameterName {
    /// `/route53/<zone-key>`
    pub fn zone(key: &str) -> Result<Self> {
        Self::new(ParameterNamespace::Route53, key)
    }

    /// `/account/<service>`
    pub fn account(service: &str) -> Result<Self> {
        Self::new(ParameterNamespace::Account, service)
    }

    pub fn new(namespace: ParameterNamespace, key: &str) -> Result<Self> {
        if !key_pattern().is_match(key) {
            return Err(TopologyError::InvalidParameterName(format!(
                "{}{}",
                namespace.prefix(),
                key
            )));
        }
        Ok(Self {
            namespace,
            key: key.to_string(),
        })
    }

    pub fn parse(path: &str) -> Result<Self> {
        for namespace in [ParameterNamespace::Route53, ParameterNamespace::Account] {
            if let Some(key) = path.strip_prefix(namespace.prefix()) {
                return Self::new(namespace, key);
            }
        }
        Err(TopologyError::InvalidParameterName(path.to_string()))
    }

    pub fn namespace(&self) -> ParameterNamespace {
        self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Full path, e.g. `/account/geolite`
    pub fn path(&self) -> String {
        format!("{}{}", self.namespace.prefix(), self.key)
    }

    /// Who is expected to publish this name when nothing more specific is known
    pub fn expected_publisher(&self) -> String {
        match self.namespace {
            ParameterNamespace::Route53 => format!("zone owner for {}", self.key),
            ParameterNamespace::Account => format!("{} account", self.key),
        }
    }

    pub fn validate_value(&self, value: &str) -> Result<()> {
        self.namespace.validate_value(&self.path(), value)
    }
}

impl std::fmt::Display for ParameterName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.namespace.prefix(), self.key)
    }
}

impl TryFrom<String> for ParameterName {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ParameterName> for String {
    fn from(name: ParameterName) -> Self {
        name.path()
    }
}

/// A published, versioned value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: ParameterName,
    pub value: String,
    /// Starts at 1, bumped on every publish by the owner
    pub version: u64,
    /// Logical owner; the only identity allowed to write this name
    pub publisher: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a single read attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Visible to this reader
    Visible(Parameter),
    /// Published but not yet converged
    Pending,
    /// Never published
    Missing,
}

/// Bounded-retry policy for reads of shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(flatten)]
    pub backoff: BackoffPolicy,
    /// Give up after this many attempts
    pub max_attempts: u32,
    /// Give up once this much time has elapsed
    #[serde(with = "duration_secs")]
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::new(Duration::from_secs(1), 2, Duration::from_secs(30)),
            max_attempts: 10,
            deadline: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_namespaces() {
        let zone = ParameterName::parse("/route53/apiexampleorg").unwrap();
        assert_eq!(zone.namespace(), ParameterNamespace::Route53);
        assert_eq!(zone.key(), "apiexampleorg");

        let account = ParameterName::parse("/account/caretaker").unwrap();
        assert_eq!(account.namespace(), ParameterNamespace::Account);
        assert_eq!(account.to_string(), "/account/caretaker");
    }

    #[test]
    fn test_parse_rejects_unknown_namespace() {
        assert!(ParameterName::parse("/secrets/token").is_err());
        assert!(ParameterName::parse("/account/").is_err());
        assert!(ParameterName::parse("/account/Bad Name").is_err());
    }

    #[test]
    fn test_value_shapes() {
        let account = ParameterName::account("geolite").unwrap();
        assert!(account.validate_value("123456789012").is_ok());
        assert!(account.validate_value("12345").is_err());
        assert!(account.validate_value("12345678901a").is_err());

        let zone = ParameterName::zone("apiexampleorg").unwrap();
        assert!(zone.validate_value("Z0123456789ABCDEFGHIJ").is_ok());
        assert!(zone.validate_value("not-a-zone").is_err());
    }

    #[test]
    fn test_name_serializes_as_path() {
        let name = ParameterName::account("geolite").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"/account/geolite\"");

        let back: ParameterName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
