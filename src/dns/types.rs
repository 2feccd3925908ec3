//! DNS Types
//!
//! Zones, record shapes and alias targets.

use serde::{Deserialize, Serialize};

/// Hosted zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Provider-assigned identifier, e.g. `Z0123ABC`
    pub id: String,
    /// Apex name, e.g. `api.example.org`
    pub name: String,
    pub comment: Option<String>,
    /// Log group receiving DNS query logs
    pub query_log_destination: Option<String>,
}

/// Request to create a hosted zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    pub comment: Option<String>,
    pub query_log_destination: Option<String>,
}

/// How a deployment holds its zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneOwnership {
    /// Created and mutated by this deployment
    Owned,
    /// Looked up by id; never recreated
    Referenced,
}

/// A zone as seen by one regional deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub zone: Zone,
    pub ownership: ZoneOwnership,
}

impl ZoneRef {
    pub fn owned(zone: Zone) -> Self {
        Self {
            zone,
            ownership: ZoneOwnership::Owned,
        }
    }

    pub fn referenced(zone: Zone) -> Self {
        Self {
            zone,
            ownership: ZoneOwnership::Referenced,
        }
    }

    pub fn id(&self) -> &str {
        &self.zone.id
    }

    pub fn name(&self) -> &str {
        &self.zone.name
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == ZoneOwnership::Owned
    }
}

/// Record types this crate writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    #[allow(clippy::upper_case_acronyms)]
    AAAA,
    #[allow(clippy::upper_case_acronyms)]
    CNAME,
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::AAAA => write!(f, "AAAA"),
            DnsRecordType::CNAME => write!(f, "CNAME"),
        }
    }
}

/// What a record answers with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTarget {
    /// Alias to a regional API endpoint
    Alias {
        dns_name: String,
        hosted_zone_id: String,
    },
    /// Literal value (validation CNAMEs)
    Value(String),
}

/// A record in a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub zone_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub target: RecordTarget,
}

impl DnsRecord {
    pub fn alias(
        zone_id: &str,
        record_type: DnsRecordType,
        name: &str,
        dns_name: &str,
        hosted_zone_id: &str,
    ) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type,
            target: RecordTarget::Alias {
                dns_name: dns_name.to_string(),
                hosted_zone_id: hosted_zone_id.to_string(),
            },
        }
    }

    pub fn cname(zone_id: &str, name: &str, value: &str) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type: DnsRecordType::CNAME,
            target: RecordTarget::Value(value.to_string()),
        }
    }
}
