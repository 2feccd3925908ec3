//! DNS Zone and Record Management
//!
//! The zone is created once by the owning region and referenced read-only by
//! every other region. Regional alias records and certificate validation
//! challenges are written through the [`DnsProvider`] seam.

pub mod answers;
mod memory;
mod types;

pub use memory::InMemoryDns;
pub use types::{DnsRecord, DnsRecordType, RecordTarget, Zone, ZoneOwnership, ZoneRef, ZoneSpec};

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, TopologyError};

/// Hosted DNS service
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create a hosted zone and return it with its assigned id
    async fn create_zone(&self, spec: &ZoneSpec) -> Result<Zone>;

    /// Look up a zone by id
    async fn get_zone(&self, zone_id: &str) -> Result<Option<Zone>>;

    /// Create or replace the record with the same (zone, name, type)
    async fn upsert_record(&self, record: &DnsRecord) -> Result<()>;

    /// Whether a record is observable by public resolvers yet
    async fn is_resolvable(&self, zone_id: &str, name: &str, record_type: DnsRecordType) -> Result<bool>;

    /// All records in a zone
    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>>;
}

/// Lowercase a domain name, drop a trailing dot and validate its labels
pub fn normalize_domain(name: &str) -> Result<String> {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    let label = LABEL.get_or_init(|| {
        Regex::new(r"^(_?[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?|_[a-z0-9-]+)$").expect("static regex")
    });

    let normalized = name.trim().trim_end_matches('.').to_ascii_lowercase();
    let valid = !normalized.is_empty()
        && normalized.len() <= 253
        && normalized.contains('.')
        && normalized.split('.').all(|part| label.is_match(part));

    if valid {
        Ok(normalized)
    } else {
        Err(TopologyError::InvalidDomainName(name.to_string()))
    }
}

/// Whether `name` is the zone apex or a name below it
pub fn is_within_zone(name: &str, zone: &str) -> bool {
    name == zone || name.ends_with(&format!(".{}", zone))
}

/// Region-qualified name, e.g. `use1` + `api.example.org` → `use1.api.example.org`
pub fn regional_name(prefix: &str, api_domain: &str) -> String {
    format!("{}.{}", prefix, api_domain)
}
