//! In-memory hosted DNS with simulated record propagation.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::types::{DnsRecord, DnsRecordType, Zone, ZoneSpec};
use super::DnsProvider;
use crate::error::{Result, TopologyError};

type RecordKey = (String, String, DnsRecordType);

#[derive(Default)]
struct State {
    zones: HashMap<String, Zone>,
    records: HashMap<RecordKey, (DnsRecord, Instant)>,
    /// Names that never become resolvable (fault injection)
    blackholed: HashSet<String>,
}

/// Process-local hosted DNS
pub struct InMemoryDns {
    state: RwLock<State>,
    propagation_delay: Duration,
}

impl InMemoryDns {
    pub fn new() -> Self {
        Self::with_propagation_delay(Duration::ZERO)
    }

    pub fn with_propagation_delay(propagation_delay: Duration) -> Self {
        Self {
            state: RwLock::new(State::default()),
            propagation_delay,
        }
    }

    /// Make records named `name` unobservable, e.g. a delegation that is broken
    pub async fn blackhole(&self, name: &str) {
        self.state.write().await.blackholed.insert(name.to_string());
    }

    pub async fn record(&self, zone_id: &str, name: &str, record_type: DnsRecordType) -> Option<DnsRecord> {
        self.state
            .read()
            .await
            .records
            .get(&(zone_id.to_string(), name.to_string(), record_type))
            .map(|(record, _)| record.clone())
    }
}

impl Default for InMemoryDns {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsProvider for InMemoryDns {
    async fn create_zone(&self, spec: &ZoneSpec) -> Result<Zone> {
        let id = format!(
            "Z{}",
            &uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase()[..20]
        );
        let zone = Zone {
            id: id.clone(),
            name: spec.name.clone(),
            comment: spec.comment.clone(),
            query_log_destination: spec.query_log_destination.clone(),
        };

        debug!(zone_id = %id, zone = %spec.name, "Created hosted zone");
        self.state.write().await.zones.insert(id, zone.clone());
        Ok(zone)
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Option<Zone>> {
        Ok(self.state.read().await.zones.get(zone_id).cloned())
    }

    async fn upsert_record(&self, record: &DnsRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.zones.contains_key(&record.zone_id) {
            return Err(TopologyError::ZoneNotFound(record.zone_id.clone()));
        }

        let key = (record.zone_id.clone(), record.name.clone(), record.record_type);
        let visible_at = Instant::now() + self.propagation_delay;
        state.records.insert(key, (record.clone(), visible_at));
        debug!(name = %record.name, record_type = %record.record_type, "Upserted record");
        Ok(())
    }

    async fn is_resolvable(&self, zone_id: &str, name: &str, record_type: DnsRecordType) -> Result<bool> {
        let state = self.state.read().await;
        if state.blackholed.contains(name) {
            return Ok(false);
        }

        let key = (zone_id.to_string(), name.to_string(), record_type);
        Ok(state
            .records
            .get(&key)
            .map(|(_, visible_at)| Instant::now() >= *visible_at)
            .unwrap_or(false))
    }

    async fn list_records(&self, zone_id: &str) -> Result<Vec<DnsRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<DnsRecord> = state
            .records
            .values()
            .filter(|(record, _)| record.zone_id == zone_id)
            .map(|(record, _)| record.clone())
            .collect();
        records.sort_by(|a, b| (&a.name, a.record_type).cmp(&(&b.name, b.record_type)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ZoneSpec {
        ZoneSpec {
            name: "api.example.org".to_string(),
            comment: Some("api.example.org".to_string()),
            query_log_destination: None,
        }
    }

    #[tokio::test]
    async fn test_zone_ids_match_hosted_zone_shape() {
        let dns = InMemoryDns::new();
        let zone = dns.create_zone(&spec()).await.unwrap();

        let name = crate::parameters::ParameterName::zone("apiexampleorg").unwrap();
        assert!(name.validate_value(&zone.id).is_ok());
        assert_eq!(dns.get_zone(&zone.id).await.unwrap(), Some(zone));
    }

    #[tokio::test]
    async fn test_record_requires_zone() {
        let dns = InMemoryDns::new();
        let record = DnsRecord::cname("ZMISSING", "_x.api.example.org", "_y.validations.example");

        let err = dns.upsert_record(&record).await.unwrap_err();
        assert!(matches!(err, TopologyError::ZoneNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_visible_after_propagation() {
        let dns = InMemoryDns::with_propagation_delay(Duration::from_secs(60));
        let zone = dns.create_zone(&spec()).await.unwrap();
        let record = DnsRecord::cname(&zone.id, "_x.api.example.org", "_y.validations.example");
        dns.upsert_record(&record).await.unwrap();

        assert!(!dns.is_resolvable(&zone.id, "_x.api.example.org", DnsRecordType::CNAME).await.unwrap());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(dns.is_resolvable(&zone.id, "_x.api.example.org", DnsRecordType::CNAME).await.unwrap());
    }

    #[tokio::test]
    async fn test_blackholed_name_never_resolves() {
        let dns = InMemoryDns::new();
        let zone = dns.create_zone(&spec()).await.unwrap();
        dns.blackhole("_x.api.example.org").await;
        dns.upsert_record(&DnsRecord::cname(&zone.id, "_x.api.example.org", "v"))
            .await
            .unwrap();

        assert!(!dns.is_resolvable(&zone.id, "_x.api.example.org", DnsRecordType::CNAME).await.unwrap());
    }
}
