//! Topology Configuration
//!
//! A JSON file describing the zone, the shared route table and the regions
//! that deploy it. Loaded once by the binary and shared read-only by every
//! regional deployment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::backend::{validate_function_name, validate_region};
use crate::backoff::duration_secs;
use crate::certificate::ValidationPolicy;
use crate::dns::{normalize_domain, regional_name};
use crate::error::TopologyError;
use crate::failover::HealthCheckSettings;
use crate::parameters::{ParameterName, ParameterNamespace, RetryPolicy};
use crate::topology::{validate_path, HttpMethod, TopologyShape};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub zone: ZoneSettings,
    /// Account the regional stacks deploy into
    pub caller_account: String,
    /// Defaults to the zone name
    #[serde(default)]
    pub api_name: Option<String>,
    pub routes: Vec<RouteSpec>,
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub health_check: HealthCheckSettings,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub simulation: SimulationSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSettings {
    /// Zone apex, also the shared API domain
    pub name: String,
    /// Key under `/route53/` where the zone id is published
    pub key: String,
    /// Region of the deployment that owns the zone
    pub owner_region: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub method: HttpMethod,
    pub path: String,
    pub backend: BackendSpec,
    /// Also served by minimal regions
    #[serde(default)]
    pub minimal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSpec {
    /// Function in the caller's own account
    Owned { function: String },
    /// Function in the account published under `/account/<service>`
    Remote {
        service: String,
        function: String,
        /// Defaults to the deploying region
        #[serde(default)]
        region: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub region: String,
    /// Label of the regional alias, e.g. `use1`
    pub prefix: String,
    pub shape: TopologyShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub parameters: RetryPolicy,
    pub validation: ValidationPolicy,
}

/// Seed data and fault injection for the in-memory providers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSpec {
    /// service → account id, published before the regions start
    pub accounts: BTreeMap<String, String>,
    #[serde(with = "duration_secs")]
    pub parameter_delay: Duration,
    #[serde(with = "duration_secs")]
    pub dns_delay: Duration,
    /// region → paths whose integration is rejected
    pub failing_routes: BTreeMap<String, Vec<String>>,
    /// Regions whose health endpoint fails after deployment
    pub unhealthy_regions: Vec<String>,
}

impl TopologyConfig {
    /// Read and validate a topology file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse topology config {}", path.display()))?;
        config.validate()?;

        info!(
            path = %path.display(),
            zone = %config.zone.name,
            regions = config.regions.len(),
            routes = config.routes.len(),
            "Loaded topology config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TopologyError> {
        let zone = normalize_domain(&self.zone.name)?;
        if zone != self.zone.name {
            return Err(TopologyError::InvalidConfig(format!(
                "zone name {:?} must be lowercase without a trailing dot",
                self.zone.name
            )));
        }
        self.zone_parameter()?;
        validate_region(&self.zone.owner_region)?;
        ParameterNamespace::Account.validate_value("caller_account", &self.caller_account)?;

        if self.regions.is_empty() {
            return Err(TopologyError::InvalidConfig("at least one region is required".to_string()));
        }

        let mut full = Vec::new();
        let mut regions = HashSet::new();
        let mut prefixes = HashSet::new();
        for spec in &self.regions {
            validate_region(&spec.region)?;
            if !regions.insert(&spec.region) {
                return Err(TopologyError::InvalidConfig(format!("region {} is listed twice", spec.region)));
            }
            if !prefixes.insert(&spec.prefix) {
                return Err(TopologyError::InvalidConfig(format!("prefix {} is used twice", spec.prefix)));
            }
            normalize_domain(&self.regional_domain(spec))?;
            if spec.prefix.contains('.') {
                return Err(TopologyError::InvalidConfig(format!(
                    "prefix {} must be a single label",
                    spec.prefix
                )));
            }
            if spec.shape == TopologyShape::Full {
                full.push(&spec.region);
            }
        }

        match full.as_slice() {
            [] => {}
            [owner] if **owner == self.zone.owner_region => {}
            [other] => {
                return Err(TopologyError::InvalidConfig(format!(
                    "full region {} does not own zone {} (owner: {})",
                    other, self.zone.name, self.zone.owner_region
                )))
            }
            _ => {
                return Err(TopologyError::InvalidConfig(format!(
                    "only one region may own zone {}; full regions: {:?}",
                    self.zone.name, full
                )))
            }
        }

        let mut routes = HashSet::new();
        for route in &self.routes {
            validate_path(&route.path)?;
            if !routes.insert((route.method, route.path.as_str())) {
                return Err(TopologyError::RouteConflict {
                    method: route.method.to_string(),
                    path: route.path.clone(),
                });
            }
            match &route.backend {
                BackendSpec::Owned { function } => validate_function_name(function)?,
                BackendSpec::Remote {
                    service,
                    function,
                    region,
                } => {
                    ParameterName::account(service)?;
                    validate_function_name(function)?;
                    if let Some(region) = region {
                        validate_region(region)?;
                    }
                }
            }
        }

        for (service, account) in &self.simulation.accounts {
            let name = ParameterName::account(service)?;
            name.validate_value(account)?;
        }

        self.health_check.validate()?;

        Ok(())
    }

    pub fn api_name(&self) -> &str {
        self.api_name.as_deref().unwrap_or(&self.zone.name)
    }

    pub fn zone_parameter(&self) -> Result<ParameterName, TopologyError> {
        ParameterName::zone(&self.zone.key)
    }

    /// `<prefix>.<zone>` for a region
    pub fn regional_domain(&self, spec: &RegionSpec) -> String {
        regional_name(&spec.prefix, &self.zone.name)
    }

    /// Routes a region of `shape` serves
    pub fn routes_for(&self, shape: TopologyShape) -> Vec<&RouteSpec> {
        self.routes
            .iter()
            .filter(|r| shape == TopologyShape::Full || r.minimal)
            .collect()
    }

    /// Two-region topology with owned and cross-account backends
    pub fn example() -> Self {
        let remote = |service: &str, function: &str| BackendSpec::Remote {
            service: service.to_string(),
            function: function.to_string(),
            region: None,
        };

        Self {
            zone: ZoneSettings {
                name: "api.example.org".to_string(),
                key: "apiexampleorg".to_string(),
                owner_region: "us-east-1".to_string(),
                comment: Some("Public API".to_string()),
            },
            caller_account: "111111111111".to_string(),
            api_name: None,
            routes: vec![
                RouteSpec {
                    method: HttpMethod::Get,
                    path: "/osint/dns".to_string(),
                    backend: remote("caretaker", "dns"),
                    minimal: false,
                },
                RouteSpec {
                    method: HttpMethod::Get,
                    path: "/osint/ip".to_string(),
                    backend: remote("caretaker", "ip"),
                    minimal: false,
                },
                RouteSpec {
                    method: HttpMethod::Get,
                    path: "/geo/geolite2".to_string(),
                    backend: remote("geolite", "search"),
                    minimal: true,
                },
                RouteSpec {
                    method: HttpMethod::Get,
                    path: "/health".to_string(),
                    backend: BackendSpec::Owned {
                        function: "health".to_string(),
                    },
                    // Every region's check probes this path
                    minimal: true,
                },
            ],
            regions: vec![
                RegionSpec {
                    region: "us-east-1".to_string(),
                    prefix: "use1".to_string(),
                    shape: TopologyShape::Full,
                },
                RegionSpec {
                    region: "us-west-2".to_string(),
                    prefix: "usw2".to_string(),
                    shape: TopologyShape::Minimal,
                },
            ],
            health_check: HealthCheckSettings::default(),
            timeouts: Timeouts::default(),
            simulation: SimulationSpec {
                accounts: BTreeMap::from([
                    ("caretaker".to_string(), "222222222222".to_string()),
                    ("geolite".to_string(), "333333333333".to_string()),
                ]),
                parameter_delay: Duration::from_secs(1),
                dns_delay: Duration::from_secs(3),
                failing_routes: BTreeMap::new(),
                unhealthy_regions: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_example_is_valid() {
        let config = TopologyConfig::example();
        config.validate().unwrap();
        assert_eq!(config.api_name(), "api.example.org");
        assert_eq!(config.regional_domain(&config.regions[1]), "usw2.api.example.org");
    }

    #[test]
    fn test_routes_for_shape() {
        let config = TopologyConfig::example();
        assert_eq!(config.routes_for(TopologyShape::Full).len(), 4);

        let minimal: Vec<&str> = config
            .routes_for(TopologyShape::Minimal)
            .iter()
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(minimal, vec!["/geo/geolite2", "/health"]);
    }

    #[test]
    fn test_rejects_two_full_regions() {
        let mut config = TopologyConfig::example();
        config.regions[1].shape = TopologyShape::Full;
        assert!(matches!(config.validate(), Err(TopologyError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_full_region_not_owning_zone() {
        let mut config = TopologyConfig::example();
        config.zone.owner_region = "us-west-2".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_prefix_and_route() {
        let mut config = TopologyConfig::example();
        config.regions[1].prefix = "use1".to_string();
        assert!(config.validate().is_err());

        let mut config = TopologyConfig::example();
        let duplicate = config.routes[0].clone();
        config.routes.push(duplicate);
        assert!(matches!(config.validate(), Err(TopologyError::RouteConflict { .. })));
    }

    #[test]
    fn test_rejects_unusable_health_check_settings() {
        let mut config = TopologyConfig::example();
        config.health_check.interval = Duration::from_secs(15);
        assert!(matches!(config.validate(), Err(TopologyError::InvalidHealthCheck(_))));

        let mut config = TopologyConfig::example();
        config.health_check.failure_threshold = 0;
        assert!(matches!(config.validate(), Err(TopologyError::InvalidHealthCheck(_))));

        let mut config = TopologyConfig::example();
        config.health_check.recovery_threshold = 11;
        assert!(matches!(config.validate(), Err(TopologyError::InvalidHealthCheck(_))));
    }

    #[test]
    fn test_rejects_bad_accounts_and_empty_regions() {
        let mut config = TopologyConfig::example();
        config.caller_account = "1234".to_string();
        assert!(config.validate().is_err());

        let mut config = TopologyConfig::example();
        config.regions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string_pretty(&TopologyConfig::example()).unwrap()).unwrap();

        let loaded = TopologyConfig::load(file.path()).unwrap();
        assert_eq!(loaded, TopologyConfig::example());
    }

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let raw = r#"{
            "zone": {"name": "api.example.org", "key": "apiexampleorg", "owner_region": "us-east-1"},
            "caller_account": "111111111111",
            "routes": [
                {"method": "GET", "path": "/health", "backend": {"kind": "owned", "function": "health"}}
            ],
            "regions": [{"region": "us-east-1", "prefix": "use1", "shape": "full"}]
        }"#;
        file.write_all(raw.as_bytes()).unwrap();

        let loaded = TopologyConfig::load(file.path()).unwrap();
        assert_eq!(loaded.health_check, HealthCheckSettings::default());
        assert_eq!(loaded.timeouts, Timeouts::default());
        assert!(!loaded.routes[0].minimal);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = TopologyConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse topology config"));
    }
}
