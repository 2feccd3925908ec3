//! Topology Builder
//!
//! Assembles one region's API surface from a zone, an issued certificate and
//! already-resolved routes. The builder never resolves backend references
//! itself; callers resolve them first, which pins the dependency order.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

use super::graph::DependencyGraph;
use super::types::{
    ApiMapping, ApiSurface, Domain, DomainKind, HttpMethod, RecordPlan, ResourceId, Route,
    TopologyShape,
};
use crate::certificate::Certificate;
use crate::dns::{self, DnsRecordType, ZoneRef};
use crate::error::{Result, TopologyError};
use crate::parameters::ParameterName;

#[derive(Debug)]
pub struct TopologyBuilder<'a> {
    region: String,
    shape: TopologyShape,
    zone: &'a ZoneRef,
    certificate: &'a Certificate,
    api_name: String,
    description: String,
    primary_domain: String,
    regional_domains: Vec<String>,
    zone_parameter: Option<ParameterName>,
    routes: Vec<Route>,
    route_keys: HashSet<(HttpMethod, String)>,
}

impl<'a> TopologyBuilder<'a> {
    /// Start a region's topology. The certificate must already be issued and
    /// cover `primary_domain`.
    pub fn new(
        region: &str,
        shape: TopologyShape,
        zone: &'a ZoneRef,
        certificate: &'a Certificate,
        primary_domain: &str,
    ) -> Result<Self> {
        certificate.ensure_attachable()?;

        match (shape, zone.is_owned()) {
            (TopologyShape::Full, false) => {
                return Err(TopologyError::InvalidConfig(format!(
                    "full topology in {} must own zone {}",
                    region,
                    zone.name()
                )))
            }
            (TopologyShape::Minimal, true) => {
                return Err(TopologyError::InvalidConfig(format!(
                    "minimal topology in {} may only reference zone {}",
                    region,
                    zone.name()
                )))
            }
            _ => {}
        }

        let primary_domain = checked_domain(zone, certificate, primary_domain)?;

        Ok(Self {
            region: region.to_string(),
            shape,
            zone,
            certificate,
            api_name: primary_domain.clone(),
            description: primary_domain.clone(),
            primary_domain,
            regional_domains: Vec::new(),
            zone_parameter: None,
            routes: Vec::new(),
            route_keys: HashSet::new(),
        })
    }

    pub fn api_name(mut self, name: &str, description: &str) -> Self {
        self.api_name = name.to_string();
        self.description = description.to_string();
        self
    }

    /// Parameter under which the owning region publishes the zone id
    pub fn zone_parameter(mut self, name: ParameterName) -> Self {
        self.zone_parameter = Some(name);
        self
    }

    /// Add a region-qualified alias domain mapped to the same API
    pub fn regional_domain(&mut self, name: &str) -> Result<&mut Self> {
        let name = checked_domain(self.zone, self.certificate, name)?;
        if name == self.primary_domain {
            return Err(TopologyError::InvalidConfig(format!(
                "regional domain {} duplicates the primary domain",
                name
            )));
        }
        if !self.regional_domains.contains(&name) {
            self.regional_domains.push(name);
        }
        Ok(self)
    }

    /// Add a route; `(method, path)` must be unique on this API
    pub fn add_route(&mut self, route: Route) -> Result<&mut Self> {
        let key = route.key();
        if !self.route_keys.insert(key) {
            return Err(TopologyError::RouteConflict {
                method: route.method.to_string(),
                path: route.path,
            });
        }
        debug!(region = %self.region, method = %route.method, path = %route.path, "Route added");
        self.routes.push(route);
        Ok(self)
    }

    pub fn build(self) -> Result<TopologyPlan> {
        let zone_id = ResourceId::Zone(self.zone.name().to_string());
        let cert_id = ResourceId::Certificate(self.certificate.id.clone());
        let primary_id = ResourceId::Domain(self.primary_domain.clone());
        let api_id = ResourceId::Api(self.api_name.clone());

        let mut domains = vec![Domain::new(&self.primary_domain, DomainKind::Primary, &self.certificate.id)];
        domains.extend(
            self.regional_domains
                .iter()
                .map(|name| Domain::new(name, DomainKind::Regional, &self.certificate.id)),
        );

        let mappings: Vec<ApiMapping> = self
            .regional_domains
            .iter()
            .map(|name| ApiMapping {
                api_name: self.api_name.clone(),
                domain: name.clone(),
            })
            .collect();

        let records: Vec<RecordPlan> = self
            .regional_domains
            .iter()
            .flat_map(|name| {
                [DnsRecordType::A, DnsRecordType::AAAA].map(|record_type| RecordPlan {
                    name: name.clone(),
                    record_type,
                    target_domain: name.clone(),
                })
            })
            .collect();

        let route_ids: Vec<ResourceId> = self
            .routes
            .iter()
            .map(|r| ResourceId::route(r.method, &r.path))
            .collect();

        // Health checks first, zone last: the graph decides the order
        let mut graph = DependencyGraph::new();
        for name in &self.regional_domains {
            let check = ResourceId::HealthCheck(name.clone());
            graph.depends_on(check.clone(), ResourceId::record(name, DnsRecordType::A));
            graph.depends_on(check, ResourceId::record(name, DnsRecordType::AAAA));
        }
        for record in &records {
            let id = ResourceId::record(&record.name, record.record_type);
            graph.depends_on(id.clone(), zone_id.clone());
            graph.depends_on(id.clone(), ResourceId::Domain(record.target_domain.clone()));
            graph.depends_on(id.clone(), ResourceId::ApiMapping(record.target_domain.clone()));
            for route in &route_ids {
                graph.depends_on(id.clone(), route.clone());
            }
        }
        for route in &route_ids {
            graph.depends_on(route.clone(), api_id.clone());
        }
        for mapping in &mappings {
            let id = ResourceId::ApiMapping(mapping.domain.clone());
            graph.depends_on(id.clone(), api_id.clone());
            graph.depends_on(id, ResourceId::Domain(mapping.domain.clone()));
        }
        graph.depends_on(api_id.clone(), primary_id);
        for domain in &domains {
            graph.depends_on(ResourceId::Domain(domain.name.clone()), cert_id.clone());
        }
        graph.depends_on(cert_id, zone_id.clone());
        if let Some(parameter) = &self.zone_parameter {
            graph.depends_on(ResourceId::ZoneParameter(parameter.path()), zone_id.clone());
        }
        // Query logging belongs to the owner; references only read the zone
        if let (true, Some(destination)) = (self.zone.is_owned(), &self.zone.zone.query_log_destination) {
            graph.depends_on(zone_id, ResourceId::QueryLogs(destination.clone()));
        }

        let order = graph.topological_order()?;

        let api = ApiSurface {
            name: self.api_name.clone(),
            description: self.description.clone(),
            region: self.region.clone(),
            default_domain: self.primary_domain.clone(),
            routes: self.routes,
        };

        info!(
            region = %self.region,
            shape = %self.shape,
            domains = domains.len(),
            routes = api.routes.len(),
            resources = order.len(),
            "Topology planned"
        );

        Ok(TopologyPlan {
            region: self.region,
            shape: self.shape,
            zone: self.zone.clone(),
            certificate_id: self.certificate.id.clone(),
            zone_parameter: self.zone_parameter,
            domains,
            api,
            mappings,
            records,
            health_checks: self.regional_domains,
            graph,
            order,
        })
    }
}

/// Normalize `name` and check the zone and certificate both cover it
fn checked_domain(zone: &ZoneRef, certificate: &Certificate, name: &str) -> Result<String> {
    let name = dns::normalize_domain(name)?;
    if !dns::is_within_zone(&name, zone.name()) {
        return Err(TopologyError::NameOutsideZone {
            name,
            zone: zone.name().to_string(),
        });
    }
    if !certificate.covers(&name) {
        return Err(TopologyError::CertificateMismatch {
            certificate: certificate.id.clone(),
            domain: name,
        });
    }
    Ok(name)
}

/// One region's resources and the order to create them in
#[derive(Debug, Clone, Serialize)]
pub struct TopologyPlan {
    pub region: String,
    pub shape: TopologyShape,
    pub zone: ZoneRef,
    pub certificate_id: String,
    pub zone_parameter: Option<ParameterName>,
    pub domains: Vec<Domain>,
    pub api: ApiSurface,
    /// Explicit mappings; the default mapping is carried by `api.default_domain`
    pub mappings: Vec<ApiMapping>,
    pub records: Vec<RecordPlan>,
    /// Fqdns that get a health check
    pub health_checks: Vec<String>,
    #[serde(skip)]
    pub graph: DependencyGraph,
    pub order: Vec<ResourceId>,
}

impl TopologyPlan {
    /// Default mapping plus explicit ones
    pub fn mapping_count(&self) -> usize {
        1 + self.mappings.len()
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.order.iter().position(|n| n == id)
    }
}
