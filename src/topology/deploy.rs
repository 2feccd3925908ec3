//! Regional Deployment
//!
//! Runs one region end to end: zone, certificate, backend references, plan,
//! then every planned resource in dependency order. A failure stops only the
//! resources that depend on it and is reported with the resource it hit.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::builder::{TopologyBuilder, TopologyPlan};
use super::types::{DomainEndpoint, ResourceId, Route, TopologyShape};
use crate::backend::{Assumption, ReferenceResolver};
use crate::certificate::{Certificate, CertificateState};
use crate::config::{BackendSpec, RegionSpec, TopologyConfig};
use crate::dns::answers::RegionalAnswer;
use crate::dns::{DnsProvider, DnsRecord, ZoneRef, ZoneSpec};
use crate::error::{Result, TopologyError};
use crate::failover::{FailoverController, HealthCheck};
use crate::gateway::ApiGateway;
use crate::parameters::{self, ParameterName, ParameterStore};

/// Identity a region publishes shared state under
pub fn publisher_for(region: &str) -> String {
    format!("topology:{}", region)
}

/// Provider seams one region deploys through
#[derive(Clone)]
pub struct Providers {
    pub parameters: Arc<dyn ParameterStore>,
    pub dns: Arc<dyn DnsProvider>,
    pub gateway: Arc<dyn ApiGateway>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ResourceStatus {
    Ready,
    Failed(String),
    /// Not attempted because a dependency is not ready
    Blocked(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub id: ResourceId,
    #[serde(flatten)]
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Complete,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirstFailure {
    pub resource: String,
    pub reason: String,
}

/// What one regional deployment produced
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub region: String,
    pub shape: TopologyShape,
    pub outcome: DeploymentOutcome,
    pub zone_id: Option<String>,
    pub certificate_state: Option<CertificateState>,
    /// Names the region's certificate covers, primary first
    pub certificate_names: Vec<String>,
    pub resources: Vec<ResourceReport>,
    pub assumptions: Vec<Assumption>,
    pub health_checks: Vec<HealthCheck>,
    /// Alias records this region contributes to DNS answers
    pub answers: Vec<RegionalAnswer>,
    pub first_failure: Option<FirstFailure>,
}

impl DeploymentReport {
    fn new(region: &str, shape: TopologyShape) -> Self {
        Self {
            region: region.to_string(),
            shape,
            outcome: DeploymentOutcome::Complete,
            zone_id: None,
            certificate_state: None,
            certificate_names: Vec::new(),
            resources: Vec::new(),
            assumptions: Vec::new(),
            health_checks: Vec::new(),
            answers: Vec::new(),
            first_failure: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == DeploymentOutcome::Complete
    }

    pub fn status(&self, id: &ResourceId) -> Option<&ResourceStatus> {
        self.resources.iter().find(|r| &r.id == id).map(|r| &r.status)
    }

    pub fn ready_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.status == ResourceStatus::Ready)
            .count()
    }

    fn ready(&mut self, id: ResourceId) {
        self.resources.push(ResourceReport {
            id,
            status: ResourceStatus::Ready,
        });
    }

    fn fail(&mut self, id: ResourceId, error: &TopologyError) {
        error!(region = %self.region, resource = %id, error = %error, "Resource failed");
        if self.first_failure.is_none() {
            self.first_failure = Some(FirstFailure {
                resource: id.to_string(),
                reason: error.to_string(),
            });
        }
        self.outcome = DeploymentOutcome::Partial;
        self.resources.push(ResourceReport {
            id,
            status: ResourceStatus::Failed(error.to_string()),
        });
    }

    fn block(&mut self, id: ResourceId, dependency: &ResourceId) {
        self.outcome = DeploymentOutcome::Partial;
        self.resources.push(ResourceReport {
            id,
            status: ResourceStatus::Blocked(dependency.to_string()),
        });
    }
}

/// One region's deployment
pub struct RegionDeployment {
    config: Arc<TopologyConfig>,
    spec: RegionSpec,
    providers: Providers,
    failover: Arc<FailoverController>,
    cancel: CancellationToken,
}

impl RegionDeployment {
    pub fn new(
        config: Arc<TopologyConfig>,
        spec: RegionSpec,
        providers: Providers,
        failover: Arc<FailoverController>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            spec,
            providers,
            failover,
            cancel,
        }
    }

    pub fn region(&self) -> &str {
        &self.spec.region
    }

    pub fn shape(&self) -> TopologyShape {
        self.spec.shape
    }

    /// Deploy the region; never returns an error, failures land in the report
    pub async fn run(self) -> DeploymentReport {
        let span = info_span!("region", region = %self.spec.region, shape = %self.spec.shape);
        async move {
            let mut report = DeploymentReport::new(&self.spec.region, self.spec.shape);
            info!("Regional deployment started");

            if let Some(plan) = self.prepare(&mut report).await {
                self.apply(&plan, &mut report).await;
            }

            match &report.first_failure {
                None => info!(resources = report.ready_count(), "Regional deployment complete"),
                Some(failure) => warn!(
                    resource = %failure.resource,
                    reason = %failure.reason,
                    ready = report.ready_count(),
                    "Regional deployment partial"
                ),
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Zone, certificate and references; returns the plan if all succeeded
    async fn prepare(&self, report: &mut DeploymentReport) -> Option<TopologyPlan> {
        let api_domain = self.config.zone.name.clone();
        let regional = self.config.regional_domain(&self.spec);

        let zone = match self.zone(report).await {
            Ok(zone) => zone,
            Err((id, e)) => {
                report.fail(id, &e);
                return None;
            }
        };
        report.zone_id = Some(zone.id().to_string());

        // Full regions certify the shared name first; minimal regions lead with their own
        let (primary, alternate) = match self.spec.shape {
            TopologyShape::Full => (api_domain.clone(), regional.clone()),
            TopologyShape::Minimal => (regional.clone(), api_domain.clone()),
        };
        let certificate = match self.certificate(&zone, &primary, &alternate).await {
            Ok(certificate) => certificate,
            Err((certificate, e)) => {
                report.certificate_state = certificate.as_ref().map(|c| c.state());
                let id = ResourceId::Certificate(certificate.map(|c| c.id).unwrap_or_else(|| primary.clone()));
                report.fail(id, &e);
                return None;
            }
        };
        report.certificate_state = Some(certificate.state());
        report.certificate_names = certificate.names();
        report.ready(ResourceId::Certificate(certificate.id.clone()));

        let resolver = ReferenceResolver::new(
            self.providers.parameters.clone(),
            &self.config.caller_account,
            self.config.timeouts.parameters,
        );
        let routes = self.resolve_routes(&resolver, report).await;
        report.assumptions = resolver.assumptions();
        let routes = routes?;

        let plan = self.plan(&zone, &certificate, &api_domain, &regional, routes);
        match plan {
            Ok(plan) => Some(plan),
            Err(e) => {
                report.fail(ResourceId::Api(self.config.api_name().to_string()), &e);
                None
            }
        }
    }

    async fn zone(&self, report: &mut DeploymentReport) -> std::result::Result<ZoneRef, (ResourceId, TopologyError)> {
        let zone_name = &self.config.zone.name;
        let parameter = self
            .config
            .zone_parameter()
            .map_err(|e| (ResourceId::Zone(zone_name.clone()), e))?;

        match self.spec.shape {
            TopologyShape::Full => {
                let destination = format!("/aws/route53/{}", self.config.zone.key);
                let zone = self
                    .providers
                    .dns
                    .create_zone(&ZoneSpec {
                        name: zone_name.clone(),
                        comment: self.config.zone.comment.clone(),
                        query_log_destination: Some(destination.clone()),
                    })
                    .await
                    .map_err(|e| (ResourceId::Zone(zone_name.clone()), e))?;
                report.ready(ResourceId::QueryLogs(destination));
                report.ready(ResourceId::Zone(zone_name.clone()));
                info!(zone_id = %zone.id, zone = %zone.name, "Hosted zone created");

                parameters::publish(
                    self.providers.parameters.as_ref(),
                    &publisher_for(&self.spec.region),
                    &parameter,
                    &zone.id,
                )
                .await
                .map_err(|e| (ResourceId::ZoneParameter(parameter.path()), e))?;
                report.ready(ResourceId::ZoneParameter(parameter.path()));

                Ok(ZoneRef::owned(zone))
            }
            TopologyShape::Minimal => {
                let published = parameters::await_published(
                    self.providers.parameters.as_ref(),
                    &parameter,
                    &publisher_for(&self.config.zone.owner_region),
                    &self.config.timeouts.parameters,
                )
                .await
                .map_err(|e| (ResourceId::Zone(zone_name.clone()), e))?;

                let zone = self
                    .providers
                    .dns
                    .get_zone(&published.value)
                    .await
                    .and_then(|zone| zone.ok_or_else(|| TopologyError::ZoneNotFound(published.value.clone())))
                    .map_err(|e| (ResourceId::Zone(zone_name.clone()), e))?;
                info!(zone_id = %zone.id, zone = %zone.name, "Hosted zone resolved by reference");
                report.ready(ResourceId::Zone(zone_name.clone()));

                Ok(ZoneRef::referenced(zone))
            }
        }
    }

    async fn certificate(
        &self,
        zone: &ZoneRef,
        primary: &str,
        alternate: &str,
    ) -> std::result::Result<Certificate, (Option<Certificate>, TopologyError)> {
        let mut certificate =
            Certificate::request(primary, &[alternate.to_string()]).map_err(|e| (None, e))?;
        let dns = self.providers.dns.as_ref();

        if let Err(e) = certificate.begin_validation(zone, dns).await {
            return Err((Some(certificate), e));
        }
        if let Err(e) = certificate
            .await_issuance(dns, &self.config.timeouts.validation, &self.cancel)
            .await
        {
            return Err((Some(certificate), e));
        }
        Ok(certificate)
    }

    /// Resolve every route this shape serves. Any unresolved reference fails
    /// the region before anything is created at the gateway.
    async fn resolve_routes(&self, resolver: &ReferenceResolver, report: &mut DeploymentReport) -> Option<Vec<Route>> {
        let mut routes = Vec::new();
        let mut failed = false;

        for spec in self.config.routes_for(self.spec.shape) {
            let id = ResourceId::route(spec.method, &spec.path);
            let backend = match &spec.backend {
                BackendSpec::Owned { function } => resolver.resolve_owned(&self.spec.region, function),
                BackendSpec::Remote {
                    service,
                    function,
                    region,
                } => match ParameterName::account(service) {
                    Ok(parameter) => {
                        let region = region.as_deref().unwrap_or(&self.spec.region);
                        resolver.resolve(&parameter, region, function).await
                    }
                    Err(e) => Err(e),
                },
            };

            match backend.and_then(|backend| Route::new(spec.method, &spec.path, backend)) {
                Ok(route) => routes.push(route),
                Err(e) => {
                    report.fail(id, &e);
                    failed = true;
                }
            }
        }

        (!failed).then_some(routes)
    }

    fn plan(
        &self,
        zone: &ZoneRef,
        certificate: &Certificate,
        api_domain: &str,
        regional: &str,
        routes: Vec<Route>,
    ) -> Result<TopologyPlan> {
        let mut builder = TopologyBuilder::new(&self.spec.region, self.spec.shape, zone, certificate, api_domain)?
            .api_name(self.config.api_name(), regional);
        if self.spec.shape == TopologyShape::Full {
            builder = builder.zone_parameter(self.config.zone_parameter()?);
        }

        builder.regional_domain(regional)?;
        for route in routes {
            builder.add_route(route)?;
        }
        builder.build()
    }

    /// Create every not-yet-ready resource in plan order
    async fn apply(&self, plan: &TopologyPlan, report: &mut DeploymentReport) {
        let mut endpoints: HashMap<String, DomainEndpoint> = HashMap::new();
        let mut api_id: Option<String> = None;

        for id in &plan.order {
            if report.status(id).is_some() {
                continue;
            }

            let blocker = plan
                .graph
                .dependencies(id)
                .into_iter()
                .find(|dep| report.status(dep) != Some(&ResourceStatus::Ready))
                .cloned();
            if let Some(dependency) = blocker {
                report.block(id.clone(), &dependency);
                continue;
            }

            if self.cancel.is_cancelled() {
                report.fail(id.clone(), &TopologyError::Cancelled(format!("deployment of {}", plan.region)));
                continue;
            }

            let result = self.create(plan, id, &mut endpoints, &mut api_id, report).await;
            match result {
                Ok(()) => report.ready(id.clone()),
                Err(e) => report.fail(id.clone(), &e),
            }
        }
    }

    async fn create(
        &self,
        plan: &TopologyPlan,
        id: &ResourceId,
        endpoints: &mut HashMap<String, DomainEndpoint>,
        api_id: &mut Option<String>,
        report: &mut DeploymentReport,
    ) -> Result<()> {
        let gateway = self.providers.gateway.as_ref();
        let missing = || TopologyError::InvalidConfig(format!("{} is not part of the plan", id));
        let no_api = || TopologyError::Provider(format!("{} requires an API that was not created", id));

        match id {
            ResourceId::Domain(name) => {
                let domain = plan.domain(name).ok_or_else(missing)?;
                let endpoint = gateway.create_domain(domain).await?;
                info!(domain = %name, endpoint = %endpoint.regional_domain_name, "Domain created");
                endpoints.insert(name.clone(), endpoint);
            }
            ResourceId::Api(_) => {
                let created = gateway.create_api(&plan.api).await?;
                info!(api = %plan.api.name, api_id = %created, default_domain = %plan.api.default_domain, "API created");
                *api_id = Some(created);
            }
            ResourceId::ApiMapping(domain) => {
                let mapping = plan.mappings.iter().find(|m| &m.domain == domain).ok_or_else(missing)?;
                gateway
                    .create_mapping(api_id.as_deref().ok_or_else(no_api)?, mapping)
                    .await?;
                info!(domain = %domain, api = %mapping.api_name, "API mapping created");
            }
            ResourceId::Route(_) => {
                let route = plan
                    .api
                    .routes
                    .iter()
                    .find(|r| &ResourceId::route(r.method, &r.path) == id)
                    .ok_or_else(missing)?;
                gateway
                    .create_route(api_id.as_deref().ok_or_else(no_api)?, route)
                    .await?;
                info!(
                    method = %route.method,
                    path = %route.path,
                    backend = %route.backend.arn(),
                    permission_granted = !route.backend.skip_permission_grant,
                    "Route created"
                );
            }
            ResourceId::Record(_) => {
                let record = plan
                    .records
                    .iter()
                    .find(|r| &ResourceId::record(&r.name, r.record_type) == id)
                    .ok_or_else(missing)?;
                let endpoint = endpoints
                    .get(&record.target_domain)
                    .ok_or_else(|| TopologyError::Provider(format!("no endpoint for {}", record.target_domain)))?;
                let dns_record = DnsRecord::alias(
                    plan.zone.id(),
                    record.record_type,
                    &record.name,
                    &endpoint.regional_domain_name,
                    &endpoint.regional_hosted_zone_id,
                );
                self.providers.dns.upsert_record(&dns_record).await?;
                info!(
                    name = %record.name,
                    record_type = %record.record_type,
                    target = %endpoint.regional_domain_name,
                    "Alias record created"
                );
                report.answers.push(RegionalAnswer {
                    region: plan.region.clone(),
                    record: dns_record,
                    health_check_id: None,
                });
            }
            ResourceId::HealthCheck(fqdn) => {
                let check = self.failover.attach_default(&plan.region, fqdn).await?;
                for answer in report.answers.iter_mut().filter(|a| &a.record.name == fqdn) {
                    answer.health_check_id = Some(check.id.clone());
                }
                report.health_checks.push(check);
            }
            ResourceId::QueryLogs(_) | ResourceId::Zone(_) | ResourceId::ZoneParameter(_) | ResourceId::Certificate(_) => {
                // Created while preparing; reaching here means preparation skipped it
                return Err(TopologyError::Provider(format!("{} was not prepared", id)));
            }
        }
        Ok(())
    }
}

/// Run every region concurrently. Each region gets its own task; one region
/// failing, or panicking, never affects another's report.
pub async fn deploy_regions(deployments: Vec<RegionDeployment>) -> Vec<DeploymentReport> {
    let handles: Vec<_> = deployments
        .into_iter()
        .map(|deployment| {
            let region = deployment.region().to_string();
            let shape = deployment.shape();
            (region, shape, tokio::spawn(deployment.run()))
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (region, shape, handle) in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                let mut report = DeploymentReport::new(&region, shape);
                report.outcome = DeploymentOutcome::Partial;
                report.first_failure = Some(FirstFailure {
                    resource: format!("region:{}", region),
                    reason: format!("deployment task aborted: {}", e),
                });
                error!(region = %region, error = %e, "Deployment task aborted");
                reports.push(report);
            }
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsRecordType, InMemoryDns, RecordTarget};
    use crate::gateway::InMemoryGateway;
    use crate::parameters::InMemoryParameterStore;

    struct Harness {
        config: Arc<TopologyConfig>,
        parameters: Arc<InMemoryParameterStore>,
        dns: Arc<InMemoryDns>,
        failover: Arc<FailoverController>,
    }

    impl Harness {
        async fn new() -> Self {
            let config = TopologyConfig::example();
            let parameters = Arc::new(InMemoryParameterStore::new());
            for (service, account) in &config.simulation.accounts {
                let name = ParameterName::account(service).unwrap();
                parameters
                    .publish(&name.expected_publisher(), &name, account)
                    .await
                    .unwrap();
            }
            Self {
                failover: Arc::new(FailoverController::new(config.health_check.clone())),
                config: Arc::new(config),
                parameters,
                dns: Arc::new(InMemoryDns::new()),
            }
        }

        fn deployment(&self, index: usize, gateway: Arc<InMemoryGateway>) -> RegionDeployment {
            self.cancellable(index, gateway, CancellationToken::new())
        }

        fn cancellable(&self, index: usize, gateway: Arc<InMemoryGateway>, cancel: CancellationToken) -> RegionDeployment {
            RegionDeployment::new(
                self.config.clone(),
                self.config.regions[index].clone(),
                Providers {
                    parameters: self.parameters.clone(),
                    dns: self.dns.clone(),
                    gateway,
                },
                self.failover.clone(),
                cancel,
            )
        }
    }

    #[tokio::test]
    async fn test_full_region_completes() {
        let harness = Harness::new().await;
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let report = harness.deployment(0, gateway.clone()).run().await;

        assert!(report.is_complete(), "{:?}", report.first_failure);
        assert_eq!(report.certificate_state, Some(CertificateState::Issued));
        assert_eq!(report.health_checks.len(), 1);
        assert_eq!(report.answers.len(), 2);
        assert!(report
            .answers
            .iter()
            .all(|a| a.health_check_id.as_deref() == Some(report.health_checks[0].id.as_str())));

        let zone_id = report.zone_id.clone().unwrap();
        let record = harness
            .dns
            .record(&zone_id, "use1.api.example.org", DnsRecordType::AAAA)
            .await
            .unwrap();
        assert!(matches!(
            record.target,
            RecordTarget::Alias { ref dns_name, .. } if dns_name.ends_with(".execute-api.us-east-1.amazonaws.com")
        ));

        // Only the owned health function gets an invoke grant
        assert_eq!(gateway.permission_grants().await.len(), 1);
        assert_eq!(report.assumptions.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_route_blocks_records_and_check() {
        let harness = Harness::new().await;
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        gateway.fail_route("/osint/ip").await;

        let report = harness.deployment(0, gateway).run().await;

        assert_eq!(report.outcome, DeploymentOutcome::Partial);
        let failure = report.first_failure.clone().unwrap();
        assert_eq!(failure.resource, "route:GET /osint/ip");
        assert!(matches!(
            report.status(&ResourceId::record("use1.api.example.org", DnsRecordType::A)),
            Some(ResourceStatus::Blocked(_))
        ));
        assert!(matches!(
            report.status(&ResourceId::HealthCheck("use1.api.example.org".to_string())),
            Some(ResourceStatus::Blocked(_))
        ));
        assert_eq!(
            report.status(&ResourceId::route(crate::topology::HttpMethod::Get, "/health")),
            Some(&ResourceStatus::Ready)
        );
        assert!(report.answers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_account_names_publisher() {
        let harness = Harness {
            parameters: Arc::new(InMemoryParameterStore::new()),
            ..Harness::new().await
        };
        let mut config = (*harness.config).clone();
        config.timeouts.parameters.max_attempts = 1;
        let harness = Harness {
            config: Arc::new(config),
            ..harness
        };

        let report = harness
            .deployment(0, Arc::new(InMemoryGateway::new("us-east-1")))
            .run()
            .await;

        let failure = report.first_failure.unwrap();
        assert_eq!(failure.resource, "route:GET /osint/dns");
        assert!(failure.reason.contains("/account/caretaker"));
        assert!(failure.reason.contains("caretaker account"));
    }

    #[tokio::test]
    async fn test_cancelled_region_leaves_certificate_pending() {
        let harness = Harness::new().await;
        let gateway = Arc::new(InMemoryGateway::new("us-east-1"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = harness.cancellable(0, gateway.clone(), cancel).run().await;

        assert_eq!(report.outcome, DeploymentOutcome::Partial);
        assert_eq!(report.certificate_state, Some(CertificateState::PendingDnsValidation));
        assert!(report.certificate_names.is_empty());
        let failure = report.first_failure.unwrap();
        assert!(failure.resource.starts_with("certificate:cert-"));
        assert!(failure.reason.contains("cancelled"));
        assert!(gateway.mappings().await.is_empty());
        assert!(report.answers.is_empty());
    }
}
