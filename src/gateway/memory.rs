//! In-memory API gateway for simulations and tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use super::ApiGateway;
use crate::error::{Result, TopologyError};
use crate::topology::{ApiMapping, ApiSurface, Domain, DomainEndpoint, Route};

/// Hosted zone ids of regional API endpoints
fn endpoint_zone_id(region: &str) -> &'static str {
    match region {
        "us-east-1" => "Z1UJRXOUMOOFQ8",
        "us-east-2" => "ZOJJZC49E0EPZ",
        "us-west-1" => "Z2MUQ32089INYE",
        "us-west-2" => "Z2OJLYMUO9EFXC",
        "eu-west-1" => "ZLY8HYME6SFDD",
        "ap-southeast-2" => "Z2RPCDW04V8134",
        _ => "Z0REGIONALAPI",
    }
}

#[derive(Default)]
struct State {
    domains: HashMap<String, DomainEndpoint>,
    /// api id -> (name, default domain)
    apis: HashMap<String, (String, String)>,
    /// domain -> api id
    mappings: HashMap<String, String>,
    routes: HashMap<String, Vec<Route>>,
    permission_grants: Vec<String>,
    failing_paths: HashSet<String>,
}

/// Process-local gateway for one region
pub struct InMemoryGateway {
    region: String,
    state: RwLock<State>,
}

impl InMemoryGateway {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            state: RwLock::new(State::default()),
        }
    }

    /// Make route creation fail for `path` (fault injection)
    pub async fn fail_route(&self, path: &str) {
        self.state.write().await.failing_paths.insert(path.to_string());
    }

    pub async fn routes(&self, api_id: &str) -> Vec<Route> {
        self.state.read().await.routes.get(api_id).cloned().unwrap_or_default()
    }

    /// Domain → API id, default mapping included
    pub async fn mappings(&self) -> HashMap<String, String> {
        self.state.read().await.mappings.clone()
    }

    /// Function ARNs this gateway granted itself permission to invoke
    pub async fn permission_grants(&self) -> Vec<String> {
        self.state.read().await.permission_grants.clone()
    }
}

#[async_trait]
impl ApiGateway for InMemoryGateway {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_domain(&self, domain: &Domain) -> Result<DomainEndpoint> {
        let mut state = self.state.write().await;
        if state.domains.contains_key(&domain.name) {
            return Err(TopologyError::Provider(format!(
                "domain {} already exists in {}",
                domain.name, self.region
            )));
        }

        let endpoint = DomainEndpoint {
            domain_name: domain.name.clone(),
            regional_domain_name: format!(
                "d-{}.execute-api.{}.amazonaws.com",
                &uuid::Uuid::new_v4().simple().to_string()[..10],
                self.region
            ),
            regional_hosted_zone_id: endpoint_zone_id(&self.region).to_string(),
        };
        debug!(domain = %domain.name, endpoint = %endpoint.regional_domain_name, "Created domain");
        state.domains.insert(domain.name.clone(), endpoint.clone());
        Ok(endpoint)
    }

    async fn create_api(&self, api: &ApiSurface) -> Result<String> {
        let mut state = self.state.write().await;
        if !state.domains.contains_key(&api.default_domain) {
            return Err(TopologyError::Provider(format!(
                "default domain {} does not exist",
                api.default_domain
            )));
        }
        if state.mappings.contains_key(&api.default_domain) {
            return Err(TopologyError::Provider(format!(
                "domain {} is already mapped in {}",
                api.default_domain, self.region
            )));
        }

        let api_id = uuid::Uuid::new_v4().simple().to_string()[..10].to_string();
        state
            .apis
            .insert(api_id.clone(), (api.name.clone(), api.default_domain.clone()));
        state.mappings.insert(api.default_domain.clone(), api_id.clone());
        debug!(api = %api.name, api_id = %api_id, "Created API");
        Ok(api_id)
    }

    async fn create_mapping(&self, api_id: &str, mapping: &ApiMapping) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.apis.contains_key(api_id) {
            return Err(TopologyError::Provider(format!("API {} does not exist", api_id)));
        }
        if !state.domains.contains_key(&mapping.domain) {
            return Err(TopologyError::Provider(format!(
                "domain {} does not exist",
                mapping.domain
            )));
        }
        if state.mappings.contains_key(&mapping.domain) {
            return Err(TopologyError::Provider(format!(
                "domain {} is already mapped",
                mapping.domain
            )));
        }
        state.mappings.insert(mapping.domain.clone(), api_id.to_string());
        Ok(())
    }

    async fn create_route(&self, api_id: &str, route: &Route) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.apis.contains_key(api_id) {
            return Err(TopologyError::Provider(format!("API {} does not exist", api_id)));
        }
        if state.failing_paths.contains(&route.path) {
            return Err(TopologyError::Provider(format!(
                "integration for {} {} rejected",
                route.method, route.path
            )));
        }

        if !route.backend.skip_permission_grant {
            state.permission_grants.push(route.backend.arn());
        }
        state
            .routes
            .entry(api_id.to_string())
            .or_default()
            .push(route.clone());
        Ok(())
    }
}
