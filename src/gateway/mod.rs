//! Regional API Gateway
//!
//! Seam over the service that hosts custom domains, APIs, mappings and
//! function-backed routes in one region.

mod memory;

pub use memory::InMemoryGateway;

use async_trait::async_trait;

use crate::error::Result;
use crate::topology::{ApiMapping, ApiSurface, Domain, DomainEndpoint, Route};

/// API hosting service for a single region
#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// Region this gateway provisions into
    fn region(&self) -> &str;

    /// Create a custom domain and return its regional endpoint
    async fn create_domain(&self, domain: &Domain) -> Result<DomainEndpoint>;

    /// Create the API with its default mapping to `api.default_domain`; returns the API id
    async fn create_api(&self, api: &ApiSurface) -> Result<String>;

    /// Map an additional domain onto an existing API
    async fn create_mapping(&self, api_id: &str, mapping: &ApiMapping) -> Result<()>;

    /// Create a route and its function integration. Invoke permission is
    /// granted only for same-environment backends.
    async fn create_route(&self, api_id: &str, route: &Route) -> Result<()>;
}
