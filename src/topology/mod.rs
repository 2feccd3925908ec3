//! Regional Topology
//!
//! One parameterised builder produces every region's plan. The plan's
//! creation order comes from an explicit dependency graph, and
//! [`RegionDeployment`] applies it through the provider seams.

mod builder;
mod deploy;
mod graph;
mod types;

pub use builder::{TopologyBuilder, TopologyPlan};
pub use deploy::{
    deploy_regions, publisher_for, DeploymentOutcome, DeploymentReport, FirstFailure, Providers, RegionDeployment,
    ResourceReport, ResourceStatus,
};
pub use graph::DependencyGraph;
pub use types::{
    validate_path, ApiMapping, ApiSurface, Domain, DomainEndpoint, DomainKind, EndpointType, HttpMethod,
    IpAddressType, RecordPlan, ResourceId, Route, TopologyShape,
};
