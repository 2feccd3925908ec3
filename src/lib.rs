//! Regional API Topology
//!
//! Provisions a multi-region, DNS-routed HTTP API: a hosted zone owned by one
//! region, DNS-validated certificates, regional API surfaces backed by owned
//! and cross-account functions, and health-checked alias records so resolvers
//! can withdraw a failed region.
//!
//! Cloud side effects go through the [`parameters::ParameterStore`],
//! [`dns::DnsProvider`], [`gateway::ApiGateway`] and [`failover::HealthProbe`]
//! traits. In-memory implementations of each drive [`simulation`] and the tests.

pub mod backend;
pub mod backoff;
pub mod certificate;
pub mod config;
pub mod dns;
pub mod error;
pub mod failover;
pub mod gateway;
pub mod parameters;
pub mod simulation;
pub mod telemetry;
pub mod topology;

pub use config::TopologyConfig;
pub use error::{Result, TopologyError};
pub use failover::FailoverController;
pub use topology::{deploy_regions, DeploymentReport, RegionDeployment, TopologyBuilder};
