//! In-process simulation of a full multi-region rollout
//!
//! Wires the in-memory providers together from a [`TopologyConfig`], deploys
//! every region concurrently, then applies the configured health faults and
//! reports which regional answers resolvers would hand out.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::TopologyConfig;
use crate::dns::answers::RegionalAnswer;
use crate::dns::InMemoryDns;
use crate::error::Result;
use crate::failover::{FailoverController, ProbeOutcome, Transition};
use crate::gateway::InMemoryGateway;
use crate::parameters::{InMemoryParameterStore, ParameterName, ParameterStore};
use crate::topology::{deploy_regions, DeploymentReport, Providers, RegionDeployment};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutcome {
    pub reports: Vec<DeploymentReport>,
    /// Every alias record the regions created
    pub candidates: Vec<RegionalAnswer>,
    /// Records a resolver would return given current health
    pub selected: Vec<RegionalAnswer>,
    pub transitions: Vec<Transition>,
}

impl SimulationOutcome {
    pub fn all_complete(&self) -> bool {
        self.reports.iter().all(DeploymentReport::is_complete)
    }
}

pub async fn simulate(config: Arc<TopologyConfig>, cancel: CancellationToken) -> Result<SimulationOutcome> {
    let simulation = &config.simulation;
    let parameters = Arc::new(InMemoryParameterStore::with_propagation_delay(simulation.parameter_delay));
    let dns = Arc::new(InMemoryDns::with_propagation_delay(simulation.dns_delay));
    let failover = Arc::new(FailoverController::new(config.health_check.clone()));

    for (service, account) in &simulation.accounts {
        let name = ParameterName::account(service)?;
        parameters.publish(&name.expected_publisher(), &name, account).await?;
    }

    let mut deployments = Vec::with_capacity(config.regions.len());
    for spec in &config.regions {
        let gateway = Arc::new(InMemoryGateway::new(&spec.region));
        for path in simulation.failing_routes.get(&spec.region).into_iter().flatten() {
            gateway.fail_route(path).await;
        }

        deployments.push(RegionDeployment::new(
            config.clone(),
            spec.clone(),
            Providers {
                parameters: parameters.clone(),
                dns: dns.clone(),
                gateway,
            },
            failover.clone(),
            cancel.child_token(),
        ));
    }

    let reports = deploy_regions(deployments).await;

    let failure = ProbeOutcome::Failure("simulated outage".to_string());
    for region in &simulation.unhealthy_regions {
        for check in failover.checks_for_region(region).await {
            for _ in 0..check.failure_threshold {
                failover.record_all(&check.id, &failure).await?;
            }
        }
    }

    let candidates: Vec<RegionalAnswer> = reports.iter().flat_map(|r| r.answers.iter().cloned()).collect();
    let selected: Vec<RegionalAnswer> = failover
        .healthy_answers(&candidates)
        .await
        .into_iter()
        .cloned()
        .collect();

    info!(
        regions = reports.len(),
        candidates = candidates.len(),
        selected = selected.len(),
        "Simulation finished"
    );

    Ok(SimulationOutcome {
        reports,
        candidates,
        selected,
        transitions: failover.transitions().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyShape;

    #[tokio::test(start_paused = true)]
    async fn test_example_simulation_completes() {
        let outcome = simulate(Arc::new(TopologyConfig::example()), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.all_complete());
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.candidates.len(), 4);
        assert_eq!(outcome.selected.len(), 4);
        assert!(outcome.transitions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_region_is_withdrawn() {
        let mut config = TopologyConfig::example();
        config.simulation.unhealthy_regions = vec!["us-west-2".to_string()];

        let outcome = simulate(Arc::new(config), CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.selected.len(), 2);
        assert!(outcome.selected.iter().all(|a| a.region == "us-east-1"));
        assert_eq!(outcome.transitions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_route_leaves_other_region_intact() {
        let mut config = TopologyConfig::example();
        config
            .simulation
            .failing_routes
            .insert("us-east-1".to_string(), vec!["/osint/dns".to_string()]);

        let outcome = simulate(Arc::new(config), CancellationToken::new()).await.unwrap();

        let east = outcome.reports.iter().find(|r| r.shape == TopologyShape::Full).unwrap();
        let west = outcome.reports.iter().find(|r| r.shape == TopologyShape::Minimal).unwrap();
        assert!(!east.is_complete());
        assert!(west.is_complete());
        assert!(outcome.selected.iter().all(|a| a.region == "us-west-2"));
    }
}
