//! Failover Controller
//!
//! Owns every active health check and the evaluator states behind it. DNS
//! answer selection reads [`FailoverController::is_healthy`]; probes feed
//! results in through [`FailoverController::record`] or a
//! [`FailoverController::monitor`] loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::health::{
    aggregate_status, EvaluatorState, HealthCheck, HealthCheckSettings, HealthProtocol, HealthStatus, ProbeOutcome,
    MIN_EVALUATORS,
};
use super::probe::HealthProbe;
use crate::backend::validate_region;
use crate::dns::answers::RegionalAnswer;
use crate::dns::normalize_domain;
use crate::error::{Result, TopologyError};


/// Aggregate status change of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub check_id: String,
    pub region: String,
    pub status: HealthStatus,
    pub at: DateTime<Utc>,
}

struct Entry {
    check: HealthCheck,
    evaluators: BTreeMap<String, EvaluatorState>,
    status: HealthStatus,
}

impl Entry {
    fn refresh(&mut self) -> Option<HealthStatus> {
        let status = aggregate_status(self.evaluators.values());
        if status != self.status {
            self.status = status;
            Some(status)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct State {
    checks: HashMap<String, Entry>,
    transitions: Vec<Transition>,
}

pub struct FailoverController {
    settings: HealthCheckSettings,
    state: RwLock<State>,
}

impl FailoverController {
    pub fn new(settings: HealthCheckSettings) -> Self {
        Self {
            settings,
            state: RwLock::new(State::default()),
        }
    }

    pub fn settings(&self) -> &HealthCheckSettings {
        &self.settings
    }

    /// Attach a check using the controller's settings
    pub async fn attach_default(&self, region: &str, fqdn: &str) -> Result<HealthCheck> {
        let settings = self.settings.clone();
        self.attach(region, fqdn, settings.port, &settings.path, &settings.evaluator_regions)
            .await
    }

    /// Attach a check for `fqdn` guarding `region`'s records.
    ///
    /// At most one check per (region, fqdn); at least three distinct
    /// evaluator regions.
    pub async fn attach(
        &self,
        region: &str,
        fqdn: &str,
        port: u16,
        path: &str,
        evaluators: &[String],
    ) -> Result<HealthCheck> {
        validate_region(region)?;
        let fqdn = normalize_domain(fqdn)?;

        if port == 0 {
            return Err(TopologyError::InvalidHealthCheck("port must be non-zero".to_string()));
        }
        if !path.starts_with('/') {
            return Err(TopologyError::InvalidHealthCheck(format!("path {:?} must be absolute", path)));
        }
        self.settings.validate()?;

        let distinct: BTreeSet<&String> = evaluators.iter().collect();
        if distinct.len() < MIN_EVALUATORS {
            return Err(TopologyError::InvalidHealthCheck(format!(
                "{} distinct evaluator regions required, got {}",
                MIN_EVALUATORS,
                distinct.len()
            )));
        }
        for evaluator in &distinct {
            validate_region(evaluator)?;
        }

        let mut state = self.state.write().await;
        if state
            .checks
            .values()
            .any(|e| e.check.region == region && e.check.fqdn == fqdn)
        {
            return Err(TopologyError::HealthCheckExists {
                region: region.to_string(),
                fqdn,
            });
        }

        let check = HealthCheck {
            id: format!("hc-{}", uuid::Uuid::new_v4()),
            region: region.to_string(),
            protocol: HealthProtocol::Https,
            fqdn,
            port,
            path: path.to_string(),
            enable_sni: self.settings.enable_sni,
            failure_threshold: self.settings.failure_threshold,
            recovery_threshold: self.settings.recovery_threshold,
            interval: self.settings.interval,
            evaluator_regions: distinct.into_iter().cloned().collect(),
        };

        info!(
            check_id = %check.id,
            region = %check.region,
            target = %check.target(),
            evaluators = check.evaluator_regions.len(),
            "Health check attached"
        );

        state.checks.insert(
            check.id.clone(),
            Entry {
                evaluators: check
                    .evaluator_regions
                    .iter()
                    .map(|r| (r.clone(), EvaluatorState::default()))
                    .collect(),
                check: check.clone(),
                status: HealthStatus::Healthy,
            },
        );
        Ok(check)
    }

    /// Remove every check guarding `region`; returns how many were removed
    pub async fn detach_region(&self, region: &str) -> usize {
        let mut state = self.state.write().await;
        let before = state.checks.len();
        state.checks.retain(|_, e| e.check.region != region);
        let removed = before - state.checks.len();
        if removed > 0 {
            info!(region = %region, removed, "Health checks detached");
        }
        removed
    }

    /// Feed one evaluator's probe result; returns the aggregate status
    pub async fn record(&self, check_id: &str, evaluator: &str, outcome: &ProbeOutcome) -> Result<HealthStatus> {
        let mut state = self.state.write().await;
        let entry = state
            .checks
            .get_mut(check_id)
            .ok_or_else(|| TopologyError::UnknownHealthCheck(check_id.to_string()))?;

        let (failure_threshold, recovery_threshold) =
            (entry.check.failure_threshold, entry.check.recovery_threshold);
        let evaluator_state = entry.evaluators.get_mut(evaluator).ok_or_else(|| {
            TopologyError::InvalidHealthCheck(format!("{} is not an evaluator of {}", evaluator, check_id))
        })?;

        if let Some(changed) = evaluator_state.observe(outcome.is_success(), failure_threshold, recovery_threshold) {
            debug!(check_id = %check_id, evaluator = %evaluator, status = %changed, "Evaluator status changed");
        }
        if let ProbeOutcome::Failure(reason) = outcome {
            debug!(check_id = %check_id, evaluator = %evaluator, reason = %reason, "Probe failed");
        }

        let region = entry.check.region.clone();
        let changed = entry.refresh();
        let status = entry.status;

        if let Some(status) = changed {
            match status {
                HealthStatus::Unhealthy => {
                    warn!(check_id = %check_id, region = %region, "Endpoint unhealthy; region withdrawn from DNS answers")
                }
                HealthStatus::Healthy => {
                    info!(check_id = %check_id, region = %region, "Endpoint recovered; region restored to DNS answers")
                }
            }
            state.transitions.push(Transition {
                check_id: check_id.to_string(),
                region,
                status,
                at: Utc::now(),
            });
        }
        Ok(status)
    }

    /// Feed the same result from every evaluator of a check
    pub async fn record_all(&self, check_id: &str, outcome: &ProbeOutcome) -> Result<HealthStatus> {
        let evaluators = self.check(check_id).await?.evaluator_regions;
        let mut status = HealthStatus::Healthy;
        for evaluator in &evaluators {
            status = self.record(check_id, evaluator, outcome).await?;
        }
        Ok(status)
    }

    pub async fn status(&self, check_id: &str) -> Result<HealthStatus> {
        self.state
            .read()
            .await
            .checks
            .get(check_id)
            .map(|e| e.status)
            .ok_or_else(|| TopologyError::UnknownHealthCheck(check_id.to_string()))
    }

    pub async fn check(&self, check_id: &str) -> Result<HealthCheck> {
        self.state
            .read()
            .await
            .checks
            .get(check_id)
            .map(|e| e.check.clone())
            .ok_or_else(|| TopologyError::UnknownHealthCheck(check_id.to_string()))
    }

    pub async fn checks_for_region(&self, region: &str) -> Vec<HealthCheck> {
        let mut checks: Vec<HealthCheck> = self
            .state
            .read()
            .await
            .checks
            .values()
            .filter(|e| e.check.region == region)
            .map(|e| e.check.clone())
            .collect();
        checks.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        checks
    }

    /// Snapshot of check id → status, for synchronous answer selection
    pub async fn snapshot(&self) -> HashMap<String, HealthStatus> {
        self.state
            .read()
            .await
            .checks
            .iter()
            .map(|(id, e)| (id.clone(), e.status))
            .collect()
    }

    pub async fn transitions(&self) -> Vec<Transition> {
        self.state.read().await.transitions.clone()
    }

    /// Unknown checks count as healthy so a detached check never withdraws a record
    pub async fn is_healthy(&self, check_id: &str) -> bool {
        self.status(check_id).await.map_or(true, |s| s == HealthStatus::Healthy)
    }

    /// Healthy subset of `candidates`, failing open when none are healthy
    pub async fn healthy_answers<'a>(&self, candidates: &'a [RegionalAnswer]) -> Vec<&'a RegionalAnswer> {
        let snapshot = self.snapshot().await;
        crate::dns::answers::select_answers(candidates, |answer| match &answer.health_check_id {
            Some(id) => snapshot.get(id).map_or(true, |s| *s == HealthStatus::Healthy),
            None => true,
        })
    }

    /// Probe a check from each evaluator every interval until cancelled
    pub async fn monitor(&self, check_id: &str, probe: Arc<dyn HealthProbe>, cancel: CancellationToken) -> Result<()> {
        let check = self.check(check_id).await?;
        let mut ticker = tokio::time::interval(check.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(check_id = %check_id, target = %check.target(), "Monitoring started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(check_id = %check_id, "Monitoring stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let outcomes = futures::future::join_all(
                        check.evaluator_regions.iter().map(|evaluator| {
                            let probe = probe.clone();
                            let check = &check;
                            async move { (evaluator, probe.probe(check, evaluator).await) }
                        }),
                    )
                    .await;

                    for (evaluator, outcome) in outcomes {
                        match self.record(check_id, evaluator, &outcome).await {
                            Ok(_) => {}
                            // Detached while probing
                            Err(TopologyError::UnknownHealthCheck(_)) => return Ok(()),
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
        }
    }
}

impl Default for FailoverController {
    fn default() -> Self {
        Self::new(HealthCheckSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsRecord, DnsRecordType};
    use crate::failover::probe::StaticProbe;
    use std::time::Duration;

    fn fail() -> ProbeOutcome {
        ProbeOutcome::Failure("timeout".to_string())
    }

    fn answer(region: &str, check_id: Option<&str>) -> RegionalAnswer {
        RegionalAnswer {
            region: region.to_string(),
            record: DnsRecord::alias(
                "ZONE",
                DnsRecordType::A,
                "api.example.org",
                &format!("d-1.execute-api.{}.amazonaws.com", region),
                "Z1",
            ),
            health_check_id: check_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_attach_requires_three_evaluators() {
        let controller = FailoverController::default();
        let two = vec!["us-east-1".to_string(), "us-west-2".to_string(), "us-east-1".to_string()];

        let err = controller
            .attach("us-east-1", "use1.api.example.org", 443, "/health", &two)
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidHealthCheck(_)));
    }

    #[tokio::test]
    async fn test_one_check_per_region_and_fqdn() {
        let controller = FailoverController::default();
        controller.attach_default("us-east-1", "use1.api.example.org").await.unwrap();

        let err = controller
            .attach_default("us-east-1", "USE1.api.example.org.")
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::HealthCheckExists { .. }));

        // Same fqdn guarding another region is a different check
        assert!(controller.attach_default("us-west-2", "use1.api.example.org").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_interval_rejected() {
        let controller = FailoverController::new(HealthCheckSettings {
            interval: Duration::from_secs(15),
            ..HealthCheckSettings::default()
        });
        assert!(controller.attach_default("us-east-1", "use1.api.example.org").await.is_err());
    }

    #[tokio::test]
    async fn test_three_failures_then_three_successes() {
        let controller = FailoverController::default();
        let check = controller.attach_default("us-east-1", "use1.api.example.org").await.unwrap();

        assert_eq!(controller.record_all(&check.id, &fail()).await.unwrap(), HealthStatus::Healthy);
        assert_eq!(controller.record_all(&check.id, &fail()).await.unwrap(), HealthStatus::Healthy);
        assert_eq!(controller.record_all(&check.id, &fail()).await.unwrap(), HealthStatus::Unhealthy);

        // One success is not enough
        assert_eq!(
            controller.record_all(&check.id, &ProbeOutcome::Success).await.unwrap(),
            HealthStatus::Unhealthy
        );
        controller.record_all(&check.id, &ProbeOutcome::Success).await.unwrap();
        assert_eq!(
            controller.record_all(&check.id, &ProbeOutcome::Success).await.unwrap(),
            HealthStatus::Healthy
        );

        let transitions = controller.transitions().await;
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].status, HealthStatus::Unhealthy);
        assert_eq!(transitions[1].status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_single_evaluator_cannot_fail_endpoint() {
        let controller = FailoverController::default();
        let check = controller.attach_default("us-east-1", "use1.api.example.org").await.unwrap();

        for _ in 0..5 {
            controller.record(&check.id, "eu-west-1", &fail()).await.unwrap();
        }
        assert_eq!(controller.status(&check.id).await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_regions_fail_independently() {
        let controller = FailoverController::default();
        let east = controller.attach_default("us-east-1", "use1.api.example.org").await.unwrap();
        let west = controller.attach_default("us-west-2", "usw2.api.example.org").await.unwrap();

        for _ in 0..3 {
            controller.record_all(&east.id, &fail()).await.unwrap();
        }

        assert!(!controller.is_healthy(&east.id).await);
        assert!(controller.is_healthy(&west.id).await);

        let candidates = [answer("us-east-1", Some(&east.id)), answer("us-west-2", Some(&west.id))];
        let selected = controller.healthy_answers(&candidates).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].region, "us-west-2");
    }

    #[tokio::test]
    async fn test_detach_region() {
        let controller = FailoverController::default();
        let check = controller.attach_default("us-east-1", "use1.api.example.org").await.unwrap();
        controller.attach_default("us-west-2", "usw2.api.example.org").await.unwrap();

        assert_eq!(controller.detach_region("us-east-1").await, 1);
        assert!(matches!(
            controller.status(&check.id).await,
            Err(TopologyError::UnknownHealthCheck(_))
        ));
        assert!(controller.is_healthy(&check.id).await);
        assert_eq!(controller.checks_for_region("us-west-2").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_marks_failing_endpoint() {
        let controller = Arc::new(FailoverController::default());
        let check = controller.attach_default("us-east-1", "use1.api.example.org").await.unwrap();
        let probe = Arc::new(StaticProbe::new());
        probe.set_failing("use1.api.example.org", true).await;

        let cancel = CancellationToken::new();
        let task = {
            let controller = controller.clone();
            let probe: Arc<dyn HealthProbe> = probe.clone();
            let cancel = cancel.clone();
            let id = check.id.clone();
            tokio::spawn(async move { controller.monitor(&id, probe, cancel).await })
        };

        // First tick fires immediately, then every 30s
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(controller.status(&check.id).await.unwrap(), HealthStatus::Unhealthy);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
