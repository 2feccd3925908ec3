//! Health Check Types
//!
//! Check definitions plus the per-evaluator hysteresis that turns probe
//! results into a pass/fail signal.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::backend::validate_region;
use crate::backoff::duration_secs;
use crate::error::{Result, TopologyError};

pub(crate) const MIN_EVALUATORS: usize = 3;
const ALLOWED_INTERVALS: [Duration; 2] = [Duration::from_secs(10), Duration::from_secs(30)];

/// Pass/fail state consumed by DNS answer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthProtocol {
    Https,
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success,
    Failure(String),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }
}

/// Shared settings for every check a controller attaches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckSettings {
    pub port: u16,
    pub path: String,
    pub enable_sni: bool,
    /// Consecutive failures before an evaluator marks the endpoint unhealthy
    pub failure_threshold: u32,
    /// Consecutive successes before an unhealthy evaluator recovers
    pub recovery_threshold: u32,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub evaluator_regions: Vec<String>,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            port: 443,
            path: "/health".to_string(),
            enable_sni: true,
            failure_threshold: 3,
            recovery_threshold: 3,
            interval: Duration::from_secs(30),
            evaluator_regions: vec![
                "us-east-1".to_string(),
                "us-west-2".to_string(),
                "eu-west-1".to_string(),
                "ap-southeast-2".to_string(),
            ],
        }
    }
}

impl HealthCheckSettings {
    /// Thresholds within 1..=10, a 10s or 30s interval, and at least three
    /// distinct valid evaluator regions
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.failure_threshold) || !(1..=10).contains(&self.recovery_threshold) {
            return Err(TopologyError::InvalidHealthCheck(format!(
                "thresholds must be within 1..=10 (failure {}, recovery {})",
                self.failure_threshold, self.recovery_threshold
            )));
        }
        if !ALLOWED_INTERVALS.contains(&self.interval) {
            return Err(TopologyError::InvalidHealthCheck(format!(
                "interval must be 10s or 30s, got {:?}",
                self.interval
            )));
        }

        let distinct: HashSet<&String> = self.evaluator_regions.iter().collect();
        if distinct.len() < MIN_EVALUATORS {
            return Err(TopologyError::InvalidHealthCheck(format!(
                "{} distinct evaluator regions required, got {}",
                MIN_EVALUATORS,
                distinct.len()
            )));
        }
        for region in distinct {
            validate_region(region)?;
        }
        Ok(())
    }
}

/// An active check against one region's endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub id: String,
    /// Region whose records this check guards
    pub region: String,
    pub protocol: HealthProtocol,
    pub fqdn: String,
    pub port: u16,
    pub path: String,
    pub enable_sni: bool,
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub evaluator_regions: Vec<String>,
}

impl HealthCheck {
    pub fn target(&self) -> String {
        format!("{}:{}{}", self.fqdn, self.port, self.path)
    }
}

/// One evaluator's view with consecutive-result hysteresis.
///
/// Starts healthy. Flips to unhealthy after `failure_threshold` consecutive
/// failures and back after `recovery_threshold` consecutive successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorState {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl Default for EvaluatorState {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

impl EvaluatorState {
    /// Apply one result; returns the new status if it changed
    pub fn observe(&mut self, success: bool, failure_threshold: u32, recovery_threshold: u32) -> Option<HealthStatus> {
        if success {
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);
            self.consecutive_failures = 0;
            if self.status == HealthStatus::Unhealthy && self.consecutive_successes >= recovery_threshold {
                self.status = HealthStatus::Healthy;
                return Some(self.status);
            }
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.consecutive_successes = 0;
            if self.status == HealthStatus::Healthy && self.consecutive_failures >= failure_threshold {
                self.status = HealthStatus::Unhealthy;
                return Some(self.status);
            }
        }
        None
    }
}

/// Endpoint is healthy while more than 18% of evaluators report healthy
pub fn aggregate_status<'a>(evaluators: impl IntoIterator<Item = &'a EvaluatorState>) -> HealthStatus {
    let (healthy, total) = evaluators.into_iter().fold((0usize, 0usize), |(h, t), e| {
        (h + usize::from(e.status == HealthStatus::Healthy), t + 1)
    });

    if total == 0 || healthy * 100 > total * 18 {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_failures_mark_unhealthy() {
        let mut state = EvaluatorState::default();
        assert_eq!(state.observe(false, 3, 3), None);
        assert_eq!(state.observe(false, 3, 3), None);
        assert_eq!(state.observe(false, 3, 3), Some(HealthStatus::Unhealthy));
    }

    #[test]
    fn test_single_success_does_not_recover() {
        let mut state = EvaluatorState::default();
        for _ in 0..3 {
            state.observe(false, 3, 3);
        }

        assert_eq!(state.observe(true, 3, 3), None);
        assert_eq!(state.status, HealthStatus::Unhealthy);
        assert_eq!(state.observe(true, 3, 3), None);
        assert_eq!(state.observe(true, 3, 3), Some(HealthStatus::Healthy));
    }

    #[test]
    fn test_interrupted_failures_reset() {
        let mut state = EvaluatorState::default();
        state.observe(false, 3, 3);
        state.observe(false, 3, 3);
        state.observe(true, 3, 3);
        state.observe(false, 3, 3);
        assert_eq!(state.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_aggregate_threshold() {
        let healthy = EvaluatorState::default();
        let unhealthy = EvaluatorState {
            status: HealthStatus::Unhealthy,
            ..EvaluatorState::default()
        };

        // 1 of 4 = 25% > 18%
        assert_eq!(
            aggregate_status([&healthy, &unhealthy, &unhealthy, &unhealthy]),
            HealthStatus::Healthy
        );
        assert_eq!(
            aggregate_status([&unhealthy, &unhealthy, &unhealthy, &unhealthy]),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_default_settings_match_endpoint_contract() {
        let settings = HealthCheckSettings::default();
        assert_eq!(settings.port, 443);
        assert_eq!(settings.path, "/health");
        assert_eq!(settings.failure_threshold, 3);
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.evaluator_regions.len(), 4);
        assert!(settings.enable_sni);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let ten_seconds = HealthCheckSettings {
            interval: Duration::from_secs(10),
            ..HealthCheckSettings::default()
        };
        assert!(ten_seconds.validate().is_ok());

        let too_few = HealthCheckSettings {
            evaluator_regions: vec!["us-east-1".to_string(), "us-east-1".to_string(), "eu-west-1".to_string()],
            ..HealthCheckSettings::default()
        };
        assert!(too_few.validate().is_err());

        let eager = HealthCheckSettings {
            recovery_threshold: 0,
            ..HealthCheckSettings::default()
        };
        assert!(eager.validate().is_err());
    }
}
