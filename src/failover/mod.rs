//! Health-Checked Failover
//!
//! Health checks are attached per regional domain. Their aggregate state is
//! the only signal DNS answer selection uses to withdraw a region.

mod controller;
mod health;
mod probe;

pub use controller::{FailoverController, Transition};
pub use health::{
    aggregate_status, EvaluatorState, HealthCheck, HealthCheckSettings, HealthProtocol, HealthStatus, ProbeOutcome,
};
pub use probe::{HealthProbe, HttpProbe, StaticProbe};
