//! Certificate Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::{duration_secs, BackoffPolicy};

/// Validation state of a domain-validated certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateState {
    Requested,
    PendingDnsValidation,
    Issued,
    Failed,
}

impl std::fmt::Display for CertificateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateState::Requested => write!(f, "requested"),
            CertificateState::PendingDnsValidation => write!(f, "pending_dns_validation"),
            CertificateState::Issued => write!(f, "issued"),
            CertificateState::Failed => write!(f, "failed"),
        }
    }
}

/// DNS challenge proving control of one name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Name being validated
    pub domain: String,
    /// CNAME placed in the zone, e.g. `_3f2a….use1.api.example.org`
    pub record_name: String,
    pub record_value: String,
}

/// Polling settings for DNS validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    #[serde(flatten)]
    pub backoff: BackoffPolicy,
    /// Hard ceiling before the certificate is marked failed
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::new(Duration::from_secs(5), 2, Duration::from_secs(300)),
            timeout: Duration::from_secs(45 * 60),
        }
    }
}
