//! Certificate Validation
//!
//! Drives a DNS-validated certificate from `Requested` to `Issued`:
//!
//! - `Requested → PendingDnsValidation` emits one CNAME challenge per name
//! - `PendingDnsValidation → Issued` once every challenge is resolvable
//! - `PendingDnsValidation → Failed` when the validation ceiling is reached
//!
//! Cancellation leaves the certificate in `PendingDnsValidation`, from which
//! validation can be resumed.

mod types;

pub use types::{CertificateState, Challenge, ValidationPolicy};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dns::{self, DnsProvider, DnsRecord, DnsRecordType, ZoneRef};
use crate::error::{Result, TopologyError};

/// A certificate for a primary name plus alternative names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    primary_name: String,
    alternative_names: Vec<String>,
    state: CertificateState,
    challenges: Vec<Challenge>,
    validation_zone_id: Option<String>,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub issued_at: Option<chrono::DateTime<chrono::Utc>>,
    failure: Option<String>,
}

impl Certificate {
    /// Request a certificate; starts in `Requested`
    pub fn request(primary_name: &str, alternative_names: &[String]) -> Result<Self> {
        let primary_name = dns::normalize_domain(primary_name)?;
        let alternative_names = normalize_alternatives(&primary_name, alternative_names)?;

        let certificate = Self {
            id: format!("cert-{}", uuid::Uuid::new_v4().simple()),
            primary_name,
            alternative_names,
            state: CertificateState::Requested,
            challenges: Vec::new(),
            validation_zone_id: None,
            requested_at: chrono::Utc::now(),
            issued_at: None,
            failure: None,
        };

        info!(
            certificate = %certificate.id,
            domain = %certificate.primary_name,
            alternatives = ?certificate.alternative_names,
            "Certificate requested"
        );
        Ok(certificate)
    }

    pub fn state(&self) -> CertificateState {
        self.state
    }

    pub fn primary_name(&self) -> &str {
        &self.primary_name
    }

    pub fn alternative_names(&self) -> &[String] {
        &self.alternative_names
    }

    /// Primary name followed by alternatives, without duplicates
    pub fn names(&self) -> Vec<String> {
        std::iter::once(self.primary_name.clone())
            .chain(self.alternative_names.iter().cloned())
            .collect()
    }

    pub fn covers(&self, domain: &str) -> bool {
        self.primary_name == domain || self.alternative_names.iter().any(|n| n == domain)
    }

    pub fn challenges(&self) -> &[Challenge] {
        &self.challenges
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_issued(&self) -> bool {
        self.state == CertificateState::Issued
    }

    /// Fail unless the certificate may be attached to a domain
    pub fn ensure_attachable(&self) -> Result<()> {
        if self.is_issued() {
            Ok(())
        } else {
            Err(TopologyError::CertificateNotIssued {
                certificate: self.id.clone(),
                state: self.state.to_string(),
            })
        }
    }

    /// Replace the alternative names; a changed name set must be re-validated
    pub fn set_alternative_names(&mut self, alternative_names: &[String]) -> Result<()> {
        let normalized = normalize_alternatives(&self.primary_name, alternative_names)?;
        if normalized == self.alternative_names {
            return Ok(());
        }

        info!(
            certificate = %self.id,
            previous_state = %self.state,
            "Certificate name set changed, re-validation required"
        );
        self.alternative_names = normalized;
        self.state = CertificateState::Requested;
        self.challenges.clear();
        self.validation_zone_id = None;
        self.issued_at = None;
        self.failure = None;
        Ok(())
    }

    /// Emit one challenge per name into `zone` and move to `PendingDnsValidation`.
    ///
    /// Calling this again while pending re-emits the same challenges.
    pub async fn begin_validation(&mut self, zone: &ZoneRef, dns: &dyn DnsProvider) -> Result<()> {
        match self.state {
            CertificateState::Issued => return Ok(()),
            CertificateState::Failed => {
                return Err(TopologyError::CertificateNotIssued {
                    certificate: self.id.clone(),
                    state: self.state.to_string(),
                })
            }
            CertificateState::Requested | CertificateState::PendingDnsValidation => {}
        }

        for name in self.names() {
            if !dns::is_within_zone(&name, zone.name()) {
                return Err(TopologyError::NameOutsideZone {
                    name,
                    zone: zone.name().to_string(),
                });
            }
        }

        if self.challenges.is_empty() {
            self.challenges = self.names().iter().map(|name| new_challenge(name)).collect();
        }

        for challenge in &self.challenges {
            let record = DnsRecord::cname(zone.id(), &challenge.record_name, &challenge.record_value);
            dns.upsert_record(&record).await?;
            debug!(certificate = %self.id, record = %challenge.record_name, "Emitted validation challenge");
        }

        self.validation_zone_id = Some(zone.id().to_string());
        self.state = CertificateState::PendingDnsValidation;
        info!(
            certificate = %self.id,
            challenges = self.challenges.len(),
            "Certificate pending DNS validation"
        );
        Ok(())
    }

    /// Poll challenge visibility with exponential backoff until issued,
    /// failed on timeout, or cancelled.
    pub async fn await_issuance(
        &mut self,
        dns: &dyn DnsProvider,
        policy: &ValidationPolicy,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.state {
            CertificateState::Issued => return Ok(()),
            CertificateState::PendingDnsValidation => {}
            CertificateState::Requested | CertificateState::Failed => {
                return Err(TopologyError::CertificateNotIssued {
                    certificate: self.id.clone(),
                    state: self.state.to_string(),
                })
            }
        }

        let zone_id = self.validation_zone_id.clone().unwrap_or_default();
        let started = Instant::now();
        let mut delays = policy.backoff.delays();

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let pending = self.pending_challenges(dns, &zone_id).await?;
            if cancel.is_cancelled() {
                return Err(self.cancelled());
            }
            if pending.is_empty() {
                self.state = CertificateState::Issued;
                self.issued_at = Some(chrono::Utc::now());
                info!(certificate = %self.id, elapsed_s = started.elapsed().as_secs(), "Certificate issued");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= policy.timeout {
                let reason = format!("challenges unresolved after {:?}: {:?}", elapsed, pending);
                warn!(certificate = %self.id, pending = ?pending, "Certificate validation timed out");
                self.state = CertificateState::Failed;
                self.failure = Some(reason);
                return Err(TopologyError::ValidationTimeout {
                    certificate: self.id.clone(),
                    elapsed,
                    pending,
                });
            }

            let delay = delays
                .next()
                .unwrap_or(policy.backoff.max_delay)
                .min(policy.timeout - elapsed);
            debug!(
                certificate = %self.id,
                pending = pending.len(),
                delay_s = delay.as_secs(),
                "Waiting for validation records"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn cancelled(&self) -> TopologyError {
        warn!(certificate = %self.id, "Validation cancelled, certificate left pending");
        TopologyError::Cancelled(format!("validation of certificate {}", self.id))
    }

    /// Names whose challenge is not yet observable
    async fn pending_challenges(&self, dns: &dyn DnsProvider, zone_id: &str) -> Result<Vec<String>> {
        let mut pending = Vec::new();
        for challenge in &self.challenges {
            if !dns
                .is_resolvable(zone_id, &challenge.record_name, DnsRecordType::CNAME)
                .await?
            {
                pending.push(challenge.domain.clone());
            }
        }
        Ok(pending)
    }
}

fn normalize_alternatives(primary: &str, alternative_names: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(alternative_names.len());
    for name in alternative_names {
        let name = dns::normalize_domain(name)?;
        if name != primary && !normalized.contains(&name) {
            normalized.push(name);
        }
    }
    Ok(normalized)
}

fn new_challenge(domain: &str) -> Challenge {
    let token = uuid::Uuid::new_v4().simple().to_string();
    let answer = uuid::Uuid::new_v4().simple().to_string();
    Challenge {
        domain: domain.to_string(),
        record_name: format!("_{}.{}", token, domain),
        record_value: format!("_{}.acm-validations.aws", answer),
    }
}
