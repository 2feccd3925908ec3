//! Health Probes
//!
//! Trait-based probing so the controller can run against live endpoints or
//! against scripted results.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::health::{HealthCheck, ProbeOutcome};
use crate::error::{Result, TopologyError};

/// Performs one request against a check's target
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, check: &HealthCheck, evaluator_region: &str) -> ProbeOutcome;
}

/// Probe over HTTP(S) using reqwest; 2xx and 3xx count as success.
///
/// Each check's `enable_sni` picks whether the TLS handshake sends the
/// target hostname.
pub struct HttpProbe {
    with_sni: Client,
    without_sni: Client,
    scheme: &'static str,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::build(timeout, "https")
    }

    /// Plain HTTP, for local endpoints without TLS
    pub fn plain_http(timeout: Duration) -> Result<Self> {
        Self::build(timeout, "http")
    }

    fn build(timeout: Duration, scheme: &'static str) -> Result<Self> {
        Ok(Self {
            with_sni: client(timeout, true)?,
            without_sni: client(timeout, false)?,
            scheme,
        })
    }

    pub fn url(&self, check: &HealthCheck) -> String {
        format!("{}://{}:{}{}", self.scheme, check.fqdn, check.port, check.path)
    }

    fn client_for(&self, check: &HealthCheck) -> &Client {
        if check.enable_sni {
            &self.with_sni
        } else {
            &self.without_sni
        }
    }
}

fn client(timeout: Duration, sni: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .tls_sni(sni)
        .user_agent(concat!("regional-api-topology/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TopologyError::Provider(format!("failed to build HTTP client: {}", e)))
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, check: &HealthCheck, evaluator_region: &str) -> ProbeOutcome {
        let url = self.url(check);
        match self.client_for(check).get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(
                    url = %url,
                    evaluator = %evaluator_region,
                    sni = check.enable_sni,
                    status = status.as_u16(),
                    "Probe response"
                );
                if status.is_success() || status.is_redirection() {
                    ProbeOutcome::Success
                } else {
                    ProbeOutcome::Failure(format!("status {}", status))
                }
            }
            Err(e) => ProbeOutcome::Failure(e.to_string()),
        }
    }
}

/// Probe whose answers are set by the caller, keyed by fqdn
#[derive(Default)]
pub struct StaticProbe {
    failing: RwLock<HashSet<String>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, fqdn: &str, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(fqdn.to_string());
        } else {
            set.remove(fqdn);
        }
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(&self, check: &HealthCheck, _evaluator_region: &str) -> ProbeOutcome {
        if self.failing.read().await.contains(&check.fqdn) {
            ProbeOutcome::Failure("synthetic failure".to_string())
        } else {
            ProbeOutcome::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::health::HealthProtocol;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn check_for(server: &MockServer) -> HealthCheck {
        let address = server.address();
        HealthCheck {
            id: "hc-test".to_string(),
            region: "us-east-1".to_string(),
            protocol: HealthProtocol::Https,
            fqdn: address.ip().to_string(),
            port: address.port(),
            path: "/health".to_string(),
            enable_sni: true,
            failure_threshold: 3,
            recovery_threshold: 3,
            interval: Duration::from_secs(30),
            evaluator_regions: vec!["us-east-1".to_string()],
        }
    }

    #[test]
    fn test_https_url() {
        let probe = HttpProbe::new(Duration::from_secs(2)).unwrap();
        let check = HealthCheck {
            id: "hc".to_string(),
            region: "us-east-1".to_string(),
            protocol: HealthProtocol::Https,
            fqdn: "use1.api.example.org".to_string(),
            port: 443,
            path: "/health".to_string(),
            enable_sni: true,
            failure_threshold: 3,
            recovery_threshold: 3,
            interval: Duration::from_secs(30),
            evaluator_regions: Vec::new(),
        };
        assert_eq!(probe.url(&check), "https://use1.api.example.org:443/health");
    }

    #[tokio::test]
    async fn test_probe_success_and_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = HttpProbe::plain_http(Duration::from_secs(2)).unwrap();
        let check = check_for(&server);

        assert_eq!(probe.probe(&check, "us-east-1").await, ProbeOutcome::Success);
        assert!(!probe.probe(&check, "us-east-1").await.is_success());
    }

    #[tokio::test]
    async fn test_check_without_sni_uses_its_own_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(301))
            .mount(&server)
            .await;

        let probe = HttpProbe::plain_http(Duration::from_secs(2)).unwrap();
        let with_sni = check_for(&server);
        let without_sni = HealthCheck {
            enable_sni: false,
            ..check_for(&server)
        };

        assert!(std::ptr::eq(probe.client_for(&with_sni), &probe.with_sni));
        assert!(std::ptr::eq(probe.client_for(&without_sni), &probe.without_sni));
        assert_eq!(probe.probe(&without_sni, "eu-west-1").await, ProbeOutcome::Success);
    }

    #[tokio::test]
    async fn test_static_probe() {
        let probe = StaticProbe::new();
        let server = MockServer::start().await;
        let check = check_for(&server);

        assert!(probe.probe(&check, "eu-west-1").await.is_success());
        probe.set_failing(&check.fqdn, true).await;
        assert!(!probe.probe(&check, "eu-west-1").await.is_success());
    }
}
