//! Cross-Stack Parameter Store
//!
//! Write-once-per-owner key/value registry that independently deployed
//! regional stacks use to share the hosted zone id and service account ids.
//!
//! ## Consistency
//!
//! - Exactly one publisher per name; a second publisher is a configuration error
//! - Reads distinguish "never published" (`NotFound`) from "not yet visible"
//!   (`PendingPropagation`)
//! - Retries are bounded by attempts and by a deadline, never infinite

mod memory;
mod types;

pub use memory::InMemoryParameterStore;
pub use types::{Lookup, Parameter, ParameterName, ParameterNamespace, RetryPolicy};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Result, TopologyError};

/// External key/value service shared across deployments
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Publish `value` under `name` on behalf of `publisher`
    async fn publish(&self, publisher: &str, name: &ParameterName, value: &str) -> Result<Parameter>;

    /// Single read attempt, no retries
    async fn lookup(&self, name: &ParameterName) -> Result<Lookup>;
}

/// Resolve a parameter, retrying while it propagates.
///
/// Fails immediately with `NotFound` if the name was never published.
pub async fn resolve(
    store: &dyn ParameterStore,
    name: &ParameterName,
    policy: &RetryPolicy,
) -> Result<Parameter> {
    read_with_retry(store, name, policy, &name.expected_publisher(), false).await
}

/// Resolve a parameter published by another deployment that may still be running.
///
/// Unlike [`resolve`], a missing name is retried too, until the policy's
/// deadline. The final error names `expected_publisher`.
pub async fn await_published(
    store: &dyn ParameterStore,
    name: &ParameterName,
    expected_publisher: &str,
    policy: &RetryPolicy,
) -> Result<Parameter> {
    read_with_retry(store, name, policy, expected_publisher, true).await
}

async fn read_with_retry(
    store: &dyn ParameterStore,
    name: &ParameterName,
    policy: &RetryPolicy,
    expected_publisher: &str,
    wait_for_publish: bool,
) -> Result<Parameter> {
    let started = Instant::now();
    let mut delays = policy.backoff.delays();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let error = match store.lookup(name).await? {
            Lookup::Visible(parameter) => {
                name.validate_value(&parameter.value)?;
                debug!(parameter = %name, version = parameter.version, attempts, "Parameter resolved");
                return Ok(parameter);
            }
            Lookup::Pending => TopologyError::PendingPropagation {
                name: name.path(),
                expected_publisher: expected_publisher.to_string(),
                attempts,
            },
            Lookup::Missing => {
                let error = TopologyError::NotFound {
                    name: name.path(),
                    expected_publisher: expected_publisher.to_string(),
                };
                if !wait_for_publish {
                    return Err(error);
                }
                error
            }
        };

        let delay = delays.next().unwrap_or(policy.backoff.max_delay);
        if attempts >= policy.max_attempts || started.elapsed() + delay > policy.deadline {
            warn!(parameter = %name, attempts, error = %error, "Giving up on parameter");
            return Err(error);
        }

        debug!(parameter = %name, attempts, delay_ms = delay.as_millis() as u64, "Parameter not visible yet, retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Publish and log; thin helper used by owning deployments
pub async fn publish(
    store: &dyn ParameterStore,
    publisher: &str,
    name: &ParameterName,
    value: &str,
) -> Result<Parameter> {
    let parameter = store.publish(publisher, name, value).await?;
    info!(
        parameter = %name,
        publisher = %publisher,
        version = parameter.version,
        "Parameter published"
    );
    Ok(parameter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            backoff: crate::backoff::BackoffPolicy::new(
                Duration::from_secs(1),
                2,
                Duration::from_secs(8),
            ),
            max_attempts: 10,
            deadline: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_before_publish_is_not_found() {
        let store = InMemoryParameterStore::new();
        let name = ParameterName::account("geolite").unwrap();

        let err = resolve(&store, &name, &quick_policy()).await.unwrap_err();
        assert!(matches!(err, TopologyError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_after_publish_converges() {
        let store = InMemoryParameterStore::with_propagation_delay(Duration::from_secs(5));
        let name = ParameterName::account("geolite").unwrap();

        publish(&store, "geolite", &name, "123456789012").await.unwrap();
        let parameter = resolve(&store, &name, &quick_policy()).await.unwrap();
        assert_eq!(parameter.value, "123456789012");
        assert_eq!(parameter.version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_gives_up_when_propagation_exceeds_bound() {
        let store = InMemoryParameterStore::with_propagation_delay(Duration::from_secs(600));
        let name = ParameterName::account("geolite").unwrap();
        store.publish("geolite", &name, "123456789012").await.unwrap();

        let err = resolve(&store, &name, &quick_policy()).await.unwrap_err();
        match err {
            TopologyError::PendingPropagation {
                expected_publisher,
                attempts,
                ..
            } => {
                assert_eq!(expected_publisher, "geolite account");
                assert!(attempts > 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_published_waits_for_late_publisher() {
        let store = std::sync::Arc::new(InMemoryParameterStore::new());
        let name = ParameterName::zone("apiexampleorg").unwrap();

        let writer = {
            let store = store.clone();
            let name = name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                store.publish("us-east-1", &name, "Z0ABCDEF").await.unwrap();
            })
        };

        let parameter = await_published(store.as_ref(), &name, "us-east-1", &quick_policy())
            .await
            .unwrap();
        assert_eq!(parameter.value, "Z0ABCDEF");
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_published_names_expected_publisher() {
        let store = InMemoryParameterStore::new();
        let name = ParameterName::zone("apiexampleorg").unwrap();

        let err = await_published(&store, &name, "us-east-1 deployment", &quick_policy())
            .await
            .unwrap_err();
        match err {
            TopologyError::NotFound { expected_publisher, .. } => {
                assert_eq!(expected_publisher, "us-east-1 deployment");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
