//! In-memory parameter store with simulated propagation delay.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::types::{Lookup, Parameter, ParameterName};
use super::ParameterStore;
use crate::error::{Result, TopologyError};

struct Entry {
    current: Parameter,
    visible_at: Instant,
    /// Last converged version, still served while `current` propagates
    previous: Option<Parameter>,
}

/// Process-local stand-in for a regional parameter service
pub struct InMemoryParameterStore {
    entries: RwLock<HashMap<ParameterName, Entry>>,
    propagation_delay: Duration,
}

impl InMemoryParameterStore {
    /// Store where published values are visible immediately
    pub fn new() -> Self {
        Self::with_propagation_delay(Duration::ZERO)
    }

    pub fn with_propagation_delay(propagation_delay: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            propagation_delay,
        }
    }

    /// Number of published names
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn publish(&self, publisher: &str, name: &ParameterName, value: &str) -> Result<Parameter> {
        name.validate_value(value)?;

        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let (version, previous) = match entries.get(name) {
            Some(entry) if entry.current.publisher != publisher => {
                return Err(TopologyError::PublisherConflict {
                    name: name.path(),
                    owner: entry.current.publisher.clone(),
                    publisher: publisher.to_string(),
                });
            }
            Some(entry) => {
                let converged = if now >= entry.visible_at {
                    Some(entry.current.clone())
                } else {
                    entry.previous.clone()
                };
                (entry.current.version + 1, converged)
            }
            None => (1, None),
        };

        let parameter = Parameter {
            name: name.clone(),
            value: value.to_string(),
            version,
            publisher: publisher.to_string(),
            published_at: chrono::Utc::now(),
        };

        debug!(parameter = %name, version, "Stored parameter");

        entries.insert(
            name.clone(),
            Entry {
                current: parameter.clone(),
                visible_at: now + self.propagation_delay,
                previous,
            },
        );

        Ok(parameter)
    }

    async fn lookup(&self, name: &ParameterName) -> Result<Lookup> {
        let entries = self.entries.read().await;

        let Some(entry) = entries.get(name) else {
            return Ok(Lookup::Missing);
        };

        if Instant::now() >= entry.visible_at {
            Ok(Lookup::Visible(entry.current.clone()))
        } else if let Some(previous) = &entry.previous {
            Ok(Lookup::Visible(previous.clone()))
        } else {
            Ok(Lookup::Pending)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_publisher_conflicts() {
        let store = InMemoryParameterStore::new();
        let name = ParameterName::zone("apiexampleorg").unwrap();

        store.publish("us-east-1", &name, "Z0ABC").await.unwrap();
        let err = store.publish("us-west-2", &name, "Z0DEF").await.unwrap_err();

        assert!(matches!(err, TopologyError::PublisherConflict { .. }));
        match store.lookup(&name).await.unwrap() {
            Lookup::Visible(p) => assert_eq!(p.value, "Z0ABC"),
            other => panic!("unexpected lookup: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_owner_republish_bumps_version() {
        let store = InMemoryParameterStore::new();
        let name = ParameterName::account("caretaker").unwrap();

        store.publish("caretaker", &name, "111111111111").await.unwrap();
        let second = store.publish("caretaker", &name, "222222222222").await.unwrap();

        assert_eq!(second.version, 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_value_rejected_at_publish() {
        let store = InMemoryParameterStore::new();
        let name = ParameterName::account("caretaker").unwrap();

        let err = store.publish("caretaker", &name, "abc").await.unwrap_err();
        assert!(matches!(err, TopologyError::InvalidParameterValue { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_until_propagated() {
        let store = InMemoryParameterStore::with_propagation_delay(Duration::from_secs(3));
        let name = ParameterName::account("geolite").unwrap();
        store.publish("geolite", &name, "123456789012").await.unwrap();

        assert_eq!(store.lookup(&name).await.unwrap(), Lookup::Pending);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(matches!(store.lookup(&name).await.unwrap(), Lookup::Visible(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_version_served_while_update_propagates() {
        let store = InMemoryParameterStore::with_propagation_delay(Duration::from_secs(3));
        let name = ParameterName::account("geolite").unwrap();
        store.publish("geolite", &name, "111111111111").await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;

        store.publish("geolite", &name, "222222222222").await.unwrap();
        match store.lookup(&name).await.unwrap() {
            Lookup::Visible(p) => assert_eq!(p.value, "111111111111"),
            other => panic!("unexpected lookup: {other:?}"),
        }
    }
}
