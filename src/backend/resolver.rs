//! Reference Resolver
//!
//! Reads account ids from the parameter store and builds validated backend
//! references. Cross-account invoke permission is never granted here; the
//! resolver records the assumption that the owning account has done so.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::{validate_function_name, validate_region, BackendReference};
use crate::error::{Result, TopologyError};
use crate::parameters::{self, ParameterName, ParameterStore, RetryPolicy};

/// A condition this deployment relies on but cannot verify itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assumption {
    /// The owning account's resource policy lets this API invoke the function
    CrossAccountAuthorizationAssumed {
        function_arn: String,
        owner_account: String,
        caller_account: String,
    },
}

impl std::fmt::Display for Assumption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Assumption::CrossAccountAuthorizationAssumed {
                function_arn,
                owner_account,
                caller_account,
            } => write!(
                f,
                "account {} must allow {} to invoke {}",
                owner_account, caller_account, function_arn
            ),
        }
    }
}

/// Resolves backend references for one caller identity
pub struct ReferenceResolver {
    store: Arc<dyn ParameterStore>,
    caller_account: String,
    policy: RetryPolicy,
    assumptions: Mutex<Vec<Assumption>>,
}

impl ReferenceResolver {
    pub fn new(store: Arc<dyn ParameterStore>, caller_account: &str, policy: RetryPolicy) -> Self {
        Self {
            store,
            caller_account: caller_account.to_string(),
            policy,
            assumptions: Mutex::new(Vec::new()),
        }
    }

    pub fn caller_account(&self) -> &str {
        &self.caller_account
    }

    /// Resolve a function owned by the account published under `account_param`.
    ///
    /// The account is awaited like any cross-deployment read; if it never
    /// appears the error is `UnresolvedAccount`, naming the parameter and its
    /// expected publisher.
    pub async fn resolve(
        &self,
        account_param: &ParameterName,
        region: &str,
        function_name: &str,
    ) -> Result<BackendReference> {
        validate_function_name(function_name)?;
        validate_region(region)?;

        let expected_publisher = account_param.expected_publisher();
        let parameter = parameters::await_published(
            self.store.as_ref(),
            account_param,
            &expected_publisher,
            &self.policy,
        )
        .await
        .map_err(|e| match e {
            TopologyError::NotFound { .. } | TopologyError::PendingPropagation { .. } => {
                TopologyError::UnresolvedAccount {
                    parameter: account_param.path(),
                    expected_publisher: expected_publisher.clone(),
                    reason: e.to_string(),
                }
            }
            other => other,
        })?;

        let reference = self.reference(&parameter.value, region, function_name);
        info!(
            function = %reference.arn(),
            cross_account = reference.is_cross_account(),
            "Resolved backend reference"
        );
        Ok(reference)
    }

    /// Reference to a function owned by the caller's own account
    pub fn resolve_owned(&self, region: &str, function_name: &str) -> Result<BackendReference> {
        validate_function_name(function_name)?;
        validate_region(region)?;
        Ok(self.reference(&self.caller_account, region, function_name))
    }

    fn reference(&self, account_id: &str, region: &str, function_name: &str) -> BackendReference {
        let same_environment = account_id == self.caller_account;
        let reference = BackendReference {
            account_id: account_id.to_string(),
            region: region.to_string(),
            function_name: function_name.to_string(),
            same_environment,
            skip_permission_grant: !same_environment,
        };

        if !same_environment {
            let assumption = Assumption::CrossAccountAuthorizationAssumed {
                function_arn: reference.arn(),
                owner_account: account_id.to_string(),
                caller_account: self.caller_account.clone(),
            };
            warn!(assumption = %assumption, "Recording cross-account authorization assumption");
            self.record(assumption);
        }

        reference
    }

    fn record(&self, assumption: Assumption) {
        let mut assumptions = match self.assumptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !assumptions.contains(&assumption) {
            assumptions.push(assumption);
        }
    }

    /// Assumptions that an external check must confirm before go-live
    pub fn assumptions(&self) -> Vec<Assumption> {
        match self.assumptions.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
