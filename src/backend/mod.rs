//! Backend References
//!
//! Symbolic pointers to functions owned by this deployment or by another
//! account, and the resolver that turns an account parameter plus a function
//! name into a reference the integration layer can invoke.

mod resolver;

pub use resolver::{Assumption, ReferenceResolver};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Result, TopologyError};

/// Pointer to compute owned by some deployment unit
///
/// The referencing stack never creates or mutates the target; it only records
/// the invocation link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendReference {
    /// Account owning the function
    pub account_id: String,
    /// Region the function lives in
    pub region: String,
    /// Logical function name
    pub function_name: String,
    /// Owned by the same account as the caller
    pub same_environment: bool,
    /// Invoke permission is managed by the owner, not by this deployment
    pub skip_permission_grant: bool,
}

impl BackendReference {
    /// Function ARN handed to the integration layer
    pub fn arn(&self) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            self.region, self.account_id, self.function_name
        )
    }

    pub fn is_cross_account(&self) -> bool {
        !self.same_environment
    }
}

impl std::fmt::Display for BackendReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.arn())
    }
}

/// Lambda-style function identifier
pub fn validate_function_name(name: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"));

    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(TopologyError::InvalidFunctionName(name.to_string()))
    }
}

/// Region identifier such as `us-east-1` or `ap-southeast-2`
pub fn validate_region(region: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-[0-9]{1,2}$").expect("static regex"));

    if pattern.is_match(region) {
        Ok(())
    } else {
        Err(TopologyError::InvalidRegion(region.to_string()))
    }
}
