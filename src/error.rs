//! Error types for the EBS CSI e2e suite
//!
//! Every failure a scenario can hit falls into one of three buckets: the
//! cluster API rejected or failed a call, a bounded poll ran out of time, or
//! an observed value disagreed with the expected one. All three abort the
//! scenario the same way; the variants exist so logs and the final report
//! say which bucket it was.

use std::time::Duration;

use thiserror::Error;

/// Main error type for e2e operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The API server answered 404 for a named resource
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "PersistentVolumeClaim")
        kind: String,
        /// Resource name, namespace-qualified where it applies
        name: String,
    },

    /// A bounded poll expired before its condition held
    #[error("timeout after {timeout:?} waiting for {what}")]
    Timeout {
        /// Human-readable description of the awaited condition
        what: String,
        /// The bound that expired
        timeout: Duration,
    },

    /// An observed value disagreed with the expected one
    #[error("assertion failed: {what}: expected {expected}, got {actual}")]
    Assertion {
        /// What was being compared
        what: String,
        /// Expected value, rendered for display
        expected: String,
        /// Observed value, rendered for display
        actual: String,
    },

    /// The write/read pod terminated unsuccessfully
    #[error("pod {name} failed: {reason}")]
    PodFailed {
        /// Pod name
        name: String,
        /// Termination reason and exit code, when the kubelet reported them
        reason: String,
    },

    /// Invalid flag or configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// A resource quantity could not be parsed
    #[error("invalid quantity {value:?}: {message}")]
    Quantity {
        /// The raw quantity string
        value: String,
        /// What was wrong with it
        message: String,
    },

    /// One or more cleanup actions failed after all of them ran
    #[error("cleanup failed: {}", failures.join("; "))]
    Cleanup {
        /// One message per failed cleanup action
        failures: Vec<String>,
    },

    /// At least one scenario of a suite failed
    #[error("{failed} scenario(s) failed: {}", names.join(", "))]
    SuiteFailed {
        /// Number of failed scenarios
        failed: usize,
        /// Names of the failed scenarios
        names: Vec<String>,
    },

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for a resource kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a timeout error for the awaited condition
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout,
        }
    }

    /// Create an assertion error from displayable expected/actual values
    pub fn assertion(
        what: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::Assertion {
            what: what.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the API server reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// True when a bounded poll expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
