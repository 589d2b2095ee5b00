//! Provisioning error types

use crate::ledger::{LedgerEntry, ResourceKind};
use std::fmt;
use thiserror::Error;

/// Provisioning errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    #[error("Resource busy: {0}")]
    Conflict(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{kind} {id} entered terminal state {status}")]
    TerminalState {
        kind: ResourceKind,
        id: String,
        status: String,
    },

    #[error("Timeout: {kind} {id} did not become {goal} after {attempts} attempts")]
    Timeout {
        kind: ResourceKind,
        id: String,
        goal: &'static str,
        attempts: u32,
    },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("{cause} (rolled back {removed} resource(s))")]
    RolledBack { cause: Box<CloudError>, removed: usize },

    #[error("{cause} and Failed to rollback: {rollback}")]
    RollbackFailed {
        cause: Box<CloudError>,
        rollback: RollbackError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// What a failed operation left behind in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The operation failed before any backend object was created
    NothingCreated,
    /// Objects were created and all of them were deleted again
    CleanedUp,
    /// Some created objects could not be deleted and need manual cleanup
    NeedsManualCleanup,
}

impl fmt::Display for FailureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureOutcome::NothingCreated => write!(f, "nothing created"),
            FailureOutcome::CleanedUp => write!(f, "created and cleaned up"),
            FailureOutcome::NeedsManualCleanup => write!(f, "cleanup failed, manual intervention needed"),
        }
    }
}

impl CloudError {
    /// Classify the error by what it left behind in the backend
    pub fn failure_outcome(&self) -> FailureOutcome {
        match self {
            CloudError::RolledBack { .. } => FailureOutcome::CleanedUp,
            CloudError::RollbackFailed { .. } => FailureOutcome::NeedsManualCleanup,
            _ => FailureOutcome::NothingCreated,
        }
    }

    /// The error that triggered a rollback, with step wrappers removed
    pub fn root_cause(&self) -> &CloudError {
        match self {
            CloudError::RolledBack { cause, .. } | CloudError::RollbackFailed { cause, .. } => {
                cause.root_cause()
            }
            CloudError::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Objects that still exist after a failed rollback
    pub fn leftovers(&self) -> Vec<&LedgerEntry> {
        match self {
            CloudError::RollbackFailed { rollback, .. } => {
                rollback.failures.iter().map(|f| &f.entry).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root_cause(), CloudError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), CloudError::ResourceNotFound(_))
    }
}

/// One ledger entry the compensator failed to delete
#[derive(Debug)]
pub struct RollbackFailure {
    pub entry: LedgerEntry,
    pub error: CloudError,
}

/// Aggregate of every deletion failure during one rollback
#[derive(Debug)]
pub struct RollbackError {
    /// Number of deletions attempted
    pub attempted: usize,
    pub failures: Vec<RollbackFailure>,
}

impl fmt::Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} deletion(s) failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.entry, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for RollbackError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_outcome() {
        let plain = CloudError::Validation("bad port".to_string());
        assert_eq!(plain.failure_outcome(), FailureOutcome::NothingCreated);

        let cleaned = CloudError::RolledBack {
            cause: Box::new(CloudError::ApiError("boom".to_string())),
            removed: 3,
        };
        assert_eq!(cleaned.failure_outcome(), FailureOutcome::CleanedUp);
        assert!(cleaned.leftovers().is_empty());

        let dirty = CloudError::RollbackFailed {
            cause: Box::new(CloudError::ApiError("boom".to_string())),
            rollback: RollbackError {
                attempted: 2,
                failures: vec![RollbackFailure {
                    entry: LedgerEntry::new(ResourceKind::Pool, "pool-1"),
                    error: CloudError::ApiError("still there".to_string()),
                }],
            },
        };
        assert_eq!(dirty.failure_outcome(), FailureOutcome::NeedsManualCleanup);
        assert_eq!(dirty.leftovers().len(), 1);
    }

    #[test]
    fn test_root_cause_unwraps_step_and_rollback() {
        let err = CloudError::RolledBack {
            cause: Box::new(CloudError::StepFailed {
                step: "resolve members".to_string(),
                source: Box::new(CloudError::ResourceNotFound("vm-x".to_string())),
            }),
            removed: 3,
        };
        assert!(err.is_not_found());
        assert!(!err.is_validation());
        assert!(err.to_string().contains("vm-x"));
    }

    #[test]
    fn test_rollback_failed_message() {
        let err = CloudError::RollbackFailed {
            cause: Box::new(CloudError::ApiError("create listener".to_string())),
            rollback: RollbackError {
                attempted: 4,
                failures: vec![RollbackFailure {
                    entry: LedgerEntry::new(ResourceKind::LoadBalancer, "lb-1"),
                    error: CloudError::ApiError("denied".to_string()),
                }],
            },
        };
        let message = err.to_string();
        assert!(message.contains("create listener"));
        assert!(message.contains("Failed to rollback"));
        assert!(message.contains("1 of 4"));
        assert!(message.contains("lb-1"));
    }
}
