//! Reverse-order cleanup of a ledger

use crate::error::{CloudError, Result, RollbackError, RollbackFailure};
use crate::ledger::{Ledger, LedgerEntry, ResourceKind};
use crate::model::Notice;
use async_trait::async_trait;

/// Kind-specific deletion of one ledger entry
#[async_trait]
pub trait Reaper: Send + Sync {
    /// Delete the object and wait until it is gone
    async fn reap(&self, entry: &LedgerEntry) -> Result<()>;
}

/// Deletes ledger entries newest first, continuing past failures
pub struct Compensator<'a> {
    reaper: &'a dyn Reaper,
}

impl<'a> Compensator<'a> {
    pub fn new(reaper: &'a dyn Reaper) -> Self {
        Self { reaper }
    }

    /// Delete every entry in reverse creation order.
    ///
    /// Returns the number of deleted entries, or the aggregate of every
    /// deletion that failed.
    pub async fn rollback(&self, ledger: &Ledger) -> std::result::Result<usize, RollbackError> {
        let mut failures = Vec::new();
        let entries = dedup_entries(ledger.entries());

        for entry in entries.iter().rev() {
            tracing::debug!("Rollback: deleting {}", entry);
            if let Err(error) = self.reaper.reap(entry).await {
                tracing::warn!("Rollback: failed to delete {}: {}", entry, error);
                failures.push(RollbackFailure {
                    entry: (*entry).clone(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(entries.len())
        } else {
            Err(RollbackError {
                attempted: entries.len(),
                failures,
            })
        }
    }

    /// Undo `ledger` after `cause` and fold the outcome into one error
    pub async fn compensate(&self, cause: CloudError, ledger: &Ledger) -> CloudError {
        if ledger.is_empty() {
            return cause;
        }

        tracing::info!("Rolling back {} resource(s) after: {}", ledger.len(), cause);
        match self.rollback(ledger).await {
            Ok(removed) => CloudError::RolledBack {
                cause: Box::new(cause),
                removed,
            },
            Err(rollback) => {
                tracing::error!("Rollback incomplete, manual cleanup needed: {}", rollback);
                CloudError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                }
            }
        }
    }

    /// Delete superseded objects after a successful change; failures become
    /// notices instead of errors
    pub async fn retire(&self, ledger: &Ledger) -> Vec<Notice> {
        match self.rollback(ledger).await {
            Ok(_) => Vec::new(),
            Err(rollback) => rollback
                .failures
                .into_iter()
                .map(|f| Notice::orphaned(&f.entry, &f.error))
                .collect(),
        }
    }
}

/// Entries in creation order, each object once
fn dedup_entries(entries: &[LedgerEntry]) -> Vec<&LedgerEntry> {
    let mut seen: Vec<(ResourceKind, &str)> = Vec::with_capacity(entries.len());
    let mut kept = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = (entry.kind, entry.id.as_str());
        if !seen.contains(&key) {
            seen.push(key);
            kept.push(entry);
        }
    }
    kept
}
