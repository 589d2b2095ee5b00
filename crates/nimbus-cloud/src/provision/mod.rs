//! Composite resource orchestrators

mod load_balancer;
mod network;
mod reaper;
pub mod validate;

pub use load_balancer::{LoadBalancerProvisioner, STALE_MEMBERS_KEY};
pub use network::{NOTICE_KEY, NetworkProvisioner};
pub use reaper::BackendReaper;

use crate::backend::CloudClients;
use crate::compensator::{Compensator, Reaper};
use crate::error::{CloudError, Result};
use crate::ledger::{Ledger, StepExecutor};
use crate::model::{Iid, KeyValue, Notice, ResourceType};

/// Run `executor`; on failure delete everything it created.
///
/// On success the ledger is handed back so that a later failure of the
/// same operation can still be compensated.
pub(crate) async fn run_compensated<C: Send>(
    executor: &StepExecutor<C>,
    ctx: &mut C,
    reaper: &dyn Reaper,
) -> Result<Ledger> {
    let mut ledger = Ledger::new();
    match executor.run(ctx, &mut ledger).await {
        Ok(()) => Ok(ledger),
        Err(cause) => Err(Compensator::new(reaper).compensate(cause, &ledger).await),
    }
}

/// Id set by an earlier step
pub(crate) fn created<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| CloudError::ResourceNotFound(format!("{} has not been created", what)))
}

/// Attach tags one by one; failures are reported, never rolled back
pub(crate) async fn bind_tags(
    clients: &CloudClients,
    resource_type: ResourceType,
    target: &Iid,
    tags: &[KeyValue],
) -> Vec<Notice> {
    let mut notices = Vec::new();
    if tags.is_empty() {
        return notices;
    }

    let Some(binder) = clients.tags.as_ref() else {
        tracing::warn!("No tag binder configured, {} tag(s) on {} dropped", tags.len(), target);
        return tags
            .iter()
            .map(|tag| Notice {
                subject: "tag".to_string(),
                id: target.to_string(),
                message: format!("tag {} not applied: backend has no tag support", tag),
            })
            .collect();
    };

    for tag in tags {
        if let Err(e) = binder.add_tag(resource_type, target, tag).await {
            tracing::warn!("Failed to tag {} {} with {}: {}", resource_type, target, tag, e);
            notices.push(Notice::tag_failed(target, tag, &e));
        }
    }
    notices
}
