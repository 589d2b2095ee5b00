//! Kind-specific deletion against the backend clients

use crate::backend::CloudClients;
use crate::compensator::Reaper;
use crate::error::Result;
use crate::ledger::{LedgerEntry, ResourceKind};
use crate::metadata::MemberPortRecord;
use crate::poller::{PollConfig, PollTarget, wait_for_deleted};
use async_trait::async_trait;

/// Deletes any ledger entry through the matching backend call, then waits
/// for asynchronously deleted objects to disappear
pub struct BackendReaper {
    clients: CloudClients,
    delete_poll: PollConfig,
}

impl BackendReaper {
    pub fn new(clients: CloudClients, delete_poll: PollConfig) -> Self {
        Self {
            clients,
            delete_poll,
        }
    }
}

#[async_trait]
impl Reaper for BackendReaper {
    async fn reap(&self, entry: &LedgerEntry) -> Result<()> {
        let network = self.clients.network.as_ref();
        let lb = self.clients.load_balancer.as_ref();
        let target = PollTarget::deleted(entry.kind, entry.id.clone());
        let id = entry.id.as_str();

        match entry.kind {
            ResourceKind::Network => {
                network.delete_network(id).await?;
                wait_for_deleted(&target, &self.delete_poll, || network.get_network(id)).await
            }
            ResourceKind::Subnet => network.delete_subnet(id).await,
            ResourceKind::Router => {
                network.delete_router(id).await?;
                wait_for_deleted(&target, &self.delete_poll, || network.get_router(id)).await
            }
            ResourceKind::RouterInterface => {
                network.remove_router_interface(entry.parent_id()?, id).await
            }
            ResourceKind::LoadBalancer => {
                lb.delete_load_balancer(id, true).await?;
                wait_for_deleted(&target, &self.delete_poll, || lb.get_load_balancer(id)).await
            }
            ResourceKind::Pool => {
                lb.delete_pool(id).await?;
                wait_for_deleted(&target, &self.delete_poll, || lb.get_pool(id)).await?;
                if let Err(e) = MemberPortRecord::new(lb).forget(id).await {
                    tracing::debug!("Could not drop metadata of pool {}: {}", id, e);
                }
                Ok(())
            }
            ResourceKind::HealthMonitor => {
                lb.delete_monitor(id).await?;
                wait_for_deleted(&target, &self.delete_poll, || lb.get_monitor(id)).await
            }
            ResourceKind::PoolMember => {
                let pool_id = entry.parent_id()?;
                lb.delete_member(pool_id, id).await?;
                wait_for_deleted(&target, &self.delete_poll, || lb.get_member(pool_id, id)).await
            }
            ResourceKind::Listener => {
                lb.delete_listener(id).await?;
                wait_for_deleted(&target, &self.delete_poll, || lb.get_listener(id)).await
            }
            ResourceKind::PublicAddress => lb.release_floating_ip(id).await,
        }
    }
}
