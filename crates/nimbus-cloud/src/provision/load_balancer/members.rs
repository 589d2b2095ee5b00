//! Resolving VMs and attaching them as pool members

use super::super::created;
use crate::backend::{CloudClients, MemberCreate, RawMember};
use crate::error::{CloudError, Result};
use crate::ledger::{LedgerEntry, ResourceKind, Step};
use crate::poller::{PollConfig, PollTarget, wait_for_active};
use async_trait::async_trait;

/// A VM resolved to the address a member is created with
#[derive(Debug, Clone)]
pub(super) struct ResolvedVm {
    pub name: String,
    pub address: String,
    pub subnet_id: String,
}

/// VMs to attach to one pool on one port
#[derive(Debug, Clone, Default)]
pub(super) struct MemberSet {
    pub pool_id: Option<String>,
    pub port: u16,
    pub names: Vec<String>,
    pub resolved: Vec<ResolvedVm>,
    pub member_ids: Vec<Option<String>>,
}

impl MemberSet {
    pub fn new(pool_id: Option<String>, port: u16, names: Vec<String>) -> Self {
        let member_ids = vec![None; names.len()];
        Self {
            pool_id,
            port,
            names,
            resolved: Vec::new(),
            member_ids,
        }
    }
}

/// Contexts carrying a member set
pub(super) trait HasMembers: Send {
    fn members(&mut self) -> &mut MemberSet;
}

impl HasMembers for MemberSet {
    fn members(&mut self) -> &mut MemberSet {
        self
    }
}

/// Look every VM up by name; fails on the first that cannot be resolved
pub(super) struct ResolveVms {
    pub clients: CloudClients,
}

#[async_trait]
impl<C: HasMembers> Step<C> for ResolveVms {
    fn name(&self) -> String {
        "resolve VMs".to_string()
    }

    async fn create(&self, ctx: &mut C) -> Result<Option<LedgerEntry>> {
        let set = ctx.members();
        let mut resolved = Vec::with_capacity(set.names.len());

        for name in &set.names {
            let server = self
                .clients
                .compute
                .find_server(name)
                .await?
                .ok_or_else(|| CloudError::ResourceNotFound(format!("unable to resolve VM '{}'", name)))?;
            let fixed = server.addresses.first().ok_or_else(|| {
                CloudError::Validation(format!("VM '{}' has no private address", name))
            })?;
            tracing::debug!("Resolved VM {} to {} on subnet {}", name, fixed.address, fixed.subnet_id);
            resolved.push(ResolvedVm {
                name: server.name.clone(),
                address: fixed.address.clone(),
                subnet_id: fixed.subnet_id.clone(),
            });
        }

        set.resolved = resolved;
        Ok(None)
    }
}

/// Attach one resolved VM and wait for it and its pool
pub(super) struct AttachMember {
    pub clients: CloudClients,
    pub poll: PollConfig,
    pub index: usize,
}

#[async_trait]
impl<C: HasMembers> Step<C> for AttachMember {
    fn name(&self) -> String {
        format!("attach member #{}", self.index + 1)
    }

    async fn create(&self, ctx: &mut C) -> Result<Option<LedgerEntry>> {
        let set = ctx.members();
        let pool_id = created(&set.pool_id, "pool")?.to_string();
        let vm = set.resolved.get(self.index).ok_or_else(|| {
            CloudError::ResourceNotFound(format!("VM #{} was not resolved", self.index + 1))
        })?;

        let member: RawMember = self
            .clients
            .load_balancer
            .create_member(
                &pool_id,
                &MemberCreate {
                    name: vm.name.clone(),
                    address: vm.address.clone(),
                    subnet_id: vm.subnet_id.clone(),
                    protocol_port: set.port,
                },
            )
            .await?;
        tracing::debug!("Attached {} as member {} of pool {}", vm.name, member.id, pool_id);
        set.member_ids[self.index] = Some(member.id.clone());
        Ok(Some(
            LedgerEntry::new(ResourceKind::PoolMember, member.id).with_parent(pool_id),
        ))
    }

    async fn settle(&self, ctx: &mut C) -> Result<()> {
        let set = ctx.members();
        let pool_id = created(&set.pool_id, "pool")?.to_string();
        let member_id = created(&set.member_ids[self.index], "member")?.to_string();
        let lb = self.clients.load_balancer.as_ref();

        let target = PollTarget::active(ResourceKind::PoolMember, member_id.clone());
        wait_for_active(&target, &self.poll, || lb.get_member(&pool_id, &member_id)).await?;

        let target = PollTarget::active(ResourceKind::Pool, pool_id.clone());
        wait_for_active(&target, &self.poll, || lb.get_pool(&pool_id)).await?;
        Ok(())
    }
}
