//! Creation steps of a network load balancer

use super::super::created;
use super::members::{HasMembers, MemberSet};
use crate::backend::{CloudClients, ListenerCreate, LoadBalancerCreate, MonitorCreate, PoolCreate};
use crate::error::Result;
use crate::ledger::{LedgerEntry, ResourceKind, Step};
use crate::metadata::MemberPortRecord;
use crate::model::HealthCheckerInfo;
use crate::poller::{PollConfig, PollTarget, wait_for_active};
use crate::provision::validate::NlbPlan;
use async_trait::async_trait;

/// Shared state of one load-balancer build
pub(super) struct LbBuild {
    pub name: String,
    pub plan: NlbPlan,
    pub checker: HealthCheckerInfo,
    pub vip_network_id: String,
    pub vip_subnet_id: String,
    pub lb_id: Option<String>,
    pub vip_port_id: Option<String>,
    pub monitor_id: Option<String>,
    pub listener_id: Option<String>,
    pub members: MemberSet,
}

impl HasMembers for LbBuild {
    fn members(&mut self) -> &mut MemberSet {
        &mut self.members
    }
}

async fn pool_active(clients: &CloudClients, poll: &PollConfig, pool_id: &str) -> Result<()> {
    let lb = clients.load_balancer.as_ref();
    let target = PollTarget::active(ResourceKind::Pool, pool_id);
    wait_for_active(&target, poll, || lb.get_pool(pool_id)).await?;
    Ok(())
}

/// Step 2: the load balancer itself
pub(super) struct CreateEnvelope {
    pub clients: CloudClients,
    pub poll: PollConfig,
}

#[async_trait]
impl Step<LbBuild> for CreateEnvelope {
    fn name(&self) -> String {
        "create load balancer".to_string()
    }

    async fn create(&self, ctx: &mut LbBuild) -> Result<Option<LedgerEntry>> {
        let lb = self
            .clients
            .load_balancer
            .create_load_balancer(&LoadBalancerCreate {
                name: ctx.name.clone(),
                vip_network_id: ctx.vip_network_id.clone(),
                vip_subnet_id: ctx.vip_subnet_id.clone(),
            })
            .await?;
        tracing::debug!("Created load balancer {} ({})", lb.name, lb.id);
        ctx.lb_id = Some(lb.id.clone());
        Ok(Some(LedgerEntry::new(ResourceKind::LoadBalancer, lb.id)))
    }

    async fn settle(&self, ctx: &mut LbBuild) -> Result<()> {
        let id = created(&ctx.lb_id, "load balancer")?;
        let backend = self.clients.load_balancer.as_ref();
        let target = PollTarget::active(ResourceKind::LoadBalancer, id);
        let lb = wait_for_active(&target, &self.poll, || backend.get_load_balancer(id)).await?;
        ctx.vip_port_id = Some(lb.vip_port_id);
        Ok(())
    }
}

/// Step 3: the pool, carrying the VM-group port
pub(super) struct CreatePool {
    pub clients: CloudClients,
    pub poll: PollConfig,
}

#[async_trait]
impl Step<LbBuild> for CreatePool {
    fn name(&self) -> String {
        "create pool".to_string()
    }

    async fn create(&self, ctx: &mut LbBuild) -> Result<Option<LedgerEntry>> {
        let lb_id = created(&ctx.lb_id, "load balancer")?.to_string();
        let backend = self.clients.load_balancer.as_ref();
        let pool = backend
            .create_pool(&PoolCreate {
                load_balancer_id: lb_id,
                name: ctx.name.clone(),
                protocol: ctx.plan.pool_protocol,
                description: MemberPortRecord::new(backend).pool_description(ctx.plan.member_port),
            })
            .await?;
        tracing::debug!("Created pool {} ({})", pool.name, pool.id);
        ctx.members.pool_id = Some(pool.id.clone());
        Ok(Some(LedgerEntry::new(ResourceKind::Pool, pool.id)))
    }

    async fn settle(&self, ctx: &mut LbBuild) -> Result<()> {
        let pool_id = created(&ctx.members.pool_id, "pool")?;
        pool_active(&self.clients, &self.poll, pool_id).await?;
        if self.clients.load_balancer.metadata().is_some() {
            MemberPortRecord::new(self.clients.load_balancer.as_ref())
                .store(pool_id, ctx.plan.member_port)
                .await?;
        }
        Ok(())
    }
}

/// Step 4: the health monitor of the pool
pub(super) struct CreateMonitor {
    pub clients: CloudClients,
    pub poll: PollConfig,
}

#[async_trait]
impl Step<LbBuild> for CreateMonitor {
    fn name(&self) -> String {
        "create health monitor".to_string()
    }

    async fn create(&self, ctx: &mut LbBuild) -> Result<Option<LedgerEntry>> {
        let pool_id = created(&ctx.members.pool_id, "pool")?.to_string();
        let monitor = self
            .clients
            .load_balancer
            .create_monitor(&MonitorCreate {
                pool_id: pool_id.clone(),
                name: ctx.name.clone(),
                protocol: ctx.plan.monitor_protocol,
                delay: ctx.checker.interval,
                timeout: ctx.checker.timeout,
                max_retries: ctx.checker.threshold,
            })
            .await?;
        tracing::debug!("Created health monitor {} for pool {}", monitor.id, pool_id);
        ctx.monitor_id = Some(monitor.id.clone());
        Ok(Some(
            LedgerEntry::new(ResourceKind::HealthMonitor, monitor.id).with_parent(pool_id),
        ))
    }

    async fn settle(&self, ctx: &mut LbBuild) -> Result<()> {
        let id = created(&ctx.monitor_id, "health monitor")?;
        let backend = self.clients.load_balancer.as_ref();
        let target = PollTarget::active(ResourceKind::HealthMonitor, id);
        wait_for_active(&target, &self.poll, || backend.get_monitor(id)).await?;

        let pool_id = created(&ctx.members.pool_id, "pool")?;
        pool_active(&self.clients, &self.poll, pool_id).await
    }
}

/// Step 6: the listener, forwarding to the pool
pub(super) struct CreateListener {
    pub clients: CloudClients,
    pub poll: PollConfig,
}

#[async_trait]
impl Step<LbBuild> for CreateListener {
    fn name(&self) -> String {
        "create listener".to_string()
    }

    async fn create(&self, ctx: &mut LbBuild) -> Result<Option<LedgerEntry>> {
        let listener = self
            .clients
            .load_balancer
            .create_listener(&ListenerCreate {
                load_balancer_id: created(&ctx.lb_id, "load balancer")?.to_string(),
                name: ctx.name.clone(),
                protocol: ctx.plan.listener_protocol,
                protocol_port: ctx.plan.listener_port,
                default_pool_id: ctx.members.pool_id.clone(),
            })
            .await?;
        tracing::debug!("Created listener {} on port {}", listener.id, listener.protocol_port);
        ctx.listener_id = Some(listener.id.clone());
        Ok(Some(LedgerEntry::new(ResourceKind::Listener, listener.id)))
    }

    async fn settle(&self, ctx: &mut LbBuild) -> Result<()> {
        let id = created(&ctx.listener_id, "listener")?;
        let backend = self.clients.load_balancer.as_ref();
        let target = PollTarget::active(ResourceKind::Listener, id);
        wait_for_active(&target, &self.poll, || backend.get_listener(id)).await?;
        Ok(())
    }
}

/// Step 7: a public address on the VIP port
pub(super) struct AssociatePublicAddress {
    pub clients: CloudClients,
}

#[async_trait]
impl Step<LbBuild> for AssociatePublicAddress {
    fn name(&self) -> String {
        "associate public address".to_string()
    }

    async fn create(&self, ctx: &mut LbBuild) -> Result<Option<LedgerEntry>> {
        let port_id = created(&ctx.vip_port_id, "VIP port")?;
        let external = self.clients.network.external_network_id().await?;
        let address = self
            .clients
            .load_balancer
            .allocate_floating_ip(&external, port_id)
            .await?;
        tracing::debug!("Associated public address {} with port {}", address.address, port_id);
        Ok(Some(LedgerEntry::new(ResourceKind::PublicAddress, address.id)))
    }
}
