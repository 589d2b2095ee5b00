//! In-place changes of an existing load balancer
//!
//! Changes replace objects rather than mutating them: the new object is
//! created and made active, dependents are re-pointed, then the old object is
//! deleted. A failure before the re-point removes the new object again; a
//! failure deleting the old object is reported as a notice.

use super::LoadBalancerProvisioner;
use super::members::MemberSet;
use super::super::{run_compensated, validate};
use crate::backend::{ListenerCreate, MemberCreate, MonitorCreate, RawListener, RawMember};
use crate::compensator::Compensator;
use crate::error::{CloudError, Result, RollbackError, RollbackFailure};
use crate::ledger::{Ledger, LedgerEntry, ResourceKind, StepExecutor};
use crate::metadata::MemberPortRecord;
use crate::model::{Applied, HealthCheckerInfo, HealthInfo, Iid, ListenerInfo, Protocol, VmGroupInfo};
use crate::poller::{PollTarget, wait_for_active, wait_for_deleted};
use crate::status::OperatingStatus;

/// Empty or matching protocol keeps the current one; anything else is refused
fn keep_protocol(what: &str, requested: &str, current: &str) -> Result<()> {
    let requested = requested.trim();
    if !requested.is_empty() && !requested.eq_ignore_ascii_case(current) {
        return Err(CloudError::Unsupported(format!(
            "changing the protocol of the {} is not supported",
            what
        )));
    }
    Ok(())
}

/// The monitor a health-checker change replaces
struct Previous<'a> {
    pool_id: &'a str,
    name: &'a str,
    monitor_id: Option<&'a str>,
    checker: &'a HealthCheckerInfo,
}

impl LoadBalancerProvisioner {
    async fn listener_active(&self, id: &str) -> Result<RawListener> {
        let backend = self.clients.load_balancer.as_ref();
        let target = PollTarget::active(ResourceKind::Listener, id);
        wait_for_active(&target, &self.settings.poll, || backend.get_listener(id)).await
    }

    async fn pool_active(&self, id: &str) -> Result<()> {
        let backend = self.clients.load_balancer.as_ref();
        let target = PollTarget::active(ResourceKind::Pool, id);
        wait_for_active(&target, &self.settings.poll, || backend.get_pool(id)).await?;
        Ok(())
    }

    /// Move `pool_id` from listener `old` to listener `new`
    async fn repoint_listener(&self, old: &str, new: &str, pool_id: &str) -> Result<()> {
        let backend = self.clients.load_balancer.as_ref();
        backend.update_listener_pool(old, None).await?;
        self.listener_active(old).await?;
        backend.update_listener_pool(new, Some(pool_id)).await?;
        self.listener_active(new).await?;
        Ok(())
    }

    pub(super) async fn replace_listener(
        &self,
        iid: &Iid,
        request: ListenerInfo,
    ) -> Result<Applied<ListenerInfo>> {
        let parts = self.parts(iid).await?;
        let old = parts
            .listener
            .ok_or_else(|| CloudError::ResourceNotFound(format!("listener of NLB {}", parts.lb.name)))?;

        let port = validate::parse_port("listener", &request.port)?;
        keep_protocol("listener", &request.protocol, &old.protocol)?;
        let protocol =
            validate::listener_protocol(&self.clients.load_balancer.capabilities(), &old.protocol)?;

        if port == old.protocol_port {
            tracing::info!("Listener of NLB {} already on port {}", parts.lb.name, port);
            return Ok(Applied::new(self.describe_listener(&parts.lb, &old).await));
        }

        tracing::info!(
            "Replacing listener of NLB {}: port {} -> {}",
            parts.lb.name,
            old.protocol_port,
            port
        );

        let backend = self.clients.load_balancer.as_ref();
        let reaper = self.reaper();
        let compensator = Compensator::new(&reaper);

        let mut fresh = Ledger::new();
        let new = backend
            .create_listener(&ListenerCreate {
                load_balancer_id: parts.lb.id.clone(),
                name: old.name.clone(),
                protocol,
                protocol_port: port,
                default_pool_id: None,
            })
            .await?;
        fresh.record(LedgerEntry::new(ResourceKind::Listener, new.id.clone()));

        if let Err(e) = self.listener_active(&new.id).await {
            return Err(compensator.compensate(e, &fresh).await);
        }

        if let Some(pool_id) = old.default_pool_id.as_deref() {
            if let Err(e) = self.repoint_listener(&old.id, &new.id, pool_id).await {
                if let Err(restore) = backend.update_listener_pool(&old.id, Some(pool_id)).await {
                    tracing::warn!("Could not give pool {} back to listener {}: {}", pool_id, old.id, restore);
                }
                return Err(compensator.compensate(e, &fresh).await);
            }
        }

        let retired = Ledger::from(vec![LedgerEntry::new(ResourceKind::Listener, old.id.clone())]);
        let notices = compensator.retire(&retired).await;

        let lb = self.find(&Iid::by_system_id(parts.lb.id.clone())).await?;
        let current = self.listener_active(&new.id).await?;
        Ok(Applied::new(self.describe_listener(&lb, &current).await).with_notices(notices))
    }

    pub(super) async fn replace_vm_group(
        &self,
        iid: &Iid,
        request: VmGroupInfo,
    ) -> Result<Applied<VmGroupInfo>> {
        let parts = self.parts(iid).await?;
        let pool = parts.pool;

        let port = validate::parse_port("VM group", &request.port)?;
        keep_protocol("VM group", &request.protocol, &pool.protocol)?;
        validate::pool_protocol(&self.clients.load_balancer.capabilities(), &pool.protocol)?;

        let group = self.member_group(&pool).await?;
        if group.port == Some(port) {
            tracing::info!("VM group of NLB {} already on port {}", parts.lb.name, port);
            return Ok(Applied::new(self.describe_group(&pool).await?));
        }

        tracing::info!("Moving VM group of NLB {} to port {}", parts.lb.name, port);

        let reaper = self.reaper();
        let compensator = Compensator::new(&reaper);

        let names = group.members.iter().map(|m| m.name.clone()).collect::<Vec<_>>();
        let mut executor: StepExecutor<MemberSet> = StepExecutor::new();
        self.member_steps(&mut executor, names.len());
        let mut set = MemberSet::new(Some(pool.id.clone()), port, names);
        let fresh = run_compensated(&executor, &mut set, &reaper).await?;

        let record = MemberPortRecord::new(self.clients.load_balancer.as_ref());
        let repoint = async {
            record.store(&pool.id, port).await?;
            self.pool_active(&pool.id).await
        };
        if let Err(e) = repoint.await {
            return Err(compensator.compensate(e, &fresh).await);
        }

        // Stale members from an earlier change go along with the group.
        let retired = Ledger::from(
            group
                .members
                .iter()
                .chain(&group.stale)
                .map(|m| LedgerEntry::new(ResourceKind::PoolMember, m.id.clone()).with_parent(pool.id.clone()))
                .collect::<Vec<_>>(),
        );
        let notices = compensator.retire(&retired).await;

        let pool = self
            .clients
            .load_balancer
            .get_pool(&pool.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("pool {}", pool.id)))?;
        Ok(Applied::new(self.describe_group(&pool).await?).with_notices(notices))
    }

    pub(super) async fn attach_vms(&self, iid: &Iid, vms: &[Iid]) -> Result<VmGroupInfo> {
        if vms.is_empty() {
            return Err(CloudError::Validation("no VM given to add".to_string()));
        }

        let parts = self.parts(iid).await?;
        let pool = parts.pool;
        let group = self.member_group(&pool).await?;

        let mut names: Vec<String> = Vec::with_capacity(vms.len());
        for vm in vms {
            validate::require_name("VM", &vm.name_id)?;
            if group.members.iter().any(|m| vm.same_name(&m.name)) {
                return Err(CloudError::ResourceAlreadyExists(format!(
                    "VM '{}' is already a member of NLB {}",
                    vm.name_id, parts.lb.name
                )));
            }
            if names.iter().any(|n| vm.same_name(n)) {
                return Err(CloudError::Validation(format!(
                    "VM '{}' is listed more than once",
                    vm.name_id
                )));
            }
            names.push(vm.name_id.clone());
        }

        let port = group.port.ok_or_else(|| {
            CloudError::ResourceNotFound(format!("VM group port of NLB {}", parts.lb.name))
        })?;

        tracing::info!("Adding {} VM(s) to NLB {}", names.len(), parts.lb.name);

        let mut executor: StepExecutor<MemberSet> = StepExecutor::new();
        self.member_steps(&mut executor, names.len());
        let mut set = MemberSet::new(Some(pool.id.clone()), port, names);
        run_compensated(&executor, &mut set, &self.reaper()).await?;

        self.describe_group(&pool).await
    }

    pub(super) async fn detach_vms(&self, iid: &Iid, vms: &[Iid]) -> Result<bool> {
        if vms.is_empty() {
            return Err(CloudError::Validation("no VM given to remove".to_string()));
        }

        let parts = self.parts(iid).await?;
        let pool = parts.pool;
        let group = self.member_group(&pool).await?;

        let mut targets: Vec<&RawMember> = Vec::with_capacity(vms.len());
        for vm in vms {
            let member = group
                .members
                .iter()
                .find(|m| vm.same_name(&m.name))
                .ok_or_else(|| {
                    CloudError::ResourceNotFound(format!(
                        "VM '{}' is not a member of NLB {}",
                        vm.name_id, parts.lb.name
                    ))
                })?;
            if !targets.iter().any(|t| t.id == member.id) {
                targets.push(member);
            }
        }

        tracing::info!("Removing {} VM(s) from NLB {}", targets.len(), parts.lb.name);

        let backend = self.clients.load_balancer.as_ref();
        let mut removed: Vec<&RawMember> = Vec::with_capacity(targets.len());
        for member in targets.iter().copied() {
            let outcome = async {
                backend.delete_member(&pool.id, &member.id).await?;
                let target = PollTarget::deleted(ResourceKind::PoolMember, member.id.clone());
                wait_for_deleted(&target, &self.settings.delete_poll, || {
                    backend.get_member(&pool.id, &member.id)
                })
                .await?;
                self.pool_active(&pool.id).await
            }
            .await;

            if let Err(cause) = outcome {
                return Err(self.restore_members(&pool.id, &removed, cause).await);
            }
            removed.push(member);
        }

        Ok(true)
    }

    /// Re-create members removed before a failed removal
    async fn restore_members(&self, pool_id: &str, removed: &[&RawMember], cause: CloudError) -> CloudError {
        if removed.is_empty() {
            return cause;
        }

        let backend = self.clients.load_balancer.as_ref();
        let mut failures = Vec::new();
        for member in removed {
            let restored = async {
                let fresh = backend
                    .create_member(
                        pool_id,
                        &MemberCreate {
                            name: member.name.clone(),
                            address: member.address.clone(),
                            subnet_id: member.subnet_id.clone(),
                            protocol_port: member.protocol_port,
                        },
                    )
                    .await?;
                let target = PollTarget::active(ResourceKind::PoolMember, fresh.id.clone());
                wait_for_active(&target, &self.settings.poll, || backend.get_member(pool_id, &fresh.id))
                    .await?;
                self.pool_active(pool_id).await
            }
            .await;

            if let Err(error) = restored {
                tracing::warn!("Could not re-attach {} to pool {}: {}", member.name, pool_id, error);
                failures.push(RollbackFailure {
                    entry: LedgerEntry::new(ResourceKind::PoolMember, member.id.clone())
                        .with_parent(pool_id),
                    error,
                });
            }
        }

        if failures.is_empty() {
            CloudError::RolledBack {
                cause: Box::new(cause),
                removed: removed.len(),
            }
        } else {
            CloudError::RollbackFailed {
                cause: Box::new(cause),
                rollback: RollbackError {
                    attempted: removed.len(),
                    failures,
                },
            }
        }
    }

    /// Create a monitor on `pool_id` and wait for it and the pool
    async fn install_monitor(
        &self,
        pool_id: &str,
        name: &str,
        protocol: Protocol,
        checker: &HealthCheckerInfo,
        ledger: &mut Ledger,
    ) -> Result<()> {
        let backend = self.clients.load_balancer.as_ref();
        let monitor = backend
            .create_monitor(&MonitorCreate {
                pool_id: pool_id.to_string(),
                name: name.to_string(),
                protocol,
                delay: checker.interval,
                timeout: checker.timeout,
                max_retries: checker.threshold,
            })
            .await?;
        ledger.record(LedgerEntry::new(ResourceKind::HealthMonitor, monitor.id.clone()).with_parent(pool_id));

        let target = PollTarget::active(ResourceKind::HealthMonitor, monitor.id.clone());
        wait_for_active(&target, &self.settings.poll, || backend.get_monitor(&monitor.id)).await?;
        self.pool_active(pool_id).await
    }

    /// Undo a failed monitor replacement: drop the new monitor, reinstall
    /// the previous one
    async fn restore_monitor(
        &self,
        previous: &Previous<'_>,
        fresh: &Ledger,
        cause: CloudError,
    ) -> CloudError {
        let reaper = self.reaper();
        let mut failures = Vec::new();
        let mut attempted = 0;
        if !fresh.is_empty() {
            attempted += fresh.len();
            if let Err(rollback) = Compensator::new(&reaper).rollback(fresh).await {
                failures.extend(rollback.failures);
            }
        }

        if let Some(old_id) = previous.monitor_id {
            attempted += 1;
            let old_protocol = Protocol::parse(&previous.checker.protocol).unwrap_or(Protocol::Tcp);
            let mut restored = Ledger::new();
            if let Err(error) = self
                .install_monitor(previous.pool_id, previous.name, old_protocol, previous.checker, &mut restored)
                .await
            {
                tracing::error!("Could not restore health monitor of NLB {}: {}", previous.name, error);
                failures.push(RollbackFailure {
                    entry: LedgerEntry::new(ResourceKind::HealthMonitor, old_id).with_parent(previous.pool_id),
                    error,
                });
            }
        }

        if failures.is_empty() {
            CloudError::RolledBack {
                cause: Box::new(cause),
                removed: attempted,
            }
        } else {
            CloudError::RollbackFailed {
                cause: Box::new(cause),
                rollback: RollbackError { attempted, failures },
            }
        }
    }

    pub(super) async fn replace_health_checker(
        &self,
        iid: &Iid,
        request: HealthCheckerInfo,
    ) -> Result<Applied<HealthCheckerInfo>> {
        let protocol = validate::health_checker(&request)?;
        let parts = self.parts(iid).await?;
        let pool = parts.pool;

        let group_port = self.member_group(&pool).await?.port;
        if !request.port.trim().is_empty() {
            let port = validate::parse_port("health checker", &request.port)?;
            if Some(port) != group_port {
                return Err(CloudError::Unsupported(
                    "changing the port of the health checker is not supported".to_string(),
                ));
            }
        }

        let port_str = group_port.map(|p| p.to_string()).unwrap_or_default();
        let current = self.describe_checker(&pool, &port_str).await?;
        if pool.monitor_id.is_some() && current.same_check(&request) {
            tracing::info!("Health checker of NLB {} unchanged", parts.lb.name);
            return Ok(Applied::new(current));
        }

        tracing::info!("Replacing health checker of NLB {}", parts.lb.name);
        let backend = self.clients.load_balancer.as_ref();
        let name = parts.lb.name.clone();

        // A pool holds one monitor, so the old one goes first. Once it is
        // deleted, any failure has to put it back.
        let previous = Previous {
            pool_id: &pool.id,
            name: &name,
            monitor_id: pool.monitor_id.as_deref(),
            checker: &current,
        };
        if let Some(old_id) = previous.monitor_id {
            backend.delete_monitor(old_id).await?;
            let gone = async {
                let target = PollTarget::deleted(ResourceKind::HealthMonitor, old_id);
                wait_for_deleted(&target, &self.settings.delete_poll, || backend.get_monitor(old_id))
                    .await?;
                self.pool_active(&pool.id).await
            }
            .await;
            if let Err(cause) = gone {
                return Err(self.restore_monitor(&previous, &Ledger::new(), cause).await);
            }
        }

        let mut fresh = Ledger::new();
        if let Err(cause) = self
            .install_monitor(&pool.id, &name, protocol, &request, &mut fresh)
            .await
        {
            return Err(self.restore_monitor(&previous, &fresh, cause).await);
        }

        let pool = backend
            .get_pool(&pool.id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("pool {}", pool.id)))?;
        Ok(Applied::new(self.describe_checker(&pool, &port_str).await?))
    }

    pub(super) async fn member_health(&self, iid: &Iid) -> Result<HealthInfo> {
        let parts = self.parts(iid).await?;
        let mut health = HealthInfo::default();

        for member in self.member_group(&parts.pool).await?.members {
            let vm = self.vm_iid(&member).await;
            match member.operating_status {
                OperatingStatus::Online => health.healthy_vms.push(vm.clone()),
                OperatingStatus::Draining => health.unhealthy_vms.push(vm.clone()),
                other => {
                    return Err(CloudError::ApiError(format!(
                        "member {} of NLB {} reports {}, health is unknown",
                        member.name, parts.lb.name, other
                    )));
                }
            }
            health.all_vms.push(vm);
        }
        Ok(health)
    }
}
