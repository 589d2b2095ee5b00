//! Network load balancer provisioning
//!
//! A load balancer is built in seven steps: validation, envelope, pool,
//! health monitor, members, listener and public address. Everything after
//! validation is recorded in a ledger and undone if a later step fails.

mod change;
mod members;
mod steps;

use super::reaper::BackendReaper;
use super::{bind_tags, created, run_compensated, validate};
use crate::backend::{CloudClients, RawListener, RawLoadBalancer, RawMember, RawNetwork, RawPool};
use crate::compensator::Compensator;
use crate::error::{CloudError, Result};
use crate::handler::NlbHandler;
use crate::ledger::{ResourceKind, StepExecutor};
use crate::metadata::MemberPortRecord;
use crate::model::{
    Applied, HealthCheckerInfo, HealthInfo, Iid, KeyValue, ListenerInfo, NlbInfo, NlbRequest,
    ResourceType, VmGroupInfo,
};
use crate::poller::{PollTarget, ProvisionSettings, wait_for_deleted};
use crate::status::ProvisioningStatus;
use async_trait::async_trait;
use members::{AttachMember, MemberSet, ResolveVms};
use steps::{
    AssociatePublicAddress, CreateEnvelope, CreateListener, CreateMonitor, CreatePool, LbBuild,
};

/// VM group key listing members left behind on another port, as `name:port`
pub const STALE_MEMBERS_KEY: &str = "StaleMembers";

/// Builds, inspects, changes and tears down network load balancers
pub struct LoadBalancerProvisioner {
    clients: CloudClients,
    settings: ProvisionSettings,
}

/// The single pool and listener of a load balancer
struct LbParts {
    lb: RawLoadBalancer,
    pool: RawPool,
    listener: Option<RawListener>,
}

/// Pool members split by the group port
///
/// Members left on another port by a change whose cleanup failed are
/// stale: they are reported, never treated as part of the VM group.
struct MemberGroup {
    port: Option<u16>,
    members: Vec<RawMember>,
    stale: Vec<RawMember>,
}

impl LoadBalancerProvisioner {
    pub fn new(clients: CloudClients, settings: ProvisionSettings) -> Self {
        Self { clients, settings }
    }

    fn reaper(&self) -> BackendReaper {
        BackendReaper::new(self.clients.clone(), self.settings.delete_poll)
    }

    fn member_steps<C: members::HasMembers + 'static>(&self, executor: &mut StepExecutor<C>, count: usize) {
        executor.push(Box::new(ResolveVms {
            clients: self.clients.clone(),
        }));
        for index in 0..count {
            executor.push(Box::new(AttachMember {
                clients: self.clients.clone(),
                poll: self.settings.poll,
                index,
            }));
        }
    }

    async fn name_taken(&self, name: &str) -> Result<bool> {
        let lbs = self.clients.load_balancer.list_load_balancers().await?;
        Ok(lbs.iter().any(|lb| lb.name.eq_ignore_ascii_case(name)))
    }

    /// VIP network and its first subnet
    async fn vip_location(&self, vpc: &Iid) -> Result<(RawNetwork, String)> {
        let backend = self.clients.network.as_ref();
        let network = if vpc.system_id.is_empty() {
            backend
                .list_networks()
                .await?
                .into_iter()
                .find(|n| n.name == vpc.name_id)
        } else {
            backend.get_network(&vpc.system_id).await?
        }
        .ok_or_else(|| CloudError::ResourceNotFound(format!("VPC {}", vpc)))?;

        let subnet_id = network.subnet_ids.first().cloned().ok_or_else(|| {
            CloudError::Validation(format!("VPC {} has no subnet for the load balancer", vpc))
        })?;
        Ok((network, subnet_id))
    }

    async fn find(&self, iid: &Iid) -> Result<RawLoadBalancer> {
        let backend = self.clients.load_balancer.as_ref();
        if !iid.system_id.is_empty() {
            return backend
                .get_load_balancer(&iid.system_id)
                .await?
                .ok_or_else(|| CloudError::ResourceNotFound(format!("NLB {}", iid)));
        }

        backend
            .list_load_balancers()
            .await?
            .into_iter()
            .find(|lb| lb.name == iid.name_id)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("NLB {}", iid)))
    }

    async fn parts(&self, iid: &Iid) -> Result<LbParts> {
        let lb = self.find(iid).await?;
        let backend = self.clients.load_balancer.as_ref();

        let pool_id = lb
            .pool_ids
            .first()
            .ok_or_else(|| CloudError::ResourceNotFound(format!("VM group of NLB {}", lb.name)))?;
        let pool = backend
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("pool {}", pool_id)))?;

        let listener = self.live_listener(&lb, Some(&pool.id)).await?;

        Ok(LbParts { lb, pool, listener })
    }

    /// The listener forwarding to `pool_id`, else the newest one
    async fn live_listener(
        &self,
        lb: &RawLoadBalancer,
        pool_id: Option<&str>,
    ) -> Result<Option<RawListener>> {
        let backend = self.clients.load_balancer.as_ref();
        let mut newest = None;
        for id in &lb.listener_ids {
            let Some(listener) = backend.get_listener(id).await? else {
                continue;
            };
            if pool_id.is_some() && listener.default_pool_id.as_deref() == pool_id {
                return Ok(Some(listener));
            }
            newest = Some(listener);
        }
        Ok(newest)
    }

    async fn members_of(&self, pool: &RawPool) -> Result<Vec<RawMember>> {
        self.clients.load_balancer.list_members(&pool.id).await
    }

    async fn vm_iid(&self, member: &RawMember) -> Iid {
        match self.clients.compute.find_server(&member.name).await {
            Ok(Some(server)) => Iid::new(server.name, server.id),
            _ => Iid::by_name(member.name.clone()),
        }
    }

    async fn group_port(&self, pool: &RawPool, members: &[RawMember]) -> Option<u16> {
        MemberPortRecord::new(self.clients.load_balancer.as_ref())
            .load(pool, members)
            .await
    }

    async fn member_group(&self, pool: &RawPool) -> Result<MemberGroup> {
        let members = self.members_of(pool).await?;
        let port = self.group_port(pool, &members).await;
        let (members, stale): (Vec<RawMember>, Vec<RawMember>) = match port {
            Some(port) => members.into_iter().partition(|m| m.protocol_port == port),
            None => (members, Vec::new()),
        };
        if !stale.is_empty() {
            tracing::warn!(
                "Pool {} holds {} stale member(s) outside port {:?}",
                pool.id,
                stale.len(),
                port
            );
        }
        Ok(MemberGroup { port, members, stale })
    }

    async fn describe_group(&self, pool: &RawPool) -> Result<VmGroupInfo> {
        let group = self.member_group(pool).await?;

        let mut vms = Vec::with_capacity(group.members.len());
        for member in &group.members {
            vms.push(self.vm_iid(member).await);
        }

        let mut key_values = Vec::new();
        if !group.stale.is_empty() {
            let stale: Vec<String> = group
                .stale
                .iter()
                .map(|m| format!("{}:{}", m.name, m.protocol_port))
                .collect();
            key_values.push(KeyValue::new(STALE_MEMBERS_KEY, stale.join(",")));
        }

        Ok(VmGroupInfo {
            protocol: pool.protocol.clone(),
            port: group.port.map(|p| p.to_string()).unwrap_or_default(),
            vms,
            csp_id: pool.id.clone(),
            key_values,
        })
    }

    async fn describe_listener(&self, lb: &RawLoadBalancer, listener: &RawListener) -> ListenerInfo {
        let public = self
            .clients
            .load_balancer
            .find_floating_ip(&lb.vip_port_id)
            .await
            .ok()
            .flatten();

        ListenerInfo {
            protocol: listener.protocol.clone(),
            ip: public.map(|p| p.address).unwrap_or_else(|| lb.vip_address.clone()),
            port: listener.protocol_port.to_string(),
            dns_name: String::new(),
            csp_id: listener.id.clone(),
            key_values: Vec::new(),
        }
    }

    async fn describe_checker(&self, pool: &RawPool, group_port: &str) -> Result<HealthCheckerInfo> {
        let Some(monitor_id) = pool.monitor_id.as_deref() else {
            return Ok(HealthCheckerInfo::default());
        };
        let monitor = self
            .clients
            .load_balancer
            .get_monitor(monitor_id)
            .await?
            .ok_or_else(|| CloudError::ResourceNotFound(format!("health monitor {}", monitor_id)))?;

        Ok(HealthCheckerInfo {
            protocol: monitor.protocol,
            port: group_port.to_string(),
            interval: monitor.delay,
            timeout: monitor.timeout,
            threshold: monitor.max_retries,
            csp_id: monitor.id,
            key_values: Vec::new(),
        })
    }

    async fn describe(&self, lb: RawLoadBalancer) -> Result<NlbInfo> {
        let backend = self.clients.load_balancer.as_ref();

        let vpc_iid = match self.clients.network.get_network(&lb.vip_network_id).await? {
            Some(network) => Iid::new(network.name, network.id),
            None => Iid::by_system_id(lb.vip_network_id.clone()),
        };

        let pool = match lb.pool_ids.first() {
            Some(id) => backend.get_pool(id).await?,
            None => None,
        };
        let listener = self
            .live_listener(&lb, pool.as_ref().map(|p| p.id.as_str()))
            .await?;
        let vm_group = match &pool {
            Some(pool) => self.describe_group(pool).await?,
            None => VmGroupInfo::default(),
        };
        let health_checker = match &pool {
            Some(pool) => self.describe_checker(pool, &vm_group.port).await?,
            None => HealthCheckerInfo::default(),
        };

        let listener = match &listener {
            Some(raw) => self.describe_listener(&lb, raw).await,
            None => ListenerInfo::default(),
        };

        let iid = Iid::new(lb.name.clone(), lb.id.clone());
        let tags = match self.clients.tags.as_ref() {
            Some(binder) => binder.list_tags(ResourceType::Nlb, &iid).await.unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(NlbInfo {
            iid,
            vpc_iid,
            listener,
            vm_group,
            health_checker,
            created_time: Some(lb.created_at),
            tags,
            key_values: vec![
                KeyValue::new("Status", lb.status.to_string()),
                KeyValue::new("VipAddress", lb.vip_address.clone()),
            ],
            ..Default::default()
        })
    }
}

#[async_trait]
impl NlbHandler for LoadBalancerProvisioner {
    async fn create_nlb(&self, request: NlbRequest) -> Result<Applied<NlbInfo>> {
        let plan = validate::nlb_request(&self.clients.load_balancer.capabilities(), &request)?;
        let name = request.iid.name_id.clone();
        if self.name_taken(&name).await? {
            return Err(CloudError::ResourceAlreadyExists(format!("NLB {}", name)));
        }
        let (network, subnet_id) = self.vip_location(&request.vpc_iid).await?;

        tracing::info!(
            "Creating NLB {} ({} {} -> {} {}) in VPC {}",
            name,
            plan.listener_protocol,
            plan.listener_port,
            plan.pool_protocol,
            plan.member_port,
            network.name
        );

        let poll = self.settings.poll;
        let mut executor = StepExecutor::new()
            .step(CreateEnvelope {
                clients: self.clients.clone(),
                poll,
            })
            .step(CreatePool {
                clients: self.clients.clone(),
                poll,
            })
            .step(CreateMonitor {
                clients: self.clients.clone(),
                poll,
            });
        self.member_steps(&mut executor, request.vm_group.vms.len());
        executor.push(Box::new(CreateListener {
            clients: self.clients.clone(),
            poll,
        }));
        executor.push(Box::new(AssociatePublicAddress {
            clients: self.clients.clone(),
        }));

        let names = request.vm_group.vms.iter().map(|vm| vm.name_id.clone()).collect();
        let mut ctx = LbBuild {
            name: name.clone(),
            plan,
            checker: request.health_checker.clone(),
            vip_network_id: network.id.clone(),
            vip_subnet_id: subnet_id,
            lb_id: None,
            vip_port_id: None,
            monitor_id: None,
            listener_id: None,
            members: MemberSet::new(None, plan.member_port, names),
        };

        let reaper = self.reaper();
        let ledger = run_compensated(&executor, &mut ctx, &reaper).await?;

        let lb_id = created(&ctx.lb_id, "load balancer")?.to_string();
        let iid = Iid::new(name.clone(), lb_id.clone());
        let notices = bind_tags(&self.clients, ResourceType::Nlb, &iid, &request.tags).await;

        let info = match self.get_nlb(&iid).await {
            Ok(info) => info,
            Err(e) => return Err(Compensator::new(&reaper).compensate(e, &ledger).await),
        };

        tracing::info!("NLB {} is ready at {}", info.iid, info.listener.ip);
        Ok(Applied::new(info).with_notices(notices))
    }

    async fn get_nlb(&self, iid: &Iid) -> Result<NlbInfo> {
        let lb = self.find(iid).await?;
        self.describe(lb).await
    }

    async fn list_nlb(&self) -> Result<Vec<NlbInfo>> {
        let mut infos = Vec::new();
        for lb in self.clients.load_balancer.list_load_balancers().await? {
            infos.push(self.describe(lb).await?);
        }
        Ok(infos)
    }

    async fn delete_nlb(&self, iid: &Iid) -> Result<bool> {
        let lb = self.find(iid).await?;
        if lb.status == ProvisioningStatus::PendingCreate {
            return Err(CloudError::Conflict(format!(
                "NLB {} is still {}, try again later",
                lb.name, lb.status
            )));
        }

        tracing::info!("Deleting NLB {} ({})", lb.name, lb.id);
        let backend = self.clients.load_balancer.as_ref();

        if let Some(address) = backend.find_floating_ip(&lb.vip_port_id).await? {
            backend.release_floating_ip(&address.id).await?;
        }
        for pool_id in &lb.pool_ids {
            if let Err(e) = MemberPortRecord::new(backend).forget(pool_id).await {
                tracing::debug!("Could not drop metadata of pool {}: {}", pool_id, e);
            }
        }

        backend.delete_load_balancer(&lb.id, true).await?;
        let target = PollTarget::deleted(ResourceKind::LoadBalancer, lb.id.clone());
        wait_for_deleted(&target, &self.settings.delete_poll, || backend.get_load_balancer(&lb.id))
            .await?;

        tracing::info!("NLB {} deleted", lb.name);
        Ok(true)
    }

    async fn change_listener(&self, iid: &Iid, listener: ListenerInfo) -> Result<Applied<ListenerInfo>> {
        self.replace_listener(iid, listener).await
    }

    async fn change_vm_group(&self, iid: &Iid, group: VmGroupInfo) -> Result<Applied<VmGroupInfo>> {
        self.replace_vm_group(iid, group).await
    }

    async fn add_vms(&self, iid: &Iid, vms: &[Iid]) -> Result<VmGroupInfo> {
        self.attach_vms(iid, vms).await
    }

    async fn remove_vms(&self, iid: &Iid, vms: &[Iid]) -> Result<bool> {
        self.detach_vms(iid, vms).await
    }

    async fn change_health_checker(
        &self,
        iid: &Iid,
        checker: HealthCheckerInfo,
    ) -> Result<Applied<HealthCheckerInfo>> {
        self.replace_health_checker(iid, checker).await
    }

    async fn get_vm_group_health(&self, iid: &Iid) -> Result<HealthInfo> {
        self.member_health(iid).await
    }
}
