//! VPC provisioning: network, router, subnets and router interfaces

use super::reaper::BackendReaper;
use super::{bind_tags, created, run_compensated, validate};
use crate::backend::{CloudClients, NetworkCreate, RawNetwork, RawSubnet, RouterCreate, SubnetCreate};
use crate::compensator::Compensator;
use crate::error::{CloudError, Result};
use crate::handler::VpcHandler;
use crate::ledger::{LedgerEntry, ResourceKind, Step, StepExecutor};
use crate::model::{
    Applied, Iid, Ipv4Cidr, KeyValue, ResourceType, SubnetInfo, VpcInfo, VpcRequest,
};
use crate::poller::{PollConfig, PollTarget, ProvisionSettings, wait_for_active, wait_for_deleted};
use async_trait::async_trait;

/// Key of the `VpcInfo::key_values` entries carrying tag failures of
/// `add_subnet`
pub const NOTICE_KEY: &str = "Notice";

/// Name of the router that connects a VPC to the gateway network
pub fn router_name(vpc_name: &str) -> String {
    format!("{}-Router", vpc_name)
}

/// Builds and tears down VPCs
pub struct NetworkProvisioner {
    clients: CloudClients,
    settings: ProvisionSettings,
}

/// Shared state of one VPC build
struct VpcBuild {
    name: String,
    cidr: String,
    subnets: Vec<SubnetInfo>,
    network_id: Option<String>,
    router_id: Option<String>,
    subnet_ids: Vec<Option<String>>,
}

impl VpcBuild {
    fn new(name: String, cidr: String, subnets: Vec<SubnetInfo>) -> Self {
        let subnet_ids = vec![None; subnets.len()];
        Self {
            name,
            cidr,
            subnets,
            network_id: None,
            router_id: None,
            subnet_ids,
        }
    }
}

struct CreateNetwork {
    clients: CloudClients,
    poll: PollConfig,
}

#[async_trait]
impl Step<VpcBuild> for CreateNetwork {
    fn name(&self) -> String {
        "create network".to_string()
    }

    async fn create(&self, ctx: &mut VpcBuild) -> Result<Option<LedgerEntry>> {
        let network = self
            .clients
            .network
            .create_network(&NetworkCreate {
                name: ctx.name.clone(),
                cidr: ctx.cidr.clone(),
            })
            .await?;
        tracing::debug!("Created network {} ({})", network.name, network.id);
        ctx.network_id = Some(network.id.clone());
        Ok(Some(LedgerEntry::new(ResourceKind::Network, network.id)))
    }

    async fn settle(&self, ctx: &mut VpcBuild) -> Result<()> {
        let id = created(&ctx.network_id, "network")?;
        let target = PollTarget::active(ResourceKind::Network, id);
        wait_for_active(&target, &self.poll, || self.clients.network.get_network(id)).await?;
        Ok(())
    }
}

struct CreateRouter {
    clients: CloudClients,
    poll: PollConfig,
}

#[async_trait]
impl Step<VpcBuild> for CreateRouter {
    fn name(&self) -> String {
        "create router".to_string()
    }

    async fn create(&self, ctx: &mut VpcBuild) -> Result<Option<LedgerEntry>> {
        let external_network_id = self.clients.network.external_network_id().await?;
        let router = self
            .clients
            .network
            .create_router(&RouterCreate {
                name: router_name(&ctx.name),
                external_network_id,
            })
            .await?;
        tracing::debug!("Created router {} ({})", router.name, router.id);
        ctx.router_id = Some(router.id.clone());
        Ok(Some(LedgerEntry::new(ResourceKind::Router, router.id)))
    }

    async fn settle(&self, ctx: &mut VpcBuild) -> Result<()> {
        let id = created(&ctx.router_id, "router")?;
        let target = PollTarget::active(ResourceKind::Router, id);
        wait_for_active(&target, &self.poll, || self.clients.network.get_router(id)).await?;
        Ok(())
    }
}

struct CreateSubnet {
    clients: CloudClients,
    index: usize,
}

#[async_trait]
impl Step<VpcBuild> for CreateSubnet {
    fn name(&self) -> String {
        format!("create subnet #{}", self.index + 1)
    }

    async fn create(&self, ctx: &mut VpcBuild) -> Result<Option<LedgerEntry>> {
        let network_id = created(&ctx.network_id, "network")?.to_string();
        let request = &ctx.subnets[self.index];
        let subnet = self
            .clients
            .network
            .create_subnet(&SubnetCreate {
                network_id: network_id.clone(),
                name: request.iid.name_id.clone(),
                cidr: request.ipv4_cidr.clone(),
            })
            .await?;
        tracing::debug!("Created subnet {} ({})", subnet.name, subnet.id);
        ctx.subnet_ids[self.index] = Some(subnet.id.clone());
        Ok(Some(
            LedgerEntry::new(ResourceKind::Subnet, subnet.id).with_parent(network_id),
        ))
    }
}

struct BindInterface {
    clients: CloudClients,
    index: usize,
}

#[async_trait]
impl Step<VpcBuild> for BindInterface {
    fn name(&self) -> String {
        format!("bind router interface #{}", self.index + 1)
    }

    async fn create(&self, ctx: &mut VpcBuild) -> Result<Option<LedgerEntry>> {
        let router_id = created(&ctx.router_id, "router")?;
        let subnet_id = created(&ctx.subnet_ids[self.index], "subnet")?;
        self.clients
            .network
            .add_router_interface(router_id, subnet_id)
            .await?;
        tracing::debug!("Bound subnet {} to router {}", subnet_id, router_id);
        Ok(Some(
            LedgerEntry::new(ResourceKind::RouterInterface, subnet_id).with_parent(router_id),
        ))
    }
}

impl NetworkProvisioner {
    pub fn new(clients: CloudClients, settings: ProvisionSettings) -> Self {
        Self { clients, settings }
    }

    fn reaper(&self) -> BackendReaper {
        BackendReaper::new(self.clients.clone(), self.settings.delete_poll)
    }

    fn subnet_steps(&self, executor: &mut StepExecutor<VpcBuild>, count: usize) {
        for index in 0..count {
            executor.push(Box::new(CreateSubnet {
                clients: self.clients.clone(),
                index,
            }));
        }
        for index in 0..count {
            executor.push(Box::new(BindInterface {
                clients: self.clients.clone(),
                index,
            }));
        }
    }

    async fn name_taken(&self, name: &str) -> Result<bool> {
        let networks = self.clients.network.list_networks().await?;
        Ok(networks.iter().any(|n| n.name.eq_ignore_ascii_case(name)))
    }

    async fn find_network(&self, iid: &Iid) -> Result<RawNetwork> {
        if !iid.system_id.is_empty() {
            return self
                .clients
                .network
                .get_network(&iid.system_id)
                .await?
                .ok_or_else(|| CloudError::ResourceNotFound(format!("VPC {}", iid)));
        }

        self.clients
            .network
            .list_networks()
            .await?
            .into_iter()
            .find(|n| n.name == iid.name_id)
            .ok_or_else(|| CloudError::ResourceNotFound(format!("VPC {}", iid)))
    }

    async fn subnets_of(&self, network: &RawNetwork) -> Result<Vec<RawSubnet>> {
        let mut subnets = Vec::with_capacity(network.subnet_ids.len());
        for id in &network.subnet_ids {
            match self.clients.network.get_subnet(id).await? {
                Some(subnet) => subnets.push(subnet),
                None => tracing::debug!("Subnet {} of network {} vanished", id, network.id),
            }
        }
        Ok(subnets)
    }

    async fn tags_of(&self, resource_type: ResourceType, iid: &Iid) -> Vec<KeyValue> {
        let Some(binder) = self.clients.tags.as_ref() else {
            return Vec::new();
        };
        binder.list_tags(resource_type, iid).await.unwrap_or_else(|e| {
            tracing::debug!("Could not list tags of {}: {}", iid, e);
            Vec::new()
        })
    }

    async fn describe(&self, network: &RawNetwork) -> Result<VpcInfo> {
        let mut subnets = Vec::new();
        for raw in self.subnets_of(network).await? {
            let iid = Iid::new(raw.name, raw.id);
            let tags = self.tags_of(ResourceType::Subnet, &iid).await;
            subnets.push(SubnetInfo {
                iid,
                ipv4_cidr: raw.cidr,
                tags,
                key_values: Vec::new(),
            });
        }

        let iid = Iid::new(network.name.clone(), network.id.clone());
        let tags = self.tags_of(ResourceType::Vpc, &iid).await;
        Ok(VpcInfo {
            iid,
            ipv4_cidr: network.cidr.clone().unwrap_or_default(),
            subnets,
            tags,
            key_values: vec![KeyValue::new("Status", network.status.to_string())],
        })
    }

    /// Refuse when an instance still has an address on one of `subnet_ids`
    async fn ensure_unused(&self, what: &str, subnet_ids: &[String]) -> Result<()> {
        for server in self.clients.compute.list_servers().await? {
            if let Some(addr) = server
                .addresses
                .iter()
                .find(|a| subnet_ids.contains(&a.subnet_id))
            {
                return Err(CloudError::ResourceInUse(format!(
                    "{}: instance {} still has address {} on subnet {}",
                    what, server.name, addr.address, addr.subnet_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VpcHandler for NetworkProvisioner {
    async fn create_vpc(&self, request: VpcRequest) -> Result<Applied<VpcInfo>> {
        validate::vpc_request(&request)?;
        let name = request.iid.name_id.clone();
        if self.name_taken(&name).await? {
            return Err(CloudError::ResourceAlreadyExists(format!("VPC {}", name)));
        }

        tracing::info!("Creating VPC {} ({})", name, request.ipv4_cidr);

        let mut executor = StepExecutor::new()
            .step(CreateNetwork {
                clients: self.clients.clone(),
                poll: self.settings.poll,
            })
            .step(CreateRouter {
                clients: self.clients.clone(),
                poll: self.settings.poll,
            });
        self.subnet_steps(&mut executor, request.subnets.len());

        let mut ctx = VpcBuild::new(name.clone(), request.ipv4_cidr.clone(), request.subnets.clone());
        let reaper = self.reaper();
        let ledger = run_compensated(&executor, &mut ctx, &reaper).await?;

        let network_id = created(&ctx.network_id, "network")?.to_string();
        let vpc_iid = Iid::new(name.clone(), network_id.clone());
        let mut notices = bind_tags(&self.clients, ResourceType::Vpc, &vpc_iid, &request.tags).await;
        for (subnet, id) in request.subnets.iter().zip(&ctx.subnet_ids) {
            if let Some(id) = id {
                let iid = Iid::new(subnet.iid.name_id.clone(), id.clone());
                notices.extend(bind_tags(&self.clients, ResourceType::Subnet, &iid, &subnet.tags).await);
            }
        }

        let info = match self.get_vpc(&vpc_iid).await {
            Ok(info) => info,
            Err(e) => return Err(Compensator::new(&reaper).compensate(e, &ledger).await),
        };

        tracing::info!("VPC {} is ready", info.iid);
        Ok(Applied::new(info).with_notices(notices))
    }

    async fn get_vpc(&self, iid: &Iid) -> Result<VpcInfo> {
        let network = self.find_network(iid).await?;
        self.describe(&network).await
    }

    async fn list_vpc(&self) -> Result<Vec<VpcInfo>> {
        let mut infos = Vec::new();
        for network in self.clients.network.list_networks().await? {
            if network.external {
                continue;
            }
            infos.push(self.describe(&network).await?);
        }
        Ok(infos)
    }

    async fn delete_vpc(&self, iid: &Iid) -> Result<bool> {
        let network = self.find_network(iid).await?;
        let what = format!("VPC {}", network.name);
        self.ensure_unused(&what, &network.subnet_ids).await?;

        tracing::info!("Deleting VPC {} ({})", network.name, network.id);
        let backend = self.clients.network.as_ref();
        let poll = &self.settings.delete_poll;

        if let Some(router) = backend.find_router(&router_name(&network.name)).await? {
            for subnet_id in router
                .interface_subnet_ids
                .iter()
                .filter(|id| network.subnet_ids.contains(id))
            {
                backend.remove_router_interface(&router.id, subnet_id).await?;
            }
            backend.delete_router(&router.id).await?;
            let target = PollTarget::deleted(ResourceKind::Router, router.id.clone());
            wait_for_deleted(&target, poll, || backend.get_router(&router.id)).await?;
        }

        backend.delete_network(&network.id).await?;
        let target = PollTarget::deleted(ResourceKind::Network, network.id.clone());
        wait_for_deleted(&target, poll, || backend.get_network(&network.id)).await?;

        tracing::info!("VPC {} deleted", network.name);
        Ok(true)
    }

    async fn add_subnet(&self, vpc: &Iid, subnet: SubnetInfo) -> Result<VpcInfo> {
        let network = self.find_network(vpc).await?;
        let vpc_cidr = Ipv4Cidr::new(network.cidr.as_deref().unwrap_or_default())?;

        let mut siblings = Vec::new();
        for raw in self.subnets_of(&network).await? {
            siblings.push((raw.name.clone(), Ipv4Cidr::new(&raw.cidr)?));
        }
        validate::subnet_cidr(&vpc_cidr, &siblings, &subnet)?;

        let router = self
            .clients
            .network
            .find_router(&router_name(&network.name))
            .await?
            .ok_or_else(|| {
                CloudError::ResourceNotFound(format!("router {}", router_name(&network.name)))
            })?;

        tracing::info!("Adding subnet {} to VPC {}", subnet.iid.name_id, network.name);

        let mut executor = StepExecutor::new();
        self.subnet_steps(&mut executor, 1);
        let mut ctx = VpcBuild::new(network.name.clone(), network.cidr.clone().unwrap_or_default(), vec![subnet.clone()]);
        ctx.network_id = Some(network.id.clone());
        ctx.router_id = Some(router.id.clone());
        run_compensated(&executor, &mut ctx, &self.reaper()).await?;

        let mut notices = Vec::new();
        if let Some(id) = &ctx.subnet_ids[0] {
            let iid = Iid::new(subnet.iid.name_id.clone(), id.clone());
            notices = bind_tags(&self.clients, ResourceType::Subnet, &iid, &subnet.tags).await;
        }

        let mut info = self.get_vpc(&Iid::new(network.name, network.id)).await?;
        info.key_values
            .extend(notices.iter().map(|n| KeyValue::new(NOTICE_KEY, n.to_string())));
        Ok(info)
    }

    async fn remove_subnet(&self, vpc: &Iid, subnet: &Iid) -> Result<bool> {
        let network = self.find_network(vpc).await?;
        let raw = self
            .subnets_of(&network)
            .await?
            .into_iter()
            .find(|s| {
                if subnet.system_id.is_empty() {
                    s.name == subnet.name_id
                } else {
                    s.id == subnet.system_id
                }
            })
            .ok_or_else(|| {
                CloudError::ResourceNotFound(format!("subnet {} in VPC {}", subnet, network.name))
            })?;

        let what = format!("subnet {}", raw.name);
        self.ensure_unused(&what, std::slice::from_ref(&raw.id)).await?;

        tracing::info!("Removing subnet {} from VPC {}", raw.name, network.name);
        let backend = self.clients.network.as_ref();
        if let Some(router) = backend.find_router(&router_name(&network.name)).await? {
            if router.interface_subnet_ids.contains(&raw.id) {
                backend.remove_router_interface(&router.id, &raw.id).await?;
            }
        }
        backend.delete_subnet(&raw.id).await?;
        Ok(true)
    }
}
