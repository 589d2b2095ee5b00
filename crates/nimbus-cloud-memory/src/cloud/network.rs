use super::{LOAD_BALANCERS, MemoryCloud, NETWORKS, ROUTERS, SERVERS, SUBNETS, new_id};
use crate::store::Transaction;
use async_trait::async_trait;
use nimbus_cloud::{
    CloudError, Ipv4Cidr, NetworkBackend, NetworkCreate, ProvisioningStatus, RawLoadBalancer,
    RawNetwork, RawRouter, RawServer, RawSubnet, ResourceKind, Result, RouterCreate,
    SubnetCreate,
};

fn missing(kind: ResourceKind, id: &str) -> CloudError {
    CloudError::ResourceNotFound(format!("{} {}", kind, id))
}

/// What still holds on to `subnet`, if anything
fn subnet_user(tx: &Transaction, subnet: &RawSubnet) -> Result<Option<String>> {
    let routers: Vec<RawRouter> = tx.values(ROUTERS)?;
    if let Some(router) = routers
        .iter()
        .find(|r| r.interface_subnet_ids.contains(&subnet.id))
    {
        return Ok(Some(format!(
            "subnet {} is attached to router {}",
            subnet.name, router.name
        )));
    }

    let servers: Vec<RawServer> = tx.values(SERVERS)?;
    if let Some(server) = servers
        .iter()
        .find(|s| s.addresses.iter().any(|a| a.subnet_id == subnet.id))
    {
        return Ok(Some(format!(
            "subnet {} is used by server {}",
            subnet.name, server.name
        )));
    }

    let lbs: Vec<RawLoadBalancer> = tx.values(LOAD_BALANCERS)?;
    if let Some(lb) = lbs.iter().find(|lb| lb.vip_subnet_id == subnet.id) {
        return Ok(Some(format!(
            "subnet {} holds the VIP of load balancer {}",
            subnet.name, lb.name
        )));
    }
    Ok(None)
}

#[async_trait]
impl NetworkBackend for MemoryCloud {
    async fn list_networks(&self) -> Result<Vec<RawNetwork>> {
        self.read(ResourceKind::Network, |tx| Ok(tx.values(NETWORKS)?))
    }

    async fn get_network(&self, id: &str) -> Result<Option<RawNetwork>> {
        self.observe(id)
    }

    async fn create_network(&self, request: &NetworkCreate) -> Result<RawNetwork> {
        Ipv4Cidr::new(&request.cidr)?;
        self.scope().transaction(|tx| {
            let network = RawNetwork {
                id: new_id("net"),
                name: request.name.clone(),
                cidr: Some(request.cidr.clone()),
                subnet_ids: Vec::new(),
                external: false,
                status: ProvisioningStatus::PendingCreate,
            };
            self.admit(tx, &network)?;
            tracing::debug!("memory: network {} ({})", network.name, network.id);
            Ok(network)
        })
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let mut network: RawNetwork = tx
                .get(NETWORKS, id)?
                .ok_or_else(|| missing(ResourceKind::Network, id))?;
            if network.external {
                return Err(CloudError::Conflict(format!(
                    "external network {} cannot be deleted",
                    network.name
                )));
            }

            for subnet_id in &network.subnet_ids {
                if let Some(subnet) = tx.get::<RawSubnet>(SUBNETS, subnet_id)? {
                    if let Some(user) = subnet_user(tx, &subnet)? {
                        return Err(CloudError::ResourceInUse(format!(
                            "network {}: {}",
                            network.name, user
                        )));
                    }
                }
            }
            for subnet_id in network.subnet_ids.drain(..) {
                tx.remove(SUBNETS, &subnet_id);
            }
            tx.put(NETWORKS, id, &network)?;
            self.retire::<RawNetwork>(tx, id)?;
            Ok(())
        })
    }

    async fn external_network_id(&self) -> Result<String> {
        self.read(ResourceKind::Network, |tx| {
            let networks: Vec<RawNetwork> = tx.values(NETWORKS)?;
            networks
                .into_iter()
                .find(|n| n.external && n.name == self.external_network)
                .map(|n| n.id)
                .ok_or_else(|| {
                    CloudError::ResourceNotFound(format!(
                        "external network {}",
                        self.external_network
                    ))
                })
        })
    }

    async fn get_subnet(&self, id: &str) -> Result<Option<RawSubnet>> {
        self.read(ResourceKind::Subnet, |tx| Ok(tx.get(SUBNETS, id)?))
    }

    async fn create_subnet(&self, request: &SubnetCreate) -> Result<RawSubnet> {
        let cidr = Ipv4Cidr::new(&request.cidr)?;
        self.scope().transaction(|tx| {
            self.refuse_create(tx, ResourceKind::Subnet)?;
            let mut network: RawNetwork = tx
                .get(NETWORKS, &request.network_id)?
                .ok_or_else(|| missing(ResourceKind::Network, &request.network_id))?;

            for sibling_id in &network.subnet_ids {
                if let Some(sibling) = tx.get::<RawSubnet>(SUBNETS, sibling_id)? {
                    if Ipv4Cidr::new(&sibling.cidr)?.overlaps(&cidr) {
                        return Err(CloudError::Conflict(format!(
                            "{} overlaps subnet {} ({})",
                            cidr, sibling.name, sibling.cidr
                        )));
                    }
                }
            }

            let subnet = RawSubnet {
                id: new_id("subnet"),
                name: request.name.clone(),
                network_id: network.id.clone(),
                cidr: cidr.to_string(),
            };
            network.subnet_ids.push(subnet.id.clone());
            tx.put(NETWORKS, network.id.clone(), &network)?;
            tx.put(SUBNETS, subnet.id.clone(), &subnet)?;
            tracing::debug!("memory: subnet {} ({}) in {}", subnet.name, subnet.id, network.name);
            Ok(subnet)
        })
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            self.refuse_delete(tx, ResourceKind::Subnet, id)?;
            let subnet: RawSubnet = tx
                .get(SUBNETS, id)?
                .ok_or_else(|| missing(ResourceKind::Subnet, id))?;
            if let Some(user) = subnet_user(tx, &subnet)? {
                return Err(CloudError::ResourceInUse(user));
            }

            if let Some(mut network) = tx.get::<RawNetwork>(NETWORKS, &subnet.network_id)? {
                network.subnet_ids.retain(|s| s != id);
                tx.put(NETWORKS, network.id.clone(), &network)?;
            }
            tx.remove(SUBNETS, id);
            tracing::debug!("memory: subnet {} removed", id);
            Ok(())
        })
    }

    async fn find_router(&self, name: &str) -> Result<Option<RawRouter>> {
        self.read(ResourceKind::Router, |tx| {
            let routers: Vec<RawRouter> = tx.values(ROUTERS)?;
            Ok(routers.into_iter().find(|r| r.name == name))
        })
    }

    async fn get_router(&self, id: &str) -> Result<Option<RawRouter>> {
        self.observe(id)
    }

    async fn create_router(&self, request: &RouterCreate) -> Result<RawRouter> {
        self.scope().transaction(|tx| {
            let external: RawNetwork = tx
                .get(NETWORKS, &request.external_network_id)?
                .ok_or_else(|| missing(ResourceKind::Network, &request.external_network_id))?;
            if !external.external {
                return Err(CloudError::Validation(format!(
                    "network {} is not external",
                    external.name
                )));
            }

            let router = RawRouter {
                id: new_id("router"),
                name: request.name.clone(),
                external_network_id: Some(external.id),
                interface_subnet_ids: Vec::new(),
                status: ProvisioningStatus::PendingCreate,
            };
            self.admit(tx, &router)?;
            tracing::debug!("memory: router {} ({})", router.name, router.id);
            Ok(router)
        })
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let router: RawRouter = tx
                .get(ROUTERS, id)?
                .ok_or_else(|| missing(ResourceKind::Router, id))?;
            if !router.interface_subnet_ids.is_empty() {
                return Err(CloudError::ResourceInUse(format!(
                    "router {} still has {} interface(s)",
                    router.name,
                    router.interface_subnet_ids.len()
                )));
            }
            self.retire::<RawRouter>(tx, id)?;
            Ok(())
        })
    }

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            self.refuse_create(tx, ResourceKind::RouterInterface)?;
            let mut router: RawRouter = tx
                .get(ROUTERS, router_id)?
                .ok_or_else(|| missing(ResourceKind::Router, router_id))?;
            if !tx.contains(SUBNETS, subnet_id) {
                return Err(missing(ResourceKind::Subnet, subnet_id));
            }
            if router.interface_subnet_ids.iter().any(|s| s == subnet_id) {
                return Err(CloudError::ResourceAlreadyExists(format!(
                    "router {} already has an interface on subnet {}",
                    router.name, subnet_id
                )));
            }
            router.interface_subnet_ids.push(subnet_id.to_string());
            tx.put(ROUTERS, router_id, &router)?;
            tracing::debug!("memory: router {} bound to subnet {}", router.name, subnet_id);
            Ok(())
        })
    }

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            self.refuse_delete(tx, ResourceKind::RouterInterface, subnet_id)?;
            let mut router: RawRouter = tx
                .get(ROUTERS, router_id)?
                .ok_or_else(|| missing(ResourceKind::Router, router_id))?;
            let before = router.interface_subnet_ids.len();
            router.interface_subnet_ids.retain(|s| s != subnet_id);
            if router.interface_subnet_ids.len() == before {
                return Err(missing(ResourceKind::RouterInterface, subnet_id));
            }
            tx.put(ROUTERS, router_id, &router)?;
            tracing::debug!("memory: router {} unbound from subnet {}", router.name, subnet_id);
            Ok(())
        })
    }
}
