use super::{
    FLOATING_IPS, LISTENERS, LOAD_BALANCERS, MEMBERS, METADATA, MONITORS, MemoryCloud, NETWORKS,
    POOLS, SUBNETS, new_id,
};
use crate::store::Transaction;
use async_trait::async_trait;
use chrono::Utc;
use nimbus_cloud::{
    CloudError, Ipv4Cidr, LbCapabilities, ListenerCreate, LoadBalancerBackend,
    LoadBalancerCreate, MemberCreate, MetadataStore, MonitorCreate, OperatingStatus, PoolCreate,
    Protocol, ProvisioningStatus, RawFloatingIp, RawListener, RawLoadBalancer, RawMember,
    RawMonitor, RawNetwork, RawPool, RawSubnet, ResourceKind, Result,
};
use std::net::Ipv4Addr;

/// First host offset handed out for VIPs in a subnet
const FIRST_VIP_HOST: u32 = 200;

fn missing(kind: ResourceKind, id: &str) -> CloudError {
    CloudError::ResourceNotFound(format!("{} {}", kind, id))
}

fn load<T: serde::de::DeserializeOwned>(
    tx: &Transaction,
    table: &str,
    kind: ResourceKind,
    id: &str,
) -> Result<T> {
    tx.get(table, id)?.ok_or_else(|| missing(kind, id))
}

fn supported(offered: &[Protocol], protocol: Protocol, what: &str) -> Result<()> {
    if offered.contains(&protocol) {
        return Ok(());
    }
    Err(CloudError::Unsupported(format!(
        "{} protocol {} is not offered by this backend",
        what, protocol
    )))
}

/// Refuse a default pool that is foreign or already taken by another listener
fn check_default_pool(
    tx: &Transaction,
    lb_id: &str,
    pool_id: &str,
    listener_id: Option<&str>,
) -> Result<()> {
    let pool: RawPool = load(tx, POOLS, ResourceKind::Pool, pool_id)?;
    if pool.load_balancer_id != lb_id {
        return Err(CloudError::Validation(format!(
            "pool {} belongs to another load balancer",
            pool_id
        )));
    }
    let listeners: Vec<RawListener> = tx.values(LISTENERS)?;
    if let Some(other) = listeners
        .iter()
        .find(|l| l.default_pool_id.as_deref() == Some(pool_id) && Some(l.id.as_str()) != listener_id)
    {
        return Err(CloudError::Conflict(format!(
            "pool {} is already the default pool of listener {}",
            pool_id, other.id
        )));
    }
    Ok(())
}

impl MemoryCloud {
    /// Set the operating status the backend reports for a member
    pub fn set_member_operating_status(
        &self,
        pool_id: &str,
        member_name: &str,
        status: OperatingStatus,
    ) -> Result<usize> {
        self.scope().transaction(|tx| {
            let members: Vec<RawMember> = tx.values(MEMBERS)?;
            let mut changed = 0;
            for mut member in members
                .into_iter()
                .filter(|m| m.pool_id == pool_id && m.name == member_name)
            {
                member.operating_status = status;
                tx.put(MEMBERS, member.id.clone(), &member)?;
                changed += 1;
            }
            Ok(changed)
        })
    }

    fn allocate_vip(&self, tx: &mut Transaction, subnet: &RawSubnet) -> Result<String> {
        let cidr = Ipv4Cidr::new(&subnet.cidr)?;
        let offset = FIRST_VIP_HOST + self.next(tx, &format!("vip/{}", subnet.id))?;
        let address = Ipv4Addr::from(u32::from(cidr.network()).saturating_add(offset));
        if !cidr.contains_addr(address) {
            return Err(CloudError::Conflict(format!(
                "subnet {} has no free VIP address",
                subnet.name
            )));
        }
        Ok(address.to_string())
    }

    /// Drop a pool with its monitor and members right away
    fn drop_pool(&self, tx: &mut Transaction, pool_id: &str) -> Result<()> {
        let members: Vec<RawMember> = tx.values(MEMBERS)?;
        for member in members.iter().filter(|m| m.pool_id == pool_id) {
            self.purge(tx, MEMBERS, &member.id);
        }
        let monitors: Vec<RawMonitor> = tx.values(MONITORS)?;
        for monitor in monitors.iter().filter(|m| m.pool_id == pool_id) {
            self.purge(tx, MONITORS, &monitor.id);
        }
        self.purge(tx, POOLS, pool_id);
        tx.remove(METADATA, pool_id);
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerBackend for MemoryCloud {
    fn capabilities(&self) -> LbCapabilities {
        self.capabilities.clone()
    }

    fn metadata(&self) -> Option<&dyn MetadataStore> {
        if self.side_table {
            Some(self as &dyn MetadataStore)
        } else {
            None
        }
    }

    async fn list_load_balancers(&self) -> Result<Vec<RawLoadBalancer>> {
        self.read(ResourceKind::LoadBalancer, |tx| Ok(tx.values(LOAD_BALANCERS)?))
    }

    async fn get_load_balancer(&self, id: &str) -> Result<Option<RawLoadBalancer>> {
        self.observe(id)
    }

    async fn create_load_balancer(&self, request: &LoadBalancerCreate) -> Result<RawLoadBalancer> {
        self.scope().transaction(|tx| {
            let subnet: RawSubnet =
                load(tx, SUBNETS, ResourceKind::Subnet, &request.vip_subnet_id)?;
            if subnet.network_id != request.vip_network_id {
                return Err(CloudError::Validation(format!(
                    "subnet {} is not part of network {}",
                    subnet.name, request.vip_network_id
                )));
            }
            self.refuse_create(tx, ResourceKind::LoadBalancer)?;

            let lb = RawLoadBalancer {
                id: new_id("lb"),
                name: request.name.clone(),
                vip_network_id: request.vip_network_id.clone(),
                vip_subnet_id: subnet.id.clone(),
                vip_port_id: new_id("port"),
                vip_address: self.allocate_vip(tx, &subnet)?,
                pool_ids: Vec::new(),
                listener_ids: Vec::new(),
                status: ProvisioningStatus::PendingCreate,
                created_at: Utc::now(),
            };
            self.admit(tx, &lb)?;
            tracing::debug!("memory: load balancer {} ({}) at {}", lb.name, lb.id, lb.vip_address);
            Ok(lb)
        })
    }

    async fn delete_load_balancer(&self, id: &str, cascade: bool) -> Result<()> {
        self.scope().transaction(|tx| {
            self.refuse_delete(tx, ResourceKind::LoadBalancer, id)?;
            let mut lb: RawLoadBalancer = load(tx, LOAD_BALANCERS, ResourceKind::LoadBalancer, id)?;

            let children = lb.pool_ids.len() + lb.listener_ids.len();
            if children > 0 && !cascade {
                return Err(CloudError::ResourceInUse(format!(
                    "load balancer {} still has {} child object(s)",
                    lb.name, children
                )));
            }

            for listener_id in &lb.listener_ids {
                self.purge(tx, LISTENERS, listener_id);
            }
            for pool_id in &lb.pool_ids {
                self.drop_pool(tx, pool_id)?;
            }
            let addresses: Vec<RawFloatingIp> = tx.values(FLOATING_IPS)?;
            for address in addresses
                .iter()
                .filter(|a| a.port_id.as_deref() == Some(lb.vip_port_id.as_str()))
            {
                tx.remove(FLOATING_IPS, &address.id);
            }

            lb.pool_ids.clear();
            lb.listener_ids.clear();
            tx.put(LOAD_BALANCERS, id, &lb)?;
            self.retire::<RawLoadBalancer>(tx, id)?;
            Ok(())
        })
    }

    async fn get_pool(&self, id: &str) -> Result<Option<RawPool>> {
        self.observe(id)
    }

    async fn create_pool(&self, request: &PoolCreate) -> Result<RawPool> {
        supported(&self.capabilities.pool_protocols, request.protocol, "pool")?;
        self.scope().transaction(|tx| {
            let mut lb: RawLoadBalancer = load(
                tx,
                LOAD_BALANCERS,
                ResourceKind::LoadBalancer,
                &request.load_balancer_id,
            )?;

            let pool = RawPool {
                id: new_id("pool"),
                name: request.name.clone(),
                load_balancer_id: lb.id.clone(),
                protocol: request.protocol.as_str().to_string(),
                description: request.description.clone(),
                monitor_id: None,
                status: ProvisioningStatus::PendingCreate,
            };
            self.admit(tx, &pool)?;
            lb.pool_ids.push(pool.id.clone());
            tx.put(LOAD_BALANCERS, lb.id.clone(), &lb)?;
            tracing::debug!("memory: pool {} ({}) on {}", pool.name, pool.id, lb.name);
            Ok(pool)
        })
    }

    async fn update_pool_description(&self, id: &str, description: &str) -> Result<RawPool> {
        self.scope().transaction(|tx| {
            let mut pool: RawPool = load(tx, POOLS, ResourceKind::Pool, id)?;
            pool.description = description.to_string();
            tx.put(POOLS, id, &pool)?;
            self.touch::<RawPool>(tx, id)?;
            load(tx, POOLS, ResourceKind::Pool, id)
        })
    }

    async fn delete_pool(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let pool: RawPool = load(tx, POOLS, ResourceKind::Pool, id)?;

            let listeners: Vec<RawListener> = tx.values(LISTENERS)?;
            if let Some(listener) = listeners.iter().find(|l| l.default_pool_id.as_deref() == Some(id)) {
                return Err(CloudError::ResourceInUse(format!(
                    "pool {} is the default pool of listener {}",
                    pool.name, listener.id
                )));
            }

            if let Some(mut lb) =
                tx.get::<RawLoadBalancer>(LOAD_BALANCERS, &pool.load_balancer_id)?
            {
                lb.pool_ids.retain(|p| p != id);
                tx.put(LOAD_BALANCERS, lb.id.clone(), &lb)?;
            }
            let members: Vec<RawMember> = tx.values(MEMBERS)?;
            for member in members.iter().filter(|m| m.pool_id == id) {
                self.purge(tx, MEMBERS, &member.id);
            }
            if let Some(monitor_id) = pool.monitor_id.as_deref() {
                self.purge(tx, MONITORS, monitor_id);
            }
            self.retire::<RawPool>(tx, id)?;
            Ok(())
        })
    }

    async fn get_monitor(&self, id: &str) -> Result<Option<RawMonitor>> {
        self.observe(id)
    }

    async fn create_monitor(&self, request: &MonitorCreate) -> Result<RawMonitor> {
        if !request.protocol.is_health_check() {
            return Err(CloudError::Unsupported(format!(
                "health monitor protocol {}",
                request.protocol
            )));
        }
        self.scope().transaction(|tx| {
            let mut pool: RawPool = load(tx, POOLS, ResourceKind::Pool, &request.pool_id)?;
            if let Some(existing) = pool.monitor_id.as_deref() {
                return Err(CloudError::Conflict(format!(
                    "pool {} already has health monitor {}",
                    pool.name, existing
                )));
            }

            let monitor = RawMonitor {
                id: new_id("monitor"),
                name: request.name.clone(),
                pool_id: pool.id.clone(),
                protocol: request.protocol.as_str().to_string(),
                delay: request.delay,
                timeout: request.timeout,
                max_retries: request.max_retries,
                status: ProvisioningStatus::PendingCreate,
            };
            self.admit(tx, &monitor)?;
            pool.monitor_id = Some(monitor.id.clone());
            tx.put(POOLS, pool.id.clone(), &pool)?;
            self.touch::<RawPool>(tx, &pool.id)?;
            tracing::debug!("memory: health monitor {} on pool {}", monitor.id, pool.name);
            Ok(monitor)
        })
    }

    async fn delete_monitor(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let monitor = self.retire::<RawMonitor>(tx, id)?;
            if let Some(mut pool) = tx.get::<RawPool>(POOLS, &monitor.pool_id)? {
                if pool.monitor_id.as_deref() == Some(id) {
                    pool.monitor_id = None;
                    tx.put(POOLS, pool.id.clone(), &pool)?;
                }
                self.touch::<RawPool>(tx, &monitor.pool_id)?;
            }
            Ok(())
        })
    }

    async fn list_members(&self, pool_id: &str) -> Result<Vec<RawMember>> {
        self.read(ResourceKind::PoolMember, |tx| {
            if !tx.contains(POOLS, pool_id) {
                return Err(missing(ResourceKind::Pool, pool_id));
            }
            let members: Vec<RawMember> = tx.values(MEMBERS)?;
            Ok(members.into_iter().filter(|m| m.pool_id == pool_id).collect())
        })
    }

    async fn get_member(&self, pool_id: &str, id: &str) -> Result<Option<RawMember>> {
        let member: Option<RawMember> = self.observe(id)?;
        Ok(member.filter(|m| m.pool_id == pool_id))
    }

    async fn create_member(&self, pool_id: &str, request: &MemberCreate) -> Result<RawMember> {
        self.scope().transaction(|tx| {
            let pool: RawPool = load(tx, POOLS, ResourceKind::Pool, pool_id)?;
            if !tx.contains(SUBNETS, &request.subnet_id) {
                return Err(missing(ResourceKind::Subnet, &request.subnet_id));
            }

            let members: Vec<RawMember> = tx.values(MEMBERS)?;
            if members.iter().any(|m| {
                m.pool_id == pool_id
                    && m.address == request.address
                    && m.protocol_port == request.protocol_port
            }) {
                return Err(CloudError::ResourceAlreadyExists(format!(
                    "member {}:{} in pool {}",
                    request.address, request.protocol_port, pool.name
                )));
            }

            let member = RawMember {
                id: new_id("member"),
                name: request.name.clone(),
                pool_id: pool.id.clone(),
                address: request.address.clone(),
                subnet_id: request.subnet_id.clone(),
                protocol_port: request.protocol_port,
                status: ProvisioningStatus::PendingCreate,
                operating_status: OperatingStatus::Online,
            };
            self.admit(tx, &member)?;
            self.touch::<RawPool>(tx, pool_id)?;
            tracing::debug!(
                "memory: member {} {}:{} in pool {}",
                member.name,
                member.address,
                member.protocol_port,
                pool.name
            );
            Ok(member)
        })
    }

    async fn delete_member(&self, pool_id: &str, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let member: RawMember = load(tx, MEMBERS, ResourceKind::PoolMember, id)?;
            if member.pool_id != pool_id {
                return Err(missing(ResourceKind::PoolMember, id));
            }
            self.retire::<RawMember>(tx, id)?;
            self.touch::<RawPool>(tx, pool_id)?;
            Ok(())
        })
    }

    async fn get_listener(&self, id: &str) -> Result<Option<RawListener>> {
        self.observe(id)
    }

    async fn create_listener(&self, request: &ListenerCreate) -> Result<RawListener> {
        supported(&self.capabilities.listener_protocols, request.protocol, "listener")?;
        self.scope().transaction(|tx| {
            let mut lb: RawLoadBalancer = load(
                tx,
                LOAD_BALANCERS,
                ResourceKind::LoadBalancer,
                &request.load_balancer_id,
            )?;

            let listeners: Vec<RawListener> = tx.values(LISTENERS)?;
            if listeners
                .iter()
                .any(|l| l.load_balancer_id == lb.id && l.protocol_port == request.protocol_port)
            {
                return Err(CloudError::ResourceAlreadyExists(format!(
                    "listener on port {} of load balancer {}",
                    request.protocol_port, lb.name
                )));
            }
            if let Some(pool_id) = request.default_pool_id.as_deref() {
                check_default_pool(tx, &lb.id, pool_id, None)?;
            }

            let listener = RawListener {
                id: new_id("listener"),
                name: request.name.clone(),
                load_balancer_id: lb.id.clone(),
                protocol: request.protocol.as_str().to_string(),
                protocol_port: request.protocol_port,
                default_pool_id: request.default_pool_id.clone(),
                status: ProvisioningStatus::PendingCreate,
            };
            self.admit(tx, &listener)?;
            lb.listener_ids.push(listener.id.clone());
            tx.put(LOAD_BALANCERS, lb.id.clone(), &lb)?;
            tracing::debug!(
                "memory: listener {} on port {} of {}",
                listener.id,
                listener.protocol_port,
                lb.name
            );
            Ok(listener)
        })
    }

    async fn update_listener_pool(&self, id: &str, pool_id: Option<&str>) -> Result<RawListener> {
        self.scope().transaction(|tx| {
            let mut listener: RawListener = load(tx, LISTENERS, ResourceKind::Listener, id)?;
            if let Some(pool_id) = pool_id {
                check_default_pool(tx, &listener.load_balancer_id, pool_id, Some(id))?;
            }
            listener.default_pool_id = pool_id.map(str::to_string);
            tx.put(LISTENERS, id, &listener)?;
            self.touch::<RawListener>(tx, id)?;
            load(tx, LISTENERS, ResourceKind::Listener, id)
        })
    }

    async fn delete_listener(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            let mut listener = self.retire::<RawListener>(tx, id)?;
            listener.default_pool_id = None;
            tx.put(LISTENERS, id, &listener)?;
            if let Some(mut lb) =
                tx.get::<RawLoadBalancer>(LOAD_BALANCERS, &listener.load_balancer_id)?
            {
                lb.listener_ids.retain(|l| l != id);
                tx.put(LOAD_BALANCERS, lb.id.clone(), &lb)?;
            }
            Ok(())
        })
    }

    async fn find_floating_ip(&self, port_id: &str) -> Result<Option<RawFloatingIp>> {
        self.read(ResourceKind::PublicAddress, |tx| {
            let addresses: Vec<RawFloatingIp> = tx.values(FLOATING_IPS)?;
            Ok(addresses
                .into_iter()
                .find(|a| a.port_id.as_deref() == Some(port_id)))
        })
    }

    async fn allocate_floating_ip(&self, network_id: &str, port_id: &str) -> Result<RawFloatingIp> {
        self.scope().transaction(|tx| {
            self.refuse_create(tx, ResourceKind::PublicAddress)?;
            let network: RawNetwork = load(tx, NETWORKS, ResourceKind::Network, network_id)?;
            if !network.external {
                return Err(CloudError::Validation(format!(
                    "network {} is not external",
                    network.name
                )));
            }

            let addresses: Vec<RawFloatingIp> = tx.values(FLOATING_IPS)?;
            if let Some(taken) = addresses
                .iter()
                .find(|a| a.port_id.as_deref() == Some(port_id))
            {
                return Err(CloudError::Conflict(format!(
                    "port {} already has public address {}",
                    port_id, taken.address
                )));
            }

            let host = self.next(tx, "floating-ip")?;
            let address = RawFloatingIp {
                id: new_id("fip"),
                address: Ipv4Addr::from(u32::from(Ipv4Addr::new(203, 0, 113, 0)) + host).to_string(),
                network_id: network.id,
                port_id: Some(port_id.to_string()),
            };
            tx.put(FLOATING_IPS, address.id.clone(), &address)?;
            tracing::debug!("memory: public address {} on port {}", address.address, port_id);
            Ok(address)
        })
    }

    async fn release_floating_ip(&self, id: &str) -> Result<()> {
        self.scope().transaction(|tx| {
            self.refuse_delete(tx, ResourceKind::PublicAddress, id)?;
            if !tx.remove(FLOATING_IPS, id) {
                return Err(missing(ResourceKind::PublicAddress, id));
            }
            tracing::debug!("memory: public address {} released", id);
            Ok(())
        })
    }
}
