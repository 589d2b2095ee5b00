//! Backend client traits
//!
//! Every cloud backend implements these capability-scoped traits. The
//! provisioners are written once against them and never see a backend's wire
//! format. Each creation call returns as soon as the backend has accepted the
//! request; readiness is observed through the `get_*` calls.

use crate::error::Result;
use crate::handler::TagBinder;
use crate::metadata::MetadataStore;
use crate::model::Protocol;
use crate::poller::HasStatus;
use crate::status::{OperatingStatus, ProvisioningStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Virtual network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNetwork {
    pub id: String,
    pub name: String,
    pub cidr: Option<String>,
    pub subnet_ids: Vec<String>,
    /// Gateway network used for public addresses
    pub external: bool,
    pub status: ProvisioningStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSubnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRouter {
    pub id: String,
    pub name: String,
    pub external_network_id: Option<String>,
    /// Subnets with an interface on this router
    pub interface_subnet_ids: Vec<String>,
    pub status: ProvisioningStatus,
}

/// Fixed (private) address of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAddress {
    pub address: String,
    pub subnet_id: String,
}

/// Compute instance, as far as load balancing and network deletion care
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawServer {
    pub id: String,
    pub name: String,
    pub addresses: Vec<FixedAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLoadBalancer {
    pub id: String,
    pub name: String,
    pub vip_network_id: String,
    pub vip_subnet_id: String,
    pub vip_port_id: String,
    pub vip_address: String,
    pub pool_ids: Vec<String>,
    pub listener_ids: Vec<String>,
    pub status: ProvisioningStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPool {
    pub id: String,
    pub name: String,
    pub load_balancer_id: String,
    pub protocol: String,
    pub description: String,
    pub monitor_id: Option<String>,
    pub status: ProvisioningStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMonitor {
    pub id: String,
    pub name: String,
    pub pool_id: String,
    pub protocol: String,
    pub delay: i32,
    pub timeout: i32,
    pub max_retries: i32,
    pub status: ProvisioningStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMember {
    pub id: String,
    pub name: String,
    pub pool_id: String,
    pub address: String,
    pub subnet_id: String,
    pub protocol_port: u16,
    pub status: ProvisioningStatus,
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListener {
    pub id: String,
    pub name: String,
    pub load_balancer_id: String,
    pub protocol: String,
    pub protocol_port: u16,
    pub default_pool_id: Option<String>,
    pub status: ProvisioningStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFloatingIp {
    pub id: String,
    pub address: String,
    pub network_id: String,
    pub port_id: Option<String>,
}

macro_rules! has_status {
    ($($ty:ty),* $(,)?) => {
        $(impl HasStatus for $ty {
            fn provisioning_status(&self) -> ProvisioningStatus {
                self.status
            }
        })*
    };
}

has_status!(
    RawNetwork,
    RawRouter,
    RawLoadBalancer,
    RawPool,
    RawMonitor,
    RawMember,
    RawListener
);

#[derive(Debug, Clone)]
pub struct NetworkCreate {
    pub name: String,
    pub cidr: String,
}

#[derive(Debug, Clone)]
pub struct SubnetCreate {
    pub network_id: String,
    pub name: String,
    pub cidr: String,
}

#[derive(Debug, Clone)]
pub struct RouterCreate {
    pub name: String,
    pub external_network_id: String,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerCreate {
    pub name: String,
    pub vip_network_id: String,
    pub vip_subnet_id: String,
}

#[derive(Debug, Clone)]
pub struct PoolCreate {
    pub load_balancer_id: String,
    pub name: String,
    pub protocol: Protocol,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct MonitorCreate {
    pub pool_id: String,
    pub name: String,
    pub protocol: Protocol,
    pub delay: i32,
    pub timeout: i32,
    pub max_retries: i32,
}

#[derive(Debug, Clone)]
pub struct MemberCreate {
    pub name: String,
    pub address: String,
    pub subnet_id: String,
    pub protocol_port: u16,
}

#[derive(Debug, Clone)]
pub struct ListenerCreate {
    pub load_balancer_id: String,
    pub name: String,
    pub protocol: Protocol,
    pub protocol_port: u16,
    pub default_pool_id: Option<String>,
}

/// Networks, subnets and routers
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<RawNetwork>>;

    async fn get_network(&self, id: &str) -> Result<Option<RawNetwork>>;

    async fn create_network(&self, request: &NetworkCreate) -> Result<RawNetwork>;

    /// Delete a network together with its (unused) subnets
    async fn delete_network(&self, id: &str) -> Result<()>;

    /// Id of the gateway network that public addresses come from
    async fn external_network_id(&self) -> Result<String>;

    async fn get_subnet(&self, id: &str) -> Result<Option<RawSubnet>>;

    async fn create_subnet(&self, request: &SubnetCreate) -> Result<RawSubnet>;

    async fn delete_subnet(&self, id: &str) -> Result<()>;

    async fn find_router(&self, name: &str) -> Result<Option<RawRouter>>;

    async fn get_router(&self, id: &str) -> Result<Option<RawRouter>>;

    async fn create_router(&self, request: &RouterCreate) -> Result<RawRouter>;

    async fn delete_router(&self, id: &str) -> Result<()>;

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;
}

/// Read-only view of compute instances
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn list_servers(&self) -> Result<Vec<RawServer>>;

    /// Look a server up by its exact name
    async fn find_server(&self, name: &str) -> Result<Option<RawServer>>;
}

/// Listener and pool protocols a load-balancer backend accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LbCapabilities {
    pub listener_protocols: Vec<Protocol>,
    pub pool_protocols: Vec<Protocol>,
}

impl Default for LbCapabilities {
    fn default() -> Self {
        Self {
            listener_protocols: vec![Protocol::Tcp],
            pool_protocols: vec![Protocol::Tcp],
        }
    }
}

/// Load balancers and their children
#[async_trait]
pub trait LoadBalancerBackend: Send + Sync {
    fn capabilities(&self) -> LbCapabilities {
        LbCapabilities::default()
    }

    /// Structured per-object metadata, when the backend has one
    fn metadata(&self) -> Option<&dyn MetadataStore> {
        None
    }

    async fn list_load_balancers(&self) -> Result<Vec<RawLoadBalancer>>;

    async fn get_load_balancer(&self, id: &str) -> Result<Option<RawLoadBalancer>>;

    async fn create_load_balancer(&self, request: &LoadBalancerCreate) -> Result<RawLoadBalancer>;

    /// Delete a load balancer; with `cascade` its children go too
    async fn delete_load_balancer(&self, id: &str, cascade: bool) -> Result<()>;

    async fn get_pool(&self, id: &str) -> Result<Option<RawPool>>;

    async fn create_pool(&self, request: &PoolCreate) -> Result<RawPool>;

    async fn update_pool_description(&self, id: &str, description: &str) -> Result<RawPool>;

    async fn delete_pool(&self, id: &str) -> Result<()>;

    async fn get_monitor(&self, id: &str) -> Result<Option<RawMonitor>>;

    async fn create_monitor(&self, request: &MonitorCreate) -> Result<RawMonitor>;

    async fn delete_monitor(&self, id: &str) -> Result<()>;

    async fn list_members(&self, pool_id: &str) -> Result<Vec<RawMember>>;

    async fn get_member(&self, pool_id: &str, id: &str) -> Result<Option<RawMember>>;

    async fn create_member(&self, pool_id: &str, request: &MemberCreate) -> Result<RawMember>;

    async fn delete_member(&self, pool_id: &str, id: &str) -> Result<()>;

    async fn get_listener(&self, id: &str) -> Result<Option<RawListener>>;

    async fn create_listener(&self, request: &ListenerCreate) -> Result<RawListener>;

    async fn update_listener_pool(&self, id: &str, pool_id: Option<&str>) -> Result<RawListener>;

    async fn delete_listener(&self, id: &str) -> Result<()>;

    async fn find_floating_ip(&self, port_id: &str) -> Result<Option<RawFloatingIp>>;

    async fn allocate_floating_ip(&self, network_id: &str, port_id: &str) -> Result<RawFloatingIp>;

    async fn release_floating_ip(&self, id: &str) -> Result<()>;
}

/// The backend clients one provisioner works with
#[derive(Clone)]
pub struct CloudClients {
    pub network: Arc<dyn NetworkBackend>,
    pub load_balancer: Arc<dyn LoadBalancerBackend>,
    pub compute: Arc<dyn ComputeBackend>,
    pub tags: Option<Arc<dyn TagBinder>>,
}

impl CloudClients {
    pub fn new(
        network: Arc<dyn NetworkBackend>,
        load_balancer: Arc<dyn LoadBalancerBackend>,
        compute: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            network,
            load_balancer,
            compute,
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: Arc<dyn TagBinder>) -> Self {
        self.tags = Some(tags);
        self
    }
}
