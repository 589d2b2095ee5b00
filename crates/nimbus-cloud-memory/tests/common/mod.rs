//! Shared fixtures for scenario tests
#![allow(dead_code)]

use nimbus_cloud::{
    CloudConnection, HealthCheckerInfo, Iid, ListenerInfo, LoadBalancerProvisioner,
    NetworkProvisioner, NlbRequest, PollConfig, ProvisionSettings, SubnetInfo, VmGroupInfo,
    VpcHandler, VpcInfo, VpcRequest,
};
use nimbus_cloud_memory::MemoryCloud;
use std::sync::Arc;
use std::time::Duration;

pub const POLL_INTERVAL_MS: u64 = 100;
pub const POLL_ATTEMPTS: u32 = 20;

pub fn settings() -> ProvisionSettings {
    let poll = PollConfig::new(Duration::from_millis(POLL_INTERVAL_MS), POLL_ATTEMPTS);
    ProvisionSettings {
        poll,
        delete_poll: poll,
    }
}

/// One in-memory cloud with a connection on top of it
pub struct World {
    pub cloud: Arc<MemoryCloud>,
    pub connection: CloudConnection,
}

impl World {
    pub fn new() -> Self {
        Self::with(MemoryCloud::isolated("test").unwrap())
    }

    pub fn with(cloud: MemoryCloud) -> Self {
        Self::with_settings(cloud, settings())
    }

    pub fn with_settings(cloud: MemoryCloud, settings: ProvisionSettings) -> Self {
        let cloud = Arc::new(cloud);
        let connection = CloudConnection::new(cloud.clients(), settings);
        Self { cloud, connection }
    }

    pub fn vpcs(&self) -> NetworkProvisioner {
        self.connection.vpc_handler()
    }

    pub fn nlbs(&self) -> LoadBalancerProvisioner {
        self.connection.nlb_handler()
    }

    /// VPC `name` 10.0.0.0/16 with one subnet 10.0.0.0/24
    pub async fn vpc(&self, name: &str, subnet: &str) -> VpcInfo {
        let request = VpcRequest::new(name, "10.0.0.0/16")
            .with_subnet(SubnetInfo::new(subnet, "10.0.0.0/24"));
        self.vpcs().create_vpc(request).await.unwrap().into_info()
    }

    /// Instance with an address on the first subnet of `vpc`
    pub fn server(&self, name: &str, vpc: &VpcInfo, address: &str) {
        let subnet_id = &vpc.subnets[0].iid.system_id;
        self.cloud.add_server(name, subnet_id, address).unwrap();
    }

    /// VPC `vpc-1` holding the given instances
    pub async fn vpc_with_servers(&self, names: &[&str]) -> VpcInfo {
        let vpc = self.vpc("vpc-1", "sub-1").await;
        for (i, name) in names.iter().enumerate() {
            self.server(name, &vpc, &format!("10.0.0.{}", 10 + i));
        }
        vpc
    }
}

/// TCP load balancer: listener 80, VM group 8080, TCP health checker
pub fn nlb_request(name: &str, vpc: &VpcInfo, vms: &[&str]) -> NlbRequest {
    let mut vm_group = VmGroupInfo::new("TCP", "8080");
    for vm in vms {
        vm_group = vm_group.with_vm(*vm);
    }
    NlbRequest {
        iid: Iid::by_name(name),
        vpc_iid: vpc.iid.clone(),
        listener: ListenerInfo::new("TCP", "80"),
        vm_group,
        health_checker: HealthCheckerInfo::new("TCP", 10, 5, 3),
        ..Default::default()
    }
}

pub fn names(vms: &[Iid]) -> Vec<String> {
    let mut names: Vec<String> = vms.iter().map(|vm| vm.name_id.clone()).collect();
    names.sort();
    names
}
