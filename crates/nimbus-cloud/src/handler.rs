//! Capability interfaces offered to callers

use crate::error::Result;
use crate::model::{
    Applied, HealthCheckerInfo, HealthInfo, Iid, KeyValue, ListenerInfo, NlbInfo, NlbRequest,
    ResourceType, SubnetInfo, VmGroupInfo, VpcInfo, VpcRequest,
};
use async_trait::async_trait;

/// Virtual network capability
#[async_trait]
pub trait VpcHandler: Send + Sync {
    /// Create a network, its router and subnets. All or nothing; tag
    /// failures are reported as notices.
    async fn create_vpc(&self, request: VpcRequest) -> Result<Applied<VpcInfo>>;

    async fn get_vpc(&self, iid: &Iid) -> Result<VpcInfo>;

    async fn list_vpc(&self) -> Result<Vec<VpcInfo>>;

    /// Refused while any instance has an address on one of its subnets
    async fn delete_vpc(&self, iid: &Iid) -> Result<bool>;

    /// Tag failures come back as `Notice` entries in `key_values`
    async fn add_subnet(&self, vpc: &Iid, subnet: SubnetInfo) -> Result<VpcInfo>;

    async fn remove_subnet(&self, vpc: &Iid, subnet: &Iid) -> Result<bool>;
}

/// Network load balancer capability
#[async_trait]
pub trait NlbHandler: Send + Sync {
    async fn create_nlb(&self, request: NlbRequest) -> Result<Applied<NlbInfo>>;

    async fn get_nlb(&self, iid: &Iid) -> Result<NlbInfo>;

    async fn list_nlb(&self) -> Result<Vec<NlbInfo>>;

    async fn delete_nlb(&self, iid: &Iid) -> Result<bool>;

    async fn change_listener(&self, iid: &Iid, listener: ListenerInfo) -> Result<Applied<ListenerInfo>>;

    async fn change_vm_group(&self, iid: &Iid, group: VmGroupInfo) -> Result<Applied<VmGroupInfo>>;

    /// Attach every VM or none
    async fn add_vms(&self, iid: &Iid, vms: &[Iid]) -> Result<VmGroupInfo>;

    /// Detach every VM or none
    async fn remove_vms(&self, iid: &Iid, vms: &[Iid]) -> Result<bool>;

    async fn change_health_checker(
        &self,
        iid: &Iid,
        checker: HealthCheckerInfo,
    ) -> Result<Applied<HealthCheckerInfo>>;

    async fn get_vm_group_health(&self, iid: &Iid) -> Result<HealthInfo>;
}

/// Attaches tags to existing resources
#[async_trait]
pub trait TagBinder: Send + Sync {
    async fn add_tag(&self, resource_type: ResourceType, iid: &Iid, tag: &KeyValue) -> Result<KeyValue>;

    async fn list_tags(&self, resource_type: ResourceType, iid: &Iid) -> Result<Vec<KeyValue>>;
}
