mod common;

use common::World;
use nimbus_cloud::{
    CloudError, FailureOutcome, Iid, KeyValue, NOTICE_KEY, NetworkBackend, ResourceKind,
    SubnetInfo, VpcHandler, VpcRequest,
};
use nimbus_cloud_memory::Fault;

#[tokio::test(start_paused = true)]
async fn test_create_vpc_binds_router_and_subnet() {
    let world = World::new();

    let applied = world
        .vpcs()
        .create_vpc(VpcRequest::new("net-a", "10.0.0.0/16").with_subnet(SubnetInfo::new("sub-a", "10.0.0.0/24")))
        .await
        .unwrap();
    assert!(applied.is_clean());

    let vpc = world.vpcs().get_vpc(&Iid::by_name("net-a")).await.unwrap();
    assert_eq!(vpc.ipv4_cidr, "10.0.0.0/16");
    assert_eq!(vpc.subnets.len(), 1);
    let subnet = vpc.subnet("sub-a").unwrap();
    assert_eq!(subnet.ipv4_cidr, "10.0.0.0/24");

    let router = world
        .cloud
        .find_router("net-a-Router")
        .await
        .unwrap()
        .expect("router created");
    assert_eq!(router.interface_subnet_ids, vec![subnet.iid.system_id.clone()]);

    let census = world.cloud.census().unwrap();
    assert_eq!(census.count(ResourceKind::Network), 1);
    assert_eq!(census.count(ResourceKind::Subnet), 1);
    assert_eq!(census.count(ResourceKind::Router), 1);
    assert_eq!(census.count(ResourceKind::RouterInterface), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_refused_while_instance_attached() {
    let world = World::new();
    let vpc = world.vpc("net-a", "sub-a").await;
    world.server("vm-1", &vpc, "10.0.0.5");

    let err = world.vpcs().delete_vpc(&vpc.iid).await.unwrap_err();
    assert!(matches!(err, CloudError::ResourceInUse(_)));
    assert!(err.to_string().contains("vm-1"));

    let still = world.vpcs().get_vpc(&vpc.iid).await.unwrap();
    assert_eq!(still.subnets.len(), 1);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::Subnet), 1);

    assert!(world.cloud.remove_server("vm-1").unwrap());
    assert!(world.vpcs().delete_vpc(&vpc.iid).await.unwrap());
    assert!(world.cloud.census().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_name_is_rejected() {
    let world = World::new();
    world.vpc("net-a", "sub-a").await;

    let err = world
        .vpcs()
        .create_vpc(VpcRequest::new("NET-A", "10.1.0.0/16").with_subnet(SubnetInfo::new("s", "10.1.0.0/24")))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::Network), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_subnet_creates_nothing() {
    let world = World::new();

    let err = world
        .vpcs()
        .create_vpc(VpcRequest::new("net-a", "10.0.0.0/16").with_subnet(SubnetInfo::new("sub-a", "10.9.0.0/24")))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.failure_outcome(), FailureOutcome::NothingCreated);
    assert!(world.cloud.census().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_router_failure_rolls_back_network() {
    let world = World::new();
    world.cloud.inject(ResourceKind::Router, Fault::fail_create()).unwrap();

    let err = world
        .vpcs()
        .create_vpc(VpcRequest::new("net-a", "10.0.0.0/16").with_subnet(SubnetInfo::new("sub-a", "10.0.0.0/24")))
        .await
        .unwrap_err();
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert!(matches!(err.root_cause(), CloudError::ApiError(_)));
    assert!(world.cloud.census().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interface_failure_rolls_back_everything() {
    let world = World::new();
    world
        .cloud
        .inject(ResourceKind::RouterInterface, Fault::fail_create())
        .unwrap();

    let request = VpcRequest::new("net-a", "10.0.0.0/16")
        .with_subnet(SubnetInfo::new("sub-a", "10.0.0.0/24"))
        .with_subnet(SubnetInfo::new("sub-b", "10.0.1.0/24"));
    let err = world.vpcs().create_vpc(request).await.unwrap_err();

    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert!(world.cloud.census().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_network_stuck_in_error_is_removed() {
    let world = World::new();
    world
        .cloud
        .inject(ResourceKind::Network, Fault::error_state())
        .unwrap();

    let err = world
        .vpcs()
        .create_vpc(VpcRequest::new("net-a", "10.0.0.0/16").with_subnet(SubnetInfo::new("sub-a", "10.0.0.0/24")))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), CloudError::TerminalState { .. }));
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert!(world.cloud.census().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_add_and_remove_subnet() {
    let world = World::new();
    let vpc = world.vpc("net-a", "sub-a").await;

    let grown = world
        .vpcs()
        .add_subnet(&vpc.iid, SubnetInfo::new("sub-b", "10.0.1.0/24"))
        .await
        .unwrap();
    assert_eq!(grown.subnets.len(), 2);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::RouterInterface), 2);

    let err = world
        .vpcs()
        .add_subnet(&vpc.iid, SubnetInfo::new("sub-c", "10.0.1.128/25"))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert!(world
        .vpcs()
        .remove_subnet(&vpc.iid, &Iid::by_name("sub-b"))
        .await
        .unwrap());
    let shrunk = world.vpcs().get_vpc(&vpc.iid).await.unwrap();
    assert_eq!(shrunk.subnets.len(), 1);
    assert!(shrunk.subnet("sub-b").is_none());
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::RouterInterface), 1);
}

#[tokio::test(start_paused = true)]
async fn test_list_skips_external_network() {
    let world = World::new();
    world.vpc("net-a", "sub-a").await;

    let vpcs = world.vpcs().list_vpc().await.unwrap();
    assert_eq!(vpcs.len(), 1);
    assert_eq!(vpcs[0].iid.name_id, "net-a");
}

#[tokio::test(start_paused = true)]
async fn test_tags_applied_or_reported() {
    let world = World::new();
    let request = VpcRequest::new("net-a", "10.0.0.0/16")
        .with_subnet(SubnetInfo::new("sub-a", "10.0.0.0/24"))
        .with_tag("env", "dev");
    let applied = world.vpcs().create_vpc(request).await.unwrap();
    assert!(applied.is_clean());
    assert_eq!(applied.info.tags, vec![KeyValue::new("env", "dev")]);

    world.cloud.fail_tags(true).unwrap();
    let request = VpcRequest::new("net-b", "10.1.0.0/16")
        .with_subnet(SubnetInfo::new("sub-b", "10.1.0.0/24"))
        .with_tag("env", "dev");
    let applied = world.vpcs().create_vpc(request).await.unwrap();
    assert_eq!(applied.notices.len(), 1);
    assert_eq!(applied.notices[0].subject, "tag");
    assert!(applied.info.tags.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_add_subnet_reports_tag_failures() {
    let world = World::new();
    let vpc = world.vpc("net-a", "sub-a").await;
    world.cloud.fail_tags(true).unwrap();

    let mut subnet = SubnetInfo::new("sub-b", "10.0.1.0/24");
    subnet.tags.push(KeyValue::new("tier", "web"));
    let grown = world.vpcs().add_subnet(&vpc.iid, subnet).await.unwrap();

    assert!(grown.subnet("sub-b").is_some());
    let notices: Vec<&KeyValue> = grown
        .key_values
        .iter()
        .filter(|kv| kv.key == NOTICE_KEY)
        .collect();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].value.contains("sub-b"));

    // Notices belong to the call, not to the VPC.
    let fetched = world.vpcs().get_vpc(&vpc.iid).await.unwrap();
    assert!(fetched.key_values.iter().all(|kv| kv.key != NOTICE_KEY));
}
