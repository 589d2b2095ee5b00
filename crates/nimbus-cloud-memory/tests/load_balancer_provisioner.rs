mod common;

use common::{POLL_ATTEMPTS, World, names, nlb_request, settings};
use nimbus_cloud::{
    CloudError, FailureOutcome, HealthCheckerInfo, Iid, ListenerInfo, LoadBalancerBackend,
    MEMBER_PORT_KEY, NlbHandler, OperatingStatus, PollConfig, ProvisionSettings, ResourceKind,
    STALE_MEMBERS_KEY, VmGroupInfo, VpcInfo, encode_port_description,
};
use std::time::Duration;
use nimbus_cloud_memory::{Fault, MemoryCloud};

async fn ready(world: &World, vms: &[&str]) -> (VpcInfo, Iid) {
    let vpc = world.vpc_with_servers(&["web-1", "web-2", "web-3"]).await;
    let applied = world
        .nlbs()
        .create_nlb(nlb_request("lb-1", &vpc, vms))
        .await
        .unwrap();
    (vpc, applied.info.iid)
}

fn lb_objects(world: &World) -> usize {
    let census = world.cloud.census().unwrap();
    [
        ResourceKind::LoadBalancer,
        ResourceKind::Pool,
        ResourceKind::HealthMonitor,
        ResourceKind::PoolMember,
        ResourceKind::Listener,
        ResourceKind::PublicAddress,
    ]
    .into_iter()
    .map(|kind| census.count(kind))
    .sum()
}

#[tokio::test(start_paused = true)]
async fn test_create_and_get() {
    let world = World::new();
    let (vpc, iid) = ready(&world, &["web-1", "web-2"]).await;

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.iid.name_id, "lb-1");
    assert_eq!(info.vpc_iid, vpc.iid);
    assert_eq!(info.listener.protocol, "TCP");
    assert_eq!(info.listener.port, "80");
    assert_eq!(info.listener.ip, "203.0.113.1");
    assert_eq!(info.vm_group.port, "8080");
    assert_eq!(names(&info.vm_group.vms), vec!["web-1", "web-2"]);
    assert_eq!(info.health_checker.protocol, "TCP");
    assert_eq!(info.health_checker.port, "8080");
    assert_eq!(info.health_checker.interval, 10);
    assert_eq!(info.health_checker.timeout, 5);
    assert_eq!(info.health_checker.threshold, 3);
    assert!(info.created_time.is_some());

    let census = world.cloud.census().unwrap();
    assert_eq!(census.count(ResourceKind::LoadBalancer), 1);
    assert_eq!(census.count(ResourceKind::Pool), 1);
    assert_eq!(census.count(ResourceKind::HealthMonitor), 1);
    assert_eq!(census.count(ResourceKind::PoolMember), 2);
    assert_eq!(census.count(ResourceKind::Listener), 1);
    assert_eq!(census.count(ResourceKind::PublicAddress), 1);

    let listed = world.nlbs().list_nlb().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_name_is_rejected() {
    let world = World::new();
    let (vpc, _) = ready(&world, &["web-1"]).await;

    let err = world
        .nlbs()
        .create_nlb(nlb_request("LB-1", &vpc, &["web-2"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));
    assert_eq!(err.failure_outcome(), FailureOutcome::NothingCreated);
}

#[tokio::test(start_paused = true)]
async fn test_failure_at_each_step_leaves_nothing() {
    for kind in [
        ResourceKind::Pool,
        ResourceKind::HealthMonitor,
        ResourceKind::PoolMember,
        ResourceKind::Listener,
        ResourceKind::PublicAddress,
    ] {
        let world = World::new();
        let vpc = world.vpc_with_servers(&["web-1", "web-2"]).await;
        world.cloud.inject(kind, Fault::fail_create()).unwrap();

        let err = world
            .nlbs()
            .create_nlb(nlb_request("lb-1", &vpc, &["web-1", "web-2"]))
            .await
            .unwrap_err();

        assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp, "failing {}", kind);
        assert!(matches!(err.root_cause(), CloudError::ApiError(_)), "failing {}", kind);
        assert_eq!(lb_objects(&world), 0, "failing {}", kind);
        assert!(world.nlbs().list_nlb().await.unwrap().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_vm_is_named() {
    let world = World::new();
    let vpc = world.vpc_with_servers(&["web-1"]).await;

    let err = world
        .nlbs()
        .create_nlb(nlb_request("lb-1", &vpc, &["web-1", "ghost"]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("ghost"));
    assert!(err.root_cause().is_not_found());
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert_eq!(lb_objects(&world), 0);
}

#[tokio::test(start_paused = true)]
async fn test_never_ready_times_out_and_cleans_up() {
    let world = World::new();
    let vpc = world.vpc_with_servers(&["web-1"]).await;
    world
        .cloud
        .inject(ResourceKind::LoadBalancer, Fault::never_ready())
        .unwrap();

    let err = world
        .nlbs()
        .create_nlb(nlb_request("lb-1", &vpc, &["web-1"]))
        .await
        .unwrap_err();

    match err.root_cause() {
        CloudError::Timeout { kind, attempts, .. } => {
            assert_eq!(*kind, ResourceKind::LoadBalancer);
            assert_eq!(*attempts, POLL_ATTEMPTS);
        }
        other => panic!("expected timeout, got {}", other),
    }
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert_eq!(lb_objects(&world), 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_state_stops_waiting() {
    let world = World::new();
    let vpc = world.vpc_with_servers(&["web-1"]).await;
    world
        .cloud
        .inject(ResourceKind::Pool, Fault::error_state())
        .unwrap();

    let started = tokio::time::Instant::now();
    let err = world
        .nlbs()
        .create_nlb(nlb_request("lb-1", &vpc, &["web-1"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        CloudError::TerminalState {
            kind: ResourceKind::Pool,
            ..
        }
    ));
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert_eq!(lb_objects(&world), 0);
    // Well under the full polling budget of the pool wait.
    assert!(started.elapsed() < common::settings().poll.budget());
}

#[tokio::test(start_paused = true)]
async fn test_rollback_failure_needs_manual_cleanup() {
    let world = World::new();
    let vpc = world.vpc_with_servers(&["web-1"]).await;
    world
        .cloud
        .inject(ResourceKind::Listener, Fault::fail_create())
        .unwrap();
    world
        .cloud
        .inject(ResourceKind::HealthMonitor, Fault::fail_delete())
        .unwrap();

    let err = world
        .nlbs()
        .create_nlb(nlb_request("lb-1", &vpc, &["web-1"]))
        .await
        .unwrap_err();

    assert_eq!(err.failure_outcome(), FailureOutcome::NeedsManualCleanup);
    let leftovers = err.leftovers();
    assert_eq!(leftovers.len(), 1);
    assert_eq!(leftovers[0].kind, ResourceKind::HealthMonitor);
    assert!(err.to_string().contains("Failed to rollback"));
}

#[tokio::test(start_paused = true)]
async fn test_transient_read_errors_are_retried() {
    let world = World::new();
    let vpc = world.vpc_with_servers(&["web-1"]).await;
    world
        .cloud
        .inject(ResourceKind::Listener, Fault::transient_reads(3))
        .unwrap();

    let applied = world
        .nlbs()
        .create_nlb(nlb_request("lb-1", &vpc, &["web-1"]))
        .await
        .unwrap();
    assert_eq!(applied.info.listener.port, "80");
}

#[tokio::test(start_paused = true)]
async fn test_port_in_description_without_side_table() {
    let world = World::with(MemoryCloud::isolated("test").unwrap().with_side_table(false));
    let (_, iid) = ready(&world, &["web-1"]).await;

    let lb = world.cloud.get_load_balancer(&iid.system_id).await.unwrap().unwrap();
    let pool = world.cloud.get_pool(&lb.pool_ids[0]).await.unwrap().unwrap();
    assert_eq!(pool.description, encode_port_description(8080));

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.vm_group.port, "8080");
}

#[tokio::test(start_paused = true)]
async fn test_port_in_side_table() {
    use nimbus_cloud::MetadataStore;

    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;

    let lb = world.cloud.get_load_balancer(&iid.system_id).await.unwrap().unwrap();
    let pool = world.cloud.get_pool(&lb.pool_ids[0]).await.unwrap().unwrap();
    assert!(pool.description.is_empty());
    assert_eq!(
        world.cloud.get(&pool.id, MEMBER_PORT_KEY).await.unwrap().as_deref(),
        Some("8080")
    );
}

#[tokio::test(start_paused = true)]
async fn test_delete_nlb() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2"]).await;

    assert!(world.nlbs().delete_nlb(&iid).await.unwrap());
    assert_eq!(lb_objects(&world), 0);

    let err = world.nlbs().get_nlb(&iid).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(start_paused = true)]
async fn test_add_vms() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;

    let group = world
        .nlbs()
        .add_vms(&iid, &[Iid::by_name("web-2"), Iid::by_name("web-3")])
        .await
        .unwrap();
    assert_eq!(names(&group.vms), vec!["web-1", "web-2", "web-3"]);
    assert_eq!(group.port, "8080");
}

#[tokio::test(start_paused = true)]
async fn test_add_vms_is_all_or_nothing() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;

    let err = world
        .nlbs()
        .add_vms(&iid, &[Iid::by_name("web-2"), Iid::by_name("ghost")])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));

    let err = world
        .nlbs()
        .add_vms(&iid, &[Iid::by_name("web-3"), Iid::by_name("web-1")])
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));

    world
        .cloud
        .inject(ResourceKind::PoolMember, Fault::error_state().times(1))
        .unwrap();
    let err = world
        .nlbs()
        .add_vms(&iid, &[Iid::by_name("web-2"), Iid::by_name("web-3")])
        .await
        .unwrap_err();
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(names(&info.vm_group.vms), vec!["web-1"]);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::PoolMember), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_vms() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2", "web-3"]).await;

    assert!(world
        .nlbs()
        .remove_vms(&iid, &[Iid::by_name("web-1"), Iid::by_name("web-3")])
        .await
        .unwrap());

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(names(&info.vm_group.vms), vec!["web-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_remove_vms_is_all_or_nothing() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2"]).await;

    let err = world
        .nlbs()
        .remove_vms(&iid, &[Iid::by_name("web-1"), Iid::by_name("ghost")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    world
        .cloud
        .inject(ResourceKind::PoolMember, Fault::fail_delete())
        .unwrap();
    let err = world
        .nlbs()
        .remove_vms(&iid, &[Iid::by_name("web-1")])
        .await
        .unwrap_err();
    assert_eq!(err.failure_outcome(), FailureOutcome::NothingCreated);

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(names(&info.vm_group.vms), vec!["web-1", "web-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_remove_vms_reattaches_after_late_failure() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2"]).await;

    world
        .cloud
        .inject(ResourceKind::PoolMember, Fault::fail_delete().after(1))
        .unwrap();
    let err = world
        .nlbs()
        .remove_vms(&iid, &[Iid::by_name("web-1"), Iid::by_name("web-2")])
        .await
        .unwrap_err();
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);
    assert!(matches!(err, CloudError::RolledBack { removed: 1, .. }));

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(names(&info.vm_group.vms), vec!["web-1", "web-2"]);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::PoolMember), 2);
}

#[tokio::test(start_paused = true)]
async fn test_change_listener() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;
    let before = world.nlbs().get_nlb(&iid).await.unwrap().listener;

    let unchanged = world
        .nlbs()
        .change_listener(&iid, ListenerInfo::new("TCP", "80"))
        .await
        .unwrap();
    assert_eq!(unchanged.info.csp_id, before.csp_id);

    let applied = world
        .nlbs()
        .change_listener(&iid, ListenerInfo::new("", "8081"))
        .await
        .unwrap();
    assert!(applied.is_clean());
    assert_eq!(applied.info.port, "8081");
    assert_ne!(applied.info.csp_id, before.csp_id);
    assert_eq!(applied.info.ip, before.ip);

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.listener.port, "8081");
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::Listener), 1);

    let err = world
        .nlbs()
        .change_listener(&iid, ListenerInfo::new("UDP", "53"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Unsupported(_)));
}

#[tokio::test(start_paused = true)]
async fn test_listener_that_never_comes_up_is_removed() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;
    let before = world.nlbs().get_nlb(&iid).await.unwrap().listener;

    world
        .cloud
        .inject(ResourceKind::Listener, Fault::error_state().times(1))
        .unwrap();
    let err = world
        .nlbs()
        .change_listener(&iid, ListenerInfo::new("TCP", "8081"))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), CloudError::TerminalState { .. }));
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);

    let after = world.nlbs().get_nlb(&iid).await.unwrap().listener;
    assert_eq!(after.port, "80");
    assert_eq!(after.csp_id, before.csp_id);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::Listener), 1);
}

#[tokio::test(start_paused = true)]
async fn test_undeletable_old_listener_is_not_reported_as_live() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;

    world
        .cloud
        .inject(ResourceKind::Listener, Fault::fail_delete())
        .unwrap();
    let applied = world
        .nlbs()
        .change_listener(&iid, ListenerInfo::new("", "8081"))
        .await
        .unwrap();
    assert_eq!(applied.notices.len(), 1);
    assert_eq!(applied.info.port, "8081");
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::Listener), 2);

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.listener.port, "8081");
    assert_eq!(info.listener.csp_id, applied.info.csp_id);

    // The next change starts from the live listener, not the leftover.
    world.cloud.clear_faults().unwrap();
    let again = world
        .nlbs()
        .change_listener(&iid, ListenerInfo::new("", "8082"))
        .await
        .unwrap();
    assert!(again.is_clean());

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.listener.port, "8082");
    assert_eq!(info.listener.csp_id, again.info.csp_id);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::Listener), 2);
}

#[tokio::test(start_paused = true)]
async fn test_change_vm_group() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2"]).await;

    let applied = world
        .nlbs()
        .change_vm_group(&iid, VmGroupInfo::new("TCP", "9090"))
        .await
        .unwrap();
    assert!(applied.is_clean());
    assert_eq!(applied.info.port, "9090");
    assert_eq!(names(&applied.info.vms), vec!["web-1", "web-2"]);

    let lb = world.cloud.get_load_balancer(&iid.system_id).await.unwrap().unwrap();
    let members = world.cloud.list_members(&lb.pool_ids[0]).await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.protocol_port == 9090));

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.vm_group.port, "9090");
    assert_eq!(info.health_checker.port, "9090");

    let err = world
        .nlbs()
        .change_vm_group(&iid, VmGroupInfo::new("UDP", "9090"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Unsupported(_)));
}

#[tokio::test(start_paused = true)]
async fn test_failed_vm_group_change_keeps_old_members() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2"]).await;

    world
        .cloud
        .inject(ResourceKind::PoolMember, Fault::error_state().times(1))
        .unwrap();
    let err = world
        .nlbs()
        .change_vm_group(&iid, VmGroupInfo::new("TCP", "9090"))
        .await
        .unwrap_err();
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);

    let info = world.nlbs().get_nlb(&iid).await.unwrap();
    assert_eq!(info.vm_group.port, "8080");
    assert_eq!(names(&info.vm_group.vms), vec!["web-1", "web-2"]);

    let lb = world.cloud.get_load_balancer(&iid.system_id).await.unwrap().unwrap();
    let members = world.cloud.list_members(&lb.pool_ids[0]).await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().all(|m| m.protocol_port == 8080));
}

#[tokio::test(start_paused = true)]
async fn test_undeletable_old_members_stay_out_of_the_group() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;

    world
        .cloud
        .inject(ResourceKind::PoolMember, Fault::fail_delete())
        .unwrap();
    let applied = world
        .nlbs()
        .change_vm_group(&iid, VmGroupInfo::new("TCP", "9090"))
        .await
        .unwrap();
    assert_eq!(applied.notices.len(), 1);
    assert_eq!(applied.info.port, "9090");
    assert_eq!(names(&applied.info.vms), vec!["web-1"]);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::PoolMember), 2);

    let group = world.nlbs().get_nlb(&iid).await.unwrap().vm_group;
    assert_eq!(names(&group.vms), vec!["web-1"]);
    let stale = group.key_values.iter().find(|kv| kv.key == STALE_MEMBERS_KEY).unwrap();
    assert_eq!(stale.value, "web-1:8080");

    // Removing the VM takes the member on the group port.
    world.cloud.clear_faults().unwrap();
    assert!(world
        .nlbs()
        .remove_vms(&iid, &[Iid::by_name("web-1")])
        .await
        .unwrap());

    let group = world.nlbs().get_nlb(&iid).await.unwrap().vm_group;
    assert!(group.vms.is_empty());
    let lb = world.cloud.get_load_balancer(&iid.system_id).await.unwrap().unwrap();
    let members = world.cloud.list_members(&lb.pool_ids[0]).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].protocol_port, 8080);
}

#[tokio::test(start_paused = true)]
async fn test_change_health_checker() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;
    let before = world.nlbs().get_nlb(&iid).await.unwrap().health_checker;

    let unchanged = world
        .nlbs()
        .change_health_checker(&iid, HealthCheckerInfo::new("TCP", 10, 5, 3))
        .await
        .unwrap();
    assert_eq!(unchanged.info.csp_id, before.csp_id);

    let applied = world
        .nlbs()
        .change_health_checker(&iid, HealthCheckerInfo::new("HTTP", 20, 10, 5))
        .await
        .unwrap();
    assert_eq!(applied.info.protocol, "HTTP");
    assert_eq!(applied.info.interval, 20);
    assert_eq!(applied.info.port, "8080");
    assert_ne!(applied.info.csp_id, before.csp_id);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::HealthMonitor), 1);

    let mut other_port = HealthCheckerInfo::new("TCP", 10, 5, 3);
    other_port.port = "9999".to_string();
    let err = world
        .nlbs()
        .change_health_checker(&iid, other_port)
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Unsupported(_)));

    let err = world
        .nlbs()
        .change_health_checker(&iid, HealthCheckerInfo::new("TCP", 5, 10, 3))
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test(start_paused = true)]
async fn test_failed_health_checker_change_restores_previous() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1"]).await;

    world
        .cloud
        .inject(ResourceKind::HealthMonitor, Fault::error_state().times(1))
        .unwrap();
    let err = world
        .nlbs()
        .change_health_checker(&iid, HealthCheckerInfo::new("HTTP", 20, 10, 5))
        .await
        .unwrap_err();
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);

    let checker = world.nlbs().get_nlb(&iid).await.unwrap().health_checker;
    assert_eq!(checker.protocol, "TCP");
    assert_eq!(checker.interval, 10);
    assert_eq!(world.cloud.census().unwrap().count(ResourceKind::HealthMonitor), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_checker_restored_when_old_monitor_lingers() {
    // Deletions take longer than the deletion budget allows.
    let poll = PollConfig::new(Duration::from_millis(100), 2);
    let world = World::with_settings(
        MemoryCloud::isolated("test").unwrap().with_latency(3),
        ProvisionSettings {
            delete_poll: poll,
            ..settings()
        },
    );
    let (_, iid) = ready(&world, &["web-1"]).await;

    let err = world
        .nlbs()
        .change_health_checker(&iid, HealthCheckerInfo::new("HTTP", 20, 10, 5))
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), CloudError::Timeout { .. }));
    assert_eq!(err.failure_outcome(), FailureOutcome::CleanedUp);

    let checker = world.nlbs().get_nlb(&iid).await.unwrap().health_checker;
    assert_eq!(checker.protocol, "TCP");
    assert_eq!(checker.interval, 10);
    assert_eq!(checker.threshold, 3);
}

#[tokio::test(start_paused = true)]
async fn test_vm_group_health() {
    let world = World::new();
    let (_, iid) = ready(&world, &["web-1", "web-2"]).await;
    let lb = world.cloud.get_load_balancer(&iid.system_id).await.unwrap().unwrap();
    let pool_id = lb.pool_ids[0].clone();

    world
        .cloud
        .set_member_operating_status(&pool_id, "web-2", OperatingStatus::Draining)
        .unwrap();
    let health = world.nlbs().get_vm_group_health(&iid).await.unwrap();
    assert_eq!(names(&health.all_vms), vec!["web-1", "web-2"]);
    assert_eq!(names(&health.healthy_vms), vec!["web-1"]);
    assert_eq!(names(&health.unhealthy_vms), vec!["web-2"]);

    world
        .cloud
        .set_member_operating_status(&pool_id, "web-1", OperatingStatus::NoMonitor)
        .unwrap();
    let err = world.nlbs().get_vm_group_health(&iid).await.unwrap_err();
    assert!(err.to_string().contains("NO_MONITOR"));
}
