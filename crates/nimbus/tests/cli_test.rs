#![allow(deprecated)] // TODO: move to cargo_bin_cmd! once assert_cmd is bumped

mod common;

use assert_cmd::Command;
use common::TestProject;
use predicates::prelude::*;

fn nimbus() -> Command {
    let mut cmd = Command::cargo_bin("nimbus").unwrap();
    cmd.env_remove("NIMBUS_CONFIG_PATH").env("NO_COLOR", "1");
    cmd
}

/// Help lists every command group
#[test]
fn test_cli_help() {
    nimbus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("all or nothing"))
        .stdout(predicate::str::contains("network"))
        .stdout(predicate::str::contains("lb"))
        .stdout(predicate::str::contains("config"));
}

/// Version prints the binary name
#[test]
fn test_cli_version() {
    nimbus()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("nimbus"));
}

/// lb create exposes VM count and fault injection
#[test]
fn test_lb_create_help() {
    nimbus()
        .args(["lb", "create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--fail-at"))
        .stdout(predicate::str::contains("--vms"));
}

/// Unknown subcommands fail
#[test]
fn test_invalid_command() {
    nimbus().arg("invalid-command").assert().failure();
}

/// --fail-at rejects unknown resource kinds
#[test]
fn test_unknown_fail_at_kind() {
    nimbus()
        .args(["network", "create", "net", "--fail-at", "bucket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown resource kind"));
}

/// config show prints the file it read and its settings
#[test]
fn test_config_show() {
    let project = TestProject::new();
    let path = project.fast();

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nimbus.yaml"))
        .stdout(predicate::str::contains("interval_ms: 5"))
        .stdout(predicate::str::contains("scope: cli-test"));
}

/// nimbus.yaml in the working directory is picked up
#[test]
fn test_config_discovered_in_current_dir() {
    let project = TestProject::new();
    project.fast();

    nimbus()
        .current_dir(project.root.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scope: cli-test"));
}

/// A malformed config file fails and names the file
#[test]
fn test_malformed_config() {
    let project = TestProject::new();
    let path = project.write_config("poll: [1, 2\n");

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nimbus.yaml"));
}

/// network create builds subnets, tags and the router
#[test]
fn test_network_create() {
    let project = TestProject::new();
    let path = project.fast();

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["network", "create", "app", "-s", "web=10.0.1.0/24", "-t", "env=dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Network app"))
        .stdout(predicate::str::contains("10.0.1.0/24"))
        .stdout(predicate::str::contains("env=dev"))
        .stdout(predicate::str::contains("1 router"));
}

/// A failed network create leaves nothing behind
#[test]
fn test_network_create_rolls_back() {
    let project = TestProject::new();
    let path = project.fast();

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["network", "create", "app", "--fail-at", "router-interface"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("created and cleaned up"))
        .stderr(predicate::str::contains("backend now holds: nothing"));
}

/// lb create puts a public address in front of every VM
#[test]
fn test_lb_create() {
    let project = TestProject::new();
    let path = project.fast();

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["lb", "create", "web", "--vms", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Load balancer web"))
        .stdout(predicate::str::contains("203.0.113."))
        .stdout(predicate::str::contains("web-vm-3"))
        .stdout(predicate::str::contains("3 pool-member"));
}

/// A failed lb create removes every load-balancer object
#[test]
fn test_lb_create_rolls_back() {
    let project = TestProject::new();
    let path = project.fast();

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["lb", "create", "web", "--fail-at", "listener"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("creating any listener will fail"))
        .stderr(predicate::str::contains("created and cleaned up"))
        .stderr(predicate::str::contains(
            "backend now holds: 1 network, 1 subnet, 1 router, 1 router-interface",
        ));
}

/// An unsupported protocol fails before anything is created
#[test]
fn test_lb_create_with_unsupported_protocol() {
    let project = TestProject::new();
    let path = project.fast();

    nimbus()
        .arg("--config")
        .arg(&path)
        .args(["lb", "create", "web", "--protocol", "UDP"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing created"));
}
