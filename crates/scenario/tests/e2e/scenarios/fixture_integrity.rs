//! Fixture failures are fatal and stop the run before the upgrade.

use keel_core::KeelError;
use keel_core::error::VerificationError;
use keel_scenario::{FixtureError, FixtureRequest, Scenario, UpgradeInvocation};

use crate::helpers::cluster::{Harness, offline_layout};
use crate::helpers::sim::{SimCluster, SimFaults};

#[tokio::test]
async fn test_e2e_reachable_node_is_integrity_violation() {
    // Given: etcd02 ignores the firewall rules
    let harness = Harness::new(SimCluster::with_faults(SimFaults {
        leaky_hosts: vec!["etcd02".to_owned()],
        ..SimFaults::default()
    }));

    // When: Establishing the disconnected fixture
    let err = harness
        .fixture
        .establish(offline_layout(), FixtureRequest::offline())
        .await
        .unwrap_err();

    // Then: The leaking node is named and no upgrade was attempted
    match &err {
        FixtureError::EnvironmentIntegrity(nodes) => assert_eq!(nodes, "etcd02"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.sim.tool_count("upgrade"), 0);
    assert!(
        harness
            .sim
            .outbound_probes()
            .iter()
            .any(|p| p.hostname == "etcd02" && p.reachable)
    );

    let keel: KeelError = err.into();
    assert!(matches!(
        keel,
        KeelError::Verification(VerificationError::EnvironmentIntegrity(_))
    ));
}

#[tokio::test]
async fn test_e2e_isolation_check_lost_over_ssh_is_fatal() {
    // Given: worker01 drops its SSH session during the outbound check
    let harness = Harness::new(SimCluster::with_faults(SimFaults {
        probe_unreachable_hosts: vec!["worker01".to_owned()],
        ..SimFaults::default()
    }));

    // When: Establishing the disconnected fixture
    let err = harness
        .fixture
        .establish(offline_layout(), FixtureRequest::offline())
        .await
        .unwrap_err();

    // Then: Isolation is unverified on that node and no upgrade was attempted
    match &err {
        FixtureError::IsolationUnverified(nodes) => {
            assert_eq!(nodes, "worker01 (timed out)");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.sim.tool_count("upgrade"), 0);

    let keel: KeelError = err.into();
    assert!(matches!(
        keel,
        KeelError::Verification(VerificationError::Fixture(_))
    ));
}

#[tokio::test]
async fn test_e2e_fixture_failure_runs_no_steps() {
    // Given: A layout that does not match the requested topology
    let harness = Harness::new(SimCluster::new());
    let mut scenario = Scenario::begin("Using an upgraded cluster");

    // When: The fixture fails
    let fixture = harness
        .fixture
        .establish(offline_layout(), FixtureRequest::skunkworks())
        .await;

    // Then: The run stops before the upgrade and before any step is registered
    let err = fixture.unwrap_err();
    assert!(matches!(err, FixtureError::Topology(_)), "{err}");
    assert!(harness.sim.tool_calls().is_empty());
    assert!(scenario.is_empty());

    let report = scenario.evaluate().await;
    assert_eq!(report.executed(), 0);
    assert!(report.passed());
}

#[tokio::test]
async fn test_e2e_fixture_is_ready_for_upgrade() {
    // Given: A healthy simulated cluster
    let harness = Harness::new(SimCluster::new());

    // When: The disconnected fixture is established
    let prepared = harness
        .fixture
        .establish(offline_layout(), FixtureRequest::offline())
        .await
        .expect("fixture should be ready");

    // Then: Every node is registered and the current tool is staged last
    for node in prepared.handle.all_nodes() {
        assert!(harness.sim.is_registered(&node.hostname), "{node}");
    }
    let calls = harness.sim.tool_calls();
    assert!(calls.last().is_some_and(|c| c.contains("kismatic.tar.gz")), "{calls:?}");

    let mut controller = harness.controller();
    assert!(controller.upgrade(&UpgradeInvocation::offline()).await.is_ok());
}
