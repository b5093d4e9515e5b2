//! Offline and online upgrade flows.

use keel_core::types::SafetyChecks;
use keel_scenario::{FixtureRequest, Topology, UpgradeError, UpgradeInvocation, UpgradeState};

use crate::helpers::cluster::{Harness, offline_layout};
use crate::helpers::sim::{CURRENT_VERSION, SOURCE_VERSION, SimCluster};

#[tokio::test]
async fn test_e2e_offline_upgrade_reaches_current_version() {
    // Given: 3 etcd / 1 master / 1 worker cluster installed at the historical
    // version, packages pre-staged and outbound access removed
    let harness = Harness::new(SimCluster::new());
    let prepared = harness
        .fixture
        .establish(offline_layout(), FixtureRequest::offline())
        .await
        .expect("fixture should be ready");
    assert_eq!(harness.sim.cluster_version().as_deref(), Some(SOURCE_VERSION));
    assert_eq!(harness.sim.isolated().len(), 5);
    assert_eq!(harness.sim.packages_removed().len(), 5);
    assert_eq!(harness.sim.packages_installed().len(), 5);

    // When: Upgrading in offline mode
    let mut controller = harness.controller();
    let version = controller
        .upgrade(&UpgradeInvocation::offline())
        .await
        .expect("offline upgrade should succeed");

    // Then: The cluster reports the current version
    assert_eq!(version.to_string(), CURRENT_VERSION);
    assert_eq!(controller.state(), UpgradeState::Succeeded);
    assert!(controller.diagnostics().is_none());
    assert_eq!(harness.sim.tool_count("upgrade offline"), 1);
    assert_eq!(harness.sim.tool_count("--ignore-safety-checks"), 0);

    // Then: No node ever reached the outside after isolation
    let probes = harness.sim.outbound_probes();
    assert_eq!(probes.len(), prepared.handle.all_nodes().len());
    assert!(probes.iter().all(|p| !p.reachable), "{probes:?}");
}

#[tokio::test]
async fn test_e2e_offline_fixture_rewrites_plan_before_upgrade() {
    // Given: An established offline fixture
    let harness = Harness::new(SimCluster::new());
    harness
        .fixture
        .establish(offline_layout(), FixtureRequest::offline())
        .await
        .expect("fixture should be ready");

    // When: Reading the plan the upgrade will use
    let plan = std::fs::read_to_string(harness.tool.plan_path()).expect("plan written");

    // Then: It describes a disconnected installation with pre-installed packages
    let plan: serde_yaml::Value = serde_yaml::from_str(&plan).expect("valid yaml");
    assert_eq!(plan["cluster"]["disconnected_installation"].as_bool(), Some(true));
    assert_eq!(plan["cluster"]["disable_package_installation"].as_bool(), Some(true));
    assert_eq!(plan["etcd"]["expected_count"].as_u64(), Some(3));
}

#[tokio::test]
async fn test_e2e_online_upgrade_bypasses_safety_checks() {
    // Given: A connected cluster at the historical version
    let harness = Harness::new(SimCluster::new());
    harness
        .fixture
        .establish(offline_layout(), FixtureRequest::new(Topology::offline()))
        .await
        .expect("fixture should be ready");

    // When: Upgrading in online mode with the default policy
    let mut controller = harness.controller();
    controller
        .upgrade(&UpgradeInvocation::online())
        .await
        .expect("online upgrade should succeed");

    // Then: Safety checks were bypassed and nothing was isolated
    assert_eq!(harness.sim.tool_count("upgrade online"), 1);
    assert_eq!(harness.sim.tool_count("--ignore-safety-checks"), 1);
    assert!(harness.sim.isolated().is_empty());
}

#[tokio::test]
async fn test_e2e_offline_bypass_is_rejected() {
    // Given: A ready offline cluster
    let harness = Harness::new(SimCluster::new());
    harness
        .fixture
        .establish(offline_layout(), FixtureRequest::offline())
        .await
        .expect("fixture should be ready");

    // When: Requesting an offline upgrade that bypasses safety checks
    let mut controller = harness.controller();
    let invocation = UpgradeInvocation::offline().with_safety_checks(SafetyChecks::Bypassed);
    let err = controller.upgrade(&invocation).await.unwrap_err();

    // Then: The invocation is refused before the tool runs
    assert!(matches!(err, UpgradeError::InvalidInvocation(_)), "{err}");
    assert_eq!(harness.sim.tool_count("upgrade"), 0);
    assert_eq!(harness.sim.cluster_version().as_deref(), Some(SOURCE_VERSION));
}
