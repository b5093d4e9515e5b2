//! Post-upgrade checks aggregated into one scenario judgment.

use keel_core::types::NodeRole;
use keel_scenario::{
    Check, FixtureRequest, PreparedCluster, Scenario, ScenarioError, UpgradeInvocation, register,
};

use crate::helpers::cluster::{Harness, skunkworks_layout};
use crate::helpers::sim::{SimCluster, SimFaults};

const FIVE_CHECKS: [Check; 5] = [
    Check::Storage,
    Check::AddWorker,
    Check::Ingress,
    Check::Dashboard,
    Check::HighAvailability,
];

async fn upgraded(faults: SimFaults) -> (Harness, PreparedCluster) {
    let harness = Harness::new(SimCluster::with_faults(faults));
    let prepared = harness
        .fixture
        .establish(skunkworks_layout(), FixtureRequest::skunkworks())
        .await
        .expect("fixture should be ready");
    harness
        .controller()
        .upgrade(&UpgradeInvocation::online())
        .await
        .expect("upgrade should succeed");
    (harness, prepared)
}

#[tokio::test]
async fn test_e2e_failing_ingress_is_the_only_aggregate_entry() {
    // Given: An upgraded multi-role cluster whose ingress answers 503
    let (harness, prepared) = upgraded(SimFaults {
        ingress_unavailable: true,
        ..SimFaults::default()
    })
    .await;
    let spare = prepared.spare_worker.clone().expect("spare worker reserved");
    assert!(!harness.sim.is_registered(&spare.hostname));

    let ctx = harness.checks(prepared.handle);
    let mut scenario = Scenario::begin("Using an upgraded cluster");
    register(&mut scenario, &ctx, &FIVE_CHECKS, Some(spare.clone()));

    // When: Evaluating the scenario
    let report = scenario.evaluate().await;

    // Then: All five ran and only ingress failed
    assert_eq!(report.executed(), 5);
    let failed: Vec<&str> = report.failures().map(|r| r.description.as_str()).collect();
    assert_eq!(failed, vec![Check::Ingress.description()]);
    assert!(report.failure_summary().contains("unexpected status 503"));

    // Then: The new worker joined and the first master is gone
    assert_eq!(harness.sim.added_workers(), vec![spare.hostname.clone()]);
    assert!(harness.sim.is_registered(&spare.hostname));
    assert_eq!(harness.sim.terminated(), vec!["master01".to_owned()]);
    let masters = ctx.cluster.lock().await.nodes(NodeRole::Master).to_vec();
    assert_eq!(masters.len(), 1);
    assert_eq!(masters[0].hostname, "master02");
    assert_eq!(harness.sim.volumes(), vec!["storage01".to_owned()]);
}

#[tokio::test]
async fn test_e2e_all_checks_pass_on_healthy_cluster() {
    // Given: A healthy upgraded cluster
    let (harness, prepared) = upgraded(SimFaults::default()).await;
    let ctx = harness.checks(prepared.handle);
    let mut scenario = Scenario::begin("Using an upgraded cluster");
    register(&mut scenario, &ctx, &Check::ALL, prepared.spare_worker);

    // When: Finalizing
    let report = scenario.finalize().await.expect("all checks should pass");

    // Then: Every registered check ran and passed
    assert_eq!(report.executed(), Check::ALL.len());
    assert!(report.passed());
    assert!(harness.sim.remote_calls().iter().any(|c| c.contains("kuberang")));
}

#[tokio::test]
async fn test_e2e_finalize_reports_failures_in_registration_order() {
    // Given: Ingress fails and no spare worker is available
    let (harness, prepared) = upgraded(SimFaults {
        ingress_unavailable: true,
        ..SimFaults::default()
    })
    .await;
    let ctx = harness.checks(prepared.handle);
    let mut scenario = Scenario::begin("Using an upgraded cluster");
    register(&mut scenario, &ctx, &FIVE_CHECKS, None);

    // When: Finalizing
    let err = scenario.finalize().await.unwrap_err();

    // Then: Both failures appear, add-worker before ingress
    let ScenarioError::StepsFailed(report) = &err;
    assert_eq!(report.executed(), 5);
    let message = err.to_string();
    let add_worker = message.find(Check::AddWorker.description()).expect("add-worker listed");
    let ingress = message.find(Check::Ingress.description()).expect("ingress listed");
    assert!(add_worker < ingress, "{message}");
    assert!(message.starts_with("scenario 'Using an upgraded cluster' failed"));
}
