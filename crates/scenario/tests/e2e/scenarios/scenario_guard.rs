//! Scenario evaluation guarantees: drop guard, timeouts, panics, isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keel_scenario::{FixtureRequest, Scenario, StepOutcome, Topology};

use crate::helpers::cluster::{Harness, offline_layout};
use crate::helpers::sim::SimCluster;

#[tokio::test]
#[should_panic(expected = "should have an accessible dashboard: connection refused")]
async fn test_e2e_dropped_scenario_fails_enclosing_test() {
    // Given: A scenario with one failing step that is never finalized
    let mut scenario = Scenario::begin("Using an upgraded cluster");
    scenario.add("should allow adding a worker node", || async {
        Ok::<(), String>(())
    });
    scenario.add("should have an accessible dashboard", || async {
        Err::<(), _>("connection refused")
    });

    // When: The scope ends
    drop(scenario);

    // Then: The drop guard panics with the aggregate
}

#[tokio::test]
async fn test_e2e_dropped_scenario_runs_every_step() {
    // Given: A passing scenario that is never finalized
    let executed = Arc::new(AtomicUsize::new(0));
    {
        let mut scenario = Scenario::begin("drop guard");
        for _ in 0..3 {
            let executed = Arc::clone(&executed);
            scenario.add("counts", move || async move {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            });
        }
        // When: The scope ends
    }

    // Then: Every step ran exactly once
    assert_eq!(executed.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_step_timeout_does_not_stop_scenario() {
    // Given: A step that outlives its timeout followed by a quick step
    let mut scenario = Scenario::begin("timeouts").with_step_timeout(Duration::from_secs(5));
    scenario.add("hangs", || async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<(), String>(())
    });
    scenario.add("answers", || async { Ok::<(), String>(()) });

    // When: Evaluating
    let report = scenario.evaluate().await;

    // Then: The hung step failed and the next one still ran
    assert_eq!(report.executed(), 2);
    assert_eq!(
        report.results[0].outcome,
        StepOutcome::Failed("timed out after 5s".to_owned())
    );
    assert!(report.results[1].outcome.is_passed());
}

#[tokio::test]
async fn test_e2e_panicking_step_is_contained() {
    // Given: A step that panics between two passing steps
    let mut scenario = Scenario::begin("panics");
    scenario.add("before", || async { Ok::<(), String>(()) });
    scenario.add("explodes", || async {
        let pods: Vec<&str> = Vec::new();
        let first = pods.first().expect("no pods scheduled");
        assert!(!first.is_empty());
        Ok::<(), String>(())
    });
    scenario.add("after", || async { Ok::<(), String>(()) });

    // When: Evaluating
    let report = scenario.evaluate().await;

    // Then: Only the panicking step failed
    let failed: Vec<&str> = report.failures().map(|r| r.description.as_str()).collect();
    assert_eq!(failed, vec!["explodes"]);
    assert!(report.failure_summary().contains("no pods scheduled"));
}

#[tokio::test]
async fn test_e2e_independent_scenarios_run_concurrently() {
    // Given: Two clusters with their own backends
    let first = Harness::new(SimCluster::new());
    let second = Harness::new(SimCluster::new());

    // When: Both fixtures are established at the same time
    let (a, b) = tokio::join!(
        first
            .fixture
            .establish(offline_layout(), FixtureRequest::new(Topology::offline())),
        second
            .fixture
            .establish(offline_layout(), FixtureRequest::offline()),
    );

    // Then: Each backend only saw its own run
    assert!(a.is_ok() && b.is_ok());
    assert!(first.sim.isolated().is_empty());
    assert_eq!(second.sim.isolated().len(), 5);
}
