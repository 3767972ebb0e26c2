//! Tests for runtime report models and target selection

use std::sync::Arc;
use std::time::Duration;

use prometheus_harvest::builders::build_pool;
use prometheus_harvest::config::DriverConfig;
use prometheus_harvest::core::{JobSet, NodeDescriptor, Sleeper};
use prometheus_harvest::infra::{SimTarget, SimulatedCluster};
use prometheus_harvest::runtime::{list_nodes, select_target, RunSummary, TokioSleeper};

#[test]
fn test_list_nodes_reports_fresh_capacity() {
    let cluster = Arc::new(SimulatedCluster::new());
    cluster.add_node("home", 32.0);
    cluster.add_node("pserv-0", 16.0);
    cluster.add_target("t", SimTarget::new(100.0, 200.0, 5.0, 1.0));
    let mut pool = build_pool(&DriverConfig::default(), cluster.as_ref(), cluster.clone()).unwrap();

    cluster.set_used_capacity("pserv-0", 6.0);
    pool.exclude("pserv-0");
    let listing = list_nodes(&pool);
    assert_eq!(listing.len(), 2);
    assert_eq!(listing[1].id, "pserv-0");
    assert_eq!(listing[1].spare_capacity, Some(10.0));
    assert!(listing[1].excluded);

    pool.dispatch(&JobSet::default().grow, 4, "t", Duration::ZERO)
        .unwrap();
    let listing = list_nodes(&pool);
    assert_eq!(listing[0].total_capacity, Some(32.0));
    assert_eq!(listing[0].spare_capacity, Some(25.0));
}

#[test]
fn test_select_target_ignores_non_targets() {
    let cluster = SimulatedCluster::new();
    cluster.set_proficiency(90);
    cluster.add_target(
        "joesguns",
        SimTarget::new(1.0, 10.0, 1.0, 1.0).with_required_proficiency(10),
    );
    let candidates = vec![
        NodeDescriptor::privileged("home"),
        NodeDescriptor::privileged("pserv-0"),
        NodeDescriptor::privileged("joesguns"),
    ];
    assert_eq!(select_target(&cluster, &candidates, "home", 3).unwrap(), "joesguns");
}

#[test]
fn test_run_summary_serializes() {
    let summary = RunSummary {
        completed: 2,
        failed: 1,
        extracted_value: 1500.0,
    };
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["completed"], 2);
    assert_eq!(json["failed"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_tokio_sleeper_advances_paused_clock() {
    let start = tokio::time::Instant::now();
    TokioSleeper::new().sleep(Duration::from_secs(3)).await;
    assert!(start.elapsed() >= Duration::from_secs(3));
}
