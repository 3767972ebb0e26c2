//! Integration tests for the continuous controller and the batch driver
//!
//! These tests validate:
//! - Full continuous cycles against a selected target
//! - Deployment failures excluding nodes from a cycle
//! - Batch rounds sized by spare capacity and their value rate
//! - Configuration errors ending a run

use std::sync::Arc;

use prometheus_harvest::config::{DriverMode, HarvestConfig};
use prometheus_harvest::core::{
    Deployer, JobKind, JobSpec, NodeDescriptor, Phase, SchedulerError, TargetOracle,
};
use prometheus_harvest::infra::{JsonSnapshotSource, SimTarget, SimulatedCluster};
use prometheus_harvest::runtime::{run_driver, BatchDriver, Collaborators, Controller};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn cluster() -> Arc<SimulatedCluster> {
    let cluster = Arc::new(SimulatedCluster::new());
    cluster.set_proficiency(3);
    cluster.add_node("home", 5000.0);
    cluster.add_node("n00dles", 0.0);
    cluster.add_target(
        "n00dles",
        SimTarget::new(50_000.0, 100_000.0, 5.0, 1.0).with_required_proficiency(1),
    );
    cluster
}

fn batch_config(max_runs: Option<u64>) -> HarvestConfig {
    let mut cfg = HarvestConfig::default();
    cfg.driver.mode = DriverMode::Batch;
    cfg.batch.target = Some("n00dles".into());
    cfg.batch.max_runs = max_runs;
    cfg
}

struct FailingDeployer(&'static str);

impl Deployer for FailingDeployer {
    fn ensure_deployed(&self, node_id: &str, _job: &JobSpec) -> Result<(), SchedulerError> {
        if node_id == self.0 {
            Err(SchedulerError::Substrate(format!("cannot copy to {node_id}")))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// CONTINUOUS CONTROLLER
// ============================================================================

#[tokio::test]
async fn test_controller_cycle_extracts_from_selected_target() {
    let cluster = cluster();
    let controller = Controller::new(HarvestConfig::default(), Collaborators::simulated(&cluster))
        .unwrap();

    let report = controller.run_cycle().await.unwrap();

    assert_eq!(report.target, "n00dles");
    assert!(report.phase(Phase::GrowToMax).unwrap().converged);
    let extract = report.phase(Phase::ExtractFraction).unwrap();
    assert!(extract.converged);
    assert!(extract.extracted_value >= 75_000.0);
    assert!(cluster.started().iter().all(|op| op.node == "home"));
}

#[tokio::test]
async fn test_controller_run_counts_cycles() {
    let cluster = cluster();
    let controller = Controller::new(HarvestConfig::default(), Collaborators::simulated(&cluster))
        .unwrap();

    let summary = controller.run(Some(2)).await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.extracted_value >= 150_000.0);
    assert!((cluster.realized_value() - summary.extracted_value).abs() < 1e-6);
}

#[tokio::test]
async fn test_controller_reads_snapshot_file_each_cycle() {
    let cluster = cluster();
    let dir = tempfile::tempdir().unwrap();
    let source = JsonSnapshotSource::new(dir.path().join("cluster.json"));
    source.save(&cluster.descriptors()).unwrap();

    let mut collaborators = Collaborators::simulated(&cluster);
    collaborators.source = Arc::new(source);
    let controller = Controller::new(HarvestConfig::default(), collaborators).unwrap();

    assert_eq!(controller.run_cycle().await.unwrap().target, "n00dles");
}

#[tokio::test]
async fn test_configured_snapshot_path_is_used() {
    let cluster = cluster();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshots").join("cluster.json");
    JsonSnapshotSource::new(&path)
        .save(&[NodeDescriptor::privileged("home"), NodeDescriptor::privileged("n00dles")])
        .unwrap();

    let mut cfg = HarvestConfig::default();
    cfg.driver.snapshot_path = path.display().to_string();
    let collaborators = Collaborators::simulated(&cluster).with_snapshot_file(&cfg.driver);
    let controller = Controller::new(cfg.clone(), collaborators).unwrap();
    assert_eq!(controller.run_cycle().await.unwrap().target, "n00dles");

    cfg.driver.snapshot_path = dir.path().join("absent.json").display().to_string();
    let collaborators = Collaborators::simulated(&cluster).with_snapshot_file(&cfg.driver);
    let summary = run_driver(cfg, collaborators, Some(1)).await.unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_missing_snapshot_fails_cycle_but_not_run() {
    let cluster = cluster();
    let dir = tempfile::tempdir().unwrap();
    let mut collaborators = Collaborators::simulated(&cluster);
    collaborators.source = Arc::new(JsonSnapshotSource::new(dir.path().join("none.json")));
    let controller = Controller::new(HarvestConfig::default(), collaborators).unwrap();

    let summary = controller.run(Some(2)).await.unwrap();
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 2);
}

#[tokio::test]
async fn test_failed_deployment_excludes_node() {
    let cluster = cluster();
    cluster.add_node("pserv-0", 5000.0);
    let mut collaborators = Collaborators::simulated(&cluster);
    collaborators.deployer = Some(Arc::new(FailingDeployer("pserv-0")));
    let controller = Controller::new(HarvestConfig::default(), collaborators).unwrap();

    controller.run_cycle().await.unwrap();

    let started = cluster.started();
    assert!(!started.is_empty());
    assert!(started.iter().all(|op| op.node == "home"));
}

#[tokio::test]
async fn test_no_target_aborts_run() {
    let cluster = Arc::new(SimulatedCluster::new());
    cluster.add_node("home", 100.0);
    let controller = Controller::new(HarvestConfig::default(), Collaborators::simulated(&cluster))
        .unwrap();

    let err = controller.run(None).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::TargetNotFound(_))
    ));
}

#[test]
fn test_invalid_config_rejected_up_front() {
    let cluster = cluster();
    let mut cfg = HarvestConfig::default();
    cfg.orchestrator.extract_fraction = 0.0;
    assert!(Controller::new(cfg.clone(), Collaborators::simulated(&cluster)).is_err());
    assert!(BatchDriver::new(cfg, Collaborators::simulated(&cluster)).is_err());
}

// ============================================================================
// BATCH DRIVER
// ============================================================================

#[tokio::test]
async fn test_batch_round_fills_spare_capacity() {
    let cluster = cluster();
    let driver = BatchDriver::new(batch_config(None), Collaborators::simulated(&cluster)).unwrap();

    let report = driver.run_round().await.unwrap();

    assert_eq!(report.worker, "home");
    assert_eq!(report.target, "n00dles");
    assert!(report.planned_runs > 1);
    assert_eq!(report.launched_runs, report.planned_runs);
    assert_eq!(report.period_ms, 4200);
    assert_eq!(
        report.elapsed_ms,
        4200 + 100 * u128::from(report.launched_runs) + 1000
    );
    assert!(report.gained_value > 0.0);
    let expected_rate = report.gained_value / (report.elapsed_ms as f64 / 1000.0);
    assert!((report.value_per_second - expected_rate).abs() < 1e-6);

    let extracts = cluster
        .started()
        .iter()
        .filter(|op| op.kind == JobKind::Extract)
        .count();
    assert_eq!(extracts as u64, report.launched_runs);
    assert_eq!(cluster.pending(), 0);
}

#[tokio::test]
async fn test_batch_round_respects_max_runs() {
    let cluster = cluster();
    let driver =
        BatchDriver::new(batch_config(Some(3)), Collaborators::simulated(&cluster)).unwrap();

    let report = driver.run_round().await.unwrap();

    assert_eq!(report.planned_runs, 3);
    assert_eq!(report.launched_runs, 3);
    assert_eq!(report.elapsed_ms, 4200 + 300 + 1000);
}

#[tokio::test]
async fn test_batch_round_selects_target_when_unset() {
    let cluster = cluster();
    let mut cfg = batch_config(Some(1));
    cfg.batch.target = None;
    let driver = BatchDriver::new(cfg, Collaborators::simulated(&cluster)).unwrap();

    assert_eq!(driver.run_round().await.unwrap().target, "n00dles");
}

#[tokio::test]
async fn test_batch_with_negative_delay_aborts() {
    let cluster = cluster();
    cluster.add_target(
        "n00dles",
        SimTarget::new(50_000.0, 100_000.0, 5.0, 1.0).with_latencies(
            std::time::Duration::from_millis(1000),
            std::time::Duration::from_millis(800),
            std::time::Duration::from_millis(2000),
        ),
    );

    let err = run_driver(batch_config(None), Collaborators::simulated(&cluster), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::NegativeDelay { .. })
    ));
    assert!(cluster.started().is_empty());
}

#[tokio::test]
async fn test_unknown_worker_aborts() {
    let cluster = cluster();
    let mut cfg = batch_config(None);
    cfg.batch.worker = "pserv-9".into();

    let err = run_driver(cfg, Collaborators::simulated(&cluster), Some(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_run_driver_batch_mode() {
    let cluster = cluster();
    let summary = run_driver(batch_config(Some(2)), Collaborators::simulated(&cluster), Some(2))
        .await
        .unwrap();
    assert_eq!(summary.completed, 2);
    assert!(summary.extracted_value > 0.0);
}

#[test]
fn test_snapshot_descriptors_are_privileged() {
    let cluster = cluster();
    assert!(cluster.descriptors().iter().all(|d| d.privileged));
    assert_eq!(
        cluster.descriptors(),
        vec![
            NodeDescriptor::privileged("home"),
            NodeDescriptor::privileged("n00dles")
        ]
    );
}
