//! Tests for configuration validation

use prometheus_harvest::config::{
    BatchConfig, DriverConfig, DriverMode, HarvestConfig, OrchestratorConfig,
};

#[test]
fn test_defaults_validate() {
    let cfg = HarvestConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.driver.mode, DriverMode::Continuous);
    assert_eq!(cfg.driver.target_divisor, 3);
    assert_eq!(cfg.batch.spacer_ms, 100);
    assert!((cfg.orchestrator.extract_fraction - 0.75).abs() < f64::EPSILON);
}

#[test]
fn test_batch_config_invalid_fraction() {
    for fraction in [0.0, -0.1, 1.5, f64::NAN] {
        let cfg = BatchConfig {
            extraction_fraction: fraction,
            ..BatchConfig::default()
        };
        assert!(cfg.validate().is_err(), "fraction {fraction} accepted");
    }
}

#[test]
fn test_batch_config_invalid_spacer() {
    let cfg = BatchConfig {
        spacer_ms: 0,
        ..BatchConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_orchestrator_config_invalid_iterations() {
    let cfg = OrchestratorConfig {
        max_iterations: Some(0),
        ..OrchestratorConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_driver_config_invalid_divisor() {
    let cfg = DriverConfig {
        target_divisor: 0,
        ..DriverConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_partial_json_uses_defaults() {
    let cfg = HarvestConfig::from_json_str(
        r#"{
            "jobs": { "grow": "g.js" },
            "batch": { "worker": "pserv-0", "max_runs": 4 },
            "driver": { "mode": "batch" }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.jobs.grow, "g.js");
    assert_eq!(cfg.jobs.extract, "extract");
    assert_eq!(cfg.batch.worker, "pserv-0");
    assert_eq!(cfg.batch.max_runs, Some(4));
    assert_eq!(cfg.driver.mode, DriverMode::Batch);
    assert_eq!(cfg.driver.home_node, "home");
}

#[test]
fn test_invalid_json_is_rejected() {
    let err = HarvestConfig::from_json_str(r#"{ "jobs": { "grow": "" } }"#).unwrap_err();
    assert!(err.contains("jobs.grow"));
    assert!(HarvestConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harvest.json");
    std::fs::write(&path, r#"{ "orchestrator": { "grow_buffer_ms": 250 } }"#).unwrap();
    let cfg = HarvestConfig::from_path(&path).unwrap();
    assert_eq!(cfg.orchestrator.grow_buffer_ms, 250);
    assert!(HarvestConfig::from_path(dir.path().join("missing.json")).is_err());
}
