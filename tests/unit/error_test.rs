//! Tests for error types

use prometheus_harvest::core::{JobKind, SchedulerError};

#[test]
fn test_negative_delay_error() {
    let err = SchedulerError::NegativeDelay {
        kind: JobKind::Grow,
        latency_ms: 5000,
        stabilize_ms: 4000,
        spacer_ms: 100,
    };
    assert_eq!(
        err.to_string(),
        "negative grow delay: latency 5000ms does not fit under stabilize latency 4000ms with spacer 100ms"
    );
    assert!(err.is_fatal());
}

#[test]
fn test_unknown_job_cost_error() {
    let err = SchedulerError::UnknownJobCost {
        job: "grow".into(),
        node: "n1".into(),
    };
    assert_eq!(format!("{err}"), "unknown cost for job `grow` on node `n1`");
    assert!(err.is_fatal());
}

#[test]
fn test_rejected_error_is_recoverable() {
    let err = SchedulerError::Rejected {
        node: "home".into(),
        kind: JobKind::Extract,
    };
    assert_eq!(format!("{err}"), "node `home` rejected extract operation");
    assert!(!err.is_fatal());
}

#[test]
fn test_collaborator_errors_are_recoverable() {
    assert!(!SchedulerError::Substrate("timeout".into()).is_fatal());
    assert!(!SchedulerError::Oracle("stale".into()).is_fatal());
    assert!(!SchedulerError::Snapshot("missing".into()).is_fatal());
}

#[test]
fn test_anyhow_keeps_scheduler_error() {
    let err: anyhow::Error = SchedulerError::DuplicateNode("n1".into()).into();
    let err = err.context("building pool");
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::DuplicateNode(id)) if id == "n1"
    ));
}
