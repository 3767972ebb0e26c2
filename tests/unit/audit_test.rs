//! Tests for audit sink

use std::sync::Arc;
use std::time::Duration;

use prometheus_harvest::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, JobKind, JobSet,
    TracingAuditSink, WorkerPool,
};
use prometheus_harvest::infra::{SimTarget, SimulatedCluster};
use prometheus_harvest::util::init_tracing;

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    sink.record(build_audit_event(
        AuditAction::Dispatch,
        "n1",
        Some(JobKind::Grow),
        Some("t".into()),
        12,
        300,
        None,
    ));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].node, "n1");
    assert_eq!(events[0].action, AuditAction::Dispatch);
    assert_eq!(events[0].kind, Some(JobKind::Grow));
    assert_eq!(events[0].target.as_deref(), Some("t"));
    assert_eq!(events[0].units, 12);
    assert_eq!(events[0].delay_ms, 300);
    assert!(!events[0].event_id.is_empty());
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    for node in ["n1", "n2", "n3"] {
        sink.record(build_audit_event(AuditAction::Terminate, node, None, None, 0, 0, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].node, "n2");
    assert_eq!(events[1].node, "n3");
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(4);
    let handle = sink.clone();
    sink.record(build_audit_event(
        AuditAction::Reject,
        "n1",
        Some(JobKind::Extract),
        Some("t".into()),
        3,
        0,
        Some("refused".into()),
    ));
    assert_eq!(handle.events().len(), 1);
    assert_eq!(handle.events()[0].detail.as_deref(), Some("refused"));
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_audit_event(AuditAction::Dispatch, "n1", None, None, 1, 0, None);
    let b = build_audit_event(AuditAction::Dispatch, "n1", None, None, 1, 0, None);
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_tracing_sink_records_pool_dispatch() {
    init_tracing();
    let cluster = Arc::new(SimulatedCluster::new());
    cluster.add_node("n1", 35.0);
    cluster.add_target("t", SimTarget::new(100.0, 200.0, 5.0, 1.0));
    let mut pool = WorkerPool::new(cluster.descriptors(), cluster.clone())
        .unwrap()
        .with_audit(Arc::new(TracingAuditSink));

    let outcome = pool
        .dispatch(&JobSet::default().grow, 5, "t", Duration::from_millis(50))
        .unwrap();
    assert_eq!(outcome.dispatched, 5);
    assert!(pool.terminate_all().is_empty());

    TracingAuditSink.record(build_audit_event(
        AuditAction::Reject,
        "n1",
        Some(JobKind::Stabilize),
        Some("t".into()),
        2,
        0,
        Some("refused".into()),
    ));
}
