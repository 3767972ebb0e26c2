//! Tests for pool builders

use std::sync::Arc;

use prometheus_harvest::builders::{build_pool, PoolBuilder};
use prometheus_harvest::config::DriverConfig;
use prometheus_harvest::core::{
    AuditAction, InMemoryAuditSink, JobSet, NodeDescriptor, SchedulerError,
};
use prometheus_harvest::infra::{InMemorySnapshot, SimTarget, SimulatedCluster};

fn cluster() -> Arc<SimulatedCluster> {
    let cluster = Arc::new(SimulatedCluster::new());
    cluster.add_node("home", 32.0);
    cluster.add_node("pserv-0", 64.0);
    cluster.add_target("t", SimTarget::new(100.0, 200.0, 5.0, 1.0));
    cluster
}

#[test]
fn test_build_pool_keeps_snapshot_order() {
    let cluster = cluster();
    let pool = build_pool(&DriverConfig::default(), cluster.as_ref(), cluster.clone()).unwrap();
    let ids: Vec<_> = pool.nodes().iter().map(|n| n.id().to_string()).collect();
    assert_eq!(ids, vec!["home", "pserv-0"]);
}

#[test]
fn test_unprivileged_nodes_allowed_when_not_required() {
    let cluster = cluster();
    let source = InMemorySnapshot::new(vec![NodeDescriptor {
        id: "home".into(),
        privileged: false,
    }]);
    let strict = build_pool(&DriverConfig::default(), &source, cluster.clone()).unwrap();
    assert!(strict.is_empty());

    let lax = DriverConfig {
        require_privileged: false,
        ..DriverConfig::default()
    };
    assert_eq!(build_pool(&lax, &source, cluster).unwrap().len(), 1);
}

#[test]
fn test_invalid_driver_config_is_rejected() {
    let cluster = cluster();
    let cfg = DriverConfig {
        min_capacity: -1.0,
        ..DriverConfig::default()
    };
    let err = build_pool(&cfg, cluster.as_ref(), cluster.clone()).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_builder_attaches_audit_sink() {
    let cluster = cluster();
    let sink = InMemoryAuditSink::new(16);
    let mut pool = PoolBuilder::new(DriverConfig::default())
        .with_audit(Arc::new(sink.clone()))
        .build(cluster.as_ref(), cluster.clone())
        .unwrap();

    let jobs = JobSet::default();
    let outcome = pool
        .dispatch(&jobs.grow, 4, "t", std::time::Duration::ZERO)
        .unwrap();
    assert_eq!(outcome.dispatched, 4);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::Dispatch);
    assert_eq!(events[0].node, "pserv-0");
}
