//! Tests for pool snapshot sources

use std::sync::Arc;

use prometheus_harvest::core::{
    JobSet, NodeDescriptor, SchedulerError, TopologySource, WorkerPool,
};
use prometheus_harvest::infra::{InMemorySnapshot, JsonSnapshotSource, SimulatedCluster};

fn sample() -> Vec<NodeDescriptor> {
    vec![
        NodeDescriptor::privileged("home"),
        NodeDescriptor {
            id: "iron-gym".into(),
            privileged: false,
        },
        NodeDescriptor::privileged("pserv-0"),
    ]
}

#[test]
fn test_json_snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = JsonSnapshotSource::new(dir.path().join("nested").join("cluster.json"));

    source.save(&sample()).unwrap();
    assert_eq!(source.load().unwrap(), sample());
}

#[test]
fn test_reloaded_snapshot_has_same_capacity() {
    let cluster = Arc::new(SimulatedCluster::new());
    cluster.add_node("home", 64.0);
    cluster.add_node("iron-gym", 16.0);
    cluster.add_node("pserv-0", 128.0);
    cluster.set_used_capacity("pserv-0", 20.0);
    let dir = tempfile::tempdir().unwrap();
    let source = JsonSnapshotSource::new(dir.path().join("cluster.json"));
    source.save(&sample()).unwrap();

    let jobs = JobSet::default();
    let saved = WorkerPool::new(sample(), cluster.clone()).unwrap();
    let reloaded = WorkerPool::new(source.load().unwrap(), cluster).unwrap();

    for job in jobs.iter() {
        assert_eq!(
            saved.capacity_for(job).unwrap(),
            reloaded.capacity_for(job).unwrap()
        );
    }
    assert_eq!(reloaded.capacity_for(&jobs.grow).unwrap(), 36 + 9 + 61);
}

#[test]
fn test_json_snapshot_accepts_camel_case_privilege() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster.json");
    std::fs::write(&path, r#"[{"id":"a","isPrivileged":true},{"id":"b"}]"#).unwrap();

    let nodes = JsonSnapshotSource::new(&path).load().unwrap();
    assert_eq!(nodes[0], NodeDescriptor::privileged("a"));
    assert!(!nodes[1].privileged);
}

#[test]
fn test_missing_snapshot_is_snapshot_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JsonSnapshotSource::new(dir.path().join("none.json"))
        .load()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Snapshot(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_malformed_snapshot_is_snapshot_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster.json");
    std::fs::write(&path, "{ not a list").unwrap();
    let err = JsonSnapshotSource::new(&path).load().unwrap_err();
    assert!(matches!(err, SchedulerError::Snapshot(_)));
}

#[test]
fn test_in_memory_snapshot_keeps_order() {
    assert_eq!(InMemorySnapshot::new(sample()).load().unwrap(), sample());
}
