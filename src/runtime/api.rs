//! Serializable report models for driver runs and pool listings.

use serde::{Deserialize, Serialize};

use crate::core::WorkerPool;

/// What one batch round did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRoundReport {
    /// Worker that ran the batches.
    pub worker: String,
    /// Target acted on.
    pub target: String,
    /// Batches the worker's spare capacity allowed.
    pub planned_runs: u64,
    /// Batches actually dispatched.
    pub launched_runs: u64,
    /// Cycle period of one batch in milliseconds.
    pub period_ms: u128,
    /// Round duration used for the rate in milliseconds.
    pub elapsed_ms: u128,
    /// Value realized during the round.
    pub gained_value: f64,
    /// `gained_value` per second of `elapsed_ms`.
    pub value_per_second: f64,
}

/// Totals over a driver run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Cycles or rounds that completed.
    pub completed: u32,
    /// Cycles or rounds that failed with a recoverable error.
    pub failed: u32,
    /// Value extracted over the run.
    pub extracted_value: f64,
}

/// Capacity view of one pool node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node id.
    pub id: String,
    /// Whether the node is privileged.
    pub privileged: bool,
    /// Total capacity, absent if the substrate could not be read.
    pub total_capacity: Option<f64>,
    /// Spare capacity, absent if the substrate could not be read.
    pub spare_capacity: Option<f64>,
    /// Excluded for the current cycle.
    pub excluded: bool,
}

/// Fresh capacity listing of every node in the pool.
pub fn list_nodes(pool: &WorkerPool) -> Vec<NodeStatus> {
    pool.nodes()
        .iter()
        .map(|node| NodeStatus {
            id: node.id().to_string(),
            privileged: node.is_privileged(),
            total_capacity: node.total_capacity().ok(),
            spare_capacity: node.spare_capacity().ok(),
            excluded: pool.is_excluded(node.id()),
        })
        .collect()
}
