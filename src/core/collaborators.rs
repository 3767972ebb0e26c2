//! Narrow interfaces to the systems the scheduler consumes but does not own.
//!
//! The scheduler never caches anything it reads through these traits: node
//! capacity and target state are mutated out of band by operations already in
//! flight, so every query goes back to the collaborator.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::{JobKind, JobSpec, NodeDescriptor, SchedulerError};

/// A request to start `units` parallel instances of a job on one node.
#[derive(Debug, Clone, Copy)]
pub struct OperationRequest<'a> {
    /// Job to run.
    pub job: &'a JobSpec,
    /// Node that runs the job.
    pub node_id: &'a str,
    /// Number of parallel units.
    pub units: u64,
    /// Target the job acts on.
    pub target_id: &'a str,
    /// Extra time the operation waits before acting, measured from dispatch.
    pub delay: Duration,
}

/// External execution substrate that hosts the worker nodes.
pub trait ExecutionSubstrate: Send + Sync {
    /// Enqueue an operation. `Ok(false)` means the substrate refused it (for
    /// example the executable is missing on the node); no acknowledgment of
    /// the operation itself is given.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate could not be reached.
    fn start_operation(&self, request: &OperationRequest<'_>) -> Result<bool, SchedulerError>;

    /// Total capacity of a node.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NodeNotFound`] for unknown nodes.
    fn capacity(&self, node_id: &str) -> Result<f64, SchedulerError>;

    /// Capacity currently in use on a node.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NodeNotFound`] for unknown nodes.
    fn used_capacity(&self, node_id: &str) -> Result<f64, SchedulerError>;

    /// Cost of one unit of `job` on `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJobCost`] when the job has no cost.
    fn job_cost(&self, job: &JobSpec, node_id: &str) -> Result<f64, SchedulerError>;

    /// Terminate every operation running on a node.
    ///
    /// # Errors
    ///
    /// Returns an error when the node is unknown or unreachable.
    fn terminate_all(&self, node_id: &str) -> Result<(), SchedulerError>;
}

/// Requested change of a target's value, used to size operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueChange {
    /// Remove this absolute amount of value.
    Extract(f64),
    /// Multiply the current value by this factor.
    Grow(f64),
}

/// Live view of target state and of the effect-size model.
pub trait TargetOracle: Send + Sync {
    /// Value currently held by the target.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn current_value(&self, target_id: &str) -> Result<f64, SchedulerError>;

    /// Maximum value the target can hold.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn max_value(&self, target_id: &str) -> Result<f64, SchedulerError>;

    /// Current instability level.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn current_instability(&self, target_id: &str) -> Result<f64, SchedulerError>;

    /// Instability floor.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn min_instability(&self, target_id: &str) -> Result<f64, SchedulerError>;

    /// Time one operation of `kind` takes against the target right now.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn latency(&self, target_id: &str, kind: JobKind) -> Result<Duration, SchedulerError>;

    /// Fractional number of units needed to apply `change` to the target.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn units_for_value_change(
        &self,
        target_id: &str,
        change: ValueChange,
    ) -> Result<f64, SchedulerError>;

    /// Instability added by `units` of `kind` (negative for stabilize).
    fn instability_delta(&self, kind: JobKind, units: u64) -> f64;

    /// Instability removed by one stabilize unit.
    fn stabilize_effect_per_unit(&self) -> f64;

    /// Proficiency the acting entity needs before it can act on the target.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::TargetNotFound`] for unknown targets.
    fn required_proficiency(&self, target_id: &str) -> Result<u32, SchedulerError>;

    /// Current proficiency of the acting entity.
    fn proficiency(&self) -> u32;

    /// Total value the acting entity has extracted so far.
    fn realized_value(&self) -> f64;
}

/// Source of the flat, de-duplicated node list a pool is built from.
pub trait TopologySource: Send + Sync {
    /// Load the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Snapshot`] when the snapshot cannot be read.
    fn load(&self) -> Result<Vec<NodeDescriptor>, SchedulerError>;
}

/// Ensures job executables are present on worker nodes before dispatch.
pub trait Deployer: Send + Sync {
    /// Make sure `job` can run on `node_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the node cannot be prepared.
    fn ensure_deployed(&self, node_id: &str, job: &JobSpec) -> Result<(), SchedulerError>;
}

/// Suspends the scheduler until a computed completion time has passed.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}
