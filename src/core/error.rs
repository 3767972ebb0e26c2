//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::JobKind;

/// Errors produced by scheduler components.
///
/// Configuration errors abort the current cycle. Everything else is either
/// contained inside a pool dispatch (rejections, per-node substrate failures)
/// or surfaced to the driver as a per-node/per-target failure.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A batch operation would need to start before the batch origin.
    #[error(
        "negative {kind} delay: latency {latency_ms}ms does not fit under stabilize latency {stabilize_ms}ms with spacer {spacer_ms}ms"
    )]
    NegativeDelay {
        /// Operation whose delay went negative.
        kind: JobKind,
        /// Latency of that operation.
        latency_ms: u128,
        /// Stabilize latency of the target.
        stabilize_ms: u128,
        /// Gap between consecutive completions.
        spacer_ms: u128,
    },
    /// The cost oracle has no usable cost for a job on a node.
    #[error("unknown cost for job `{job}` on node `{node}`")]
    UnknownJobCost {
        /// Executable name of the job.
        job: String,
        /// Node the cost was requested for.
        node: String,
    },
    /// No node with this id exists in the pool.
    #[error("node not found: {0}")]
    NodeNotFound(String),
    /// No target with this id is known to the oracle.
    #[error("target not found: {0}")]
    TargetNotFound(String),
    /// The pool snapshot carries the same node id twice.
    #[error("duplicate node id in pool snapshot: {0}")]
    DuplicateNode(String),
    /// Extraction fraction outside `(0, 1]`.
    #[error("invalid extraction fraction {0}: expected a value in (0, 1]")]
    InvalidFraction(f64),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The execution substrate refused to start an operation.
    #[error("node `{node}` rejected {kind} operation")]
    Rejected {
        /// Node that refused the operation.
        node: String,
        /// Kind of the refused operation.
        kind: JobKind,
    },
    /// Execution substrate failure.
    #[error("substrate error: {0}")]
    Substrate(String),
    /// Target oracle failure.
    #[error("oracle error: {0}")]
    Oracle(String),
    /// Pool snapshot could not be read or written.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl SchedulerError {
    /// Whether this error aborts the scheduling cycle.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NegativeDelay { .. }
                | Self::UnknownJobCost { .. }
                | Self::NodeNotFound(_)
                | Self::TargetNotFound(_)
                | Self::DuplicateNode(_)
                | Self::InvalidFraction(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
