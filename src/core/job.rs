//! Job kinds and their per-node resource cost.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::JobsConfig;
use crate::core::{Node, SchedulerError};

/// The three operation kinds the scheduler dispatches against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Lowers the target's instability toward its floor.
    Stabilize,
    /// Raises the target's value toward its maximum.
    Grow,
    /// Removes value from the target.
    Extract,
}

impl JobKind {
    /// All job kinds in dispatch-priority order.
    pub const ALL: [Self; 3] = [Self::Stabilize, Self::Grow, Self::Extract];

    /// Lowercase name used in logs and audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stabilize => "stabilize",
            Self::Grow => "grow",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation kind bound to the executable that performs it.
///
/// Immutable once constructed. The cost per unit is not stored: it is asked
/// from the cost oracle relative to a specific node every time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobSpec {
    kind: JobKind,
    executable: String,
}

impl JobSpec {
    /// Create a job spec for `kind` run by `executable`.
    pub fn new(kind: JobKind, executable: impl Into<String>) -> Self {
        Self {
            kind,
            executable: executable.into(),
        }
    }

    /// Operation kind.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        self.kind
    }

    /// Executable name deployed on worker nodes.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Resource cost of one unit of this job on `node`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJobCost`] when the oracle has no cost
    /// or reports a non-positive one; the job cannot be scheduled then.
    pub fn cost_per_unit(&self, node: &Node) -> Result<f64, SchedulerError> {
        let cost = node.substrate().job_cost(self, node.id())?;
        if cost.is_finite() && cost > 0.0 {
            Ok(cost)
        } else {
            Err(SchedulerError::UnknownJobCost {
                job: self.executable.clone(),
                node: node.id().to_string(),
            })
        }
    }
}

/// The grow/extract/stabilize job triple used by batches and orchestrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSet {
    /// Grow job.
    pub grow: JobSpec,
    /// Extract job.
    pub extract: JobSpec,
    /// Stabilize job.
    pub stabilize: JobSpec,
}

impl JobSet {
    /// Build the set from the configured executable names.
    #[must_use]
    pub fn from_config(cfg: &JobsConfig) -> Self {
        Self {
            grow: JobSpec::new(JobKind::Grow, cfg.grow.clone()),
            extract: JobSpec::new(JobKind::Extract, cfg.extract.clone()),
            stabilize: JobSpec::new(JobKind::Stabilize, cfg.stabilize.clone()),
        }
    }

    /// Job for a given kind.
    #[must_use]
    pub const fn get(&self, kind: JobKind) -> &JobSpec {
        match kind {
            JobKind::Grow => &self.grow,
            JobKind::Extract => &self.extract,
            JobKind::Stabilize => &self.stabilize,
        }
    }

    /// Iterate over the three jobs.
    pub fn iter(&self) -> impl Iterator<Item = &JobSpec> {
        [&self.stabilize, &self.grow, &self.extract].into_iter()
    }
}

impl Default for JobSet {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}
