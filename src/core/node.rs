//! Worker nodes and the target view.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{
    ExecutionSubstrate, JobKind, JobSpec, OperationRequest, SchedulerError, TargetOracle,
    ValueChange,
};

/// One entry of a pool snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node id.
    pub id: String,
    /// Whether the acting entity holds the privileges needed to run jobs here.
    #[serde(default, alias = "isPrivileged")]
    pub privileged: bool,
}

impl NodeDescriptor {
    /// Descriptor for a privileged node.
    pub fn privileged(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            privileged: true,
        }
    }
}

/// Round a fractional unit count up to whole units; non-finite or
/// non-positive values map to zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn whole_units(raw: f64) -> u64 {
    if raw.is_finite() && raw > 0.0 {
        raw.ceil() as u64
    } else {
        0
    }
}

/// A worker node with finite execution capacity.
///
/// Capacity is never cached: every query re-reads the substrate, because
/// operations started by other actors change it concurrently.
#[derive(Clone)]
pub struct Node {
    descriptor: NodeDescriptor,
    substrate: Arc<dyn ExecutionSubstrate>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.descriptor.id)
            .field("privileged", &self.descriptor.privileged)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Bind a descriptor to the substrate that hosts it.
    pub fn new(descriptor: NodeDescriptor, substrate: Arc<dyn ExecutionSubstrate>) -> Self {
        Self {
            descriptor,
            substrate,
        }
    }

    /// Node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Snapshot descriptor this node was built from.
    #[must_use]
    pub const fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    /// Whether the node is privileged.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        self.descriptor.privileged
    }

    pub(crate) fn substrate(&self) -> &Arc<dyn ExecutionSubstrate> {
        &self.substrate
    }

    /// Total capacity.
    ///
    /// # Errors
    ///
    /// Propagates substrate failures.
    pub fn total_capacity(&self) -> Result<f64, SchedulerError> {
        self.substrate.capacity(self.id())
    }

    /// Capacity in use.
    ///
    /// # Errors
    ///
    /// Propagates substrate failures.
    pub fn used_capacity(&self) -> Result<f64, SchedulerError> {
        self.substrate.used_capacity(self.id())
    }

    /// Capacity not in use, never negative.
    ///
    /// # Errors
    ///
    /// Propagates substrate failures.
    pub fn spare_capacity(&self) -> Result<f64, SchedulerError> {
        Ok((self.total_capacity()? - self.used_capacity()?).max(0.0))
    }

    /// Number of whole units of `job` that fit in the spare capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJobCost`] when the job has no cost on
    /// this node, or a substrate error.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn capacity_for(&self, job: &JobSpec) -> Result<u64, SchedulerError> {
        let cost = job.cost_per_unit(self)?;
        let spare = self.spare_capacity()?;
        Ok((spare / cost).floor() as u64)
    }

    /// Ask the substrate to start `units` of `job` against `target_id`.
    ///
    /// Fire and forget: `Ok(true)` only means the request was enqueued.
    ///
    /// # Errors
    ///
    /// Propagates substrate failures.
    pub fn dispatch(
        &self,
        job: &JobSpec,
        units: u64,
        target_id: &str,
        delay: Duration,
    ) -> Result<bool, SchedulerError> {
        self.substrate.start_operation(&OperationRequest {
            job,
            node_id: self.id(),
            units,
            target_id,
            delay,
        })
    }

    /// Terminate every operation on this node.
    ///
    /// # Errors
    ///
    /// Propagates substrate failures.
    pub fn terminate_all(&self) -> Result<(), SchedulerError> {
        self.substrate.terminate_all(self.id())
    }
}

/// A node in its target role: dynamic state read fresh from the oracle.
///
/// The scheduler never mutates a target directly and never memoizes any of
/// its fields.
#[derive(Clone)]
pub struct Target {
    id: String,
    oracle: Arc<dyn TargetOracle>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Target {
    /// View `id` through `oracle`.
    pub fn new(id: impl Into<String>, oracle: Arc<dyn TargetOracle>) -> Self {
        Self {
            id: id.into(),
            oracle,
        }
    }

    /// Target id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Oracle backing this view.
    #[must_use]
    pub fn oracle(&self) -> &Arc<dyn TargetOracle> {
        &self.oracle
    }

    /// Current value.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn current_value(&self) -> Result<f64, SchedulerError> {
        self.oracle.current_value(&self.id)
    }

    /// Maximum value.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn max_value(&self) -> Result<f64, SchedulerError> {
        self.oracle.max_value(&self.id)
    }

    /// Current instability.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn current_instability(&self) -> Result<f64, SchedulerError> {
        self.oracle.current_instability(&self.id)
    }

    /// Instability floor.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn min_instability(&self) -> Result<f64, SchedulerError> {
        self.oracle.min_instability(&self.id)
    }

    /// `max_value - current_value`.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn value_deficit(&self) -> Result<f64, SchedulerError> {
        Ok(self.max_value()? - self.current_value()?)
    }

    /// `current_instability - min_instability`.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn instability_excess(&self) -> Result<f64, SchedulerError> {
        Ok(self.current_instability()? - self.min_instability()?)
    }

    /// Instability is at or below its floor.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn is_stable(&self) -> Result<bool, SchedulerError> {
        Ok(self.instability_excess()? <= 0.0)
    }

    /// Value is at or above its maximum.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn has_max_value(&self) -> Result<bool, SchedulerError> {
        Ok(self.value_deficit()? <= 0.0)
    }

    /// Latency of one operation of `kind`. Shrinks over the run as the acting
    /// entity's proficiency grows.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn latency(&self, kind: JobKind) -> Result<Duration, SchedulerError> {
        self.oracle.latency(&self.id, kind)
    }

    /// Stabilize latency.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn stabilize_latency(&self) -> Result<Duration, SchedulerError> {
        self.latency(JobKind::Stabilize)
    }

    /// Grow latency.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn grow_latency(&self) -> Result<Duration, SchedulerError> {
        self.latency(JobKind::Grow)
    }

    /// Extract latency.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn extract_latency(&self) -> Result<Duration, SchedulerError> {
        self.latency(JobKind::Extract)
    }

    /// Required proficiency.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn required_proficiency(&self) -> Result<u32, SchedulerError> {
        self.oracle.required_proficiency(&self.id)
    }

    /// Instability removed by one stabilize unit.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Oracle`] when the oracle reports a
    /// non-positive effect, which would make stabilization impossible.
    pub fn stabilize_effect_per_unit(&self) -> Result<f64, SchedulerError> {
        let effect = self.oracle.stabilize_effect_per_unit();
        if effect.is_finite() && effect > 0.0 {
            Ok(effect)
        } else {
            Err(SchedulerError::Oracle(format!(
                "stabilize effect per unit must be positive, got {effect}"
            )))
        }
    }

    /// Stabilize units needed to bring instability down to its floor.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn units_to_stabilize(&self) -> Result<u64, SchedulerError> {
        let excess = self.instability_excess()?;
        Ok(whole_units(excess / self.stabilize_effect_per_unit()?))
    }

    /// Stabilize units that cancel the instability `units` of `kind` add,
    /// never fewer than one.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn units_to_offset(&self, kind: JobKind, units: u64) -> Result<u64, SchedulerError> {
        let added = self.oracle.instability_delta(kind, units);
        Ok(whole_units(added / self.stabilize_effect_per_unit()?).max(1))
    }

    /// Extract units needed to remove `amount` of value.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn units_to_extract(&self, amount: f64) -> Result<u64, SchedulerError> {
        if amount <= 0.0 {
            return Ok(0);
        }
        let raw = self
            .oracle
            .units_for_value_change(&self.id, ValueChange::Extract(amount))?;
        Ok(whole_units(raw))
    }

    /// Grow units that restore the value removed by extracting `fraction` of
    /// the current value.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn units_to_grow(&self, fraction: f64) -> Result<u64, SchedulerError> {
        let current = self.current_value()?;
        let remaining = (current * (1.0 - fraction)).max(1.0);
        self.units_for_multiplier(current.max(1.0) / remaining)
    }

    /// Grow units that bring the value up to its maximum.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn units_to_grow_to_max(&self) -> Result<u64, SchedulerError> {
        let current = self.current_value()?.max(1.0);
        self.units_for_multiplier(self.max_value()? / current)
    }

    fn units_for_multiplier(&self, multiplier: f64) -> Result<u64, SchedulerError> {
        if multiplier <= 1.0 {
            return Ok(0);
        }
        let raw = self
            .oracle
            .units_for_value_change(&self.id, ValueChange::Grow(multiplier))?;
        Ok(whole_units(raw))
    }
}
