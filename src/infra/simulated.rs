//! Deterministic in-process cluster for development and testing.
//!
//! One `SimulatedCluster` plays every collaborator at once: the execution
//! substrate hosting the workers, the target oracle with a simple effect
//! model, the deployer, and a virtual clock that sleeping advances. Operations
//! apply their effect when the clock passes `start + delay + latency`, so
//! completion ordering can be observed exactly.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::core::{
    Deployer, ExecutionSubstrate, JobKind, JobSpec, NodeDescriptor, OperationRequest,
    SchedulerError, Sleeper, TargetOracle, TopologySource, ValueChange,
};

/// Per-unit effect sizes of the three operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectModel {
    /// Fraction of current value one extract unit removes.
    pub extract_fraction_per_unit: f64,
    /// Compound growth rate of one grow unit.
    pub grow_rate_per_unit: f64,
    /// Instability one extract unit adds.
    pub extract_instability_per_unit: f64,
    /// Instability one grow unit adds.
    pub grow_instability_per_unit: f64,
    /// Instability one stabilize unit removes.
    pub stabilize_effect_per_unit: f64,
}

impl Default for EffectModel {
    fn default() -> Self {
        Self {
            extract_fraction_per_unit: 0.002,
            grow_rate_per_unit: 0.003,
            extract_instability_per_unit: 0.002,
            grow_instability_per_unit: 0.004,
            stabilize_effect_per_unit: 0.05,
        }
    }
}

/// State of a simulated target.
#[derive(Debug, Clone, PartialEq)]
pub struct SimTarget {
    /// Current value.
    pub value: f64,
    /// Maximum value.
    pub max_value: f64,
    /// Current instability.
    pub instability: f64,
    /// Instability floor.
    pub min_instability: f64,
    /// Proficiency needed to act on the target.
    pub required_proficiency: u32,
    /// Stabilize latency.
    pub stabilize_latency: Duration,
    /// Grow latency.
    pub grow_latency: Duration,
    /// Extract latency.
    pub extract_latency: Duration,
}

impl SimTarget {
    /// Target with 4000/3200/1600 ms stabilize/grow/extract latencies.
    #[must_use]
    pub const fn new(value: f64, max_value: f64, instability: f64, min_instability: f64) -> Self {
        Self {
            value,
            max_value,
            instability,
            min_instability,
            required_proficiency: 1,
            stabilize_latency: Duration::from_millis(4000),
            grow_latency: Duration::from_millis(3200),
            extract_latency: Duration::from_millis(1600),
        }
    }

    /// Override the latencies.
    #[must_use]
    pub const fn with_latencies(
        mut self,
        stabilize: Duration,
        grow: Duration,
        extract: Duration,
    ) -> Self {
        self.stabilize_latency = stabilize;
        self.grow_latency = grow;
        self.extract_latency = extract;
        self
    }

    /// Override the required proficiency.
    #[must_use]
    pub const fn with_required_proficiency(mut self, level: u32) -> Self {
        self.required_proficiency = level;
        self
    }

    const fn latency(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Stabilize => self.stabilize_latency,
            JobKind::Grow => self.grow_latency,
            JobKind::Extract => self.extract_latency,
        }
    }
}

/// An operation the simulated substrate accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedOperation {
    /// Node running the operation.
    pub node: String,
    /// Operation kind.
    pub kind: JobKind,
    /// Units.
    pub units: u64,
    /// Target acted on.
    pub target: String,
    /// Requested start delay.
    pub delay: Duration,
    /// Virtual time of dispatch.
    pub started_at: Duration,
    /// Virtual time the effect applies.
    pub completes_at: Duration,
    /// Capacity held until completion.
    pub cost: f64,
}

#[derive(Debug, Default)]
struct SimNode {
    capacity: f64,
    used: f64,
    refuses: bool,
    unreachable: bool,
    missing: HashSet<String>,
}

#[derive(Debug, Default)]
struct SimState {
    now: Duration,
    order: Vec<String>,
    nodes: HashMap<String, SimNode>,
    targets: HashMap<String, SimTarget>,
    job_costs: HashMap<JobKind, f64>,
    node_job_costs: HashMap<(String, JobKind), f64>,
    pending: Vec<StartedOperation>,
    started: Vec<StartedOperation>,
    completed: Vec<StartedOperation>,
    proficiency: u32,
    realized: f64,
}

impl SimState {
    fn node(&self, id: &str) -> Result<&SimNode, SchedulerError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))?;
        if node.unreachable {
            return Err(SchedulerError::Substrate(format!("node `{id}` unreachable")));
        }
        Ok(node)
    }

    fn target(&self, id: &str) -> Result<&SimTarget, SchedulerError> {
        self.targets
            .get(id)
            .ok_or_else(|| SchedulerError::TargetNotFound(id.to_string()))
    }

    fn cost(&self, kind: JobKind, node: &str) -> Option<f64> {
        self.node_job_costs
            .get(&(node.to_string(), kind))
            .or_else(|| self.job_costs.get(&kind))
            .copied()
    }
}

/// In-process cluster implementing every collaborator trait.
#[derive(Debug)]
pub struct SimulatedCluster {
    state: Mutex<SimState>,
    effects: EffectModel,
}

impl Default for SimulatedCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCluster {
    /// Empty cluster with the default effect model and job costs of 1.75
    /// (grow, stabilize) and 1.7 (extract) per unit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_effects(EffectModel::default())
    }

    /// Empty cluster with a custom effect model.
    #[must_use]
    pub fn with_effects(effects: EffectModel) -> Self {
        let state = SimState {
            job_costs: HashMap::from([
                (JobKind::Grow, 1.75),
                (JobKind::Stabilize, 1.75),
                (JobKind::Extract, 1.7),
            ]),
            proficiency: 1,
            ..SimState::default()
        };
        Self {
            state: Mutex::new(state),
            effects,
        }
    }

    /// Effect model in use.
    #[must_use]
    pub const fn effects(&self) -> &EffectModel {
        &self.effects
    }

    /// Add a worker node with `capacity`.
    pub fn add_node(&self, id: impl Into<String>, capacity: f64) {
        let id = id.into();
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&id) {
            state.order.push(id.clone());
        }
        state.nodes.insert(
            id,
            SimNode {
                capacity,
                ..SimNode::default()
            },
        );
    }

    /// Add or replace a target.
    pub fn add_target(&self, id: impl Into<String>, target: SimTarget) {
        self.state.lock().targets.insert(id.into(), target);
    }

    /// Set the cost per unit of a job kind on every node.
    pub fn set_job_cost(&self, kind: JobKind, cost: f64) {
        self.state.lock().job_costs.insert(kind, cost);
    }

    /// Set the cost per unit of a job kind on one node.
    pub fn set_node_job_cost(&self, node: impl Into<String>, kind: JobKind, cost: f64) {
        self.state
            .lock()
            .node_job_costs
            .insert((node.into(), kind), cost);
    }

    /// Mark capacity on a node as used by someone else.
    pub fn set_used_capacity(&self, node: &str, used: f64) {
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.used = used;
        }
    }

    /// Make a node refuse every operation.
    pub fn refuse_operations(&self, node: &str) {
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.refuses = true;
        }
    }

    /// Make every substrate call for a node fail.
    pub fn set_unreachable(&self, node: &str) {
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.unreachable = true;
        }
    }

    /// Remove an executable from a node until it is deployed again.
    pub fn remove_executable(&self, node: &str, executable: &str) {
        if let Some(n) = self.state.lock().nodes.get_mut(node) {
            n.missing.insert(executable.to_string());
        }
    }

    /// Set the acting entity's proficiency.
    pub fn set_proficiency(&self, level: u32) {
        self.state.lock().proficiency = level;
    }

    /// Snapshot of a target's state.
    #[must_use]
    pub fn target(&self, id: &str) -> Option<SimTarget> {
        self.state.lock().targets.get(id).cloned()
    }

    /// Descriptors of every node in insertion order, all privileged.
    #[must_use]
    pub fn descriptors(&self) -> Vec<NodeDescriptor> {
        self.state
            .lock()
            .order
            .iter()
            .map(NodeDescriptor::privileged)
            .collect()
    }

    /// Every operation accepted so far, in dispatch order.
    #[must_use]
    pub fn started(&self) -> Vec<StartedOperation> {
        self.state.lock().started.clone()
    }

    /// Every operation applied so far, in completion order.
    #[must_use]
    pub fn completed(&self) -> Vec<StartedOperation> {
        self.state.lock().completed.clone()
    }

    /// Operations accepted but not yet applied.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Advance the virtual clock and apply every operation that completes
    /// by then, in completion order.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.now += duration;
        let now = state.now;

        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|op| op.completes_at <= now);
        state.pending = pending;
        due.sort_by_key(|op| op.completes_at);

        for op in due {
            if let Some(node) = state.nodes.get_mut(&op.node) {
                node.used = (node.used - op.cost).max(0.0);
            }
            let realized = state
                .targets
                .get_mut(&op.target)
                .map_or(0.0, |target| self.apply(target, &op));
            state.realized += realized;
            trace!(node = %op.node, kind = %op.kind, units = op.units, "operation completed");
            state.completed.push(op);
        }
    }

    /// Apply one operation to a target; returns the value extracted.
    #[allow(clippy::cast_precision_loss)]
    fn apply(&self, target: &mut SimTarget, op: &StartedOperation) -> f64 {
        let units = op.units as f64;
        match op.kind {
            JobKind::Extract => {
                let share = (self.effects.extract_fraction_per_unit * units).min(1.0);
                let stolen = target.value * share;
                target.value -= stolen;
                target.instability += self.effects.extract_instability_per_unit * units;
                stolen
            }
            JobKind::Grow => {
                let grown =
                    (target.value + units) * (1.0 + self.effects.grow_rate_per_unit).powf(units);
                target.value = grown.min(target.max_value);
                target.instability += self.effects.grow_instability_per_unit * units;
                0.0
            }
            JobKind::Stabilize => {
                target.instability = (target.instability
                    - self.effects.stabilize_effect_per_unit * units)
                    .max(target.min_instability);
                0.0
            }
        }
    }
}

impl ExecutionSubstrate for SimulatedCluster {
    #[allow(clippy::cast_precision_loss)]
    fn start_operation(&self, request: &OperationRequest<'_>) -> Result<bool, SchedulerError> {
        let mut state = self.state.lock();
        let node = state.node(request.node_id)?;
        if node.refuses || node.missing.contains(request.job.executable()) {
            return Ok(false);
        }
        let kind = request.job.kind();
        let Some(per_unit) = state.cost(kind, request.node_id) else {
            return Err(SchedulerError::UnknownJobCost {
                job: request.job.executable().to_string(),
                node: request.node_id.to_string(),
            });
        };
        let cost = per_unit * request.units as f64;
        if node.used + cost > node.capacity + 1e-9 {
            return Ok(false);
        }
        let latency = state.target(request.target_id)?.latency(kind);

        let op = StartedOperation {
            node: request.node_id.to_string(),
            kind,
            units: request.units,
            target: request.target_id.to_string(),
            delay: request.delay,
            started_at: state.now,
            completes_at: state.now + request.delay + latency,
            cost,
        };
        if let Some(node) = state.nodes.get_mut(request.node_id) {
            node.used += cost;
        }
        state.started.push(op.clone());
        state.pending.push(op);
        Ok(true)
    }

    fn capacity(&self, node_id: &str) -> Result<f64, SchedulerError> {
        Ok(self.state.lock().node(node_id)?.capacity)
    }

    fn used_capacity(&self, node_id: &str) -> Result<f64, SchedulerError> {
        Ok(self.state.lock().node(node_id)?.used)
    }

    fn job_cost(&self, job: &JobSpec, node_id: &str) -> Result<f64, SchedulerError> {
        self.state
            .lock()
            .cost(job.kind(), node_id)
            .ok_or_else(|| SchedulerError::UnknownJobCost {
                job: job.executable().to_string(),
                node: node_id.to_string(),
            })
    }

    fn terminate_all(&self, node_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        state.node(node_id)?;
        state.pending.retain(|op| op.node != node_id);
        if let Some(node) = state.nodes.get_mut(node_id) {
            node.used = 0.0;
        }
        Ok(())
    }
}

impl TargetOracle for SimulatedCluster {
    fn current_value(&self, target_id: &str) -> Result<f64, SchedulerError> {
        Ok(self.state.lock().target(target_id)?.value)
    }

    fn max_value(&self, target_id: &str) -> Result<f64, SchedulerError> {
        Ok(self.state.lock().target(target_id)?.max_value)
    }

    fn current_instability(&self, target_id: &str) -> Result<f64, SchedulerError> {
        Ok(self.state.lock().target(target_id)?.instability)
    }

    fn min_instability(&self, target_id: &str) -> Result<f64, SchedulerError> {
        Ok(self.state.lock().target(target_id)?.min_instability)
    }

    fn latency(&self, target_id: &str, kind: JobKind) -> Result<Duration, SchedulerError> {
        Ok(self.state.lock().target(target_id)?.latency(kind))
    }

    fn units_for_value_change(
        &self,
        target_id: &str,
        change: ValueChange,
    ) -> Result<f64, SchedulerError> {
        let value = self.state.lock().target(target_id)?.value;
        Ok(match change {
            ValueChange::Extract(amount) if value > 0.0 && amount > 0.0 => {
                amount / (value * self.effects.extract_fraction_per_unit)
            }
            ValueChange::Grow(multiplier) if multiplier > 1.0 => {
                multiplier.ln() / self.effects.grow_rate_per_unit.ln_1p()
            }
            _ => 0.0,
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn instability_delta(&self, kind: JobKind, units: u64) -> f64 {
        let units = units as f64;
        match kind {
            JobKind::Extract => self.effects.extract_instability_per_unit * units,
            JobKind::Grow => self.effects.grow_instability_per_unit * units,
            JobKind::Stabilize => -self.effects.stabilize_effect_per_unit * units,
        }
    }

    fn stabilize_effect_per_unit(&self) -> f64 {
        self.effects.stabilize_effect_per_unit
    }

    fn required_proficiency(&self, target_id: &str) -> Result<u32, SchedulerError> {
        Ok(self.state.lock().target(target_id)?.required_proficiency)
    }

    fn proficiency(&self) -> u32 {
        self.state.lock().proficiency
    }

    fn realized_value(&self) -> f64 {
        self.state.lock().realized
    }
}

impl Deployer for SimulatedCluster {
    fn ensure_deployed(&self, node_id: &str, job: &JobSpec) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        state.node(node_id)?;
        if let Some(node) = state.nodes.get_mut(node_id) {
            node.missing.remove(job.executable());
        }
        Ok(())
    }
}

impl TopologySource for SimulatedCluster {
    fn load(&self) -> Result<Vec<NodeDescriptor>, SchedulerError> {
        Ok(self.descriptors())
    }
}

#[async_trait]
impl Sleeper for SimulatedCluster {
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
