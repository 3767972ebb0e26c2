//! Iterative whole-pool strategies: stabilize to floor, grow to max, extract
//! a fraction.
//!
//! Each strategy loops on an explicit predicate over fresh target state. A
//! pass sizes one operation, dispatches whatever the pool can take, sleeps
//! until the predicted completion, and then re-reads the target instead of
//! trusting the prediction. Insufficient capacity slows convergence down; it
//! never fails a phase.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::core::{
    whole_units, DispatchOutcome, JobKind, JobSet, SchedulerError, Sleeper, Target, WorkerPool,
};

/// The three orchestrator strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Drive instability down to its floor.
    StabilizeToFloor,
    /// Drive value up to its maximum.
    GrowToMax,
    /// Extract a fraction of the maximum value.
    ExtractFraction,
}

/// What one phase did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Phase that ran.
    pub phase: Phase,
    /// Target acted on.
    pub target: String,
    /// Dispatch iterations.
    pub iterations: u32,
    /// Units of the phase's main job that were started.
    pub units_dispatched: u64,
    /// Stabilize units paired with grow units.
    pub paired_stabilize_units: u64,
    /// Iterations that placed fewer units than needed.
    pub shortfalls: u32,
    /// Iterations whose observed state disagreed with a sufficient dispatch.
    pub desyncs: u32,
    /// Nodes that refused work.
    pub rejections: u32,
    /// The phase was skipped by the redundant-stabilize heuristic.
    pub skipped: bool,
    /// The stopping predicate held on exit.
    pub converged: bool,
    /// Time spent sleeping.
    pub waited_ms: u128,
    /// Value removed from the target (extract phase only).
    pub extracted_value: f64,
}

impl PhaseReport {
    fn new(phase: Phase, target: &str) -> Self {
        Self {
            phase,
            target: target.to_string(),
            iterations: 0,
            units_dispatched: 0,
            paired_stabilize_units: 0,
            shortfalls: 0,
            desyncs: 0,
            rejections: 0,
            skipped: false,
            converged: false,
            waited_ms: 0,
            extracted_value: 0.0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn absorb_rejections(&mut self, outcome: &DispatchOutcome) {
        self.rejections += outcome.rejections.len() as u32;
    }
}

/// All phases run against one target in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Target acted on.
    pub target: String,
    /// Phases in execution order; phases whose predicate already held are absent.
    pub phases: Vec<PhaseReport>,
}

impl CycleReport {
    /// Value extracted during the cycle.
    #[must_use]
    pub fn extracted_value(&self) -> f64 {
        self.phases.iter().map(|p| p.extracted_value).sum()
    }

    /// Report for a phase, if it ran.
    #[must_use]
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Runs the whole-pool strategies against one target.
///
/// Phases for one target must run one after another: each phase's
/// precondition is the previous one's postcondition.
pub struct ContinuousOrchestrator<'a> {
    pool: &'a mut WorkerPool,
    target: Target,
    jobs: JobSet,
    sleeper: Arc<dyn Sleeper>,
    config: OrchestratorConfig,
}

impl<'a> ContinuousOrchestrator<'a> {
    /// Create an orchestrator over a pool snapshot owned by this cycle.
    pub fn new(
        pool: &'a mut WorkerPool,
        target: Target,
        jobs: JobSet,
        sleeper: Arc<dyn Sleeper>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            pool,
            target,
            jobs,
            sleeper,
            config,
        }
    }

    /// Target acted on.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    async fn wait(&self, report: &mut PhaseReport, duration: Duration) {
        report.waited_ms += duration.as_millis();
        self.sleeper.sleep(duration).await;
    }

    async fn back_off(&self, report: &mut PhaseReport) {
        report.shortfalls += 1;
        warn!(
            target = self.target.id(),
            phase = ?report.phase,
            backoff_ms = self.config.idle_backoff_ms,
            "no capacity available, backing off"
        );
        self.wait(report, self.config.idle_backoff()).await;
    }

    fn budget_spent(&self, report: &PhaseReport) -> bool {
        let spent = self
            .config
            .max_iterations
            .is_some_and(|max| report.iterations >= max);
        if spent {
            warn!(
                target = self.target.id(),
                phase = ?report.phase,
                iterations = report.iterations,
                "iteration limit reached before convergence"
            );
        }
        spent
    }

    /// Stabilize units removed per unit of instability one grow unit adds.
    fn grow_stabilize_ratio(&self) -> Result<f64, SchedulerError> {
        let per_grow = self.target.oracle().instability_delta(JobKind::Grow, 1);
        Ok(per_grow / self.target.stabilize_effect_per_unit()?)
    }

    /// Stabilize units the grow phase reserves out of `capacity`, at least one.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn paired_stabilize_budget(ratio: f64, capacity: u64) -> u64 {
        let raw = (ratio * capacity as f64).floor();
        if raw.is_finite() && raw >= 1.0 {
            raw as u64
        } else {
            1
        }
    }

    /// Drive instability down to its floor.
    ///
    /// When a grow phase will follow and the stabilize units it pairs with
    /// growth already exceed the current excess, the phase is skipped. That
    /// check compares a predicted future consumption against current need
    /// with the current pool size, so it is a heuristic, not a bound.
    ///
    /// # Errors
    ///
    /// Only configuration and oracle errors propagate.
    pub async fn stabilize_to_floor(&mut self) -> Result<PhaseReport, SchedulerError> {
        let mut report = PhaseReport::new(Phase::StabilizeToFloor, self.target.id());
        if self.target.is_stable()? {
            report.converged = true;
            return Ok(report);
        }

        if self.config.skip_redundant_stabilize && !self.target.has_max_value()? {
            let needed = self.target.units_to_stabilize()?;
            let capacity = self.pool.capacity_for(&self.jobs.grow)?;
            let paired = Self::paired_stabilize_budget(self.grow_stabilize_ratio()?, capacity);
            if paired > needed {
                info!(
                    target = self.target.id(),
                    needed,
                    paired,
                    "skipping stabilize phase, grow phase pairs enough stabilize units"
                );
                report.skipped = true;
                return Ok(report);
            }
        }

        while !self.target.is_stable()? {
            if self.budget_spent(&report) {
                return Ok(report);
            }
            report.iterations += 1;

            let needed = self.target.units_to_stabilize()?;
            let available = self.pool.capacity_for(&self.jobs.stabilize)?;
            let latency = self.target.stabilize_latency()?;
            info!(
                target = self.target.id(),
                instability = self.target.current_instability()?,
                floor = self.target.min_instability()?,
                needed,
                available,
                latency_ms = %latency.as_millis(),
                "stabilizing"
            );
            if available == 0 {
                self.back_off(&mut report).await;
                continue;
            }

            let outcome = self.pool.dispatch(
                &self.jobs.stabilize,
                needed.min(available),
                self.target.id(),
                Duration::ZERO,
            )?;
            report.absorb_rejections(&outcome);
            report.units_dispatched += outcome.dispatched;
            if outcome.dispatched == 0 {
                self.back_off(&mut report).await;
                continue;
            }
            if outcome.dispatched < needed {
                report.shortfalls += 1;
            }

            self.wait(&mut report, latency).await;

            if outcome.dispatched >= needed && !self.target.is_stable()? {
                report.desyncs += 1;
                warn!(
                    target = self.target.id(),
                    excess = self.target.instability_excess()?,
                    "instability above floor after a sufficient dispatch, re-measuring"
                );
            }
        }

        report.converged = true;
        info!(
            target = self.target.id(),
            iterations = report.iterations,
            units = report.units_dispatched,
            "target stabilized"
        );
        Ok(report)
    }

    /// Drive value up to its maximum, pairing each grow with stabilize units
    /// that land after it. Instability already above the floor is paid off by
    /// the same paired units.
    ///
    /// # Errors
    ///
    /// Only configuration and oracle errors propagate.
    pub async fn grow_to_max(&mut self) -> Result<PhaseReport, SchedulerError> {
        let mut report = PhaseReport::new(Phase::GrowToMax, self.target.id());
        let ratio = self.grow_stabilize_ratio()?;
        let buffer = self.config.grow_buffer();

        while !self.target.has_max_value()? {
            if self.budget_spent(&report) {
                return Ok(report);
            }
            report.iterations += 1;

            let remaining = self.target.units_to_grow_to_max()?.max(1);
            let capacity = self.pool.capacity_for(&self.jobs.grow)?;
            // excess left by a skipped stabilize phase rides on the paired
            // units, capped at half the pool
            let carried = self.target.units_to_stabilize()?.min(capacity / 2);
            let budget = Self::paired_stabilize_budget(ratio, capacity) + carried;
            let available = capacity.saturating_sub(budget);
            if available == 0 {
                self.back_off(&mut report).await;
                continue;
            }
            let grow_units = remaining.min(available);
            #[allow(clippy::cast_precision_loss)]
            let offset = whole_units(ratio * grow_units as f64).max(1);
            let stabilize_units = budget.min(offset + carried);

            let grow_latency = self.target.grow_latency()?;
            let stabilize_latency = self.target.stabilize_latency()?;
            let stabilize_delay = (grow_latency + buffer).saturating_sub(stabilize_latency);
            let wait = stabilize_latency + stabilize_delay + buffer;
            info!(
                target = self.target.id(),
                value = self.target.current_value()?,
                max = self.target.max_value()?,
                remaining,
                capacity,
                grow_units,
                stabilize_units,
                carried,
                stabilize_delay_ms = %stabilize_delay.as_millis(),
                wait_ms = %wait.as_millis(),
                "growing"
            );

            let grown = self.pool.dispatch(
                &self.jobs.grow,
                grow_units,
                self.target.id(),
                Duration::ZERO,
            )?;
            let paired = self.pool.dispatch(
                &self.jobs.stabilize,
                stabilize_units,
                self.target.id(),
                stabilize_delay,
            )?;
            report.absorb_rejections(&grown);
            report.absorb_rejections(&paired);
            report.units_dispatched += grown.dispatched;
            report.paired_stabilize_units += paired.dispatched;
            if grown.dispatched == 0 {
                self.back_off(&mut report).await;
                continue;
            }
            if grown.dispatched < remaining {
                report.shortfalls += 1;
            }

            self.wait(&mut report, wait).await;

            if grown.dispatched >= remaining && !self.target.has_max_value()? {
                report.desyncs += 1;
                warn!(
                    target = self.target.id(),
                    deficit = self.target.value_deficit()?,
                    "value below max after a sufficient grow, re-measuring"
                );
            }
        }

        report.converged = true;
        info!(
            target = self.target.id(),
            iterations = report.iterations,
            units = report.units_dispatched,
            "target at max value"
        );
        Ok(report)
    }

    /// Extract `extract_fraction` of the maximum value, capped at what the
    /// target holds when the phase starts.
    ///
    /// # Errors
    ///
    /// Only configuration and oracle errors propagate.
    pub async fn extract_fraction(&mut self) -> Result<PhaseReport, SchedulerError> {
        let mut report = PhaseReport::new(Phase::ExtractFraction, self.target.id());
        let starting = self.target.current_value()?;
        let goal = (self.target.max_value()? * self.config.extract_fraction).min(starting);
        let mut extracted = 0.0_f64;

        while extracted < goal {
            if self.budget_spent(&report) {
                report.extracted_value = extracted;
                return Ok(report);
            }
            if self.target.current_value()? <= 0.0 {
                warn!(target = self.target.id(), "target value exhausted");
                break;
            }
            report.iterations += 1;

            let capacity = self.pool.capacity_for(&self.jobs.extract)?;
            let needed = self.target.units_to_extract(goal - extracted)?.max(1);
            let units = needed.min(capacity);
            if units == 0 {
                self.back_off(&mut report).await;
                continue;
            }
            let latency = self.target.extract_latency()?;
            info!(
                target = self.target.id(),
                value = self.target.current_value()?,
                extracted,
                goal,
                needed,
                capacity,
                latency_ms = %latency.as_millis(),
                "extracting"
            );

            let outcome = self.pool.dispatch(
                &self.jobs.extract,
                units,
                self.target.id(),
                Duration::ZERO,
            )?;
            report.absorb_rejections(&outcome);
            report.units_dispatched += outcome.dispatched;
            if outcome.dispatched == 0 {
                self.back_off(&mut report).await;
                continue;
            }
            if outcome.dispatched < needed {
                report.shortfalls += 1;
            }

            self.wait(&mut report, latency).await;

            extracted = (starting - self.target.current_value()?).max(0.0);
            if outcome.dispatched >= needed && extracted < goal {
                report.desyncs += 1;
                warn!(target = self.target.id(), extracted, goal, "extracted less than predicted");
            }
        }

        report.extracted_value = extracted;
        report.converged = true;
        info!(
            target = self.target.id(),
            extracted,
            iterations = report.iterations,
            "extraction complete"
        );
        Ok(report)
    }

    /// Stabilize, grow, then extract, pausing `phase_gap` between phases.
    /// Phases whose predicate already holds are not run. A grow that leaves
    /// instability above the floor is followed by another stabilize pass, so
    /// extraction always starts on a stable target at max value.
    ///
    /// # Errors
    ///
    /// Propagates the first phase error.
    pub async fn run_cycle(&mut self, phase_gap: Duration) -> Result<CycleReport, SchedulerError> {
        let mut phases = Vec::with_capacity(3);
        if !self.target.is_stable()? {
            phases.push(self.stabilize_to_floor().await?);
        }
        self.sleeper.sleep(phase_gap).await;
        if !self.target.has_max_value()? {
            phases.push(self.grow_to_max().await?);
            if !self.target.is_stable()? {
                phases.push(self.stabilize_to_floor().await?);
            }
        }
        self.sleeper.sleep(phase_gap).await;
        phases.push(self.extract_fraction().await?);
        Ok(CycleReport {
            target: self.target.id().to_string(),
            phases,
        })
    }
}
