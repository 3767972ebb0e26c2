//! Self-correcting four-operation batch against one worker/target pair.
//!
//! A batch extracts a fraction of the target's current value, grows it back,
//! and stabilizes after each, with start delays chosen so the operations
//! *complete* in a fixed order, one `spacer` apart, measured from the moment
//! the batch is dispatched:
//!
//! ```text
//! extract                  S - spacer
//! stabilize after extract  S
//! grow                     S + spacer
//! stabilize after grow     S + 2 * spacer
//! ```
//!
//! `S` is the stabilize latency, the slowest of the three. Nothing here is
//! cached: every call re-reads the target, because its state moves between
//! batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{JobKind, JobSet, Node, SchedulerError, Target};

/// The four steps of a batch, in completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStep {
    /// Extract a fraction of the value.
    Extract,
    /// Cancel the instability the extract adds.
    StabilizeAfterExtract,
    /// Restore the extracted value.
    Grow,
    /// Cancel the instability the grow adds.
    StabilizeAfterGrow,
}

impl BatchStep {
    /// Steps in completion order.
    pub const COMPLETION_ORDER: [Self; 4] = [
        Self::Extract,
        Self::StabilizeAfterExtract,
        Self::Grow,
        Self::StabilizeAfterGrow,
    ];

    /// Steps in the order they are handed to the worker.
    pub const DISPATCH_ORDER: [Self; 4] = [
        Self::StabilizeAfterGrow,
        Self::Grow,
        Self::StabilizeAfterExtract,
        Self::Extract,
    ];

    /// Job kind that performs this step.
    #[must_use]
    pub const fn kind(self) -> JobKind {
        match self {
            Self::Extract => JobKind::Extract,
            Self::Grow => JobKind::Grow,
            Self::StabilizeAfterExtract | Self::StabilizeAfterGrow => JobKind::Stabilize,
        }
    }
}

/// Start delays and latencies of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSchedule {
    /// Stabilize latency `S`.
    pub stabilize_latency: Duration,
    /// Grow latency `G`.
    pub grow_latency: Duration,
    /// Extract latency `E`.
    pub extract_latency: Duration,
    /// Completion gap.
    pub spacer: Duration,
    /// `(S - E) - spacer`.
    pub extract_delay: Duration,
    /// Always zero.
    pub stabilize_after_extract_delay: Duration,
    /// `(S - G) + spacer`.
    pub grow_delay: Duration,
    /// `2 * spacer`.
    pub stabilize_after_grow_delay: Duration,
}

impl BatchSchedule {
    /// Derive the schedule from the three latencies.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] when the extract or grow
    /// latency exceeds the stabilize latency by more than the slack the
    /// spacer leaves.
    pub fn compute(
        stabilize_latency: Duration,
        grow_latency: Duration,
        extract_latency: Duration,
        spacer: Duration,
    ) -> Result<Self, SchedulerError> {
        let negative = |kind: JobKind, latency: Duration| SchedulerError::NegativeDelay {
            kind,
            latency_ms: latency.as_millis(),
            stabilize_ms: stabilize_latency.as_millis(),
            spacer_ms: spacer.as_millis(),
        };
        let extract_delay = stabilize_latency
            .checked_sub(extract_latency + spacer)
            .ok_or_else(|| negative(JobKind::Extract, extract_latency))?;
        let grow_delay = (stabilize_latency + spacer)
            .checked_sub(grow_latency)
            .ok_or_else(|| negative(JobKind::Grow, grow_latency))?;
        Ok(Self {
            stabilize_latency,
            grow_latency,
            extract_latency,
            spacer,
            extract_delay,
            stabilize_after_extract_delay: Duration::ZERO,
            grow_delay,
            stabilize_after_grow_delay: spacer * 2,
        })
    }

    /// Start delay of a step.
    #[must_use]
    pub const fn delay(&self, step: BatchStep) -> Duration {
        match step {
            BatchStep::Extract => self.extract_delay,
            BatchStep::StabilizeAfterExtract => self.stabilize_after_extract_delay,
            BatchStep::Grow => self.grow_delay,
            BatchStep::StabilizeAfterGrow => self.stabilize_after_grow_delay,
        }
    }

    /// Completion time of a step measured from dispatch.
    #[must_use]
    pub fn completion(&self, step: BatchStep) -> Duration {
        let latency = match step.kind() {
            JobKind::Stabilize => self.stabilize_latency,
            JobKind::Grow => self.grow_latency,
            JobKind::Extract => self.extract_latency,
        };
        self.delay(step) + latency
    }

    /// Minimum interval before the next batch may start on the same worker.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.stabilize_latency + self.spacer * 2
    }
}

/// Unit counts of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchUnits {
    /// Extract units.
    pub extract: u64,
    /// Stabilize units paired with the extract.
    pub stabilize_after_extract: u64,
    /// Grow units.
    pub grow: u64,
    /// Stabilize units paired with the grow.
    pub stabilize_after_grow: u64,
}

impl BatchUnits {
    /// Units for a step.
    #[must_use]
    pub const fn get(&self, step: BatchStep) -> u64 {
        match step {
            BatchStep::Extract => self.extract,
            BatchStep::StabilizeAfterExtract => self.stabilize_after_extract,
            BatchStep::Grow => self.grow,
            BatchStep::StabilizeAfterGrow => self.stabilize_after_grow,
        }
    }

    /// Sum of all units.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.extract + self.stabilize_after_extract + self.grow + self.stabilize_after_grow
    }
}

/// One batch against a worker/target pair.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    worker: Node,
    target: Target,
    extraction_fraction: f64,
    jobs: JobSet,
    spacer: Duration,
}

impl BatchPlan {
    /// Default gap between consecutive completions.
    pub const DEFAULT_SPACER: Duration = Duration::from_millis(100);

    /// Plan batches that extract `extraction_fraction` of the current value.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidFraction`] unless the fraction is in
    /// `(0, 1]`.
    pub fn new(
        worker: Node,
        target: Target,
        extraction_fraction: f64,
        jobs: JobSet,
    ) -> Result<Self, SchedulerError> {
        if !(extraction_fraction > 0.0 && extraction_fraction <= 1.0) {
            return Err(SchedulerError::InvalidFraction(extraction_fraction));
        }
        Ok(Self {
            worker,
            target,
            extraction_fraction,
            jobs,
            spacer: Self::DEFAULT_SPACER,
        })
    }

    /// Override the completion gap.
    #[must_use]
    pub fn with_spacer(mut self, spacer: Duration) -> Self {
        self.spacer = spacer;
        self
    }

    /// Worker that runs every step.
    #[must_use]
    pub const fn worker(&self) -> &Node {
        &self.worker
    }

    /// Target acted on.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Completion gap.
    #[must_use]
    pub const fn spacer(&self) -> Duration {
        self.spacer
    }

    /// Extract units for the configured fraction of the current value.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn extract_units(&self) -> Result<u64, SchedulerError> {
        let amount = self.target.current_value()? * self.extraction_fraction;
        self.target.units_to_extract(amount)
    }

    /// Stabilize units cancelling the extract, at least one.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn extract_stabilize_units(&self) -> Result<u64, SchedulerError> {
        self.target
            .units_to_offset(JobKind::Extract, self.extract_units()?)
    }

    /// Grow units restoring the extracted value.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn grow_units(&self) -> Result<u64, SchedulerError> {
        self.target.units_to_grow(self.extraction_fraction)
    }

    /// Stabilize units cancelling the grow, at least one.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn grow_stabilize_units(&self) -> Result<u64, SchedulerError> {
        self.target.units_to_offset(JobKind::Grow, self.grow_units()?)
    }

    /// All four unit counts from one consistent read of the target.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn units(&self) -> Result<BatchUnits, SchedulerError> {
        let extract = self.extract_units()?;
        let grow = self.grow_units()?;
        Ok(BatchUnits {
            extract,
            stabilize_after_extract: self.target.units_to_offset(JobKind::Extract, extract)?,
            grow,
            stabilize_after_grow: self.target.units_to_offset(JobKind::Grow, grow)?,
        })
    }

    /// Capacity one batch occupies on the worker.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJobCost`] or oracle failures.
    #[allow(clippy::cast_precision_loss)]
    pub fn total_cost(&self) -> Result<f64, SchedulerError> {
        let units = self.units()?;
        let grow = self.jobs.grow.cost_per_unit(&self.worker)?;
        let extract = self.jobs.extract.cost_per_unit(&self.worker)?;
        let stabilize = self.jobs.stabilize.cost_per_unit(&self.worker)?;
        Ok(grow * units.grow as f64
            + extract * units.extract as f64
            + stabilize * (units.stabilize_after_extract + units.stabilize_after_grow) as f64)
    }

    /// Current schedule for this target.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] or oracle failures.
    pub fn schedule(&self) -> Result<BatchSchedule, SchedulerError> {
        BatchSchedule::compute(
            self.target.stabilize_latency()?,
            self.target.grow_latency()?,
            self.target.extract_latency()?,
            self.spacer,
        )
    }

    /// Dispatch all four steps to the worker and return the cycle period.
    ///
    /// The schedule is validated before anything is dispatched, so a
    /// negative delay never leaves a partial batch behind.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NegativeDelay`] before dispatch, or
    /// [`SchedulerError::Rejected`] when the worker refuses a step.
    pub fn run(&self) -> Result<Duration, SchedulerError> {
        let schedule = self.schedule()?;
        let units = self.units()?;
        let target_id = self.target.id();

        for step in BatchStep::DISPATCH_ORDER {
            let count = units.get(step);
            if count == 0 {
                debug!(?step, target = target_id, "skipping empty batch step");
                continue;
            }
            let job = self.jobs.get(step.kind());
            let accepted = self
                .worker
                .dispatch(job, count, target_id, schedule.delay(step))?;
            if !accepted {
                warn!(worker = self.worker.id(), ?step, units = count, "batch step refused");
                return Err(SchedulerError::Rejected {
                    node: self.worker.id().to_string(),
                    kind: step.kind(),
                });
            }
        }

        let period = schedule.period();
        info!(
            worker = self.worker.id(),
            target = target_id,
            extract = units.extract,
            grow = units.grow,
            stabilize = units.stabilize_after_extract + units.stabilize_after_grow,
            period_ms = %period.as_millis(),
            "batch dispatched"
        );
        Ok(period)
    }
}
