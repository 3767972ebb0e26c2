//! Batch driver: fills one worker with overlapping timed batches each round
//! and reports the value rate the round achieved.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::config::HarvestConfig;
use crate::core::{AppResult, BatchPlan, JobSet, SchedulerError, Target};
use crate::runtime::controller::is_fatal;
use crate::runtime::{select_target, BatchRoundReport, Collaborators, RunSummary};

/// Runs batch rounds on the configured worker.
#[derive(Debug)]
pub struct BatchDriver {
    config: HarvestConfig,
    collaborators: Collaborators,
}

impl BatchDriver {
    /// Create a batch driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: HarvestConfig, collaborators: Collaborators) -> AppResult<Self> {
        config
            .validate()
            .map_err(SchedulerError::InvalidConfig)
            .context("invalid harvest configuration")?;
        Ok(Self {
            config,
            collaborators,
        })
    }

    /// Batches that fit in `spare` capacity at `cost` each, capped by
    /// `max_runs`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn runs_for(spare: f64, cost: f64, max_runs: Option<u64>) -> u64 {
        let runs = if cost > 0.0 && spare.is_finite() {
            (spare / cost).floor().max(0.0) as u64
        } else {
            0
        };
        max_runs.map_or(runs, |max| runs.min(max))
    }

    /// Run one round: launch as many batches as fit, spaced by the spacer,
    /// then wait for the last one to land and measure realized value.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker or target cannot be resolved, the
    /// schedule has a negative delay, or the worker cannot be prepared.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub async fn run_round(&self) -> AppResult<BatchRoundReport> {
        let c = &self.collaborators;
        let batch = &self.config.batch;

        let descriptors = c.source.load().context("failed to load pool snapshot")?;
        let target_id = match &batch.target {
            Some(id) => id.clone(),
            None => select_target(
                c.oracle.as_ref(),
                &descriptors,
                &self.config.driver.home_node,
                self.config.driver.target_divisor,
            )?,
        };
        let pool = c.prepare_pool(&self.config, descriptors)?;
        if pool.is_excluded(&batch.worker) {
            anyhow::bail!("worker `{}` could not be prepared", batch.worker);
        }
        let worker = pool.require(&batch.worker)?.clone();

        let plan = BatchPlan::new(
            worker.clone(),
            Target::new(target_id.clone(), Arc::clone(&c.oracle)),
            batch.extraction_fraction,
            JobSet::from_config(&self.config.jobs),
        )?
        .with_spacer(batch.spacer());
        let period = plan.schedule()?.period();
        let cost = plan.total_cost()?;
        let planned = Self::runs_for(worker.spare_capacity()?, cost, batch.max_runs);
        info!(
            worker = worker.id(),
            target = %target_id,
            runs = planned,
            batch_cost = cost,
            "starting batch round"
        );

        let before = c.oracle.realized_value();
        let mut launched = 0_u64;
        for _ in 0..planned {
            match plan.run() {
                Ok(_) => launched += 1,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, launched, "batch refused, ending round early");
                    break;
                }
            }
            c.sleeper.sleep(batch.spacer()).await;
        }
        c.sleeper.sleep(period + batch.settle()).await;

        let elapsed = period + batch.spacer() * launched as u32 + batch.settle();
        let gained = c.oracle.realized_value() - before;
        let report = BatchRoundReport {
            worker: worker.id().to_string(),
            target: target_id,
            planned_runs: planned,
            launched_runs: launched,
            period_ms: period.as_millis(),
            elapsed_ms: elapsed.as_millis(),
            gained_value: gained,
            value_per_second: rate(gained, elapsed),
        };
        info!(
            target = %report.target,
            launched,
            gained,
            per_second = report.value_per_second,
            "batch round complete"
        );
        Ok(report)
    }

    /// Run up to `max_rounds` rounds back to back.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error.
    pub async fn run(&self, max_rounds: Option<u32>) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();
        let mut round = 0_u32;
        while max_rounds.is_none_or(|max| round < max) {
            round += 1;
            match self.run_round().await {
                Ok(report) => {
                    summary.completed += 1;
                    summary.extracted_value += report.gained_value;
                }
                Err(e) if is_fatal(&e) => {
                    error!(round, error = %format!("{e:#}"), "aborting on configuration error");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(round, error = %format!("{e:#}"), "batch round failed");
                    self.collaborators
                        .sleeper
                        .sleep(self.config.batch.settle())
                        .await;
                }
            }
        }
        Ok(summary)
    }
}

fn rate(gained: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        gained / secs
    } else {
        0.0
    }
}
