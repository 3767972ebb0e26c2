//! Continuous controller: one whole-pool stabilize/grow/extract cycle after
//! another against the best current target.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use crate::config::HarvestConfig;
use crate::core::{
    AppResult, ContinuousOrchestrator, CycleReport, JobSet, SchedulerError, Target,
};
use crate::runtime::{select_target, Collaborators, RunSummary};

/// Runs continuous cycles.
#[derive(Debug)]
pub struct Controller {
    config: HarvestConfig,
    collaborators: Collaborators,
}

impl Controller {
    /// Create a controller.
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

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run one cycle on a fresh pool and a freshly selected target.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be loaded, no target
    /// qualifies, or a phase fails.
    pub async fn run_cycle(&self) -> AppResult<CycleReport> {
        let c = &self.collaborators;
        let descriptors = c.source.load().context("failed to load pool snapshot")?;
        let target_id = select_target(
            c.oracle.as_ref(),
            &descriptors,
            &self.config.driver.home_node,
            self.config.driver.target_divisor,
        )?;
        let mut pool = c.prepare_pool(&self.config, descriptors)?;
        info!(target = %target_id, nodes = pool.len(), "starting cycle");

        let mut orchestrator = ContinuousOrchestrator::new(
            &mut pool,
            Target::new(target_id.clone(), Arc::clone(&c.oracle)),
            JobSet::from_config(&self.config.jobs),
            Arc::clone(&c.sleeper),
            self.config.orchestrator.clone(),
        );
        let report = orchestrator
            .run_cycle(self.config.driver.phase_gap())
            .await
            .with_context(|| format!("cycle against `{target_id}` failed"))?;
        info!(
            target = %target_id,
            phases = report.phases.len(),
            extracted = report.extracted_value(),
            "cycle complete"
        );
        Ok(report)
    }

    /// Run up to `max_cycles` cycles, sleeping `cycle_gap` after each.
    ///
    /// A failed cycle is logged and the next one starts; a configuration
    /// error ends the run.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error.
    pub async fn run(&self, max_cycles: Option<u32>) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();
        let mut cycle = 0_u32;
        while max_cycles.is_none_or(|max| cycle < max) {
            cycle += 1;
            match self.run_cycle().await {
                Ok(report) => {
                    summary.completed += 1;
                    summary.extracted_value += report.extracted_value();
                }
                Err(e) if is_fatal(&e) => {
                    error!(cycle, error = %format!("{e:#}"), "aborting on configuration error");
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(cycle, error = %format!("{e:#}"), "cycle failed");
                }
            }
            self.collaborators
                .sleeper
                .sleep(self.config.driver.cycle_gap())
                .await;
        }
        Ok(summary)
    }
}

/// Whether an error chain carries a configuration error.
pub(crate) fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SchedulerError>()
        .is_some_and(SchedulerError::is_fatal)
}
