//! Collaborator wiring shared by the drivers, and the mode switch.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::builders::PoolBuilder;
use crate::config::{DriverConfig, DriverMode, HarvestConfig};
use crate::core::{
    AppResult, AuditSink, Deployer, ExecutionSubstrate, JobSet, NodeDescriptor, Sleeper,
    TargetOracle, TopologySource, WorkerPool,
};
use crate::infra::{JsonSnapshotSource, SimulatedCluster};
use crate::runtime::{BatchDriver, Controller, RunSummary};

/// Every external system a driver talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Pool snapshot source, re-read each cycle.
    pub source: Arc<dyn TopologySource>,
    /// Substrate hosting the workers.
    pub substrate: Arc<dyn ExecutionSubstrate>,
    /// Target state and effect model.
    pub oracle: Arc<dyn TargetOracle>,
    /// Clock the drivers wait on.
    pub sleeper: Arc<dyn Sleeper>,
    /// Optional deployment precondition.
    pub deployer: Option<Arc<dyn Deployer>>,
    /// Optional dispatch audit trail.
    pub audit: Option<Arc<dyn AuditSink>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("deployer", &self.deployer.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Use one simulated cluster for every role.
    #[must_use]
    pub fn simulated(cluster: &Arc<SimulatedCluster>) -> Self {
        Self {
            source: Arc::clone(cluster) as Arc<dyn TopologySource>,
            substrate: Arc::clone(cluster) as Arc<dyn ExecutionSubstrate>,
            oracle: Arc::clone(cluster) as Arc<dyn TargetOracle>,
            sleeper: Arc::clone(cluster) as Arc<dyn Sleeper>,
            deployer: Some(Arc::clone(cluster) as Arc<dyn Deployer>),
            audit: None,
        }
    }

    /// Read the pool snapshot from `driver.snapshot_path` on every cycle.
    #[must_use]
    pub fn with_snapshot_file(mut self, driver: &DriverConfig) -> Self {
        self.source = Arc::new(JsonSnapshotSource::new(&driver.snapshot_path));
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build this cycle's pool from a fresh snapshot and run the deployment
    /// precondition; nodes that cannot be prepared are excluded.
    pub(crate) fn prepare_pool(
        &self,
        config: &HarvestConfig,
        descriptors: Vec<NodeDescriptor>,
    ) -> AppResult<WorkerPool> {
        let mut builder = PoolBuilder::new(config.driver.clone());
        if let Some(audit) = &self.audit {
            builder = builder.with_audit(Arc::clone(audit));
        }
        let mut pool = builder.build_from(descriptors, Arc::clone(&self.substrate))?;

        if let Some(deployer) = &self.deployer {
            let jobs = JobSet::from_config(&config.jobs);
            let mut failing = Vec::new();
            for node in pool.nodes() {
                for job in jobs.iter() {
                    if let Err(e) = deployer.ensure_deployed(node.id(), job) {
                        warn!(
                            node = node.id(),
                            job = job.executable(),
                            error = %e,
                            "deployment failed"
                        );
                        failing.push(node.id().to_string());
                        break;
                    }
                }
            }
            for id in failing {
                pool.exclude(&id);
            }
        }
        Ok(pool)
    }
}

/// Run the driver selected by `config.driver.mode` for up to `max_cycles`
/// cycles or rounds; `None` runs until a configuration error.
///
/// # Errors
///
/// Returns an error for invalid configuration or a fatal scheduling error.
pub async fn run_driver(
    config: HarvestConfig,
    collaborators: Collaborators,
    max_cycles: Option<u32>,
) -> AppResult<RunSummary> {
    match config.driver.mode {
        DriverMode::Continuous => Controller::new(config, collaborators)?.run(max_cycles).await,
        DriverMode::Batch => BatchDriver::new(config, collaborators)?.run(max_cycles).await,
    }
}
