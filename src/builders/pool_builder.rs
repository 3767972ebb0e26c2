//! Builders to construct worker pools from a snapshot and driver configuration.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::DriverConfig;
use crate::core::{
    AuditSink, ExecutionSubstrate, NodeDescriptor, SchedulerError, TopologySource, WorkerPool,
};

/// Build a worker pool from the current snapshot.
///
/// Unprivileged nodes are left out when `require_privileged` is set, and so
/// are nodes whose total capacity is at or below `min_capacity` or cannot be
/// read.
///
/// # Errors
///
/// Returns an error when the configuration is invalid, the snapshot cannot be
/// loaded, or it lists a node twice.
pub fn build_pool(
    cfg: &DriverConfig,
    source: &dyn TopologySource,
    substrate: Arc<dyn ExecutionSubstrate>,
) -> Result<WorkerPool, SchedulerError> {
    PoolBuilder::new(cfg.clone()).build(source, substrate)
}

/// Configurable pool construction.
#[derive(Clone, Default)]
pub struct PoolBuilder {
    cfg: DriverConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl PoolBuilder {
    /// Builder using `cfg` for node filtering.
    #[must_use]
    pub fn new(cfg: DriverConfig) -> Self {
        Self { cfg, audit: None }
    }

    /// Attach an audit sink to every pool built.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Whether a descriptor passes the configured filters.
    fn admits(&self, descriptor: &NodeDescriptor, substrate: &dyn ExecutionSubstrate) -> bool {
        if self.cfg.require_privileged && !descriptor.privileged {
            debug!(node = %descriptor.id, "skipping unprivileged node");
            return false;
        }
        match substrate.capacity(&descriptor.id) {
            Ok(capacity) if capacity > self.cfg.min_capacity => true,
            Ok(capacity) => {
                debug!(node = %descriptor.id, capacity, "skipping node below minimum capacity");
                false
            }
            Err(e) => {
                warn!(node = %descriptor.id, error = %e, "skipping node with unreadable capacity");
                false
            }
        }
    }

    /// Load the snapshot and build the pool.
    ///
    /// # Errors
    ///
    /// See [`build_pool`].
    pub fn build(
        &self,
        source: &dyn TopologySource,
        substrate: Arc<dyn ExecutionSubstrate>,
    ) -> Result<WorkerPool, SchedulerError> {
        self.build_from(source.load()?, substrate)
    }

    /// Build the pool from descriptors already loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for an invalid driver
    /// configuration, or [`SchedulerError::DuplicateNode`] if two admitted
    /// descriptors share an id.
    pub fn build_from(
        &self,
        descriptors: Vec<NodeDescriptor>,
        substrate: Arc<dyn ExecutionSubstrate>,
    ) -> Result<WorkerPool, SchedulerError> {
        self.cfg
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("driver invalid: {e}")))?;

        let descriptors: Vec<_> = descriptors
            .into_iter()
            .filter(|d| self.admits(d, substrate.as_ref()))
            .collect();
        debug!(nodes = descriptors.len(), "building worker pool");

        let pool = WorkerPool::new(descriptors, substrate)?;
        Ok(match &self.audit {
            Some(audit) => pool.with_audit(Arc::clone(audit)),
            None => pool,
        })
    }
}
