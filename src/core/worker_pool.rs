//! Pool of worker nodes with greedy multi-node dispatch.
//!
//! A pool is built once per scheduling cycle from a topology snapshot and
//! discarded afterwards. Capacity is always re-read from the substrate; the
//! only state the pool keeps between calls is the set of nodes that refused
//! work this cycle.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut pool = WorkerPool::new(descriptors, substrate)?;
//! let outcome = pool.dispatch(&jobs.stabilize, needed, "target", Duration::ZERO)?;
//! if outcome.shortfall() > 0 {
//!     // degraded capacity: iterate again later
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{
    build_audit_event, AuditAction, AuditSink, ExecutionSubstrate, JobKind, JobSpec, Node,
    NodeDescriptor, SchedulerError,
};

/// Units handed to one node during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Node that received the units.
    pub node: String,
    /// Units started on that node.
    pub units: u64,
}

/// A node that refused work during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Node that refused.
    pub node: String,
    /// Units that were offered.
    pub units: u64,
    /// Why the node refused.
    pub reason: String,
}

/// Result of one pool dispatch.
///
/// `dispatched < requested` is a capacity shortfall, not an error: callers
/// adapt by iterating.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Job kind dispatched.
    pub kind: Option<JobKind>,
    /// Units asked for.
    pub requested: u64,
    /// Units actually started.
    pub dispatched: u64,
    /// Per-node placements in dispatch order.
    pub placements: Vec<Placement>,
    /// Nodes that refused work.
    pub rejections: Vec<Rejection>,
}

impl DispatchOutcome {
    /// Units that could not be placed.
    #[must_use]
    pub const fn shortfall(&self) -> u64 {
        self.requested.saturating_sub(self.dispatched)
    }

    /// Every requested unit was placed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.dispatched >= self.requested
    }
}

/// Unordered set of worker nodes keyed by unique id.
///
/// Not safe for concurrent dispatchers: a snapshot belongs to one scheduling
/// cycle, which `&mut self` on [`WorkerPool::dispatch`] enforces.
pub struct WorkerPool {
    nodes: Vec<Node>,
    excluded: HashSet<String>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("nodes", &self.nodes)
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Build a pool from snapshot descriptors. Input order is kept and used
    /// as the tie-break between nodes of equal capacity.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DuplicateNode`] if two descriptors share an id.
    pub fn new(
        descriptors: impl IntoIterator<Item = NodeDescriptor>,
        substrate: Arc<dyn ExecutionSubstrate>,
    ) -> Result<Self, SchedulerError> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for descriptor in descriptors {
            if !seen.insert(descriptor.id.clone()) {
                return Err(SchedulerError::DuplicateNode(descriptor.id));
            }
            nodes.push(Node::new(descriptor, Arc::clone(&substrate)));
        }
        Ok(Self {
            nodes,
            excluded: HashSet::new(),
            audit: None,
        })
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Nodes in snapshot order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the pool has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look a node up by id.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    /// Look a node up by id, failing when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NodeNotFound`].
    pub fn require(&self, id: &str) -> Result<&Node, SchedulerError> {
        self.find_by_id(id)
            .ok_or_else(|| SchedulerError::NodeNotFound(id.to_string()))
    }

    /// Remove a node from dispatch for the rest of this cycle.
    pub fn exclude(&mut self, id: &str) {
        if self.excluded.insert(id.to_string()) {
            warn!(node = id, "node excluded from pool for this cycle");
        }
    }

    /// Whether a node has been excluded this cycle.
    #[must_use]
    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.contains(id)
    }

    /// Units of `job` each usable node can take, in snapshot order.
    ///
    /// Per-node substrate failures count as zero capacity; configuration
    /// errors (unknown job cost) propagate.
    fn node_capacities(&self, job: &JobSpec) -> Result<Vec<(usize, u64)>, SchedulerError> {
        let mut capacities = Vec::with_capacity(self.nodes.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            if self.excluded.contains(node.id()) {
                continue;
            }
            match node.capacity_for(job) {
                Ok(units) => capacities.push((idx, units)),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(
                        node = node.id(),
                        error = %err,
                        "capacity unavailable, treating as zero"
                    );
                    capacities.push((idx, 0));
                }
            }
        }
        Ok(capacities)
    }

    /// Total units of `job` the pool can start right now.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownJobCost`] when the job cannot be costed.
    pub fn capacity_for(&self, job: &JobSpec) -> Result<u64, SchedulerError> {
        Ok(self
            .node_capacities(job)?
            .into_iter()
            .map(|(_, units)| units)
            .sum())
    }

    /// Start up to `max_units` of `job` against `target_id`, draining the
    /// largest nodes first.
    ///
    /// Nodes are ordered by descending capacity on a fresh view each call;
    /// equal capacities keep snapshot order. Nodes that refuse are excluded
    /// for the rest of the cycle and the refused units simply go unplaced.
    ///
    /// # Errors
    ///
    /// Only configuration errors propagate; per-node failures reduce the
    /// dispatched total instead.
    pub fn dispatch(
        &mut self,
        job: &JobSpec,
        max_units: u64,
        target_id: &str,
        delay: Duration,
    ) -> Result<DispatchOutcome, SchedulerError> {
        let mut outcome = DispatchOutcome {
            kind: Some(job.kind()),
            requested: max_units,
            ..DispatchOutcome::default()
        };
        if max_units == 0 {
            return Ok(outcome);
        }

        let mut order = self.node_capacities(job)?;
        // sort_by is stable: equal capacities keep snapshot order
        order.sort_by(|a, b| b.1.cmp(&a.1));

        let mut refused = Vec::new();
        for (idx, capacity) in order {
            let remaining = max_units - outcome.dispatched;
            if remaining == 0 || capacity == 0 {
                break;
            }
            let node = &self.nodes[idx];
            let units = capacity.min(remaining);
            match node.dispatch(job, units, target_id, delay) {
                Ok(true) => {
                    debug!(
                        node = node.id(),
                        kind = %job.kind(),
                        units,
                        target = target_id,
                        "dispatched"
                    );
                    self.record(
                        AuditAction::Dispatch,
                        node.id(),
                        job,
                        target_id,
                        units,
                        delay,
                        None,
                    );
                    outcome.dispatched += units;
                    outcome.placements.push(Placement {
                        node: node.id().to_string(),
                        units,
                    });
                }
                Ok(false) => {
                    let reason = "substrate rejected operation".to_string();
                    self.record(
                        AuditAction::Reject,
                        node.id(),
                        job,
                        target_id,
                        units,
                        delay,
                        Some(reason.clone()),
                    );
                    refused.push(Rejection {
                        node: node.id().to_string(),
                        units,
                        reason,
                    });
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    let reason = err.to_string();
                    self.record(
                        AuditAction::Reject,
                        node.id(),
                        job,
                        target_id,
                        units,
                        delay,
                        Some(reason.clone()),
                    );
                    refused.push(Rejection {
                        node: node.id().to_string(),
                        units,
                        reason,
                    });
                }
            }
        }

        for rejection in &refused {
            warn!(
                node = %rejection.node,
                kind = %job.kind(),
                units = rejection.units,
                reason = %rejection.reason,
                "dispatch refused"
            );
            self.exclude(&rejection.node);
        }
        outcome.rejections = refused;

        if !outcome.is_complete() {
            debug!(
                kind = %job.kind(),
                requested = outcome.requested,
                dispatched = outcome.dispatched,
                "capacity shortfall"
            );
        }
        Ok(outcome)
    }

    /// Terminate every operation on every node in the pool.
    ///
    /// Returns the ids of nodes that could not be reached.
    pub fn terminate_all(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for node in &self.nodes {
            match node.terminate_all() {
                Ok(()) => {
                    if let Some(audit) = &self.audit {
                        audit.record(build_audit_event(
                            AuditAction::Terminate,
                            node.id(),
                            None,
                            None,
                            0,
                            0,
                            None,
                        ));
                    }
                }
                Err(err) => {
                    warn!(node = node.id(), error = %err, "terminate failed");
                    failed.push(node.id().to_string());
                }
            }
        }
        failed
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        action: AuditAction,
        node: &str,
        job: &JobSpec,
        target_id: &str,
        units: u64,
        delay: Duration,
        detail: Option<String>,
    ) {
        if let Some(audit) = &self.audit {
            audit.record(build_audit_event(
                action,
                node,
                Some(job.kind()),
                Some(target_id.to_string()),
                units,
                delay.as_millis(),
                detail,
            ));
        }
    }
}
