//! Dispatch audit trail.
//!
//! Every placement and rejection a pool dispatch makes can be recorded to a
//! sink, so drivers can report exactly which nodes ran what.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::JobKind;
use crate::util::clock::now_ms;

/// What happened to one slice of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Units were handed to the node.
    Dispatch,
    /// The node refused the units.
    Reject,
    /// All operations on the node were terminated.
    Terminate,
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Node involved.
    pub node: String,
    /// Job kind, absent for node-wide actions.
    pub kind: Option<JobKind>,
    /// Target acted on, absent for node-wide actions.
    pub target: Option<String>,
    /// Units involved.
    pub units: u64,
    /// Start delay in milliseconds.
    pub delay_ms: u128,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev. Clones share one buffer.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::debug!(
            event_id = %event.event_id,
            action = ?event.action,
            node = %event.node,
            kind = ?event.kind,
            units = event.units,
            delay_ms = %event.delay_ms,
            "audit"
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    action: AuditAction,
    node: impl Into<String>,
    kind: Option<JobKind>,
    target: Option<String>,
    units: u64,
    delay_ms: u128,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        action,
        node: node.into(),
        kind,
        target,
        units,
        delay_ms,
        created_at_ms: now_ms(),
        detail,
    }
}
