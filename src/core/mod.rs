//! Core scheduling abstractions and capacity accounting.

pub mod audit;
pub mod batch;
pub mod collaborators;
pub mod error;
pub mod job;
pub mod node;
pub mod orchestrator;
pub mod worker_pool;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use batch::{BatchPlan, BatchSchedule, BatchStep, BatchUnits};
pub use collaborators::{
    Deployer, ExecutionSubstrate, OperationRequest, Sleeper, TargetOracle, TopologySource,
    ValueChange,
};
pub use error::{AppResult, SchedulerError};
pub use job::{JobKind, JobSet, JobSpec};
pub use node::{whole_units, Node, NodeDescriptor, Target};
pub use orchestrator::{ContinuousOrchestrator, CycleReport, Phase, PhaseReport};
pub use worker_pool::{DispatchOutcome, Placement, Rejection, WorkerPool};
