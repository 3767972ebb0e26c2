//! # Prometheus Harvest
//!
//! A capacity-aware scheduler that times extract, grow, and stabilize
//! operations across a pool of worker nodes against a single target.
//!
//! Workers have finite capacity, operations take a target-dependent latency
//! to land, and every operation shifts the target's state. The scheduler
//! sizes operations from live target state, spreads them over whatever
//! capacity the pool has right now, and waits for predicted completion
//! before re-reading the target.
//!
//! ## Two strategies
//!
//! - **Batches** ([`core::BatchPlan`]): all four operations of one batch are
//!   dispatched together on one worker with start delays chosen so they
//!   complete in the order extract, stabilize, grow, stabilize, one spacer
//!   apart. Many batches overlap in a pipeline.
//! - **Continuous phases** ([`core::ContinuousOrchestrator`]): the whole pool
//!   first drives instability to its floor, then value to its maximum, then
//!   extracts a fraction. Each phase iterates until its predicate holds on
//!   fresh state, so a shortfall only slows convergence.
//!
//! ## Dispatch
//!
//! [`core::WorkerPool::dispatch`] drains the largest nodes first and never
//! starts more than the requested units. Nodes that refuse work sit out the
//! rest of the cycle.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_harvest::config::HarvestConfig;
//! use prometheus_harvest::infra::{SimTarget, SimulatedCluster};
//! use prometheus_harvest::runtime::{run_driver, Collaborators};
//!
//! let cluster = Arc::new(SimulatedCluster::new());
//! cluster.add_node("home", 512.0);
//! cluster.add_target("n00dles", SimTarget::new(2.0e5, 1.0e6, 40.0, 1.0));
//!
//! let summary = run_driver(
//!     HarvestConfig::default(),
//!     Collaborators::simulated(&cluster),
//!     Some(3),
//! )
//! .await?;
//! ```
//!
//! For complete scenarios, see the integration suites under `tests/`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models for jobs, batches, orchestration, and drivers.
pub mod config;
/// Builders that assemble worker pools from snapshots.
pub mod builders;
/// Infrastructure adapters: pool snapshots and the simulated cluster.
pub mod infra;
/// Drivers, target selection, and report models.
pub mod runtime;
/// Shared utilities.
pub mod util;
