//! Drivers that run the scheduler against live collaborators, and their
//! report models.

pub mod api;
pub mod batcher;
pub mod controller;
pub mod driver;
pub mod targeting;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_sleeper;

pub use api::{list_nodes, BatchRoundReport, NodeStatus, RunSummary};
pub use batcher::BatchDriver;
pub use controller::Controller;
pub use driver::{run_driver, Collaborators};
pub use targeting::select_target;
#[cfg(feature = "tokio-runtime")]
pub use tokio_sleeper::TokioSleeper;
