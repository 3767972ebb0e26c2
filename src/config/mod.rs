//! Configuration models for jobs, batches, orchestration, and drivers.

pub mod harvest;

pub use harvest::{
    BatchConfig, DriverConfig, DriverMode, HarvestConfig, JobsConfig, OrchestratorConfig,
    CONFIG_PATH_ENV,
};
