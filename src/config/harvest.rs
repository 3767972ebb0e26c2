//! Harvest scheduler configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "HARVEST_CONFIG";

/// Which driver runs the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    /// Stabilize, grow, then extract across the whole pool, once per cycle.
    #[default]
    Continuous,
    /// Overlapping self-correcting batches on one worker.
    Batch,
}

/// Executable names per job kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Grow executable.
    pub grow: String,
    /// Extract executable.
    pub extract: String,
    /// Stabilize executable.
    pub stabilize: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            grow: "grow".into(),
            extract: "extract".into(),
            stabilize: "stabilize".into(),
        }
    }
}

/// Batch driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker node that runs every batch.
    pub worker: String,
    /// Fixed target; selected automatically when absent.
    pub target: Option<String>,
    /// Fraction of current value each batch extracts.
    pub extraction_fraction: f64,
    /// Gap between consecutive completions in milliseconds.
    pub spacer_ms: u64,
    /// Extra wait after the last batch of a round in milliseconds.
    pub settle_ms: u64,
    /// Upper bound on batches per round.
    pub max_runs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            worker: "home".into(),
            target: None,
            extraction_fraction: 0.03,
            spacer_ms: 100,
            settle_ms: 1000,
            max_runs: None,
        }
    }
}

impl BatchConfig {
    /// Completion gap.
    #[must_use]
    pub const fn spacer(&self) -> Duration {
        Duration::from_millis(self.spacer_ms)
    }

    /// Settle time after a round.
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Validate batch settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker.is_empty() {
            return Err("worker must not be empty".into());
        }
        if !(self.extraction_fraction > 0.0 && self.extraction_fraction <= 1.0) {
            return Err("extraction_fraction must be in (0, 1]".into());
        }
        if self.spacer_ms == 0 {
            return Err("spacer_ms must be greater than 0".into());
        }
        if self.max_runs == Some(0) {
            return Err("max_runs must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Continuous orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Fraction of max value the extract phase aims to remove.
    pub extract_fraction: f64,
    /// Buffer added to grow-phase waits in milliseconds.
    pub grow_buffer_ms: u64,
    /// Wait before retrying when the pool has no capacity, in milliseconds.
    pub idle_backoff_ms: u64,
    /// Upper bound on iterations of any phase.
    pub max_iterations: Option<u32>,
    /// Skip the stabilize phase when the grow phase's paired stabilize units
    /// will cover the current excess anyway.
    pub skip_redundant_stabilize: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            extract_fraction: 0.75,
            grow_buffer_ms: 100,
            idle_backoff_ms: 1000,
            max_iterations: None,
            skip_redundant_stabilize: true,
        }
    }
}

impl OrchestratorConfig {
    /// Grow-phase buffer.
    #[must_use]
    pub const fn grow_buffer(&self) -> Duration {
        Duration::from_millis(self.grow_buffer_ms)
    }

    /// Idle backoff.
    #[must_use]
    pub const fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Validate orchestrator settings.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.extract_fraction > 0.0 && self.extract_fraction <= 1.0) {
            return Err("extract_fraction must be in (0, 1]".into());
        }
        if self.idle_backoff_ms == 0 {
            return Err("idle_backoff_ms must be greater than 0".into());
        }
        if self.max_iterations == Some(0) {
            return Err("max_iterations must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Top-level driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Driver to run.
    pub mode: DriverMode,
    /// Pool snapshot file.
    pub snapshot_path: String,
    /// Node the acting entity lives on; never chosen as a target.
    pub home_node: String,
    /// Targets are chosen near `proficiency / target_divisor`.
    pub target_divisor: u32,
    /// Pause between phases in milliseconds.
    pub phase_gap_ms: u64,
    /// Pause between cycles in milliseconds.
    pub cycle_gap_ms: u64,
    /// Only privileged nodes join the pool.
    pub require_privileged: bool,
    /// Nodes with total capacity at or below this are left out of the pool.
    pub min_capacity: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: DriverMode::Continuous,
            snapshot_path: "cluster.json".into(),
            home_node: "home".into(),
            target_divisor: 3,
            phase_gap_ms: 100,
            cycle_gap_ms: 1000,
            require_privileged: true,
            min_capacity: 0.0,
        }
    }
}

impl DriverConfig {
    /// Pause between phases.
    #[must_use]
    pub const fn phase_gap(&self) -> Duration {
        Duration::from_millis(self.phase_gap_ms)
    }

    /// Pause between cycles.
    #[must_use]
    pub const fn cycle_gap(&self) -> Duration {
        Duration::from_millis(self.cycle_gap_ms)
    }

    /// Validate driver settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.target_divisor == 0 {
            return Err("target_divisor must be greater than 0".into());
        }
        if self.min_capacity < 0.0 {
            return Err("min_capacity must not be negative".into());
        }
        Ok(())
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Job executables.
    pub jobs: JobsConfig,
    /// Batch driver settings.
    pub batch: BatchConfig,
    /// Continuous orchestrator settings.
    pub orchestrator: OrchestratorConfig,
    /// Driver settings.
    pub driver: DriverConfig,
}

impl HarvestConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        for (kind, name) in [
            ("grow", &self.jobs.grow),
            ("extract", &self.jobs.extract),
            ("stabilize", &self.jobs.stabilize),
        ] {
            if name.is_empty() {
                return Err(format!("jobs.{kind} must not be empty"));
            }
        }
        self.batch.validate().map_err(|e| format!("batch invalid: {e}"))?;
        self.orchestrator
            .validate()
            .map_err(|e| format!("orchestrator invalid: {e}"))?;
        self.driver.validate().map_err(|e| format!("driver invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Load `.env`, then read the file named by `HARVEST_CONFIG`; defaults
    /// apply when the variable is unset.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_path(path),
            Err(_) => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }
}
