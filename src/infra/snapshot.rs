//! Pool snapshot sources.
//!
//! A snapshot is a JSON array of node descriptors produced by an external
//! discovery pass. The file is re-read on every `load`, so a fresh discovery
//! run is picked up at the next cycle.

use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use crate::core::{NodeDescriptor, SchedulerError, TopologySource};

/// File-backed snapshot holding a JSON array of descriptors.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    path: PathBuf,
}

impl JsonSnapshotSource {
    /// Snapshot at `path`; the file need not exist yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `nodes` to the snapshot file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Snapshot`] on I/O or encoding failures.
    pub fn save(&self, nodes: &[NodeDescriptor]) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| SchedulerError::Snapshot(e.to_string()))?;
        }
        let encoded = serde_json::to_string_pretty(nodes)
            .map_err(|e| SchedulerError::Snapshot(e.to_string()))?;
        fs::write(&self.path, encoded).map_err(|e| SchedulerError::Snapshot(e.to_string()))
    }
}

impl TopologySource for JsonSnapshotSource {
    fn load(&self) -> Result<Vec<NodeDescriptor>, SchedulerError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            SchedulerError::Snapshot(format!("cannot read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            SchedulerError::Snapshot(format!("cannot parse {}: {e}", self.path.display()))
        })
    }
}

/// Snapshot held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshot {
    nodes: Vec<NodeDescriptor>,
}

impl InMemorySnapshot {
    /// Snapshot of `nodes` in the given order.
    #[must_use]
    pub const fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self { nodes }
    }
}

impl TopologySource for InMemorySnapshot {
    fn load(&self) -> Result<Vec<NodeDescriptor>, SchedulerError> {
        Ok(self.nodes.clone())
    }
}
