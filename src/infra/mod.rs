//! Infrastructure adapters: pool snapshots and the simulated cluster.

pub mod simulated;
pub mod snapshot;

pub use simulated::{EffectModel, SimTarget, SimulatedCluster, StartedOperation};
pub use snapshot::{InMemorySnapshot, JsonSnapshotSource};
