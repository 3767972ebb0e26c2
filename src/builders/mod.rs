//! Builders that assemble worker pools from snapshots.

pub mod pool_builder;

pub use pool_builder::{build_pool, PoolBuilder};
