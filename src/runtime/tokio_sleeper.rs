//! Tokio timer sleeper.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::Sleeper;

/// Sleeper backed by `tokio::time::sleep`. Must be awaited inside a tokio
/// runtime with the time driver enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl TokioSleeper {
    /// Create a new sleeper.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
