//! Core environment context trait for texsync nodes.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts the clock so the tick loop can run
/// against real time in production and against a virtual clock in tests.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` (in `texsync_sim`) - manually advanced clock
#[async_trait]
pub trait NodeContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock and returns immediately
    async fn sleep(&self, duration: Duration);
}
