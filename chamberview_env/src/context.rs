//! Core environment context trait for ChamberView viewers.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for time and task management.
///
/// This trait abstracts the "real world" clock so the playback scheduler can
/// run in both production (tokio) and simulation (virtual clock)
/// environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `Instant`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
#[async_trait]
pub trait ViewerContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Snapshot arrival estimates and frame selection are both measured
    /// against this clock.
    fn now(&self) -> Duration;
    
    /// Returns `now()` in fractional milliseconds.
    fn now_ms(&self) -> f64 {
        self.now().as_secs_f64() * 1000.0
    }
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
