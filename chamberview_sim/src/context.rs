//! Virtual-time context implementing `ViewerContext` for deterministic runs.

use async_trait::async_trait;
use chamberview_env::ViewerContext;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Simulation context backed by a manually advanced clock.
///
/// - Time only moves through `advance_time`, `set_time` or `sleep`
/// - Every random stream is derived from one master seed
#[derive(Clone)]
pub struct SimContext {
    /// Master seed for this run
    seed: u64,
    
    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }
    
    pub fn seed(&self) -> u64 {
        self.seed
    }
    
    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        *self.lock() += duration.as_nanos() as u64;
    }
    
    /// Sets virtual time to an absolute value.
    pub fn set_time(&self, time: Duration) {
        *self.lock() = time.as_nanos() as u64;
    }
    
    /// Independent deterministic RNG for one concern (jitter, faults, physics).
    pub fn rng(&self, stream: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_mul(0x9e3779b97f4a7c15) ^ stream)
    }
    
    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ViewerContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.lock())
    }
    
    async fn sleep(&self, duration: Duration) {
        // Sleeping is how simulated tasks let time pass.
        self.advance_time(duration);
    }
    
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::trace!(task = %name, "spawning simulated task");
        tokio::spawn(future);
    }
}
