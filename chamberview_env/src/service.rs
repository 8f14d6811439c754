//! Simulation service abstraction for ChamberView viewers.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{ChamberId, InitInfo, SimulationStep, UserInfo};
use std::time::Duration;

/// Abstraction over the server that runs the ball simulation.
///
/// # Implementations
///
/// - **Production**: `HttpService` - HTTP + JSON against a live server
/// - **Simulation**: `SimService` - in-memory server with delivery faults
///
/// # Request Flow
///
/// ```text
/// Viewer                      Service
///   |-- init_info() ------------>|
///   |<-------- layout, ids ------|
///   |-- chamber_artifact(id) --->|   (per chamber, at relayout)
///   |-- simulation_state(n) ---->|   (every fetch interval)
///   |<----- steps > n -----------|
/// ```
#[async_trait]
pub trait SimulationService: Send + Sync + 'static {
    /// Fetches layout bootstrap information.
    async fn init_info(&self) -> Result<InitInfo, EnvError>;
    
    /// Fetches all simulation steps produced after `since`, oldest first.
    ///
    /// # Returns
    /// * `Ok(steps)` - Possibly empty when nothing new was produced
    /// * `Err(_)` - Transport or decode failure; callers retry next interval
    async fn simulation_state(&self, since: u64) -> Result<Vec<SimulationStep>, EnvError>;
    
    /// Fetches the compiled sandbox artifact for one chamber.
    async fn chamber_artifact(&self, id: &ChamberId) -> Result<Vec<u8>, EnvError>;
    
    /// Fetches the logged-in user and their admin flag.
    async fn user_info(&self) -> Result<UserInfo, EnvError>;
    
    /// Requests a new ball count.
    async fn set_num_balls(&self, num_balls: u64) -> Result<(), EnvError>;
    
    /// Requests a new row width.
    async fn set_chambers_per_row(&self, chambers_per_row: usize) -> Result<(), EnvError>;
    
    /// Triggers a simulation reset.
    async fn reset(&self) -> Result<(), EnvError>;
}

/// Fault injection for simulated services.
///
/// Allows scenarios to reshape how snapshots reach the viewer.
pub trait ServiceController: Send + Sync {
    /// Sets the probability (0.0 - 1.0) that a state fetch fails.
    fn set_failure_rate(&self, rate: f64);
    
    /// Withholds state responses (answers with no steps) until `until`.
    fn stall_until(&self, until: Duration);
    
    /// Adds latency to every request.
    fn set_latency(&self, latency: Duration);
    
    /// Clears all injected faults.
    fn heal_all(&self);
}
