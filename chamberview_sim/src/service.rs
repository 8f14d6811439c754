//! In-memory simulation service with delivery fault injection.

use async_trait::async_trait;
use chamberview_env::{
    ChamberId, EnvError, InitInfo, ServiceController, SimulationService, SimulationStep, UserInfo,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::oracle::Oracle;

/// WebAssembly text of the simulated chamber artifact.
pub const CHAMBER_WAT: &[u8] = include_bytes!("chamber.wat");

/// Steps kept for `simulation_state` queries.
const HISTORY_LIMIT: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ServerState {
    oracle: Oracle,
    history: VecDeque<SimulationStep>,
    chambers_per_row: usize,
    broken: HashSet<ChamberId>,
    requests: Vec<String>,
}

struct Faults {
    failure_rate: f64,
    stall_until: Duration,
    latency: Duration,
    jitter: Duration,
    rng: ChaCha8Rng,
    failures: u64,
}

/// A ball-machine server living in the same process.
#[derive(Clone)]
pub struct SimService {
    state: Arc<Mutex<ServerState>>,
    faults: Arc<Mutex<Faults>>,
    chamber_ids: Vec<ChamberId>,
    chamber_height: f64,
    user: UserInfo,
}

impl SimService {
    /// Creates a server with `chambers` chambers named `0..chambers`.
    pub fn new(seed: u64, chambers: usize, balls: usize, chambers_per_row: usize, chamber_height: f64) -> Self {
        let physics_seed = seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut history = VecDeque::new();
        let oracle = Oracle::new(physics_seed, chambers, balls, chamber_height);
        history.push_back(oracle.snapshot());
        Self {
            state: Arc::new(Mutex::new(ServerState {
                oracle,
                history,
                chambers_per_row,
                broken: HashSet::new(),
                requests: Vec::new(),
            })),
            faults: Arc::new(Mutex::new(Faults {
                failure_rate: 0.0,
                stall_until: Duration::ZERO,
                latency: Duration::ZERO,
                jitter: Duration::ZERO,
                rng: ChaCha8Rng::seed_from_u64(seed ^ 0xfa17),
                failures: 0,
            })),
            chamber_ids: (0..chambers).map(ChamberId::new).collect(),
            chamber_height,
            user: UserInfo {
                name: "sim".to_string(),
                is_admin: true,
            },
        }
    }
    
    /// Returns a controller sharing this server's fault state.
    pub fn controller(&self) -> SimServiceController {
        SimServiceController {
            faults: Arc::clone(&self.faults),
        }
    }
    
    pub fn chamber_ids(&self) -> &[ChamberId] {
        &self.chamber_ids
    }
    
    /// Runs one physics step and publishes it.
    pub fn advance(&self, dt: f64) {
        let mut state = lock(&self.state);
        state.oracle.step(dt);
        let snapshot = state.oracle.snapshot();
        state.history.push_back(snapshot);
        while state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }
    }
    
    pub fn steps_taken(&self) -> u64 {
        lock(&self.state).oracle.steps_taken()
    }
    
    pub fn chambers_per_row(&self) -> usize {
        lock(&self.state).chambers_per_row
    }
    
    /// Serves garbage instead of the artifact for `id`.
    pub fn break_chamber(&self, id: &ChamberId) {
        lock(&self.state).broken.insert(id.clone());
    }
    
    /// Non-polling requests seen so far, in arrival order.
    pub fn request_log(&self) -> Vec<String> {
        lock(&self.state).requests.clone()
    }
    
    /// Fetches that were failed on purpose.
    pub fn injected_failures(&self) -> u64 {
        lock(&self.faults).failures
    }
    
    /// How long a response issued at `now` takes to reach the client.
    pub fn delivery_delay(&self, now: Duration) -> Duration {
        let mut faults = lock(&self.faults);
        let jitter = if faults.jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = faults.jitter.as_secs_f64();
            Duration::from_secs_f64(faults.rng.gen_range(0.0..max))
        };
        let stalled = faults.stall_until.saturating_sub(now);
        faults.latency + jitter + stalled
    }
    
    fn record(&self, request: String) {
        lock(&self.state).requests.push(request);
    }
}

#[async_trait]
impl SimulationService for SimService {
    async fn init_info(&self) -> Result<InitInfo, EnvError> {
        let state = lock(&self.state);
        Ok(InitInfo {
            chamber_height: self.chamber_height,
            chambers_per_row: state.chambers_per_row,
            num_balls: state.oracle.num_balls() as u64,
            chamber_ids: self.chamber_ids.clone(),
        })
    }
    
    async fn simulation_state(&self, since: u64) -> Result<Vec<SimulationStep>, EnvError> {
        {
            let mut faults = lock(&self.faults);
            let rate = faults.failure_rate;
            if rate > 0.0 && faults.rng.gen_bool(rate) {
                faults.failures += 1;
                return Err(EnvError::network("injected fetch failure"));
            }
        }
        let state = lock(&self.state);
        Ok(state
            .history
            .iter()
            .filter(|s| s.num_steps_taken > since)
            .cloned()
            .collect())
    }
    
    async fn chamber_artifact(&self, id: &ChamberId) -> Result<Vec<u8>, EnvError> {
        self.record(format!("artifact {}", id));
        if !self.chamber_ids.contains(id) {
            return Err(EnvError::Status(404));
        }
        if lock(&self.state).broken.contains(id) {
            return Ok(b"not a wasm module".to_vec());
        }
        Ok(CHAMBER_WAT.to_vec())
    }
    
    async fn user_info(&self) -> Result<UserInfo, EnvError> {
        Ok(self.user.clone())
    }
    
    async fn set_num_balls(&self, num_balls: u64) -> Result<(), EnvError> {
        self.record(format!("num_balls {}", num_balls));
        lock(&self.state).oracle.set_num_balls(num_balls as usize);
        Ok(())
    }
    
    async fn set_chambers_per_row(&self, chambers_per_row: usize) -> Result<(), EnvError> {
        self.record(format!("chambers_per_row {}", chambers_per_row));
        if chambers_per_row == 0 {
            return Err(EnvError::InvalidRequest("chambers_per_row must be positive".to_string()));
        }
        lock(&self.state).chambers_per_row = chambers_per_row;
        Ok(())
    }
    
    async fn reset(&self) -> Result<(), EnvError> {
        self.record("reset".to_string());
        lock(&self.state).oracle.reset();
        Ok(())
    }
}

/// Fault injection for a `SimService`.
#[derive(Clone)]
pub struct SimServiceController {
    faults: Arc<Mutex<Faults>>,
}

impl SimServiceController {
    /// Adds a uniformly distributed extra delay in `[0, jitter)`.
    pub fn set_jitter(&self, jitter: Duration) {
        lock(&self.faults).jitter = jitter;
    }
}

impl ServiceController for SimServiceController {
    fn set_failure_rate(&self, rate: f64) {
        lock(&self.faults).failure_rate = rate.clamp(0.0, 1.0);
    }
    
    fn stall_until(&self, until: Duration) {
        lock(&self.faults).stall_until = until;
    }
    
    fn set_latency(&self, latency: Duration) {
        lock(&self.faults).latency = latency;
    }
    
    fn heal_all(&self) {
        let mut faults = lock(&self.faults);
        faults.failure_rate = 0.0;
        faults.stall_until = Duration::ZERO;
        faults.latency = Duration::ZERO;
        faults.jitter = Duration::ZERO;
    }
}
