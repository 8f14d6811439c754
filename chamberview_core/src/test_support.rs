//! Shared fakes for unit tests.

use async_trait::async_trait;
use chamberview_env::{
    BallPosition, ChamberId, ChamberTable, EnvError, InitInfo, SimulationService, SimulationStep,
    UserInfo, ViewerContext,
};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::SandboxError;
use crate::sandbox::{Sandbox, SandboxFactory, StateRegion};

/// A step with no chamber data.
pub(crate) fn step(n: u64) -> SimulationStep {
    SimulationStep {
        num_steps_taken: n,
        chamber_states: ChamberTable::new(),
        chamber_balls: ChamberTable::new(),
    }
}

/// A step carrying `state` and one ball for each of `slots` slots.
pub(crate) fn step_with(n: u64, slots: usize, state: &[u8]) -> SimulationStep {
    let mut s = step(n);
    for slot in 0..slots {
        s.chamber_states.insert(slot, state.to_vec());
        s.chamber_balls.insert(slot, vec![BallPosition::new(0.5, 0.5)]);
    }
    s
}

/// Clock that only moves when told to.
#[derive(Clone, Default)]
pub(crate) struct ManualClock {
    now_ms: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }
    
    pub(crate) fn set_ms(&self, ms: f64) {
        *self.now_ms.lock().unwrap() = ms;
    }
}

#[async_trait]
impl ViewerContext for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_secs_f64(*self.now_ms.lock().unwrap() / 1000.0)
    }
    
    fn now_ms(&self) -> f64 {
        *self.now_ms.lock().unwrap()
    }
    
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
    
    fn spawn<F>(&self, _name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<Option<Vec<SimulationStep>>>,
    since_log: Vec<u64>,
    artifacts: HashMap<String, Vec<u8>>,
    requests: Vec<String>,
    fail_puts: bool,
    artifact_delay: Duration,
}

/// Service answering from a pre-recorded script.
#[derive(Clone, Default)]
pub(crate) struct ScriptedService {
    script: Arc<Mutex<Script>>,
}

impl ScriptedService {
    pub(crate) fn new() -> Self {
        Self::default()
    }
    
    pub(crate) fn push_response(&self, steps: Vec<SimulationStep>) {
        self.script.lock().unwrap().responses.push_back(Some(steps));
    }
    
    pub(crate) fn push_failure(&self) {
        self.script.lock().unwrap().responses.push_back(None);
    }
    
    pub(crate) fn add_artifact(&self, id: &str, bytes: &[u8]) {
        self.script.lock().unwrap().artifacts.insert(id.to_string(), bytes.to_vec());
    }
    
    pub(crate) fn fail_puts(&self) {
        self.script.lock().unwrap().fail_puts = true;
    }
    
    pub(crate) fn set_artifact_delay(&self, delay: Duration) {
        self.script.lock().unwrap().artifact_delay = delay;
    }
    
    pub(crate) fn since_log(&self) -> Vec<u64> {
        self.script.lock().unwrap().since_log.clone()
    }
    
    /// Requests other than state polls, in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.script.lock().unwrap().requests.clone()
    }
    
    fn record(&self, request: String) -> bool {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request);
        script.fail_puts
    }
}

#[async_trait]
impl SimulationService for ScriptedService {
    async fn init_info(&self) -> Result<InitInfo, EnvError> {
        let ids = {
            let script = self.script.lock().unwrap();
            let mut ids: Vec<String> = script.artifacts.keys().cloned().collect();
            ids.sort();
            ids
        };
        Ok(InitInfo {
            chamber_height: 0.5,
            chambers_per_row: 2,
            num_balls: 1,
            chamber_ids: ids.into_iter().map(ChamberId).collect(),
        })
    }
    
    async fn simulation_state(&self, since: u64) -> Result<Vec<SimulationStep>, EnvError> {
        let mut script = self.script.lock().unwrap();
        script.since_log.push(since);
        match script.responses.pop_front() {
            Some(Some(steps)) => Ok(steps),
            Some(None) => Err(EnvError::network("scripted failure")),
            None => Ok(Vec::new()),
        }
    }
    
    async fn chamber_artifact(&self, id: &ChamberId) -> Result<Vec<u8>, EnvError> {
        let (delay, artifact) = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(format!("artifact {}", id));
            (script.artifact_delay, script.artifacts.get(id.as_str()).cloned())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        artifact.ok_or(EnvError::Status(404))
    }
    
    async fn user_info(&self) -> Result<UserInfo, EnvError> {
        Ok(UserInfo {
            name: "tester".to_string(),
            is_admin: true,
        })
    }
    
    async fn set_num_balls(&self, num_balls: u64) -> Result<(), EnvError> {
        if self.record(format!("num_balls {}", num_balls)) {
            return Err(EnvError::Status(403));
        }
        Ok(())
    }
    
    async fn set_chambers_per_row(&self, chambers_per_row: usize) -> Result<(), EnvError> {
        if self.record(format!("chambers_per_row {}", chambers_per_row)) {
            return Err(EnvError::Status(403));
        }
        Ok(())
    }
    
    async fn reset(&self) -> Result<(), EnvError> {
        self.record("reset".to_string());
        Ok(())
    }
}

/// Observable state of a `FakeSandbox`.
#[derive(Debug, Default)]
pub(crate) struct FakeSandboxState {
    pub(crate) memory: Vec<u8>,
    pub(crate) loads: usize,
    pub(crate) draws: usize,
    pub(crate) init: Option<(u32, u32)>,
    pub(crate) trap_on_draw: bool,
}

/// In-memory sandbox: a fixed state region and a solid-color drawing routine
/// whose color is the first three loaded state bytes.
pub(crate) struct FakeSandbox {
    state: Arc<Mutex<FakeSandboxState>>,
    region: StateRegion,
    width: u32,
    height: u32,
    color: [u8; 3],
}

impl FakeSandbox {
    pub(crate) fn new(capacity: usize) -> (Self, Arc<Mutex<FakeSandboxState>>) {
        let state = Arc::new(Mutex::new(FakeSandboxState {
            memory: vec![0; 16 + capacity],
            ..Default::default()
        }));
        let sandbox = Self {
            state: Arc::clone(&state),
            region: StateRegion { base: 16, capacity },
            width: 0,
            height: 0,
            color: [0; 3],
        };
        (sandbox, state)
    }
}

impl Sandbox for FakeSandbox {
    fn init(&mut self, width: u32, height: u32) -> Result<(), SandboxError> {
        self.width = width;
        self.height = height;
        self.state.lock().unwrap().init = Some((width, height));
        Ok(())
    }
    
    fn state_region(&mut self) -> Result<StateRegion, SandboxError> {
        Ok(self.region)
    }
    
    fn write_state(&mut self, region: StateRegion, bytes: &[u8]) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.memory[region.base..region.base + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
    
    fn load(&mut self) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        state.loads += 1;
        let base = self.region.base;
        for (i, c) in self.color.iter_mut().enumerate() {
            *c = state.memory.get(base + i).copied().unwrap_or(0);
        }
        Ok(())
    }
    
    fn draw(&mut self, out: &mut Vec<u8>) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        if state.trap_on_draw {
            return Err(SandboxError::trap("unreachable executed"));
        }
        state.draws += 1;
        out.clear();
        for _ in 0..(self.width * self.height) {
            out.extend_from_slice(&[self.color[0], self.color[1], self.color[2], 255]);
        }
        Ok(())
    }
}

/// Factory producing `FakeSandbox`es, optionally refusing some artifacts.
#[derive(Clone, Default)]
pub(crate) struct FakeFactory {
    pub(crate) capacity: usize,
    built: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FakeFactory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            built: Arc::default(),
        }
    }
    
    /// Artifacts instantiated so far, in order.
    pub(crate) fn built(&self) -> Vec<Vec<u8>> {
        self.built.lock().unwrap().clone()
    }
}

impl SandboxFactory for FakeFactory {
    fn instantiate(&self, artifact: &[u8]) -> Result<Box<dyn Sandbox>, SandboxError> {
        if artifact.starts_with(b"bad") {
            return Err(SandboxError::Compile("not a module".to_string()));
        }
        self.built.lock().unwrap().push(artifact.to_vec());
        let (sandbox, _) = FakeSandbox::new(self.capacity);
        Ok(Box::new(sandbox))
    }
}
