//! Scenario runner: drives the real playback pipeline over virtual time.
//!
//! One loop iteration is one virtual millisecond. Each iteration the server
//! may publish a step, a fetch may be issued or land (after the scenario's
//! delivery delay), and on display ticks the `Player` selects and composites
//! a frame. Chambers run in real wasmtime sandboxes.

use crate::context::SimContext;
use crate::scenarios::ScenarioId;
use crate::service::SimService;

use chamberview_core::{
    Batch, Fetcher, FrameReport, FrameSink, GridSpec, LayoutSummary, Player, RelayoutQueue,
    RelayoutRequest, RelayoutWorker, RerunSink, SandboxError, ViewerConfig, ViewerError,
    WasmEngine,
};
use chamberview_env::{ChamberId, EnvError, ServiceController, SimulationService, ViewerContext};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for a harness run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed
    pub seed: u64,
    
    /// Number of chambers on the server
    pub chambers: usize,
    
    /// Balls per chamber
    pub balls: usize,
    
    /// Initial row width
    pub chambers_per_row: usize,
    
    /// Chamber height as a fraction of its width
    pub chamber_height: f64,
    
    /// Simulated duration in seconds
    pub duration_secs: f64,
    
    /// Server physics period (default: 16 ms)
    pub server_step: Duration,
    
    /// Stream composited frames to Rerun
    pub visualize: bool,
    
    /// Viewer settings; chambers are kept small so runs stay fast
    pub viewer: ViewerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            chambers: 4,
            balls: 3,
            chambers_per_row: 2,
            chamber_height: 0.5,
            duration_secs: 10.0,
            server_step: Duration::from_millis(16),
            visualize: false,
            viewer: ViewerConfig {
                chamber_width: 32,
                ..Default::default()
            },
        }
    }
}

/// Errors that stop a run before any assertion is made.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Runtime error: {0}")]
    Runtime(String),
    
    #[error("Viewer error: {0}")]
    Viewer(#[from] ViewerError),
    
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,
    
    /// Seed used
    pub seed: u64,
    
    /// Whether scenario passed all assertions
    pub passed: bool,
    
    /// Display ticks executed
    pub total_ticks: u64,
    
    /// Final simulation time in seconds
    pub final_time_secs: f64,
    
    /// Failure message if any
    pub failure_reason: Option<String>,
    
    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Steps the server published
    pub server_steps: u64,
    
    /// Fetches issued
    pub fetches: u64,
    
    /// Fetches that failed
    pub fetch_failures: u64,
    
    /// Largest batch received
    pub max_batch: usize,
    
    /// Largest playback offset observed (ms)
    pub max_offset_ms: f64,
    
    /// Offset at the end of the run (ms)
    pub final_offset_ms: f64,
    
    /// Frames composited
    pub frames: u64,
    
    /// Snapshots dropped without being shown
    pub skipped: u64,
    
    /// Frames composited after the stall cleared
    pub frames_after_recovery: u64,
    
    /// Slot renders that failed
    pub failed_slot_renders: u64,
    
    /// Grid rebuilds completed
    pub relayouts: u64,
}

/// Per-run assertion state.
#[derive(Debug, Default)]
struct Invariants {
    last_delivered: Option<u64>,
    violations: Vec<String>,
}

impl Invariants {
    fn violate(&mut self, message: String) {
        warn!("Invariant violated: {}", message);
        self.violations.push(message);
    }
    
    /// The offset must cover the span of the batch just folded in.
    fn check_offset(&mut self, offset_ms: f64, batch_size: usize, spacing_ms: f64) {
        let span = spacing_ms * batch_size as f64;
        if offset_ms + 1e-9 < span {
            self.violate(format!("offset {:.3}ms below batch span {:.3}ms", offset_ms, span));
        }
    }
    
    /// Delivered steps must strictly increase.
    fn check_frame(&mut self, report: &FrameReport) {
        if let Some(last) = self.last_delivered {
            if report.step <= last {
                self.violate(format!("step {} delivered after step {}", report.step, last));
            }
        }
        self.last_delivered = Some(report.step);
    }
}

/// Checks that rebuilds did not interleave: every announced width is
/// followed by one artifact download per chamber before the next one, and
/// widths were announced in submission order.
fn check_serialized(log: &[String], widths: &[usize], chambers: usize) -> Result<(), String> {
    let mut announced = Vec::new();
    let mut downloads = 0usize;
    for entry in log {
        if let Some(width) = entry.strip_prefix("chambers_per_row ") {
            if !announced.is_empty() && downloads != chambers {
                return Err(format!("{} downloads between relayouts, expected {}", downloads, chambers));
            }
            announced.push(width.parse::<usize>().map_err(|e| e.to_string())?);
            downloads = 0;
        } else if entry.starts_with("artifact ") {
            downloads += 1;
        }
    }
    if !announced.is_empty() && downloads != chambers {
        return Err(format!("{} downloads after last relayout, expected {}", downloads, chambers));
    }
    if announced != widths {
        return Err(format!("relayouts announced as {:?}, submitted as {:?}", announced, widths));
    }
    Ok(())
}

/// Runs scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }
    
    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.duration_secs = secs;
        self
    }
    
    pub fn config(&self) -> &SimConfig {
        &self.config
    }
    
    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);
        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SimError::Runtime(e.to_string()))
            .and_then(|runtime| runtime.block_on(self.simulate(scenario)));
        
        outcome.unwrap_or_else(|e| ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            failure_reason: Some(e.to_string()),
            metrics: ScenarioMetrics::default(),
        })
    }
    
    async fn simulate(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let config = &self.config;
        let ctx = SimContext::shared(config.seed);
        let mut rng = ctx.rng(1);
        let service = SimService::new(
            config.seed,
            config.chambers,
            config.balls,
            config.chambers_per_row,
            config.chamber_height,
        );
        let controller = service.controller();
        
        let stall_start = Duration::from_secs(4);
        let stall_end = Duration::from_secs(7);
        let storm_times = [2u64, 4, 6].map(Duration::from_secs);
        let broken = service
            .chamber_ids()
            .last()
            .cloned()
            .unwrap_or_else(|| ChamberId::new(0));
        match scenario {
            ScenarioId::Steady => controller.set_latency(Duration::from_millis(20)),
            ScenarioId::Bursty => {
                controller.set_latency(Duration::from_millis(10));
                controller.set_jitter(Duration::from_millis(400));
            }
            ScenarioId::Flaky => {
                controller.set_latency(Duration::from_millis(20));
                controller.set_failure_rate(0.33);
            }
            ScenarioId::Stall => controller.set_latency(Duration::from_millis(20)),
            ScenarioId::RelayoutStorm => {
                controller.set_latency(Duration::from_millis(20));
                service.break_chamber(&broken);
            }
        }
        
        // Grid pipeline: the same worker the viewer runs.
        let engine = Arc::new(WasmEngine::new(config.viewer.fuel_per_frame)?);
        let (grid_tx, mut grid_rx) = mpsc::channel(8);
        let spec = GridSpec {
            chamber_ids: service.chamber_ids().to_vec(),
            chamber_width: config.viewer.chamber_width,
            chamber_height_ratio: config.chamber_height,
        };
        let (queue, worker) = RelayoutWorker::new(Arc::new(service.clone()), engine, spec, grid_tx);
        ctx.spawn("relayout", worker.run());
        
        let mut metrics = ScenarioMetrics::default();
        let mut invariants = Invariants::default();
        let mut player = Player::new(&config.viewer);
        let mut sink = if config.visualize {
            RerunSink::new("chamberview-sim", 1)
        } else {
            RerunSink::disabled()
        };
        let mut summaries = vec![queue.relayout(RelayoutRequest::local(config.chambers_per_row)).await?];
        let mut submitted_widths = Vec::new();
        
        let spacing_ms = config.viewer.buffer.nominal_spacing_ms;
        let millisecond = Duration::from_millis(1);
        let end = Duration::from_secs_f64(config.duration_secs.max(0.0));
        let mut fetcher = Fetcher::new();
        let mut in_flight: Option<(Duration, Result<Batch, EnvError>)> = None;
        let mut next_fetch = Duration::ZERO;
        let mut next_server_step = config.server_step;
        let mut next_frame = Duration::ZERO;
        let mut total_ticks = 0u64;
        let mut now = Duration::ZERO;
        
        while now < end {
            ctx.set_time(now);
            
            while next_server_step <= now {
                service.advance(config.server_step.as_secs_f64());
                next_server_step += config.server_step;
            }
            
            if scenario == ScenarioId::Stall && now == stall_start {
                info!("Server stalls until {:?}", stall_end);
                controller.stall_until(stall_end);
            }
            if scenario == ScenarioId::RelayoutStorm && storm_times.contains(&now) {
                service.set_num_balls(rng.gen_range(1..6)).await.ok();
                let widths: Vec<usize> = (0..3).map(|_| rng.gen_range(1..=4)).collect();
                debug!(?widths, "Relayout storm");
                summaries.extend(storm(&queue, &widths).await?);
                submitted_widths.extend(widths);
            }
            
            if in_flight.is_none() && now >= next_fetch {
                let result = fetcher.fetch(ctx.as_ref(), &service).await;
                let arrival = now + service.delivery_delay(now);
                metrics.fetches += 1;
                in_flight = Some((arrival, result));
            }
            if in_flight.as_ref().is_some_and(|(arrival, _)| now >= *arrival) {
                if let Some((_, result)) = in_flight.take() {
                    match result {
                        Ok(mut batch) => {
                            batch.retrieved_at_ms = ctx.now_ms();
                            let size = batch.steps.len();
                            player.ingest(batch);
                            let offset = player.buffer().offset_ms();
                            invariants.check_offset(offset, size, spacing_ms);
                            metrics.max_batch = metrics.max_batch.max(size);
                            metrics.max_offset_ms = metrics.max_offset_ms.max(offset);
                        }
                        Err(e) => {
                            debug!(error = %e, "Fetch failed, retrying next interval");
                            metrics.fetch_failures += 1;
                        }
                    }
                    next_fetch = now + config.viewer.fetch_interval;
                }
            }
            
            if now >= next_frame {
                next_frame += config.viewer.frame_interval;
                total_ticks += 1;
                while let Ok(grid) = grid_rx.try_recv() {
                    player.install(grid);
                }
                if let Some(report) = player.tick(ctx.now_ms()) {
                    invariants.check_frame(&report);
                    metrics.frames += 1;
                    metrics.failed_slot_renders += report.failed as u64;
                    if now > stall_end + Duration::from_secs(1) {
                        metrics.frames_after_recovery += 1;
                    }
                    sink.frame(player.canvas(), &report);
                    
                    if let Some(again) = player.tick(ctx.now_ms()) {
                        invariants.violate(format!(
                            "second tick at the same instant delivered step {}",
                            again.step
                        ));
                    }
                }
            }
            
            now += millisecond;
        }
        
        metrics.server_steps = service.steps_taken();
        metrics.skipped = player.stats().skipped;
        metrics.final_offset_ms = player.buffer().offset_ms();
        metrics.relayouts = summaries.len() as u64;
        
        let mut failures = invariants.violations;
        if metrics.frames == 0 {
            failures.push("no frames were delivered".to_string());
        }
        if metrics.failed_slot_renders > 0 {
            failures.push(format!("{} slot renders failed", metrics.failed_slot_renders));
        }
        match scenario {
            ScenarioId::Flaky if metrics.fetch_failures == 0 => {
                failures.push("no fetch failures were injected".to_string());
            }
            ScenarioId::Stall => {
                let stalled_steps = (stall_end - stall_start).as_millis() as usize
                    / config.server_step.as_millis().max(1) as usize;
                if metrics.max_batch < stalled_steps / 2 {
                    failures.push(format!("largest batch {} after a stall", metrics.max_batch));
                }
                if metrics.frames_after_recovery == 0 {
                    failures.push("playback did not resume after the stall".to_string());
                }
            }
            ScenarioId::RelayoutStorm => {
                if let Err(e) = check_serialized(&service.request_log(), &submitted_widths, config.chambers) {
                    failures.push(e);
                }
                if summaries.iter().any(|s| s.failed != [broken.clone()]) {
                    failures.push("broken chamber was not isolated".to_string());
                }
            }
            _ => {}
        }
        
        let passed = failures.is_empty();
        info!(
            frames = metrics.frames,
            skipped = metrics.skipped,
            fetches = metrics.fetches,
            failures = metrics.fetch_failures,
            offset_ms = metrics.final_offset_ms,
            "Scenario {} complete",
            scenario.name()
        );
        
        Ok(ScenarioResult {
            scenario,
            seed: config.seed,
            passed,
            total_ticks,
            final_time_secs: now.as_secs_f64(),
            failure_reason: if passed { None } else { Some(failures.join("; ")) },
            metrics,
        })
    }
}

/// Submits every width back to back, then waits for all of them.
async fn storm(queue: &RelayoutQueue, widths: &[usize]) -> Result<Vec<LayoutSummary>, SimError> {
    let pending = widths
        .iter()
        .map(|&w| queue.submit(RelayoutRequest::user(w)))
        .collect::<Result<Vec<_>, _>>()?;
    let mut summaries = Vec::with_capacity(pending.len());
    for done in pending {
        let summary = done
            .await
            .map_err(|_| ViewerError::Stopped("relayout worker"))??;
        summaries.push(summary);
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    
    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(SimConfig::default())
    }
    
    #[test]
    fn test_steady_scenario() {
        let result = runner().run(ScenarioId::Steady);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.frames > 0);
        assert_eq!(result.metrics.fetch_failures, 0);
        assert!(result.metrics.final_offset_ms < result.metrics.max_offset_ms);
    }
    
    #[test]
    fn test_flaky_scenario_recovers() {
        let result = runner().run(ScenarioId::Flaky);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.fetch_failures > 0);
    }
    
    #[test]
    fn test_stall_grows_offset() {
        let result = runner().run(ScenarioId::Stall);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.max_offset_ms >= 16.0 * result.metrics.max_batch as f64 - 1e-6);
    }
    
    #[test]
    fn test_relayout_storm_is_serialized() {
        let result = runner().run(ScenarioId::RelayoutStorm);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.relayouts, 10);
    }
    
    #[test]
    fn test_same_seed_same_metrics() {
        let a = runner().with_duration(3.0).run(ScenarioId::Bursty);
        let b = runner().with_duration(3.0).run(ScenarioId::Bursty);
        assert_eq!(a.metrics.frames, b.metrics.frames);
        assert_eq!(a.metrics.skipped, b.metrics.skipped);
        assert_eq!(a.metrics.max_batch, b.metrics.max_batch);
    }
    
    #[test]
    fn test_check_serialized() {
        let log: Vec<String> = [
            "artifact 0",
            "chambers_per_row 2",
            "artifact 0",
            "artifact 1",
            "chambers_per_row 1",
            "artifact 0",
            "artifact 1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert!(check_serialized(&log, &[2, 1], 2).is_ok());
        assert!(check_serialized(&log, &[1, 2], 2).is_err());
        
        let interleaved: Vec<String> = ["chambers_per_row 2", "artifact 0", "chambers_per_row 1", "artifact 1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(check_serialized(&interleaved, &[2, 1], 2).is_err());
    }
    
    fn serial_log(widths: &[usize], chambers: usize) -> Vec<String> {
        let mut log: Vec<String> = (0..chambers).map(|c| format!("artifact {}", c)).collect();
        for width in widths {
            log.push(format!("num_balls {}", width));
            log.push(format!("chambers_per_row {}", width));
            log.extend((0..chambers).map(|c| format!("artifact {}", c)));
        }
        log
    }
    
    proptest! {
        #[test]
        fn prop_serial_logs_pass_and_lost_downloads_fail(
            widths in prop::collection::vec(1usize..8, 1..6),
            chambers in 1usize..6,
            drop_at in any::<prop::sample::Index>(),
        ) {
            let log = serial_log(&widths, chambers);
            prop_assert!(check_serialized(&log, &widths, chambers).is_ok());
            
            let downloads: Vec<usize> = log
                .iter()
                .enumerate()
                .skip(chambers)
                .filter(|(_, entry)| entry.starts_with("artifact "))
                .map(|(i, _)| i)
                .collect();
            let mut short = log.clone();
            short.remove(downloads[drop_at.index(downloads.len())]);
            prop_assert!(check_serialized(&short, &widths, chambers).is_err());
        }
    }
}
