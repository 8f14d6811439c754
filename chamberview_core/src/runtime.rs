//! Viewer runtime: wires the fetch task, the relayout worker and the render
//! loop together.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Batch (mpsc)  ┌────────────────────────────────────┐
//! │  fetch task  │ ─────────────▶ │            render loop             │
//! │  (Fetcher)   │                │  Player: SnapshotBuffer            │
//! └──────────────┘                │          PlaybackClock             │
//! ┌──────────────┐  Grid (mpsc)   │          Compositor ──▶ FrameSink  │
//! │   relayout   │ ─────────────▶ │                                    │
//! │    worker    │                └────────────────────────────────────┘
//! └──────────────┘
//!        ▲ RelayoutRequest + completion (oneshot)
//!  ViewerHandle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chamberview_env::{InitInfo, SimulationService, UserInfo, ViewerContext};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::canvas::{Canvas, RenderStyle};
use crate::compositor::{Compositor, FrameReport, Grid};
use crate::error::ViewerError;
use crate::layout::PanDrift;
use crate::playback::{PlaybackClock, PlaybackStats};
use crate::relayout::{GridSpec, LayoutSummary, RelayoutQueue, RelayoutRequest, RelayoutWorker};
use crate::sandbox::SandboxFactory;
use crate::snapshot_buffer::{Batch, BufferConfig, Fetcher, SnapshotBuffer};
use crate::visualization::{FrameSink, NullSink};

/// Configuration for a viewer.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Delay between state fetches (default: 300 ms)
    pub fetch_interval: Duration,
    
    /// Display refresh period (default: 16 ms)
    pub frame_interval: Duration,
    
    pub buffer: BufferConfig,
    
    /// Width of one chamber in pixels (default: 600)
    pub chamber_width: u32,
    
    pub style: RenderStyle,
    
    /// Pan drift per rendered frame, in pixels (default: 0.05, 0.01)
    pub pan_step: (f64, f64),
    
    /// Sandbox instruction budget per frame; `None` disables metering
    pub fuel_per_frame: Option<u64>,
    
    /// Period of the playback summary log (default: 5 s)
    pub stats_interval: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_millis(300),
            frame_interval: Duration::from_millis(16),
            buffer: BufferConfig::default(),
            chamber_width: 600,
            style: RenderStyle::default(),
            pan_step: (0.05, 0.01),
            fuel_per_frame: Some(50_000_000),
            stats_interval: Duration::from_secs(5),
        }
    }
}

/// Render-side state: everything the render loop owns.
///
/// Synchronous and clock-agnostic, so it can be driven by a real display
/// loop or by a virtual-time harness.
pub struct Player {
    buffer: SnapshotBuffer,
    clock: PlaybackClock,
    compositor: Compositor,
}

impl Player {
    pub fn new(config: &ViewerConfig) -> Self {
        let (dx, dy) = config.pan_step;
        Self {
            buffer: SnapshotBuffer::new(config.buffer.clone()),
            clock: PlaybackClock::new(),
            compositor: Compositor::new(config.style.clone(), PanDrift::new(dx, dy)),
        }
    }
    
    /// Queues a fetched batch. Returns how many snapshots were accepted.
    pub fn ingest(&mut self, batch: Batch) -> usize {
        self.buffer.ingest(batch)
    }
    
    /// Swaps in a freshly built grid.
    pub fn install(&mut self, grid: Grid) {
        self.compositor.install(grid);
    }
    
    /// One display tick: renders the selected snapshot, if any.
    pub fn tick(&mut self, now_ms: f64) -> Option<FrameReport> {
        let snapshot = self.clock.next_frame(&mut self.buffer, now_ms)?;
        Some(self.compositor.render_frame(snapshot))
    }
    
    pub fn buffer(&self) -> &SnapshotBuffer {
        &self.buffer
    }
    
    pub fn stats(&self) -> &PlaybackStats {
        self.clock.stats()
    }
    
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }
    
    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }
    
    pub fn canvas(&self) -> &Canvas {
        self.compositor.canvas()
    }
}

/// Cloneable control surface of a running viewer.
#[derive(Clone)]
pub struct ViewerHandle {
    service: Arc<dyn SimulationService>,
    relayout: RelayoutQueue,
    user: UserInfo,
}

impl ViewerHandle {
    pub fn user(&self) -> &UserInfo {
        &self.user
    }
    
    /// Whether the server granted this user the admin controls.
    pub fn is_admin(&self) -> bool {
        self.user.is_admin
    }
    
    pub async fn set_num_balls(&self, num_balls: u64) -> Result<(), ViewerError> {
        self.service.set_num_balls(num_balls).await?;
        info!(num_balls, "Ball count updated");
        Ok(())
    }
    
    /// Tells the server the new row width, then rebuilds the grid. Waits for
    /// every earlier relayout to finish first.
    pub async fn set_chambers_per_row(
        &self,
        chambers_per_row: usize,
    ) -> Result<LayoutSummary, ViewerError> {
        self.relayout
            .relayout(RelayoutRequest::user(chambers_per_row))
            .await
    }
    
    pub async fn reset(&self) -> Result<(), ViewerError> {
        self.service.reset().await?;
        info!("Simulation reset requested");
        Ok(())
    }
}

/// A connected viewer, ready to run its render loop.
pub struct ChamberViewer<Ctx: ViewerContext> {
    ctx: Arc<Ctx>,
    config: ViewerConfig,
    init: InitInfo,
    player: Player,
    batches: mpsc::Receiver<Batch>,
    grids: Option<mpsc::Receiver<Grid>>,
    sink: Box<dyn FrameSink>,
}

impl<Ctx: ViewerContext> ChamberViewer<Ctx> {
    /// Reads the initial configuration, starts the fetch task and the
    /// relayout worker, and builds the first grid.
    pub async fn connect(
        ctx: Arc<Ctx>,
        service: Arc<dyn SimulationService>,
        factory: Arc<dyn SandboxFactory>,
        config: ViewerConfig,
    ) -> Result<(Self, ViewerHandle), ViewerError> {
        let init = service.init_info().await?;
        let user = match service.user_info().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "User info unavailable, continuing without admin controls");
                UserInfo::default()
            }
        };
        info!(
            user = %user.name,
            admin = user.is_admin,
            chambers = init.chamber_ids.len(),
            chambers_per_row = init.chambers_per_row,
            "Connected"
        );
        
        let (grid_tx, grid_rx) = mpsc::channel(4);
        let spec = GridSpec {
            chamber_ids: init.chamber_ids.clone(),
            chamber_width: config.chamber_width,
            chamber_height_ratio: init.chamber_height,
        };
        let (relayout, worker) = RelayoutWorker::new(Arc::clone(&service), factory, spec, grid_tx);
        ctx.spawn("relayout", worker.run());
        relayout
            .relayout(RelayoutRequest::local(init.chambers_per_row))
            .await?;
        
        let (batch_tx, batch_rx) = mpsc::channel(64);
        ctx.spawn(
            "fetch",
            fetch_loop(Arc::clone(&ctx), Arc::clone(&service), config.fetch_interval, batch_tx),
        );
        
        let viewer = Self {
            player: Player::new(&config),
            ctx,
            config,
            init,
            batches: batch_rx,
            grids: Some(grid_rx),
            sink: Box::new(NullSink),
        };
        let handle = ViewerHandle {
            service,
            relayout,
            user,
        };
        Ok((viewer, handle))
    }
    
    /// Replaces the frame sink.
    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }
    
    pub fn init_info(&self) -> &InitInfo {
        &self.init
    }
    
    pub fn player(&self) -> &Player {
        &self.player
    }
    
    /// Runs the render loop until the fetch task goes away.
    pub async fn run(mut self) -> Result<(), ViewerError> {
        let mut next_stats = self.ctx.now() + self.config.stats_interval;
        loop {
            self.pump()?;
            
            if let Some(report) = self.player.tick(self.ctx.now_ms()) {
                self.sink.frame(self.player.canvas(), &report);
            }
            
            let now = self.ctx.now();
            if now >= next_stats {
                self.log_stats();
                next_stats = now + self.config.stats_interval;
            }
            
            self.ctx.sleep(self.config.frame_interval).await;
        }
    }
    
    /// Applies everything the background tasks have produced since the last
    /// tick: new grids first, then fetched batches.
    fn pump(&mut self) -> Result<(), ViewerError> {
        if let Some(grids) = self.grids.as_mut() {
            loop {
                match grids.try_recv() {
                    Ok(grid) => self.player.install(grid),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("Relayout worker stopped, keeping current grid");
                        self.grids = None;
                        break;
                    }
                }
            }
        }
        loop {
            match self.batches.try_recv() {
                Ok(batch) => {
                    self.player.ingest(batch);
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(ViewerError::Stopped("fetch loop")),
            }
        }
    }
    
    fn log_stats(&self) {
        let stats = self.player.stats();
        info!(
            delivered = stats.delivered,
            skipped = stats.skipped,
            idle_ticks = stats.idle_ticks,
            queued = self.player.buffer().len(),
            offset_ms = self.player.buffer().offset_ms(),
            "Playback"
        );
    }
}

/// Polls the service forever, one fetch per interval. Failures are logged
/// and retried on the next interval.
async fn fetch_loop<Ctx: ViewerContext>(
    ctx: Arc<Ctx>,
    service: Arc<dyn SimulationService>,
    interval: Duration,
    batches: mpsc::Sender<Batch>,
) {
    let mut fetcher = Fetcher::new();
    loop {
        match fetcher.fetch(ctx.as_ref(), service.as_ref()).await {
            Ok(batch) => {
                if batches.send(batch).await.is_err() {
                    debug!("Render loop gone, stopping fetch loop");
                    return;
                }
            }
            Err(e) => warn!(since = fetcher.last_step(), error = %e, "State fetch failed"),
        }
        ctx.sleep(interval).await;
    }
}
