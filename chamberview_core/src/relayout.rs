//! Serialized grid rebuilds.
//!
//! Every change of row width goes through one queue drained by a single
//! worker task, so rebuilds never interleave. A rebuild optionally tells the
//! server first, downloads and instantiates every chamber artifact, and hands
//! the finished `Grid` to the render loop, which swaps it in between frames.

use std::sync::Arc;

use chamberview_env::{ChamberId, SimulationService};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::chamber::ChamberSlot;
use crate::compositor::Grid;
use crate::error::ViewerError;
use crate::layout::GridLayout;
use crate::sandbox::SandboxFactory;

/// A request to rebuild the grid at a new row width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayoutRequest {
    pub chambers_per_row: usize,
    
    /// Announce the new width to the server before rebuilding
    pub notify_server: bool,
}

impl RelayoutRequest {
    /// A rebuild the user asked for; the server is told first.
    pub fn user(chambers_per_row: usize) -> Self {
        Self {
            chambers_per_row,
            notify_server: true,
        }
    }
    
    /// A rebuild matching what the server already reports.
    pub fn local(chambers_per_row: usize) -> Self {
        Self {
            chambers_per_row,
            notify_server: false,
        }
    }
}

/// What a completed rebuild produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutSummary {
    pub chambers_per_row: usize,
    pub slots: usize,
    pub populated: usize,
    pub canvas_width: u32,
    pub canvas_height: u32,
    
    /// Chambers whose artifact could not be loaded; their slots are empty
    pub failed: Vec<ChamberId>,
}

type Completion = oneshot::Sender<Result<LayoutSummary, ViewerError>>;

/// Cloneable handle for submitting rebuilds.
#[derive(Clone)]
pub struct RelayoutQueue {
    tx: mpsc::UnboundedSender<(RelayoutRequest, Completion)>,
}

impl RelayoutQueue {
    /// Enqueues a rebuild and returns the channel its result will arrive on.
    pub fn submit(
        &self,
        request: RelayoutRequest,
    ) -> Result<oneshot::Receiver<Result<LayoutSummary, ViewerError>>, ViewerError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send((request, done_tx))
            .map_err(|_| ViewerError::Stopped("relayout worker"))?;
        Ok(done_rx)
    }
    
    /// Enqueues a rebuild and waits for it (and everything queued before it).
    pub async fn relayout(&self, request: RelayoutRequest) -> Result<LayoutSummary, ViewerError> {
        let done = self.submit(request)?;
        done.await.map_err(|_| ViewerError::Stopped("relayout worker"))?
    }
}

/// Fixed inputs of every rebuild.
#[derive(Debug, Clone)]
pub struct GridSpec {
    pub chamber_ids: Vec<ChamberId>,
    pub chamber_width: u32,
    pub chamber_height_ratio: f64,
}

/// Drains the relayout queue, one request at a time.
pub struct RelayoutWorker {
    service: Arc<dyn SimulationService>,
    factory: Arc<dyn SandboxFactory>,
    spec: GridSpec,
    requests: mpsc::UnboundedReceiver<(RelayoutRequest, Completion)>,
    grids: mpsc::Sender<Grid>,
}

impl RelayoutWorker {
    /// Creates the worker and its queue handle. Built grids go to `grids`.
    pub fn new(
        service: Arc<dyn SimulationService>,
        factory: Arc<dyn SandboxFactory>,
        spec: GridSpec,
        grids: mpsc::Sender<Grid>,
    ) -> (RelayoutQueue, Self) {
        let (tx, requests) = mpsc::unbounded_channel();
        let worker = Self {
            service,
            factory,
            spec,
            requests,
            grids,
        };
        (RelayoutQueue { tx }, worker)
    }
    
    /// Runs until every `RelayoutQueue` handle is dropped.
    pub async fn run(mut self) {
        while let Some((request, done)) = self.requests.recv().await {
            let result = self.process(request).await;
            match &result {
                Ok(summary) => info!(
                    chambers_per_row = summary.chambers_per_row,
                    slots = summary.slots,
                    failed = summary.failed.len(),
                    "Grid rebuilt"
                ),
                Err(e) => warn!(
                    chambers_per_row = request.chambers_per_row,
                    error = %e,
                    "Relayout failed, keeping current grid"
                ),
            }
            // The requester may have stopped waiting.
            let _ = done.send(result);
        }
    }
    
    async fn process(&self, request: RelayoutRequest) -> Result<LayoutSummary, ViewerError> {
        // Reject a width this client cannot draw before the server adopts it.
        GridLayout::new(
            self.spec.chamber_ids.len(),
            request.chambers_per_row,
            self.spec.chamber_width,
            self.spec.chamber_height_ratio,
        )?;
        if request.notify_server {
            self.service
                .set_chambers_per_row(request.chambers_per_row)
                .await?;
        }
        let (grid, summary) = build_grid(
            self.service.as_ref(),
            self.factory.as_ref(),
            &self.spec,
            request.chambers_per_row,
        )
        .await?;
        self.grids
            .send(grid)
            .await
            .map_err(|_| ViewerError::Stopped("render loop"))?;
        Ok(summary)
    }
}

/// Downloads and instantiates every chamber, in id order, and pads the grid
/// with empty slots. A chamber that fails to load gets an empty slot.
pub async fn build_grid(
    service: &dyn SimulationService,
    factory: &dyn SandboxFactory,
    spec: &GridSpec,
    chambers_per_row: usize,
) -> Result<(Grid, LayoutSummary), ViewerError> {
    let layout = GridLayout::new(
        spec.chamber_ids.len(),
        chambers_per_row,
        spec.chamber_width,
        spec.chamber_height_ratio,
    )?;
    
    let mut slots = Vec::with_capacity(layout.slot_count());
    let mut failed = Vec::new();
    for (index, id) in spec.chamber_ids.iter().enumerate() {
        match load_chamber(service, factory, &layout, index, id).await {
            Ok(slot) => slots.push(slot),
            Err(e) => {
                warn!(chamber = %id, error = %e, "Chamber failed to load, leaving slot empty");
                failed.push(id.clone());
                slots.push(ChamberSlot::empty(index));
            }
        }
    }
    for index in spec.chamber_ids.len()..layout.slot_count() {
        slots.push(ChamberSlot::empty(index));
    }
    
    let summary = LayoutSummary {
        chambers_per_row,
        slots: slots.len(),
        populated: spec.chamber_ids.len() - failed.len(),
        canvas_width: layout.canvas_width(),
        canvas_height: layout.canvas_height(),
        failed,
    };
    Ok((Grid::new(layout, slots), summary))
}

async fn load_chamber(
    service: &dyn SimulationService,
    factory: &dyn SandboxFactory,
    layout: &GridLayout,
    index: usize,
    id: &ChamberId,
) -> Result<ChamberSlot, ViewerError> {
    let artifact = service.chamber_artifact(id).await?;
    let sandbox = factory.instantiate(&artifact)?;
    let slot = ChamberSlot::populated(
        index,
        id.clone(),
        sandbox,
        layout.chamber_width(),
        layout.chamber_height(),
    )?;
    Ok(slot)
}
