//! Snapshot buffering with an adaptive playback offset.
//!
//! Snapshots arrive in batches every fetch interval. Stamping each batch
//! backward from its retrieval time at a fixed nominal spacing spreads a
//! burst across a plausible timeline, and the playback offset delays the
//! whole timeline far enough that the next batch normally lands before the
//! queue runs dry.
//!
//! ```text
//! retrieved_at ─────────────────────────────────────────────▶ time
//!   batch of k:  [s0]──16ms──[s1]──16ms── ... ──[s(k-1)] = retrieved_at
//!   rendered at: estimated_time + offset
//! ```

use chamberview_env::{BallPosition, EnvError, SimulationService, SimulationStep, ViewerContext};
use std::collections::VecDeque;

/// Tunables for the snapshot buffer.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Assumed spacing between consecutive server steps (ms)
    pub nominal_spacing_ms: f64,
    
    /// Playback offset before the first batch arrives (ms)
    pub initial_offset_ms: f64,
    
    /// Weight of the old offset when smoothing toward a smaller batch span
    pub retain_weight: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            nominal_spacing_ms: 16.0,
            initial_offset_ms: 300.0 * 16.0,
            retain_weight: 0.8,
        }
    }
}

/// One buffered simulation step with its estimated arrival time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The step as reported by the server
    pub step: SimulationStep,
    
    /// Client-local time (ms) at which this step is assumed to have been current
    pub estimated_time_ms: f64,
}

impl Snapshot {
    pub fn new(step: SimulationStep, estimated_time_ms: f64) -> Self {
        Self { step, estimated_time_ms }
    }
    
    /// Sequence number of the underlying step.
    pub fn num_steps_taken(&self) -> u64 {
        self.step.num_steps_taken
    }
    
    /// Raw sandbox state for a slot.
    pub fn state(&self, slot: usize) -> Option<&[u8]> {
        self.step.chamber_states.get(slot).map(Vec::as_slice)
    }
    
    /// Ball positions for a slot; a slot without an entry has no balls.
    pub fn balls(&self, slot: usize) -> &[BallPosition] {
        self.step
            .chamber_balls
            .get(slot)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A fetch result handed from the fetch task to the render task.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Steps in server order (oldest first)
    pub steps: Vec<SimulationStep>,
    
    /// Client time at which the response was fully received (ms)
    pub retrieved_at_ms: f64,
}

/// Fetch-side state: the last step the service has handed us.
///
/// Lives in the fetch task; the queue itself belongs to the render task.
#[derive(Debug, Default)]
pub struct Fetcher {
    last_step: u64,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Returns the `since` value the next fetch will use.
    pub fn last_step(&self) -> u64 {
        self.last_step
    }
    
    /// Fetches every step after the last seen one.
    ///
    /// An empty response leaves the sequence number unchanged; otherwise it
    /// advances to the last element, whatever the batch size.
    pub async fn fetch<Ctx, Svc>(&mut self, ctx: &Ctx, service: &Svc) -> Result<Batch, EnvError>
    where
        Ctx: ViewerContext,
        Svc: SimulationService + ?Sized,
    {
        let steps = service.simulation_state(self.last_step).await?;
        let retrieved_at_ms = ctx.now_ms();
        if let Some(last) = steps.last() {
            self.last_step = last.num_steps_taken;
        }
        Ok(Batch { steps, retrieved_at_ms })
    }
}

/// Ordered queue of stamped snapshots plus the adaptive playback offset.
#[derive(Debug)]
pub struct SnapshotBuffer {
    config: BufferConfig,
    queue: VecDeque<Snapshot>,
    offset_ms: f64,
    last_batch_size: usize,
    newest_step: Option<u64>,
}

impl SnapshotBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let offset_ms = config.initial_offset_ms;
        Self {
            config,
            queue: VecDeque::new(),
            offset_ms,
            last_batch_size: 0,
            newest_step: None,
        }
    }
    
    /// Current playback offset (ms).
    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }
    
    /// Size of the most recently ingested batch.
    pub fn last_batch_size(&self) -> usize {
        self.last_batch_size
    }
    
    /// Number of queued snapshots, including the playback cursor.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    
    /// Iterates queued snapshots oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.queue.iter()
    }
    
    /// Stamps a batch at the nominal spacing, counted back from retrieval.
    pub fn stamp(&self, batch: Batch) -> Vec<Snapshot> {
        let spacing = self.config.nominal_spacing_ms;
        let count = batch.steps.len();
        batch
            .steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| {
                let steps_before_retrieval = (count - 1 - idx) as f64;
                Snapshot::new(step, batch.retrieved_at_ms - spacing * steps_before_retrieval)
            })
            .collect()
    }
    
    /// Folds a batch size into the playback offset.
    ///
    /// A span larger than the offset is adopted at once; a smaller one is
    /// approached by exponential smoothing.
    pub fn update_offset(&mut self, batch_size: usize) {
        let batch_span = self.config.nominal_spacing_ms * batch_size as f64;
        if batch_span > self.offset_ms {
            self.offset_ms = batch_span;
        } else {
            let retain = self.config.retain_weight;
            self.offset_ms = self.offset_ms * retain + batch_span * (1.0 - retain);
        }
        self.last_batch_size = batch_size;
    }
    
    /// Appends a fetched batch and adapts the offset to its size.
    ///
    /// Steps at or below the newest already-queued sequence number are
    /// dropped so the queue stays ordered. Returns how many were appended.
    pub fn ingest(&mut self, batch: Batch) -> usize {
        self.update_offset(batch.steps.len());
        
        let mut appended = 0;
        for snapshot in self.stamp(batch) {
            let seq = snapshot.num_steps_taken();
            if self.newest_step.is_some_and(|newest| seq <= newest) {
                tracing::trace!(seq, "dropping out-of-order snapshot");
                continue;
            }
            self.newest_step = Some(seq);
            self.queue.push_back(snapshot);
            appended += 1;
        }
        appended
    }
    
    /// Counts leading snapshots whose adjusted time has elapsed at `now_ms`.
    pub(crate) fn due_count(&self, now_ms: f64) -> usize {
        self.queue
            .iter()
            .take_while(|s| s.estimated_time_ms + self.offset_ms <= now_ms)
            .count()
    }
    
    /// Drops the first `count` snapshots.
    pub(crate) fn discard_front(&mut self, count: usize) {
        self.queue.drain(..count.min(self.queue.len()));
    }
    
    pub(crate) fn front(&self) -> Option<&Snapshot> {
        self.queue.front()
    }
    
    /// Pins the offset, for tests that need exact due instants.
    #[cfg(test)]
    pub(crate) fn set_offset_ms(&mut self, offset_ms: f64) {
        self.offset_ms = offset_ms;
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}
