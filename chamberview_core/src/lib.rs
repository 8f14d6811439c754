//! ChamberView Core - jitter-absorbing playback and sandboxed chamber compositing
//!
//! A ball-machine server publishes simulation steps for many independent
//! chambers. This crate turns those irregular, batch-delivered steps into a
//! steady stream of frames and draws every chamber, each running in its own
//! WebAssembly sandbox, into one shared canvas:
//!
//! 1. **Playback**: `SnapshotBuffer` stamps and queues steps behind an
//!    adaptive offset; `PlaybackClock` picks at most one per display tick.
//! 2. **Compositing**: `ChamberSlot`s load state into their sandbox, draw,
//!    and land in a row/column `GridLayout` on the shared `Canvas`.
//! 3. **Relayout**: grid rebuilds are serialized through one worker task.

pub mod canvas;
pub mod chamber;
pub mod compositor;
pub mod error;
pub mod layout;
pub mod playback;
pub mod relayout;
pub mod runtime;
pub mod sandbox;
pub mod snapshot_buffer;
pub mod visualization;
pub mod wasm;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use canvas::{Bounds, Canvas, Filter, RenderStyle};
pub use chamber::{ChamberSandbox, ChamberSlot};
pub use compositor::{Compositor, FrameReport, Grid};
pub use error::{LayoutError, SandboxError, ViewerError};
pub use layout::{GridLayout, PanDrift, MAX_CANVAS_PIXELS, MAX_CANVAS_SIDE};
pub use playback::{PlaybackClock, PlaybackStats};
pub use relayout::{build_grid, GridSpec, LayoutSummary, RelayoutQueue, RelayoutRequest, RelayoutWorker};
pub use runtime::{ChamberViewer, Player, ViewerConfig, ViewerHandle};
pub use sandbox::{Sandbox, SandboxFactory, StateRegion};
pub use snapshot_buffer::{Batch, BufferConfig, Fetcher, Snapshot, SnapshotBuffer};
pub use visualization::{FrameSink, NullSink, RerunSink};
pub use wasm::{WasmEngine, WasmSandbox};
