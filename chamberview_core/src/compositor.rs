//! The shared canvas and the grid of slots drawn into it.

use tracing::debug;

use crate::canvas::{Canvas, Filter, RenderStyle};
use crate::chamber::ChamberSlot;
use crate::layout::{GridLayout, PanDrift};
use crate::snapshot_buffer::Snapshot;

/// A fully built grid, ready to be swapped in between frames.
pub struct Grid {
    pub layout: GridLayout,
    pub slots: Vec<ChamberSlot>,
}

impl Grid {
    pub fn new(layout: GridLayout, slots: Vec<ChamberSlot>) -> Self {
        Self { layout, slots }
    }
    
    /// Slots holding a live sandbox.
    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_populated()).count()
    }
}

/// Outcome of one composited frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub step: u64,
    pub rendered: usize,
    pub failed: usize,
}

/// Owns the shared canvas and renders every slot once per frame.
pub struct Compositor {
    canvas: Canvas,
    offscreen: Canvas,
    grid: Option<Grid>,
    pan: PanDrift,
    style: RenderStyle,
}

impl Compositor {
    pub fn new(style: RenderStyle, pan: PanDrift) -> Self {
        Self {
            canvas: Canvas::new(0, 0),
            offscreen: Canvas::new(0, 0),
            grid: None,
            pan,
            style,
        }
    }
    
    /// Replaces the grid and resizes (and so clears) the canvas to fit it.
    pub fn install(&mut self, grid: Grid) {
        let layout = grid.layout;
        self.canvas.resize(layout.canvas_width(), layout.canvas_height());
        self.offscreen.resize(layout.chamber_width(), layout.chamber_height());
        self.grid = Some(grid);
    }
    
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }
    
    pub fn layout(&self) -> Option<&GridLayout> {
        self.grid.as_ref().map(|g| &g.layout)
    }
    
    pub fn pan(&self) -> &PanDrift {
        &self.pan
    }
    
    pub fn set_filter(&mut self, filter: Filter) {
        self.style.filter = filter;
    }
    
    /// Draws `snapshot` into every slot. A failing slot is logged and
    /// counted; its previous pixels stay and the remaining slots still draw.
    pub fn render_frame(&mut self, snapshot: &Snapshot) -> FrameReport {
        let mut report = FrameReport {
            step: snapshot.num_steps_taken(),
            ..Default::default()
        };
        let Some(grid) = self.grid.as_mut() else {
            return report;
        };
        
        self.pan.advance(self.canvas.width(), self.canvas.height());
        for slot in grid.slots.iter_mut() {
            let bounds = grid.layout.slot_bounds(slot.index(), &self.pan);
            match slot.render(snapshot, &mut self.canvas, &mut self.offscreen, bounds, &self.style) {
                Ok(()) => report.rendered += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(slot = slot.index(), step = report.step, error = %e, "Chamber render failed");
                }
            }
        }
        report
    }
}
