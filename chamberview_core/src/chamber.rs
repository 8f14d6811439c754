//! Grid slots and the chamber each one owns.

use chamberview_env::ChamberId;

use crate::canvas::{Bounds, Canvas, RenderStyle};
use crate::error::{SandboxError, ViewerError};
use crate::sandbox::{load_state, Sandbox};
use crate::snapshot_buffer::Snapshot;

/// A chamber backed by a live sandbox.
pub struct PopulatedChamber {
    id: ChamberId,
    sandbox: Box<dyn Sandbox>,
    frame: Vec<u8>,
}

impl PopulatedChamber {
    pub fn id(&self) -> &ChamberId {
        &self.id
    }
}

/// What occupies a slot. Chosen when the grid is built and never changed.
pub enum ChamberSandbox {
    Populated(PopulatedChamber),
    /// Padding slot, or a chamber whose artifact could not be loaded
    Empty,
}

/// One position in the grid. `index` doubles as the key into a snapshot's
/// per-chamber tables.
pub struct ChamberSlot {
    index: usize,
    chamber: ChamberSandbox,
}

impl ChamberSlot {
    /// Wraps a sandbox and tells it the frame size it will draw at.
    pub fn populated(
        index: usize,
        id: ChamberId,
        mut sandbox: Box<dyn Sandbox>,
        width: u32,
        height: u32,
    ) -> Result<Self, SandboxError> {
        sandbox.init(width, height)?;
        Ok(Self {
            index,
            chamber: ChamberSandbox::Populated(PopulatedChamber {
                id,
                sandbox,
                frame: Vec::new(),
            }),
        })
    }
    
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            chamber: ChamberSandbox::Empty,
        }
    }
    
    pub fn index(&self) -> usize {
        self.index
    }
    
    pub fn chamber(&self) -> &ChamberSandbox {
        &self.chamber
    }
    
    pub fn is_populated(&self) -> bool {
        matches!(self.chamber, ChamberSandbox::Populated(_))
    }
    
    /// Draws this slot's part of `snapshot` into `bounds` on `canvas`.
    ///
    /// `offscreen` must already be sized to the chamber frame. On error the
    /// canvas has not been touched.
    pub fn render(
        &mut self,
        snapshot: &Snapshot,
        canvas: &mut Canvas,
        offscreen: &mut Canvas,
        bounds: Bounds,
        style: &RenderStyle,
    ) -> Result<(), ViewerError> {
        let slot = self.index;
        match &mut self.chamber {
            ChamberSandbox::Populated(chamber) => {
                let state = snapshot.state(slot).ok_or(ViewerError::MissingChamberData {
                    step: snapshot.num_steps_taken(),
                    slot,
                    what: "state",
                })?;
                load_state(chamber.sandbox.as_mut(), state)?;
                chamber.sandbox.draw(&mut chamber.frame)?;
                offscreen.copy_from_rgba(&chamber.frame)?;
                canvas.draw_image(offscreen, bounds, style.filter);
            }
            ChamberSandbox::Empty => canvas.clear_rect(bounds),
        }
        canvas.draw_balls(snapshot.balls(slot), bounds, style);
        Ok(())
    }
}

impl std::fmt::Debug for ChamberSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.chamber {
            ChamberSandbox::Populated(c) => write!(f, "Slot({}, {})", self.index, c.id),
            ChamberSandbox::Empty => write!(f, "Slot({}, empty)", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Filter, TRANSPARENT};
    use crate::test_support::{step, step_with, FakeSandbox, FakeSandboxState};
    use std::sync::{Arc, Mutex};
    
    const W: u32 = 10;
    const H: u32 = 5;
    
    fn slot(capacity: usize) -> (ChamberSlot, Arc<Mutex<FakeSandboxState>>) {
        let (sandbox, state) = FakeSandbox::new(capacity);
        let slot = ChamberSlot::populated(0, ChamberId::new("a"), Box::new(sandbox), W, H).unwrap();
        (slot, state)
    }
    
    fn surfaces() -> (Canvas, Canvas, Bounds) {
        (Canvas::new(W, H), Canvas::new(W, H), Bounds::new(0.0, 0.0, W, H))
    }
    
    #[test]
    fn test_populated_init_receives_frame_size() {
        let (_, state) = slot(3);
        assert_eq!(state.lock().unwrap().init, Some((W, H)));
    }
    
    #[test]
    fn test_populated_draws_state_then_balls() {
        let (mut slot, state) = slot(3);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        let snapshot = Snapshot::new(step_with(1, 1, &[200, 10, 20]), 0.0);
        let style = RenderStyle::default();
        
        slot.render(&snapshot, &mut canvas, &mut offscreen, bounds, &style).unwrap();
        
        assert_eq!(canvas.pixel(0, 0), Some([200, 10, 20, 255]));
        // ball at (0.5, 0.5) chamber units -> (5, 0) px, radius 0.25 px
        assert_eq!(state.lock().unwrap().draws, 1);
    }
    
    #[test]
    fn test_filter_applies_to_chamber_only() {
        let (mut slot, _) = slot(3);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        let mut step = step_with(1, 1, &[0, 0, 0]);
        step.chamber_balls.insert(0, vec![chamberview_env::BallPosition {
            x: 0.5,
            y: 0.25,
            r: Some(0.2),
        }]);
        let snapshot = Snapshot::new(step, 0.0);
        let style = RenderStyle {
            filter: Filter::Invert,
            ball_color: [255, 0, 0, 255],
            ..Default::default()
        };
        
        slot.render(&snapshot, &mut canvas, &mut offscreen, bounds, &style).unwrap();
        
        assert_eq!(canvas.pixel(0, 0), Some([255, 255, 255, 255]));
        // ball center (5, 2.5), radius 2
        assert_eq!(canvas.pixel(5, 2), Some([255, 0, 0, 255]));
    }
    
    #[test]
    fn test_missing_state_is_typed_error() {
        let (mut slot, state) = slot(3);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        let snapshot = Snapshot::new(step(7), 0.0);
        
        let err = slot
            .render(&snapshot, &mut canvas, &mut offscreen, bounds, &RenderStyle::default())
            .unwrap_err();
        
        assert!(matches!(
            err,
            ViewerError::MissingChamberData { step: 7, slot: 0, what: "state" }
        ));
        assert_eq!(state.lock().unwrap().loads, 0);
    }
    
    #[test]
    fn test_length_mismatch_leaves_canvas_and_memory() {
        let (mut slot, state) = slot(3);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        canvas.fill([1, 2, 3, 255]);
        let snapshot = Snapshot::new(step_with(1, 1, &[9, 9]), 0.0);
        
        let err = slot
            .render(&snapshot, &mut canvas, &mut offscreen, bounds, &RenderStyle::default())
            .unwrap_err();
        
        assert!(matches!(
            err,
            ViewerError::Sandbox(SandboxError::StateLengthMismatch { expected: 3, actual: 2 })
        ));
        assert!(state.lock().unwrap().memory.iter().all(|&b| b == 0));
        assert_eq!(canvas.pixel(4, 4), Some([1, 2, 3, 255]));
    }
    
    #[test]
    fn test_trap_leaves_previous_pixels() {
        let (mut slot, state) = slot(3);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        canvas.fill([1, 2, 3, 255]);
        state.lock().unwrap().trap_on_draw = true;
        let snapshot = Snapshot::new(step_with(1, 1, &[9, 9, 9]), 0.0);
        
        let err = slot
            .render(&snapshot, &mut canvas, &mut offscreen, bounds, &RenderStyle::default())
            .unwrap_err();
        
        assert!(matches!(err, ViewerError::Sandbox(SandboxError::Trap(_))));
        assert_eq!(canvas.pixel(0, 0), Some([1, 2, 3, 255]));
    }
    
    #[test]
    fn test_empty_slot_clears_and_draws_balls() {
        let mut slot = ChamberSlot::empty(1);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        canvas.fill([1, 2, 3, 255]);
        let snapshot = Snapshot::new(step_with(1, 2, &[]), 0.0);
        let style = RenderStyle {
            ball_radius: 0.2,
            ..Default::default()
        };
        
        slot.render(&snapshot, &mut canvas, &mut offscreen, bounds, &style).unwrap();
        
        assert_eq!(canvas.pixel(0, 4), Some(TRANSPARENT));
        // ball at (0.5, 0.5) -> center (5, 0), radius 2
        assert_eq!(canvas.pixel(5, 0), Some(style.ball_color));
    }
    
    #[test]
    fn test_empty_slot_without_balls_entry() {
        let mut slot = ChamberSlot::empty(3);
        let (mut canvas, mut offscreen, bounds) = surfaces();
        let snapshot = Snapshot::new(step(1), 0.0);
        assert!(slot
            .render(&snapshot, &mut canvas, &mut offscreen, bounds, &RenderStyle::default())
            .is_ok());
    }
}
