//! Row/column grid geometry and the slow global pan.

use crate::canvas::Bounds;
use crate::error::LayoutError;

/// Longest canvas side accepted, in pixels.
pub const MAX_CANVAS_SIDE: u32 = 1 << 16;

/// Largest canvas area accepted, in pixels (256 MiB of RGBA).
pub const MAX_CANVAS_PIXELS: u64 = 1 << 26;

/// Converts a fractional pixel measure to whole pixels, absorbing float
/// noise such as `0.7 * 600 = 419.99999999999994`.
fn to_pixels(v: f64) -> u32 {
    (v + 1e-6).floor().max(0.0) as u32
}

/// Geometry derived from the chamber count and row width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    chambers: usize,
    row_width: usize,
    chamber_width: u32,
    chamber_height_ratio: f64,
}

impl GridLayout {
    /// `chamber_height_ratio` is a chamber's height as a fraction of its width.
    pub fn new(
        chambers: usize,
        row_width: usize,
        chamber_width: u32,
        chamber_height_ratio: f64,
    ) -> Result<Self, LayoutError> {
        if row_width == 0 {
            return Err(LayoutError::ZeroRowWidth);
        }
        if chamber_width == 0 {
            return Err(LayoutError::ZeroChamberWidth);
        }
        if !chamber_height_ratio.is_finite() || chamber_height_ratio <= 0.0 {
            return Err(LayoutError::InvalidChamberHeight(chamber_height_ratio));
        }
        let layout = Self {
            chambers,
            row_width,
            chamber_width,
            chamber_height_ratio,
        };
        
        let too_large = || LayoutError::CanvasTooLarge {
            row_width,
            max_side: MAX_CANVAS_SIDE,
            max_pixels: MAX_CANVAS_PIXELS,
        };
        let width = u32::try_from(row_width)
            .ok()
            .and_then(|w| w.checked_mul(chamber_width))
            .filter(|&w| w <= MAX_CANVAS_SIDE)
            .ok_or_else(too_large)?;
        // At least one row, so the chamber height itself is bounded too.
        let height = layout.rows().max(1) as f64 * chamber_height_ratio * chamber_width as f64;
        if height > MAX_CANVAS_SIDE as f64 {
            return Err(too_large());
        }
        if u64::from(width) * u64::from(to_pixels(height)) > MAX_CANVAS_PIXELS {
            return Err(too_large());
        }
        Ok(layout)
    }
    
    /// Number of populated slots.
    pub fn chambers(&self) -> usize {
        self.chambers
    }
    
    pub fn row_width(&self) -> usize {
        self.row_width
    }
    
    /// Total slots: the chamber count padded up to a multiple of the row width.
    pub fn slot_count(&self) -> usize {
        let w = self.row_width;
        self.chambers + (w - self.chambers % w) % w
    }
    
    pub fn rows(&self) -> usize {
        self.slot_count() / self.row_width
    }
    
    pub fn chamber_width(&self) -> u32 {
        self.chamber_width
    }
    
    pub fn chamber_height(&self) -> u32 {
        to_pixels(self.chamber_height_ratio * self.chamber_width as f64)
    }
    
    pub fn canvas_width(&self) -> u32 {
        self.row_width as u32 * self.chamber_width
    }
    
    pub fn canvas_height(&self) -> u32 {
        to_pixels(self.rows() as f64 * self.chamber_height_ratio * self.chamber_width as f64)
    }
    
    /// Screen rectangle of slot `index`, shifted by the current pan.
    pub fn slot_bounds(&self, index: usize, pan: &PanDrift) -> Bounds {
        let row = index / self.row_width;
        let col = index % self.row_width;
        let row_y = to_pixels(row as f64 * self.chamber_height_ratio * self.chamber_width as f64);
        Bounds {
            x: (col as u32 * self.chamber_width) as f64 + pan.x,
            y: row_y as f64 + pan.y,
            width: self.chamber_width,
            height: self.chamber_height(),
        }
    }
}

/// Global offset added to every slot, nudged once per rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PanDrift {
    x: f64,
    y: f64,
    step_x: f64,
    step_y: f64,
}

impl PanDrift {
    pub fn new(step_x: f64, step_y: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            step_x,
            step_y,
        }
    }
    
    pub fn x(&self) -> f64 {
        self.x
    }
    
    pub fn y(&self) -> f64 {
        self.y
    }
    
    /// Moves one step, wrapping each axis modulo the canvas size.
    pub fn advance(&mut self, canvas_width: u32, canvas_height: u32) {
        self.x = wrap(self.x + self.step_x, canvas_width);
        self.y = wrap(self.y + self.step_y, canvas_height);
    }
}

impl Default for PanDrift {
    fn default() -> Self {
        Self::new(0.05, 0.01)
    }
}

fn wrap(v: f64, extent: u32) -> f64 {
    if extent == 0 {
        0.0
    } else {
        v.rem_euclid(extent as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    
    #[test]
    fn test_three_chambers_two_wide() {
        let layout = GridLayout::new(3, 2, 600, 0.5).unwrap();
        assert_eq!(layout.slot_count(), 4);
        assert_eq!(layout.rows(), 2);
        assert_eq!(layout.canvas_width(), 1200);
        assert_eq!(layout.canvas_height(), 600);
        
        let pan = PanDrift::new(0.0, 0.0);
        assert_eq!(layout.slot_bounds(3, &pan), Bounds::new(600.0, 300.0, 600, 300));
    }
    
    #[test]
    fn test_exact_multiple_needs_no_padding() {
        let layout = GridLayout::new(6, 3, 100, 1.0).unwrap();
        assert_eq!(layout.slot_count(), 6);
        assert_eq!(layout.rows(), 2);
    }
    
    #[test]
    fn test_no_chambers() {
        let layout = GridLayout::new(0, 4, 100, 1.0).unwrap();
        assert_eq!(layout.slot_count(), 0);
        assert_eq!(layout.canvas_height(), 0);
    }
    
    #[test]
    fn test_fractional_heights_round_stably() {
        let layout = GridLayout::new(1, 1, 600, 0.7).unwrap();
        assert_eq!(layout.chamber_height(), 420);
        assert_eq!(layout.canvas_height(), 420);
    }
    
    #[test]
    fn test_invalid_inputs() {
        assert_eq!(GridLayout::new(3, 0, 600, 0.5), Err(LayoutError::ZeroRowWidth));
        assert_eq!(GridLayout::new(3, 1, 0, 0.5), Err(LayoutError::ZeroChamberWidth));
        assert!(matches!(
            GridLayout::new(3, 1, 600, f64::NAN),
            Err(LayoutError::InvalidChamberHeight(_))
        ));
        assert_eq!(
            GridLayout::new(3, 1, 600, -1.0),
            Err(LayoutError::InvalidChamberHeight(-1.0))
        );
    }
    
    #[test]
    fn test_oversized_canvas_is_rejected() {
        for row_width in [8_000_000, 110, usize::MAX] {
            assert!(matches!(
                GridLayout::new(3, row_width, 600, 0.5),
                Err(LayoutError::CanvasTooLarge { .. })
            ));
        }
        // Tall chambers overflow the side limit even with a single row.
        assert!(matches!(
            GridLayout::new(1, 1, 600, 1e9),
            Err(LayoutError::CanvasTooLarge { .. })
        ));
        // Many rows of small chambers overflow it as well.
        assert!(matches!(
            GridLayout::new(200_000, 1, 600, 0.5),
            Err(LayoutError::CanvasTooLarge { .. })
        ));
        
        let widest = GridLayout::new(3, 109, 600, 0.5).unwrap();
        assert_eq!(widest.canvas_width(), 65_400);
    }
    
    #[test]
    fn test_pan_moves_slots_and_wraps() {
        let layout = GridLayout::new(2, 2, 10, 1.0).unwrap();
        let mut pan = PanDrift::new(4.0, 3.0);
        pan.advance(layout.canvas_width(), layout.canvas_height());
        assert_eq!(layout.slot_bounds(1, &pan).x, 14.0);
        assert_eq!(layout.slot_bounds(1, &pan).y, 3.0);
        
        for _ in 0..4 {
            pan.advance(layout.canvas_width(), layout.canvas_height());
        }
        assert_eq!(pan.x(), 0.0);
        assert_eq!(pan.y(), 5.0);
    }
    
    proptest! {
        #[test]
        fn prop_slots_cover_chambers(n in 0usize..200, w in 1usize..20) {
            let layout = GridLayout::new(n, w, 600, 0.5).unwrap();
            let slots = layout.slot_count();
            prop_assert_eq!(slots % w, 0);
            prop_assert!(slots >= n && slots < n + w);
            prop_assert_eq!(layout.rows(), (n + w - 1) / w);
            prop_assert_eq!(layout.canvas_width() as usize, w * 600);
        }
        
        #[test]
        fn prop_pan_stays_on_canvas(steps in 0usize..5000, w in 1u32..50, h in 1u32..50) {
            let mut pan = PanDrift::new(0.37, 0.21);
            for _ in 0..steps {
                pan.advance(w, h);
            }
            prop_assert!(pan.x() >= 0.0 && pan.x() < w as f64);
            prop_assert!(pan.y() >= 0.0 && pan.y() < h as f64);
        }
    }
}
