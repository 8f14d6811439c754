//! RGBA drawing surfaces: the shared canvas and per-chamber offscreen frames.

use crate::error::SandboxError;
use chamberview_env::BallPosition;

/// An RGBA color.
pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// Screen-space rectangle a slot draws into. The origin may be fractional
/// (it carries the pan drift) and may lie partly outside the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
    
    /// Integer pixel origin of the rectangle.
    fn origin(&self) -> (i64, i64) {
        (self.x.floor() as i64, self.y.floor() as i64)
    }
}

/// Visual filter applied while compositing a chamber's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    None,
    Grayscale,
    Invert,
    Sepia,
}

impl Filter {
    /// Maps one source pixel through the filter. Alpha is untouched.
    pub fn apply(self, [r, g, b, a]: Rgba) -> Rgba {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        match self {
            Filter::None => [r, g, b, a],
            Filter::Grayscale => {
                let l = channel(0.2126 * rf + 0.7152 * gf + 0.0722 * bf);
                [l, l, l, a]
            }
            Filter::Invert => [255 - r, 255 - g, 255 - b, a],
            Filter::Sepia => [
                channel(0.393 * rf + 0.769 * gf + 0.189 * bf),
                channel(0.349 * rf + 0.686 * gf + 0.168 * bf),
                channel(0.272 * rf + 0.534 * gf + 0.131 * bf),
                a,
            ],
        }
    }
    
    pub fn name(&self) -> &'static str {
        match self {
            Filter::None => "none",
            Filter::Grayscale => "grayscale",
            Filter::Invert => "invert",
            Filter::Sepia => "sepia",
        }
    }
}

fn channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Filter {
    type Err = String;
    
    /// Accepts bare names and CSS-style forms such as `grayscale(100%)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        let name = name.split('(').next().unwrap_or("").trim();
        match name {
            "" | "none" => Ok(Filter::None),
            "grayscale" | "greyscale" => Ok(Filter::Grayscale),
            "invert" => Ok(Filter::Invert),
            "sepia" => Ok(Filter::Sepia),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// How chambers and balls are painted.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    /// Filter applied to sandbox frames (never to balls)
    pub filter: Filter,
    
    /// Ball radius in chamber units, used when the server sends none
    pub ball_radius: f64,
    
    pub ball_color: Rgba,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            filter: Filter::None,
            ball_radius: 0.025,
            ball_color: [240, 240, 240, 255],
        }
    }
}

/// A width × height RGBA pixel surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }
    
    pub fn width(&self) -> u32 {
        self.width
    }
    
    pub fn height(&self) -> u32 {
        self.height
    }
    
    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
    
    /// Resizes the surface; like an HTML canvas, resizing clears it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 4, 0);
    }
    
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let idx = self.index(x as i64, y as i64)?;
        let mut px = [0; 4];
        px.copy_from_slice(&self.pixels[idx..idx + 4]);
        Some(px)
    }
    
    pub fn fill(&mut self, color: Rgba) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }
    
    /// Replaces the whole surface with `rgba`, which must match its size.
    pub fn copy_from_rgba(&mut self, rgba: &[u8]) -> Result<(), SandboxError> {
        if rgba.len() != self.pixels.len() {
            return Err(SandboxError::FrameSize {
                expected: self.pixels.len(),
                actual: rgba.len(),
            });
        }
        self.pixels.copy_from_slice(rgba);
        Ok(())
    }
    
    /// Resets a rectangle to transparent, clipped to the surface.
    pub fn clear_rect(&mut self, bounds: Bounds) {
        let (ox, oy) = bounds.origin();
        for dy in 0..bounds.height as i64 {
            for dx in 0..bounds.width as i64 {
                if let Some(idx) = self.index(ox + dx, oy + dy) {
                    self.pixels[idx..idx + 4].copy_from_slice(&TRANSPARENT);
                }
            }
        }
    }
    
    /// Composites `src` at the origin of `bounds` (source-over), filtering
    /// each source pixel. Only the `bounds` rectangle is touched.
    pub fn draw_image(&mut self, src: &Canvas, bounds: Bounds, filter: Filter) {
        let (ox, oy) = bounds.origin();
        let w = src.width.min(bounds.width) as i64;
        let h = src.height.min(bounds.height) as i64;
        for sy in 0..h {
            for sx in 0..w {
                let Some(dst_idx) = self.index(ox + sx, oy + sy) else {
                    continue;
                };
                let src_idx = ((sy * src.width as i64 + sx) * 4) as usize;
                let mut px = [0; 4];
                px.copy_from_slice(&src.pixels[src_idx..src_idx + 4]);
                self.blend(dst_idx, filter.apply(px));
            }
        }
    }
    
    /// Fills a disc whose center is `(cx, cy)` in canvas pixels.
    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba) {
        if !(radius > 0.0) || !cx.is_finite() || !cy.is_finite() {
            return;
        }
        let r2 = radius * radius;
        let (x0, x1) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
        let (y0, y1) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
                if px * px + py * py > r2 {
                    continue;
                }
                if let Some(idx) = self.index(x, y) {
                    self.blend(idx, color);
                }
            }
        }
    }
    
    /// Draws one slot's balls. Ball coordinates are chamber units: x spans
    /// the slot width, y grows upward from the slot's bottom edge.
    pub fn draw_balls(&mut self, balls: &[BallPosition], bounds: Bounds, style: &RenderStyle) {
        let scale = bounds.width as f64;
        for ball in balls {
            let radius = ball.r.unwrap_or(style.ball_radius) * scale;
            let cx = bounds.x + ball.x * scale;
            let cy = bounds.y + bounds.height as f64 - ball.y * scale;
            self.fill_circle(cx, cy, radius, style.ball_color);
        }
    }
    
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(((y * self.width as i64 + x) * 4) as usize)
    }
    
    fn blend(&mut self, idx: usize, src: Rgba) {
        let alpha = src[3] as u32;
        let dst = &mut self.pixels[idx..idx + 4];
        match alpha {
            255 => dst.copy_from_slice(&src),
            0 => {}
            _ => {
                let inv = 255 - alpha;
                for c in 0..3 {
                    dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * inv) / 255) as u8;
                }
                dst[3] = (alpha + dst[3] as u32 * inv / 255) as u8;
            }
        }
    }
}
