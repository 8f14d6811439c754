//! Frame sinks: where composited frames go after each render.
//!
//! The viewer itself has no window. A sink receives the shared canvas after
//! every delivered frame; `RerunSink` streams it to a Rerun viewer when the
//! `visualization` feature is enabled.

#[cfg(feature = "visualization")]
use rerun::RecordingStream;

use crate::canvas::Canvas;
use crate::compositor::FrameReport;

/// Consumer of composited frames.
pub trait FrameSink: Send {
    fn frame(&mut self, canvas: &Canvas, report: &FrameReport);
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn frame(&mut self, _canvas: &Canvas, _report: &FrameReport) {}
}

/// Streams the canvas and per-frame counters to Rerun.
pub struct RerunSink {
    #[cfg(feature = "visualization")]
    rec: Option<RecordingStream>,
    
    /// Log one frame out of every `every`
    every: u64,
    
    frames: u64,
}

impl RerunSink {
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "visualization")]
            rec: None,
            every: 1,
            frames: 0,
        }
    }
    
    /// Spawns a Rerun viewer; falls back to disabled if that fails.
    #[cfg(feature = "visualization")]
    pub fn new(name: &str, every: u64) -> Self {
        match rerun::RecordingStreamBuilder::new(name).spawn() {
            Ok(rec) => {
                tracing::info!("Rerun frame sink enabled");
                Self {
                    rec: Some(rec),
                    every: every.max(1),
                    frames: 0,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Rerun: {:?}", e);
                Self::disabled()
            }
        }
    }
    
    #[cfg(not(feature = "visualization"))]
    pub fn new(_name: &str, every: u64) -> Self {
        tracing::info!("Rerun frame sink not available (compile with --features visualization)");
        Self {
            every: every.max(1),
            ..Self::disabled()
        }
    }
    
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "visualization")]
        {
            self.rec.is_some()
        }
        #[cfg(not(feature = "visualization"))]
        {
            false
        }
    }
    
    /// Frames offered to the sink so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }
    
    #[cfg(feature = "visualization")]
    fn log(&self, canvas: &Canvas, report: &FrameReport) {
        let Some(rec) = &self.rec else {
            return;
        };
        rec.set_time_sequence("step", report.step as i64);
        if canvas.width() > 0 && canvas.height() > 0 {
            let _ = rec.log(
                "viewer/canvas",
                &rerun::Image::from_rgba32(canvas.pixels().to_vec(), [canvas.width(), canvas.height()]),
            );
        }
        let _ = rec.log("metrics/failed_slots", &rerun::Scalar::new(report.failed as f64));
    }
    
    #[cfg(not(feature = "visualization"))]
    fn log(&self, _canvas: &Canvas, _report: &FrameReport) {}
}

impl FrameSink for RerunSink {
    fn frame(&mut self, canvas: &Canvas, report: &FrameReport) {
        self.frames += 1;
        if self.frames % self.every == 0 {
            self.log(canvas, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_disabled_sink_counts_frames() {
        let mut sink = RerunSink::disabled();
        assert!(!sink.is_enabled());
        
        let canvas = Canvas::new(2, 2);
        sink.frame(&canvas, &FrameReport::default());
        sink.frame(&canvas, &FrameReport::default());
        assert_eq!(sink.frames_seen(), 2);
    }
}
