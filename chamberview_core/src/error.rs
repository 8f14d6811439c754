//! Error types for the ChamberView playback core.

use chamberview_env::EnvError;
use thiserror::Error;

/// Errors raised by a chamber sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Artifact failed to compile: {0}")]
    Compile(String),
    
    #[error("Sandbox failed to instantiate: {0}")]
    Instantiate(String),
    
    #[error("Artifact is missing export `{0}`")]
    MissingExport(String),
    
    /// A sandbox call trapped or ran out of fuel
    #[error("Sandbox trapped: {0}")]
    Trap(String),
    
    /// State bytes do not match the region the sandbox declared
    #[error("State length {actual} does not match region capacity {expected}")]
    StateLengthMismatch { expected: usize, actual: usize },
    
    /// The drawing routine produced a frame of the wrong size
    #[error("Sandbox frame has {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
    
    /// A sandbox-reported region lies outside its memory
    #[error("Region {base:#x}+{len} lies outside sandbox memory of {memory_size} bytes")]
    OutOfBounds { base: usize, len: usize, memory_size: usize },
}

impl SandboxError {
    pub(crate) fn trap(err: impl std::fmt::Display) -> Self {
        Self::Trap(err.to_string())
    }
}

/// Errors raised while deriving a grid layout.
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("Row width must be at least 1")]
    ZeroRowWidth,
    
    #[error("Chamber height ratio must be positive and finite, got {0}")]
    InvalidChamberHeight(f64),
    
    #[error("Chamber width must be at least 1 pixel")]
    ZeroChamberWidth,
    
    #[error("Row width {row_width} gives a canvas beyond {max_side} px per side or {max_pixels} px in total")]
    CanvasTooLarge { row_width: usize, max_side: u32, max_pixels: u64 },
}

/// Top-level viewer errors.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Service error: {0}")]
    Service(#[from] EnvError),
    
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
    
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),
    
    /// A snapshot carried no entry for a slot that needs one
    #[error("Snapshot {step} has no {what} for slot {slot}")]
    MissingChamberData { step: u64, slot: usize, what: &'static str },
    
    /// The relayout worker or render loop has shut down
    #[error("Viewer task stopped: {0}")]
    Stopped(&'static str),
}
