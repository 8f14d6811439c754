//! The capability a chamber's isolated execution environment exposes.
//!
//! A sandbox owns a private linear memory. The only way to inject state is
//! to write bytes into the region it declares and ask it to `load` them.

use crate::error::SandboxError;

/// Where a sandbox expects its state bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRegion {
    /// Offset of the region in sandbox memory
    pub base: usize,
    
    /// Exact number of state bytes the sandbox accepts
    pub capacity: usize,
}

/// One isolated chamber instance.
pub trait Sandbox: Send {
    /// Tells the sandbox the pixel size of the frames it will draw.
    fn init(&mut self, width: u32, height: u32) -> Result<(), SandboxError>;
    
    fn state_region(&mut self) -> Result<StateRegion, SandboxError>;
    
    /// Copies `bytes` to the start of `region`.
    fn write_state(&mut self, region: StateRegion, bytes: &[u8]) -> Result<(), SandboxError>;
    
    fn load(&mut self) -> Result<(), SandboxError>;
    
    /// Runs the drawing routine and replaces `out` with its RGBA frame.
    fn draw(&mut self, out: &mut Vec<u8>) -> Result<(), SandboxError>;
}

/// Builds sandboxes from downloaded chamber artifacts.
pub trait SandboxFactory: Send + Sync {
    fn instantiate(&self, artifact: &[u8]) -> Result<Box<dyn Sandbox>, SandboxError>;
}

/// Pushes one snapshot's state into `sandbox`.
///
/// The length check happens before anything is written, so a rejected
/// snapshot leaves sandbox memory as it was.
pub fn load_state(sandbox: &mut dyn Sandbox, bytes: &[u8]) -> Result<(), SandboxError> {
    let region = sandbox.state_region()?;
    if bytes.len() != region.capacity {
        return Err(SandboxError::StateLengthMismatch {
            expected: region.capacity,
            actual: bytes.len(),
        });
    }
    sandbox.write_state(region, bytes)?;
    sandbox.load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSandbox;
    
    #[test]
    fn test_load_state_writes_then_loads() {
        let (mut sandbox, state) = FakeSandbox::new(4);
        load_state(&mut sandbox, &[1, 2, 3, 4]).unwrap();
        
        let state = state.lock().unwrap();
        assert_eq!(&state.memory[16..20], &[1, 2, 3, 4]);
        assert_eq!(state.loads, 1);
    }
    
    #[test]
    fn test_length_mismatch_is_rejected_before_write() {
        let (mut sandbox, state) = FakeSandbox::new(4);
        let err = load_state(&mut sandbox, &[9, 9, 9]).unwrap_err();
        
        assert!(matches!(
            err,
            SandboxError::StateLengthMismatch { expected: 4, actual: 3 }
        ));
        let state = state.lock().unwrap();
        assert!(state.memory.iter().all(|&b| b == 0));
        assert_eq!(state.loads, 0);
    }
}
